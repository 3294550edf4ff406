//! Seed a quote catalog and print what a query returns.
//!
//! Every subcommand opens a fresh factory (in-memory unless `--url` or
//! `QUOTEDB_URL` names a file), inserts the seed quotes in one transaction and
//! runs its query in a second one. Records go to stdout one per line, followed
//! by a count line; diagnostics go to stderr through `tracing`.

use std::io::{self, Write};
use std::process::ExitCode;

use anyhow::{Context, anyhow};
use asupersync::runtime::RuntimeBuilder;
use clap::{Parser, Subcommand};
use quotedb::prelude::*;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "quotedb-cli", version, about = "Seed a quote catalog and query it")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Database URL: `sqlite::memory:`, `sqlite:<path>` or a bare path.
    #[arg(long, global = true)]
    url: Option<String>,

    /// Log every SQL statement at info level.
    #[arg(long, global = true)]
    echo_sql: bool,

    /// Print JSON lines instead of the text form.
    #[arg(long, global = true)]
    json: bool,

    /// Raise the default log level to debug.
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
enum Command {
    /// Every quote with its author and subjects.
    QueryQuotes,
    /// Quotes attributed to one author.
    QueryByAuthor {
        #[arg(default_value = quotedb::seed::RON_PAUL)]
        name: String,
    },
    /// Quotes tagged with one subject.
    QueryBySubject {
        #[arg(default_value = quotedb::seed::LIBERTY)]
        subject: String,
    },
    /// Add two "David Icke" quotes, then list every quote.
    InsertAndQuery,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let config = factory_config(cli)?;
    let rt = RuntimeBuilder::current_thread()
        .build()
        .map_err(|e| anyhow!("failed to create runtime: {e:?}"))?;
    let cx = Cx::for_testing();

    let quotes = match rt.block_on(execute(&cx, config, &cli.command)) {
        Outcome::Ok(quotes) => quotes,
        Outcome::Err(e) => return Err(e).context("query failed"),
        Outcome::Cancelled(reason) => return Err(anyhow!("cancelled: {reason:?}")),
        Outcome::Panicked(payload) => return Err(anyhow!("panicked: {payload:?}")),
    };
    print_quotes(&quotes, cli.json)
}

fn factory_config(cli: &Cli) -> anyhow::Result<FactoryConfig> {
    let mut config = FactoryConfig::from_env().context("invalid QUOTEDB_* environment")?;
    if let Some(url) = &cli.url {
        config = config.url(url.clone());
    }
    if cli.echo_sql {
        config = config.echo_sql(true);
    }
    Ok(config)
}

async fn execute(
    cx: &Cx,
    config: FactoryConfig,
    command: &Command,
) -> Outcome<Vec<model::Quote>, Error> {
    let factory = try_outcome!(SessionFactory::open(cx, config).await);
    try_outcome!(
        factory
            .call_in_transaction(cx, async |session| {
                let seeded = try_result!(seed::insert_quotes(session));
                tracing::info!(quotes = seeded.len(), "Seeded catalog");
                Outcome::Ok(())
            })
            .await
    );

    let quotes = factory
        .call_in_transaction(cx, async |session| {
            let found = match command {
                Command::QueryQuotes => try_outcome!(repository::find_all_quotes(session, cx).await),
                Command::QueryByAuthor { name } => {
                    try_outcome!(repository::find_quotes_by_author(session, cx, name).await)
                }
                Command::QueryBySubject { subject } => {
                    try_outcome!(repository::find_quotes_by_subject(session, cx, subject).await)
                }
                Command::InsertAndQuery => {
                    try_outcome!(seed::insert_extra_quotes(session, cx).await);
                    try_outcome!(repository::find_all_quotes(session, cx).await)
                }
            };
            Outcome::Ok(try_result!(found.project()))
        })
        .await;
    factory.close();
    quotes
}

fn print_quotes(quotes: &[model::Quote], json: bool) -> anyhow::Result<()> {
    let mut out = io::stdout().lock();
    for quote in quotes {
        if json {
            writeln!(out, "{}", serde_json::to_string(quote)?)?;
        } else {
            writeln!(out, "{quote}")?;
        }
    }
    writeln!(out, "{} quote(s)", quotes.len())?;
    out.flush()?;
    Ok(())
}
