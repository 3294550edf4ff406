#![allow(dead_code)]

use asupersync::runtime::RuntimeBuilder;
use quotedb::prelude::*;
use quotedb::{Project, StatementLog};

pub fn block_on<T>(f: impl Future<Output = T>) -> T {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    rt.block_on(f)
}

pub fn unwrap_outcome<T>(outcome: Outcome<T, Error>) -> T {
    match outcome {
        Outcome::Ok(v) => v,
        Outcome::Err(e) => panic!("unexpected error: {e}"),
        Outcome::Cancelled(r) => panic!("cancelled: {r:?}"),
        Outcome::Panicked(p) => panic!("panicked: {p:?}"),
    }
}

pub fn expect_err<T>(outcome: Outcome<T, Error>) -> Error {
    match outcome {
        Outcome::Err(e) => e,
        Outcome::Ok(_) => panic!("expected an error, got a value"),
        Outcome::Cancelled(r) => panic!("cancelled: {r:?}"),
        Outcome::Panicked(p) => panic!("panicked: {p:?}"),
    }
}

/// A fresh in-memory catalog recording every statement into `log`.
pub async fn recording_factory(cx: &Cx, log: &StatementLog) -> SessionFactory {
    unwrap_outcome(SessionFactory::open_recording(cx, FactoryConfig::default(), log.clone()).await)
}

/// Seed the catalog in one transaction and return the projected quotes.
pub async fn seed_catalog(cx: &Cx, factory: &SessionFactory) -> Vec<model::Quote> {
    unwrap_outcome(
        factory
            .call_in_transaction(cx, async |session| {
                let quotes = try_result!(seed::insert_quotes(session));
                try_outcome!(session.flush(cx).await);
                Outcome::Ok(try_result!(quotes.project()))
            })
            .await,
    )
}

/// Number of rows `sql` returns, read in its own transaction.
pub async fn count_rows(cx: &Cx, factory: &SessionFactory, sql: &str) -> usize {
    unwrap_outcome(
        factory
            .call_in_transaction(cx, async |session| {
                let rows = try_outcome!(session.native_query(cx, sql, &[]).await);
                Outcome::Ok(rows.len())
            })
            .await,
    )
}
