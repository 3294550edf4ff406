mod common;

use common::{block_on, count_rows, expect_err, recording_factory, seed_catalog, unwrap_outcome};
use quotedb::prelude::*;
use quotedb::entity::Quote as QuoteEntity;
use quotedb::{Project, StatementLog};
use std::sync::Arc;

#[test]
fn seeded_quotes_round_trip_through_a_planned_query() {
    let cx = Cx::for_testing();
    let log = StatementLog::new();
    block_on(async {
        let factory = recording_factory(&cx, &log).await;
        let inserted = seed_catalog(&cx, &factory).await;
        assert_eq!(inserted.len(), 14);
        assert!(inserted.iter().all(|q| q.id.is_some()));

        let queried = unwrap_outcome(
            factory
                .call_in_transaction(&cx, async |session| {
                    let quotes = try_outcome!(repository::find_all_quotes(session, &cx).await);
                    Outcome::Ok(try_result!(quotes.project()))
                })
                .await,
        );
        assert_eq!(queried, inserted);

        let ids: Vec<_> = queried.iter().filter_map(|q| q.id).collect();
        assert_eq!(ids, (1..=14).collect::<Vec<_>>());
        // Subjects order by id: liberty was inserted before financial system
        assert_eq!(queried[9].subject_names().collect::<Vec<_>>(), vec![
            "liberty",
            "financial system"
        ]);
    });
}

#[test]
fn filter_by_author() {
    let cx = Cx::for_testing();
    let log = StatementLog::new();
    block_on(async {
        let factory = recording_factory(&cx, &log).await;
        let inserted = seed_catalog(&cx, &factory).await;

        let ron_paul = unwrap_outcome(
            factory
                .call_in_transaction(&cx, async |session| {
                    let quotes = try_outcome!(
                        repository::find_quotes_by_author(session, &cx, "Ron Paul").await
                    );
                    Outcome::Ok(try_result!(quotes.project()))
                })
                .await,
        );
        assert_eq!(ron_paul.len(), 9);
        assert!(ron_paul.iter().all(|q| q.attributed_to.name == "Ron Paul"));
        assert!(ron_paul.iter().all(|q| !q.subjects.is_empty()));

        let expected: Vec<_> = inserted
            .into_iter()
            .filter(|q| q.attributed_to.name == "Ron Paul")
            .collect();
        assert_eq!(ron_paul, expected);
    });
}

#[test]
fn filter_by_subject_keeps_complete_subject_sets() {
    let cx = Cx::for_testing();
    let log = StatementLog::new();
    block_on(async {
        let factory = recording_factory(&cx, &log).await;
        let inserted = seed_catalog(&cx, &factory).await;
        let expected: Vec<_> = inserted
            .iter()
            .filter(|q| q.has_subject("liberty"))
            .cloned()
            .collect();
        assert_eq!(expected.len(), 7);

        let planned = unwrap_outcome(
            factory
                .call_in_transaction(&cx, async |session| {
                    let quotes = try_outcome!(
                        repository::find_quotes_by_subject(session, &cx, "liberty").await
                    );
                    Outcome::Ok(try_result!(quotes.project()))
                })
                .await,
        );
        assert_eq!(planned, expected);
        let end_the_fed = planned
            .iter()
            .find(|q| q.quote_text.contains("end the Fed"))
            .expect("quote tagged with two subjects");
        assert_eq!(end_the_fed.subjects.len(), 2);

        log.clear();
        let one_by_one = unwrap_outcome(
            factory
                .call_in_transaction(&cx, async |session| {
                    let quotes = try_outcome!(
                        repository::find_quotes_by_subject_one_by_one(session, &cx, "liberty")
                            .await
                    );
                    Outcome::Ok(try_result!(quotes.project()))
                })
                .await,
        );
        assert_eq!(one_by_one, expected);
        // One id query plus one find per quote
        assert_eq!(log.select_count(), 1 + expected.len());
    });
}

#[test]
fn upserting_an_author_twice_creates_one_row() {
    let cx = Cx::for_testing();
    let log = StatementLog::new();
    block_on(async {
        let factory = recording_factory(&cx, &log).await;

        let same = unwrap_outcome(
            factory
                .call_in_transaction(&cx, async |session| {
                    let first = try_outcome!(
                        repository::upsert_author(session, &cx, "David Icke").await
                    );
                    let second = try_outcome!(
                        repository::upsert_author(session, &cx, "David Icke").await
                    );
                    Outcome::Ok(Arc::ptr_eq(&first, &second))
                })
                .await,
        );
        assert!(same);

        unwrap_outcome(
            factory
                .call_in_transaction(&cx, async |session| {
                    try_outcome!(repository::upsert_author(session, &cx, "David Icke").await);
                    Outcome::Ok(())
                })
                .await,
        );
        let rows = count_rows(
            &cx,
            &factory,
            "SELECT id FROM AUTHOR WHERE name = 'David Icke'",
        )
        .await;
        assert_eq!(rows, 1);
    });
}

#[test]
fn planned_query_issues_exactly_one_select() {
    let cx = Cx::for_testing();
    let log = StatementLog::new();
    block_on(async {
        let factory = recording_factory(&cx, &log).await;
        seed_catalog(&cx, &factory).await;
        log.clear();

        let quotes = unwrap_outcome(
            factory
                .call_in_transaction(&cx, async |session| {
                    let quotes = try_outcome!(repository::find_all_quotes(session, &cx).await);
                    Outcome::Ok(try_result!(quotes.project()))
                })
                .await,
        );
        assert_eq!(quotes.len(), 14);
        assert_eq!(log.select_count(), 1);
        assert_eq!(log.insert_count(), 0);
    });
}

#[test]
fn projecting_without_a_load_plan_after_close_is_an_incomplete_graph() {
    let cx = Cx::for_testing();
    let log = StatementLog::new();
    block_on(async {
        let factory = recording_factory(&cx, &log).await;
        seed_catalog(&cx, &factory).await;

        let detached = unwrap_outcome(
            factory
                .call_in_transaction(&cx, async |session| {
                    session.query(&cx, &Query::<QuoteEntity>::new()).await
                })
                .await,
        );
        assert_eq!(detached.len(), 14);

        let err = detached.project().unwrap_err();
        match err {
            Error::IncompleteGraph { entity, path } => {
                assert_eq!(entity, "Quote");
                assert_eq!(path, "attributedTo");
            }
            other => panic!("expected an incomplete graph, got {other}"),
        }
    });
}

#[test]
fn explicit_initialization_costs_extra_statements() {
    let cx = Cx::for_testing();
    let log = StatementLog::new();
    block_on(async {
        let factory = recording_factory(&cx, &log).await;
        let inserted = seed_catalog(&cx, &factory).await;
        log.clear();

        let projected = unwrap_outcome(
            factory
                .call_in_transaction(&cx, async |session| {
                    let quotes = try_outcome!(
                        session.query(&cx, &Query::<QuoteEntity>::new().order_by("id")).await
                    );
                    for quote in &quotes {
                        try_outcome!(session.initialize(&cx, quote, "attributedTo").await);
                        try_outcome!(session.initialize(&cx, quote, "subjects").await);
                    }
                    Outcome::Ok(try_result!(quotes.project()))
                })
                .await,
        );
        assert_eq!(projected, inserted);
        // One statement per relationship per quote
        assert_eq!(log.select_count(), 1 + 2 * 14);
    });
}

#[test]
fn repeated_queries_return_the_same_instances() {
    let cx = Cx::for_testing();
    let log = StatementLog::new();
    block_on(async {
        let factory = recording_factory(&cx, &log).await;
        seed_catalog(&cx, &factory).await;

        let identical = unwrap_outcome(
            factory
                .call_in_transaction(&cx, async |session| {
                    let first = try_outcome!(repository::find_all_quotes(session, &cx).await);
                    let second = try_outcome!(repository::find_all_quotes(session, &cx).await);
                    let same_roots = first
                        .iter()
                        .zip(&second)
                        .all(|(a, b)| Arc::ptr_eq(a, b));
                    let author = |q: &EntityRef<QuoteEntity>| {
                        q.read()
                            .unwrap_or_else(|e| e.into_inner())
                            .attributed_to
                            .get()
                            .cloned()
                    };
                    let shared_author = match (author(&first[5]), author(&first[6])) {
                        (Some(a), Some(b)) => Arc::ptr_eq(&a, &b),
                        _ => false,
                    };
                    Outcome::Ok(same_roots && shared_author && first.len() == second.len())
                })
                .await,
        );
        assert!(identical);
    });
}

#[test]
fn insert_and_query_adds_two_quotes() {
    let cx = Cx::for_testing();
    let log = StatementLog::new();
    block_on(async {
        let factory = recording_factory(&cx, &log).await;
        let inserted = seed_catalog(&cx, &factory).await;

        let all = unwrap_outcome(
            factory
                .call_in_transaction(&cx, async |session| {
                    try_outcome!(seed::insert_extra_quotes(session, &cx).await);
                    // The second extra quote is flushed by the query itself
                    let quotes = try_outcome!(repository::find_all_quotes(session, &cx).await);
                    Outcome::Ok(try_result!(quotes.project()))
                })
                .await,
        );
        assert_eq!(all.len(), inserted.len() + 2);
        assert!(inserted.iter().all(|q| all.contains(q)));
        let icke: Vec<_> = all
            .iter()
            .filter(|q| q.attributed_to.name == "David Icke")
            .collect();
        assert_eq!(icke.len(), 2);
        assert!(icke[0].has_subject("tyranny"));
        assert!(icke[1].has_subject("truth"));

        // Running it again reuses the author and both subjects
        unwrap_outcome(
            factory
                .call_in_transaction(&cx, async |session| {
                    try_outcome!(seed::insert_extra_quotes(session, &cx).await);
                    Outcome::Ok(())
                })
                .await,
        );
        assert_eq!(count_rows(&cx, &factory, "SELECT id FROM AUTHOR").await, 3);
        assert_eq!(count_rows(&cx, &factory, "SELECT id FROM SUBJECT").await, 8);
        assert_eq!(count_rows(&cx, &factory, "SELECT id FROM QUOTE").await, 18);
    });
}

#[test]
fn session_is_closed_after_the_transaction() {
    let cx = Cx::for_testing();
    let log = StatementLog::new();
    block_on(async {
        let factory = recording_factory(&cx, &log).await;
        let mut session = unwrap_outcome(factory.open_session(&cx).await);
        unwrap_outcome(session.begin(&cx).await);
        unwrap_outcome(session.close(&cx).await);
        unwrap_outcome(session.close(&cx).await);
        let err = expect_err(repository::find_all_quotes(&mut session, &cx).await);
        assert!(err.session_kind().is_some());
        assert_eq!(factory.pool_stats().active_connections, 0);
    });
}
