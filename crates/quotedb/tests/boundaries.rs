mod common;

use common::{block_on, count_rows, expect_err, recording_factory, seed_catalog, unwrap_outcome};
use quotedb::entity::{Author, MAX_QUOTE_LENGTH, QUOTE_TEXT_LENGTH_CONSTRAINT, Quote, Subject};
use quotedb::prelude::*;
use quotedb::{Project, StatementLog};

fn text_of_length(len: usize) -> String {
    "q".repeat(len)
}

#[test]
fn quote_text_at_the_limit_is_stored() {
    let cx = Cx::for_testing();
    let log = StatementLog::new();
    block_on(async {
        let factory = recording_factory(&cx, &log).await;
        let text = text_of_length(MAX_QUOTE_LENGTH as usize);

        unwrap_outcome(
            factory
                .call_in_transaction(&cx, async |session| {
                    let author = try_outcome!(repository::upsert_author(session, &cx, "Wim Hof").await);
                    let quote = Quote::new(text.clone(), &author, []).into_ref();
                    try_result!(session.persist(&quote));
                    try_outcome!(session.flush(&cx).await);
                    Outcome::Ok(())
                })
                .await,
        );

        let found = unwrap_outcome(
            factory
                .call_in_transaction(&cx, async |session| {
                    let quotes = try_outcome!(repository::find_all_quotes(session, &cx).await);
                    Outcome::Ok(try_result!(quotes.project()))
                })
                .await,
        );
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].quote_text.chars().count(), MAX_QUOTE_LENGTH as usize);
    });
}

#[test]
fn quote_text_over_the_limit_violates_the_named_check() {
    let cx = Cx::for_testing();
    let log = StatementLog::new();
    block_on(async {
        let factory = recording_factory(&cx, &log).await;
        seed_catalog(&cx, &factory).await;
        let text = text_of_length(MAX_QUOTE_LENGTH as usize + 1);

        let err = expect_err(
            factory
                .call_in_transaction(&cx, async |session| {
                    let author = try_outcome!(repository::upsert_author(session, &cx, "David Icke").await);
                    let quote = Quote::new(text.clone(), &author, []).into_ref();
                    try_result!(session.persist(&quote));
                    try_outcome!(session.flush(&cx).await);
                    Outcome::Ok(())
                })
                .await,
        );
        assert!(err.is_constraint_violation(), "unexpected error: {err}");
        assert_eq!(err.constraint_name(), Some(QUOTE_TEXT_LENGTH_CONSTRAINT));

        // Nothing from the failed transaction survives, including the new author
        assert_eq!(count_rows(&cx, &factory, "SELECT id FROM QUOTE").await, 14);
        assert_eq!(count_rows(&cx, &factory, "SELECT id FROM AUTHOR").await, 2);
        assert_eq!(factory.pool_stats().active_connections, 0);
    });
}

#[test]
fn rolled_back_instances_can_be_persisted_again() {
    let cx = Cx::for_testing();
    let log = StatementLog::new();
    block_on(async {
        let factory = recording_factory(&cx, &log).await;
        let author = Author::new("Wim Hof").into_ref();
        let too_long = Quote::new(
            text_of_length(MAX_QUOTE_LENGTH as usize + 1),
            &author,
            [],
        )
        .into_ref();

        let err = expect_err(
            factory
                .call_in_transaction(&cx, async |session| {
                    try_result!(session.persist(&author));
                    try_result!(session.persist(&too_long));
                    try_outcome!(session.flush(&cx).await);
                    Outcome::Ok(())
                })
                .await,
        );
        assert_eq!(err.constraint_name(), Some(QUOTE_TEXT_LENGTH_CONSTRAINT));
        let id_of = |author: &EntityRef<Author>| author.read().unwrap_or_else(|e| e.into_inner()).id;
        assert_eq!(id_of(&author), None);
        assert_eq!(too_long.read().unwrap_or_else(|e| e.into_inner()).id, None);

        unwrap_outcome(
            factory
                .call_in_transaction(&cx, async |session| {
                    try_result!(session.persist(&author));
                    let quote = Quote::new("Cold is a stressor.", &author, []).into_ref();
                    try_result!(session.persist(&quote));
                    Outcome::Ok(())
                })
                .await,
        );
        assert!(id_of(&author).is_some());
        assert_eq!(count_rows(&cx, &factory, "SELECT id FROM AUTHOR").await, 1);
        assert_eq!(count_rows(&cx, &factory, "SELECT id FROM QUOTE").await, 1);
    });
}

#[test]
fn unknown_author_and_subject_find_nothing() {
    let cx = Cx::for_testing();
    let log = StatementLog::new();
    block_on(async {
        let factory = recording_factory(&cx, &log).await;
        seed_catalog(&cx, &factory).await;

        let (by_author, by_subject, one_by_one) = unwrap_outcome(
            factory
                .call_in_transaction(&cx, async |session| {
                    let by_author = try_outcome!(
                        repository::find_quotes_by_author(session, &cx, "Nobody").await
                    );
                    let by_subject = try_outcome!(
                        repository::find_quotes_by_subject(session, &cx, "astrology").await
                    );
                    let one_by_one = try_outcome!(
                        repository::find_quotes_by_subject_one_by_one(session, &cx, "astrology")
                            .await
                    );
                    Outcome::Ok((by_author.len(), by_subject.len(), one_by_one.len()))
                })
                .await,
        );
        assert_eq!((by_author, by_subject, one_by_one), (0, 0, 0));
    });
}

#[test]
fn quote_without_subjects_round_trips_with_an_empty_set() {
    let cx = Cx::for_testing();
    let log = StatementLog::new();
    block_on(async {
        let factory = recording_factory(&cx, &log).await;

        unwrap_outcome(
            factory
                .call_in_transaction(&cx, async |session| {
                    let author = try_outcome!(repository::upsert_author(session, &cx, "Ron Paul").await);
                    let untagged = Quote::new("Truth is treason in the empire of lies.", &author, []);
                    try_result!(session.persist(&untagged.into_ref()));
                    let tag = Subject::new("peace").into_ref();
                    try_result!(session.persist(&tag));
                    let tagged = Quote::new("Peace is the answer.", &author, [&tag]);
                    try_result!(session.persist(&tagged.into_ref()));
                    Outcome::Ok(())
                })
                .await,
        );

        let quotes = unwrap_outcome(
            factory
                .call_in_transaction(&cx, async |session| {
                    let quotes = try_outcome!(repository::find_all_quotes(session, &cx).await);
                    Outcome::Ok(try_result!(quotes.project()))
                })
                .await,
        );
        assert_eq!(quotes.len(), 2);
        assert!(quotes[0].subjects.is_empty());
        assert_eq!(quotes[0].attributed_to.name, "Ron Paul");
        assert_eq!(quotes[1].subject_names().collect::<Vec<_>>(), vec!["peace"]);
    });
}

#[test]
fn json_output_uses_the_record_field_names() {
    let cx = Cx::for_testing();
    let log = StatementLog::new();
    block_on(async {
        let factory = recording_factory(&cx, &log).await;
        let quotes = seed_catalog(&cx, &factory).await;

        let json = serde_json::to_value(&quotes[0]).expect("serialize quote");
        assert_eq!(json["quoteText"], quotes[0].quote_text.as_str());
        assert_eq!(json["attributedTo"]["name"], "Wim Hof");
        assert_eq!(json["subjects"][0]["subject"], "inner strength");
        assert_eq!(json["idOption"], 1);
    });
}
