//! Catalog queries and upserts.
//!
//! The finders fetch quotes with their author and subjects in one statement,
//! ordered by quote id, so results can be projected after the session ends.

use crate::entity::{Author, Quote, Subject};
use quotedb_core::{
    Connection, Cx, Entity, EntityRef, Error, Outcome, Value, try_outcome, try_result,
};
use quotedb_query::{LoadPlan, Query};
use quotedb_session::Session;

/// Load plan materializing a quote's author and subjects.
pub fn quote_load_plan() -> LoadPlan {
    LoadPlan::new()
        .subgraph("attributedTo")
        .element_subgraph("subjects")
}

/// Every quote, fully loaded, in id order.
pub fn all_quotes_query() -> Query<Quote> {
    Query::new().order_by("id").load(quote_load_plan())
}

pub async fn find_all_quotes<C: Connection>(
    session: &mut Session<C>,
    cx: &Cx,
) -> Outcome<Vec<EntityRef<Quote>>, Error> {
    session.query(cx, &all_quotes_query()).await
}

/// Quotes attributed to the author called `name`; empty when there is none.
pub async fn find_quotes_by_author<C: Connection>(
    session: &mut Session<C>,
    cx: &Cx,
    name: &str,
) -> Outcome<Vec<EntityRef<Quote>>, Error> {
    let query = all_quotes_query().filter("attributedTo.name", name);
    session.query(cx, &query).await
}

/// Quotes tagged with `subject`, each with its complete subject set.
pub async fn find_quotes_by_subject<C: Connection>(
    session: &mut Session<C>,
    cx: &Cx,
    subject: &str,
) -> Outcome<Vec<EntityRef<Quote>>, Error> {
    let query = all_quotes_query().filter("subjects.subject", subject);
    session.query(cx, &query).await
}

/// Same result as [`find_quotes_by_subject`], built from one native id query
/// followed by one `find` per quote.
///
/// Issues N + 1 statements; kept as the counter-example to a load plan.
pub async fn find_quotes_by_subject_one_by_one<C: Connection>(
    session: &mut Session<C>,
    cx: &Cx,
    subject: &str,
) -> Outcome<Vec<EntityRef<Quote>>, Error> {
    let rows = try_outcome!(
        session
            .native_query(
                cx,
                "SELECT DISTINCT qs.\"quoteId\" AS id \
                 FROM \"QUOTE_SUBJECT\" qs \
                 JOIN \"SUBJECT\" s ON s.\"id\" = qs.\"subjectId\" \
                 WHERE s.\"subject\" = ?1 \
                 ORDER BY qs.\"quoteId\"",
                &[Value::from(subject)],
            )
            .await
    );
    let plan = quote_load_plan();
    let mut quotes = Vec::with_capacity(rows.len());
    for row in &rows {
        let id: i64 = try_result!(row.get_named("id"));
        if let Some(quote) = try_outcome!(session.find::<Quote>(cx, id, Some(&plan)).await) {
            quotes.push(quote);
        }
    }
    Outcome::Ok(quotes)
}

pub async fn find_author_by_name<C: Connection>(
    session: &mut Session<C>,
    cx: &Cx,
    name: &str,
) -> Outcome<Option<EntityRef<Author>>, Error> {
    let query = Query::<Author>::new().filter("name", name).order_by("id");
    let found = try_outcome!(session.query(cx, &query).await);
    Outcome::Ok(found.into_iter().next())
}

pub async fn find_subject<C: Connection>(
    session: &mut Session<C>,
    cx: &Cx,
    subject: &str,
) -> Outcome<Option<EntityRef<Subject>>, Error> {
    let query = Query::<Subject>::new()
        .filter("subject", subject)
        .order_by("id");
    let found = try_outcome!(session.query(cx, &query).await);
    Outcome::Ok(found.into_iter().next())
}

/// The managed author called `name`, persisted first if it does not exist.
pub async fn upsert_author<C: Connection>(
    session: &mut Session<C>,
    cx: &Cx,
    name: &str,
) -> Outcome<EntityRef<Author>, Error> {
    if let Some(author) = try_outcome!(find_author_by_name(session, cx, name).await) {
        return Outcome::Ok(author);
    }
    let author = Author::new(name).into_ref();
    try_result!(session.persist(&author));
    tracing::debug!(name, "Persisted new author");
    Outcome::Ok(author)
}

/// The managed subject `subject`, persisted first if it does not exist.
pub async fn upsert_subject<C: Connection>(
    session: &mut Session<C>,
    cx: &Cx,
    subject: &str,
) -> Outcome<EntityRef<Subject>, Error> {
    if let Some(found) = try_outcome!(find_subject(session, cx, subject).await) {
        return Outcome::Ok(found);
    }
    let created = Subject::new(subject).into_ref();
    try_result!(session.persist(&created));
    tracing::debug!(subject, "Persisted new subject");
    Outcome::Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use quotedb_query::plan;

    #[test]
    fn finder_queries_plan_to_one_statement() {
        let registry = crate::catalog_registry().unwrap();
        let dialect = quotedb_core::Dialect::Sqlite;

        let all = plan(&registry, all_quotes_query().spec(), dialect).unwrap();
        assert!(all.sql.contains("LEFT JOIN \"AUTHOR\" t1"));
        assert!(all.sql.contains("\"QUOTE_SUBJECT\""));
        assert!(all.params.is_empty());

        let by_author = plan(
            &registry,
            all_quotes_query().filter("attributedTo.name", "Ron Paul").spec(),
            dialect,
        )
        .unwrap();
        assert_eq!(by_author.params, vec![Value::from("Ron Paul")]);

        let by_subject = plan(
            &registry,
            all_quotes_query().filter("subjects.subject", "liberty").spec(),
            dialect,
        )
        .unwrap();
        assert!(by_subject.sql.contains(" IN ("));
    }
}
