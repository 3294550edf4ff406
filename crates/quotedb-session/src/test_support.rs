//! Entities, rows and a scripted connection for the session tests.

#![allow(clippy::manual_async_fn)]

use quotedb_core::{
    Collection, ColumnMeta, Connection, Cx, Entity, EntityMeta, EntityRef, Error,
    GenerationStrategy, IsolationLevel, LinkTableMeta, MetadataRegistry, Outcome, QueryError,
    QueryErrorKind, Reference, RelationSlot, RelationshipMeta, Result, Row, Value,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

#[derive(Debug)]
pub struct Author {
    pub id: Option<i64>,
    pub name: String,
}

static AUTHOR_META: EntityMeta = EntityMeta {
    name: "Author",
    table: "AUTHOR",
    generation: GenerationStrategy::Auto,
    columns: &[ColumnMeta::id("id"), ColumnMeta::text("name", "name")],
    relationships: &[],
};

impl Entity for Author {
    const META: &'static EntityMeta = &AUTHOR_META;

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn set_id(&mut self, id: Option<i64>) {
        self.id = id;
    }

    fn column_values(&self) -> Vec<Value> {
        vec![Value::from(self.name.as_str())]
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.get_named("id")?,
            name: row.get_named("name")?,
        })
    }

    fn relation(&self, _name: &str) -> Option<&dyn RelationSlot> {
        None
    }

    fn relation_mut(&mut self, _name: &str) -> Option<&mut dyn RelationSlot> {
        None
    }
}

#[derive(Debug)]
pub struct Subject {
    pub id: Option<i64>,
    pub subject: String,
}

static SUBJECT_META: EntityMeta = EntityMeta {
    name: "Subject",
    table: "SUBJECT",
    generation: GenerationStrategy::Auto,
    columns: &[ColumnMeta::id("id"), ColumnMeta::text("subject", "subject")],
    relationships: &[],
};

impl Entity for Subject {
    const META: &'static EntityMeta = &SUBJECT_META;

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn set_id(&mut self, id: Option<i64>) {
        self.id = id;
    }

    fn column_values(&self) -> Vec<Value> {
        vec![Value::from(self.subject.as_str())]
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.get_named("id")?,
            subject: row.get_named("subject")?,
        })
    }

    fn relation(&self, _name: &str) -> Option<&dyn RelationSlot> {
        None
    }

    fn relation_mut(&mut self, _name: &str) -> Option<&mut dyn RelationSlot> {
        None
    }
}

#[derive(Debug)]
pub struct Quote {
    pub id: Option<i64>,
    pub text: String,
    pub attributed_to: Reference<Author>,
    pub subjects: Collection<Subject>,
}

static QUOTE_META: EntityMeta = EntityMeta {
    name: "Quote",
    table: "QUOTE",
    generation: GenerationStrategy::Auto,
    columns: &[
        ColumnMeta::id("id"),
        ColumnMeta::varchar("quoteText", "quoteText", 5000),
    ],
    relationships: &[
        RelationshipMeta::to_one("attributedTo", "Author", "authorId", "FK_QUOTE_AUTHOR"),
        RelationshipMeta::to_many(
            "subjects",
            "Subject",
            LinkTableMeta::new("QUOTE_SUBJECT", "quoteId", "subjectId"),
        ),
    ],
};

impl Entity for Quote {
    const META: &'static EntityMeta = &QUOTE_META;

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn set_id(&mut self, id: Option<i64>) {
        self.id = id;
    }

    fn column_values(&self) -> Vec<Value> {
        vec![Value::from(self.text.as_str())]
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.get_named("id")?,
            text: row.get_named("quoteText")?,
            attributed_to: Reference::unloaded(row.get_named("authorId")?),
            subjects: Collection::Unloaded,
        })
    }

    fn relation(&self, name: &str) -> Option<&dyn RelationSlot> {
        match name {
            "attributedTo" => Some(&self.attributed_to),
            "subjects" => Some(&self.subjects),
            _ => None,
        }
    }

    fn relation_mut(&mut self, name: &str) -> Option<&mut dyn RelationSlot> {
        match name {
            "attributedTo" => Some(&mut self.attributed_to),
            "subjects" => Some(&mut self.subjects),
            _ => None,
        }
    }
}

pub fn registry() -> Arc<MetadataRegistry> {
    MetadataRegistry::builder()
        .register::<Author>()
        .register::<Subject>()
        .register::<Quote>()
        .build()
        .expect("test registry is valid")
}

pub fn author(id: Option<i64>, name: &str) -> EntityRef<Author> {
    Author {
        id,
        name: name.to_string(),
    }
    .into_ref()
}

pub fn subject(id: Option<i64>, subject: &str) -> EntityRef<Subject> {
    Subject {
        id,
        subject: subject.to_string(),
    }
    .into_ref()
}

pub fn quote(
    id: Option<i64>,
    text: &str,
    author: &EntityRef<Author>,
    subjects: &[&EntityRef<Subject>],
) -> EntityRef<Quote> {
    Quote {
        id,
        text: text.to_string(),
        attributed_to: Reference::new(author),
        subjects: Collection::from_refs(subjects.iter().copied()),
    }
    .into_ref()
}

fn quote_row(
    id: i64,
    text: &str,
    author: (i64, &str),
    subject: Option<(i64, &str)>,
) -> Row {
    let (subject_id, subject_name) =
        subject.map_or((Value::Null, Value::Null), |(i, s)| (Value::BigInt(i), Value::from(s)));
    Row::new(
        [
            "t0__id",
            "t0__quoteText",
            "t0__authorId",
            "t1__id",
            "t1__name",
            "t2__id",
            "t2__subject",
        ]
        .iter()
        .map(|s| (*s).to_string())
        .collect(),
        vec![
            Value::BigInt(id),
            Value::from(text),
            Value::BigInt(author.0),
            Value::BigInt(author.0),
            Value::from(author.1),
            subject_id,
            subject_name,
        ],
    )
}

/// Three quotes, two by the same author; the last one has no subjects.
pub fn quote_rows() -> Vec<Row> {
    vec![
        quote_row(1, "We don't need a national ID card.", (1, "Ron Paul"), Some((1, "liberty"))),
        quote_row(1, "We don't need a national ID card.", (1, "Ron Paul"), Some((2, "peace"))),
        quote_row(2, "End the Fed.", (1, "Ron Paul"), Some((1, "liberty"))),
        quote_row(3, "Cold is a stressor.", (2, "Wim Hof"), None),
    ]
}

#[derive(Debug, Default)]
pub struct MockState {
    pub statements: Vec<(String, Vec<Value>)>,
    pub responses: VecDeque<Vec<Row>>,
    pub next_id: i64,
    pub in_transaction: bool,
    /// Statements containing this text fail with a constraint violation.
    pub fail_on: Option<String>,
}

impl MockState {
    pub fn sql(&self) -> Vec<String> {
        self.statements.iter().map(|(s, _)| s.clone()).collect()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.statements
            .iter()
            .filter(|(s, _)| s.starts_with(prefix))
            .count()
    }
}

/// A connection that records statements and replays scripted result sets.
#[derive(Debug, Clone, Default)]
pub struct MockConnection {
    pub state: Arc<Mutex<MockState>>,
}

impl MockConnection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, rows: Vec<Row>) {
        self.state.lock().unwrap().responses.push_back(rows);
    }

    pub fn fail_on(&self, text: &str) {
        self.state.lock().unwrap().fail_on = Some(text.to_string());
    }

    pub fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    fn record(&self, sql: &str, params: &[Value]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.statements.push((sql.to_string(), params.to_vec()));
        match &state.fail_on {
            Some(text) if sql.contains(text.as_str()) => Err(Error::Query(QueryError {
                kind: QueryErrorKind::Constraint,
                sql: Some(sql.to_string()),
                constraint: Some("CK_TEST".to_string()),
                message: "CHECK constraint failed: CK_TEST".to_string(),
                source: None,
            })),
            _ => Ok(()),
        }
    }
}

impl Connection for MockConnection {
    fn query(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
        let result = self
            .record(sql, params)
            .map(|()| self.state.lock().unwrap().responses.pop_front().unwrap_or_default());
        async move { result.map_or_else(Outcome::Err, Outcome::Ok) }
    }

    fn query_one(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Option<Row>, Error>> + Send {
        let result = self.record(sql, params).map(|()| {
            self.state
                .lock()
                .unwrap()
                .responses
                .pop_front()
                .and_then(|rows| rows.into_iter().next())
        });
        async move { result.map_or_else(Outcome::Err, Outcome::Ok) }
    }

    fn execute(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send {
        let result = self.record(sql, params).map(|()| 1);
        async move { result.map_or_else(Outcome::Err, Outcome::Ok) }
    }

    fn insert(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<i64, Error>> + Send {
        let result = self.record(sql, params).map(|()| {
            let mut state = self.state.lock().unwrap();
            state.next_id += 1;
            state.next_id
        });
        async move { result.map_or_else(Outcome::Err, Outcome::Ok) }
    }

    fn batch(
        &self,
        _cx: &Cx,
        statements: &[(String, Vec<Value>)],
    ) -> impl Future<Output = Outcome<Vec<u64>, Error>> + Send {
        let result = statements
            .iter()
            .map(|(sql, params)| self.record(sql, params).map(|()| 1))
            .collect::<Result<Vec<u64>>>();
        async move { result.map_or_else(Outcome::Err, Outcome::Ok) }
    }

    fn begin(
        &self,
        _cx: &Cx,
        _isolation: IsolationLevel,
    ) -> impl Future<Output = Outcome<(), Error>> + Send {
        let result = self.record("BEGIN", &[]);
        if result.is_ok() {
            self.state.lock().unwrap().in_transaction = true;
        }
        async move { result.map_or_else(Outcome::Err, Outcome::Ok) }
    }

    fn commit(&self, _cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send {
        let result = self.record("COMMIT", &[]);
        self.state.lock().unwrap().in_transaction = false;
        async move { result.map_or_else(Outcome::Err, Outcome::Ok) }
    }

    fn rollback(&self, _cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send {
        let result = self.record("ROLLBACK", &[]);
        self.state.lock().unwrap().in_transaction = false;
        async move { result.map_or_else(Outcome::Err, Outcome::Ok) }
    }

    fn in_transaction(&self) -> bool {
        self.state.lock().unwrap().in_transaction
    }

    fn ping(&self, _cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send {
        async { Outcome::Ok(()) }
    }
}

pub fn unwrap_outcome<T: std::fmt::Debug>(outcome: Outcome<T, Error>) -> T {
    match outcome {
        Outcome::Ok(v) => v,
        other => std::panic::panic_any(format!("unexpected outcome: {other:?}")),
    }
}

pub fn expect_err<T: std::fmt::Debug>(outcome: Outcome<T, Error>) -> Error {
    match outcome {
        Outcome::Err(e) => e,
        other => std::panic::panic_any(format!("expected an error, got {other:?}")),
    }
}
