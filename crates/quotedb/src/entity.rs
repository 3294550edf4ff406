//! The mapped catalog entities.
//!
//! Quotes reference their author lazily and their subjects through the
//! `QUOTE_SUBJECT` link table. Nothing cascades: authors and subjects must be
//! persisted (or already managed) before a quote that refers to them.

use quotedb_core::{
    Collection, ColumnMeta, Entity, EntityMeta, EntityRef, GenerationStrategy, LinkTableMeta,
    Reference, RelationSlot, RelationshipMeta, Result, Row, Value,
};

/// Maximum length of a quote text, in characters.
pub const MAX_QUOTE_LENGTH: u32 = 5000;

/// Name of the CHECK constraint on the quote text length.
pub const QUOTE_TEXT_LENGTH_CONSTRAINT: &str = "CK_QUOTE_QUOTETEXT_LENGTH";

#[derive(Debug)]
pub struct Author {
    pub id: Option<i64>,
    pub name: String,
}

impl Author {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
        }
    }
}

pub static AUTHOR_META: EntityMeta = EntityMeta {
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

impl Subject {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            id: None,
            subject: subject.into(),
        }
    }
}

pub static SUBJECT_META: EntityMeta = EntityMeta {
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
    pub quote_text: String,
    /// Required; never NULL in the database.
    pub attributed_to: Reference<Author>,
    pub subjects: Collection<Subject>,
}

impl Quote {
    /// A transient quote pointing at `author` and `subjects`.
    pub fn new<'a>(
        quote_text: impl Into<String>,
        author: &EntityRef<Author>,
        subjects: impl IntoIterator<Item = &'a EntityRef<Subject>>,
    ) -> Self {
        Self {
            id: None,
            quote_text: quote_text.into(),
            attributed_to: Reference::new(author),
            subjects: Collection::from_refs(subjects),
        }
    }
}

pub static QUOTE_META: EntityMeta = EntityMeta {
    name: "Quote",
    table: "QUOTE",
    generation: GenerationStrategy::Auto,
    columns: &[
        ColumnMeta::id("id"),
        ColumnMeta::varchar("quoteText", "quoteText", MAX_QUOTE_LENGTH),
    ],
    relationships: &[
        RelationshipMeta::to_one("attributedTo", "Author", "authorId", "FK_QUOTE_AUTHOR"),
        RelationshipMeta::to_many(
            "subjects",
            "Subject",
            LinkTableMeta::new("QUOTE_SUBJECT", "quoteId", "subjectId")
                .constraints("FK_QUOTE_SUBJECT_QUOTE", "FK_QUOTE_SUBJECT_SUBJECT"),
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
        vec![Value::from(self.quote_text.as_str())]
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.get_named("id")?,
            quote_text: row.get_named("quoteText")?,
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
