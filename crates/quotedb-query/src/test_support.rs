//! Catalog entities used by the planner tests.

use quotedb_core::{
    Collection, ColumnMeta, Entity, EntityMeta, GenerationStrategy, LinkTableMeta,
    MetadataRegistry, Reference, RelationSlot, RelationshipMeta, Result, Row, Value,
};
use std::sync::Arc;

#[derive(Debug)]
pub struct Author {
    pub id: Option<i64>,
    pub name: String,
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
    pub text: String,
    pub attributed_to: Reference<Author>,
    pub subjects: Collection<Subject>,
}

pub static QUOTE_META: EntityMeta = EntityMeta {
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

/// An entity whose author is always joined.
#[derive(Debug)]
pub struct Note {
    pub id: Option<i64>,
    pub body: String,
    pub author: Reference<Author>,
}

pub static NOTE_META: EntityMeta = EntityMeta {
    name: "Note",
    table: "NOTE",
    generation: GenerationStrategy::Auto,
    columns: &[ColumnMeta::id("id"), ColumnMeta::text("body", "body")],
    relationships: &[
        RelationshipMeta::to_one("author", "Author", "authorId", "FK_NOTE_AUTHOR").eager(),
    ],
};

impl Entity for Note {
    const META: &'static EntityMeta = &NOTE_META;

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn set_id(&mut self, id: Option<i64>) {
        self.id = id;
    }

    fn column_values(&self) -> Vec<Value> {
        vec![Value::from(self.body.as_str())]
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.get_named("id")?,
            body: row.get_named("body")?,
            author: Reference::unloaded(row.get_named("authorId")?),
        })
    }

    fn relation(&self, name: &str) -> Option<&dyn RelationSlot> {
        (name == "author").then_some(&self.author as &dyn RelationSlot)
    }

    fn relation_mut(&mut self, name: &str) -> Option<&mut dyn RelationSlot> {
        (name == "author").then_some(&mut self.author as &mut dyn RelationSlot)
    }
}

pub fn registry() -> Arc<MetadataRegistry> {
    MetadataRegistry::builder()
        .register::<Author>()
        .register::<Subject>()
        .register::<Quote>()
        .register::<Note>()
        .build()
        .expect("test registry is valid")
}
