//! Immutable value records, the only shape visible outside a session.
//!
//! Projection from the managed entities copies scalar fields and recurses into
//! materialized relationships. A relationship that was never loaded fails the
//! projection with `IncompleteGraph` instead of issuing another query.

use crate::entity;
use quotedb_core::{Error, Project, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Author {
    #[serde(rename = "idOption")]
    pub id: Option<i64>,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Subject {
    #[serde(rename = "idOption")]
    pub id: Option<i64>,
    pub subject: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    #[serde(rename = "idOption")]
    pub id: Option<i64>,
    pub quote_text: String,
    pub attributed_to: Author,
    /// Compared as a set.
    pub subjects: BTreeSet<Subject>,
}

impl Quote {
    /// Subject names, in set order.
    pub fn subject_names(&self) -> impl Iterator<Item = &str> {
        self.subjects.iter().map(|s| s.subject.as_str())
    }

    pub fn has_subject(&self, subject: &str) -> bool {
        self.subject_names().any(|s| s == subject)
    }
}

impl fmt::Display for Quote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let id = self.id.map_or_else(|| "-".to_string(), |id| id.to_string());
        let subjects: Vec<&str> = self.subject_names().collect();
        write!(
            f,
            "Quote[id={}, quoteText={:?}, attributedTo={}, subjects=[{}]]",
            id,
            self.quote_text,
            self.attributed_to.name,
            subjects.join(", ")
        )
    }
}

impl Project for entity::Author {
    type Model = Author;

    fn project(&self) -> Result<Author> {
        Ok(Author {
            id: self.id,
            name: self.name.clone(),
        })
    }
}

impl Project for entity::Subject {
    type Model = Subject;

    fn project(&self) -> Result<Subject> {
        Ok(Subject {
            id: self.id,
            subject: self.subject.clone(),
        })
    }
}

impl Project for entity::Quote {
    type Model = Quote;

    fn project(&self) -> Result<Quote> {
        let author = self
            .attributed_to
            .get()
            .ok_or_else(|| Error::incomplete_graph("Quote", "attributedTo"))?
            .project()
            .map_err(|e| e.nested_in("attributedTo"))?;
        let subjects = self
            .subjects
            .get()
            .ok_or_else(|| Error::incomplete_graph("Quote", "subjects"))?
            .iter()
            .map(Project::project)
            .collect::<Result<BTreeSet<_>>>()
            .map_err(|e| e.nested_in("subjects"))?;
        Ok(Quote {
            id: self.id,
            quote_text: self.quote_text.clone(),
            attributed_to: author,
            subjects,
        })
    }
}
