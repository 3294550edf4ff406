//! Projection of managed entities to immutable value records.

use crate::error::Result;

/// Converts a managed entity graph into an owned value record.
///
/// Implementations copy scalar columns and recurse into materialized
/// relationships. An unmaterialized relationship is an error
/// ([`Error::IncompleteGraph`](crate::Error::IncompleteGraph)), never a
/// trigger for another query.
pub trait Project {
    type Model;

    fn project(&self) -> Result<Self::Model>;
}

impl<T: Project> Project for std::sync::RwLock<T> {
    type Model = T::Model;

    fn project(&self) -> Result<Self::Model> {
        self.read().unwrap_or_else(|e| e.into_inner()).project()
    }
}

impl<T: Project + ?Sized> Project for std::sync::Arc<T> {
    type Model = T::Model;

    fn project(&self) -> Result<Self::Model> {
        T::project(self)
    }
}

impl<T: Project> Project for [T] {
    type Model = Vec<T::Model>;

    fn project(&self) -> Result<Self::Model> {
        self.iter().map(Project::project).collect()
    }
}

impl<T: Project> Project for Vec<T> {
    type Model = Vec<T::Model>;

    fn project(&self) -> Result<Self::Model> {
        self.as_slice().project()
    }
}
