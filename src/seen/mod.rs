mod file_store;
mod sqlite_store;

use std::collections::BTreeSet;

pub use file_store::JsonFileStore;
pub use sqlite_store::SqliteStore;

use crate::config::{StateSettings, StoreBackend};
use crate::error::Result;

/// Identifiers already reported. Only ever grows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeenSet {
    ids: BTreeSet<String>,
}

impl SeenSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Add an identifier. Returns false when it was already present.
    pub fn record(&mut self, id: impl Into<String>) -> bool {
        self.ids.insert(id.into())
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Identifiers in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }
}

impl FromIterator<String> for SeenSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}

/// Durable seen-set. `load` never fails: missing or unreadable state is an
/// empty set. `save` writes the whole set in one all-or-nothing step.
pub trait SeenStore {
    fn load(&self) -> SeenSet;
    fn save(&self, seen: &SeenSet) -> Result<()>;
    fn describe(&self) -> String;
}

pub fn open(settings: &StateSettings) -> Result<Box<dyn SeenStore>> {
    let store: Box<dyn SeenStore> = match settings.backend {
        StoreBackend::Json => Box::new(JsonFileStore::new(&settings.path)),
        StoreBackend::Sqlite => Box::new(SqliteStore::open(&settings.path)?),
    };
    Ok(store)
}
