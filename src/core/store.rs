//! OC-005: Definition store — the catalog the resolver reads from.
//!
//! The compiler never reaches for ambient state: a store is constructed,
//! filled, and passed in. `MemoryDefinitionStore` is the shipped backend; it
//! can be filled programmatically or from a directory of YAML files.

use super::error::StoreError;
use super::parser::{self, CatalogDocument};
use super::types::{ApplicationRevision, Definition, DefinitionKind};
use async_trait::async_trait;
use rustc_hash::FxHashMap;
use std::path::Path;
use std::sync::RwLock;

/// Read-only lookup of definitions and recorded revisions.
#[async_trait]
pub trait DefinitionStore: Send + Sync {
    /// Fetch a definition. Absent entries are `StoreError::NotFound`.
    async fn get(&self, kind: DefinitionKind, name: &str) -> Result<Definition, StoreError>;

    /// Fetch a recorded application revision.
    async fn get_revision(&self, name: &str) -> Result<ApplicationRevision, StoreError> {
        Err(StoreError::RevisionNotFound(name.to_string()))
    }
}

/// In-memory definition catalog.
#[derive(Debug, Default)]
pub struct MemoryDefinitionStore {
    definitions: RwLock<FxHashMap<(DefinitionKind, String), Definition>>,
    revisions: RwLock<FxHashMap<String, ApplicationRevision>>,
}

impl MemoryDefinitionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store holding `definitions`.
    pub fn with_definitions(definitions: impl IntoIterator<Item = Definition>) -> Self {
        let map = definitions
            .into_iter()
            .map(|d| ((d.kind, d.metadata.name.clone()), d))
            .collect();
        Self {
            definitions: RwLock::new(map),
            revisions: RwLock::new(FxHashMap::default()),
        }
    }

    /// Insert or replace a definition. Returns the previous entry.
    pub fn insert(&self, definition: Definition) -> Result<Option<Definition>, StoreError> {
        let mut map = self
            .definitions
            .write()
            .map_err(|e| StoreError::Backend(format!("lock: {}", e)))?;
        Ok(map.insert((definition.kind, definition.metadata.name.clone()), definition))
    }

    /// Remove a definition. Returns the removed entry.
    pub fn remove(&self, kind: DefinitionKind, name: &str) -> Result<Option<Definition>, StoreError> {
        let mut map = self
            .definitions
            .write()
            .map_err(|e| StoreError::Backend(format!("lock: {}", e)))?;
        Ok(map.remove(&(kind, name.to_string())))
    }

    /// Insert or replace a recorded revision.
    pub fn insert_revision(&self, revision: ApplicationRevision) -> Result<(), StoreError> {
        let mut map = self
            .revisions
            .write()
            .map_err(|e| StoreError::Backend(format!("lock: {}", e)))?;
        map.insert(revision.metadata.name.clone(), revision);
        Ok(())
    }

    /// Number of definitions held.
    pub fn len(&self) -> usize {
        self.definitions.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Load every `*.yaml` / `*.yml` file under `dir` (recursively, sorted by
    /// path). Later files replace earlier entries with the same key.
    pub fn load_dir(dir: &Path) -> Result<Self, StoreError> {
        let store = Self::new();
        for path in catalog_files(dir)? {
            let display = path.display().to_string();
            let content = std::fs::read_to_string(&path).map_err(|source| StoreError::Io {
                path: display.clone(),
                source,
            })?;
            let docs = parser::parse_catalog_documents(&content).map_err(|message| {
                StoreError::Parse {
                    path: display.clone(),
                    message,
                }
            })?;
            for doc in docs {
                match doc {
                    CatalogDocument::Definition(def) => {
                        store.insert(*def)?;
                    }
                    CatalogDocument::Revision(rev) => store.insert_revision(*rev)?,
                }
            }
        }
        tracing::debug!(dir = %dir.display(), definitions = store.len(), "loaded definition catalog");
        Ok(store)
    }
}

fn catalog_files(dir: &Path) -> Result<Vec<std::path::PathBuf>, StoreError> {
    if !dir.is_dir() {
        return Err(StoreError::Io {
            path: dir.display().to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"),
        });
    }
    let mut files = Vec::new();
    for ext in ["yaml", "yml"] {
        let pattern = format!("{}/**/*.{}", glob::Pattern::escape(&dir.display().to_string()), ext);
        let entries = glob::glob(&pattern).map_err(|e| StoreError::Backend(e.to_string()))?;
        for entry in entries {
            let path = entry.map_err(|e| StoreError::Backend(e.to_string()))?;
            if path.is_file() {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}

#[async_trait]
impl DefinitionStore for MemoryDefinitionStore {
    async fn get(&self, kind: DefinitionKind, name: &str) -> Result<Definition, StoreError> {
        let map = self
            .definitions
            .read()
            .map_err(|e| StoreError::Backend(format!("lock: {}", e)))?;
        map.get(&(kind, name.to_string()))
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                kind,
                name: name.to_string(),
            })
    }

    async fn get_revision(&self, name: &str) -> Result<ApplicationRevision, StoreError> {
        let map = self
            .revisions
            .read()
            .map_err(|e| StoreError::Backend(format!("lock: {}", e)))?;
        map.get(name)
            .cloned()
            .ok_or_else(|| StoreError::RevisionNotFound(name.to_string()))
    }
}
