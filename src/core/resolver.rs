//! OC-007: Definition resolution.
//!
//! Resolves `(kind, type)` references against a definition store. Each
//! resolver lives for exactly one compilation: every distinct reference is
//! fetched at most once and then served from the resolver's cache. A
//! not-found answer is cached too, so optional references (builtin policy
//! types) are not refetched for every use.
//! `prefetch` issues all fetches concurrently (bounded), keyed by reference,
//! so completion order never leaks into the compiled output.

use super::error::{CompileError, StoreError};
use super::store::DefinitionStore;
use super::types::{ApplicationRevision, Definition, DefinitionKind};
use futures::stream::{self, StreamExt};
use indexmap::IndexSet;
use rustc_hash::FxHashMap;
use std::sync::Mutex;

/// A reference to a catalog entry.
pub type DefinitionKey = (DefinitionKind, String);

/// Per-compilation definition resolver.
pub struct DefinitionResolver<'a> {
    store: &'a dyn DefinitionStore,
    pinned: Option<&'a ApplicationRevision>,
    /// `None` records a definition the store does not have
    cache: Mutex<FxHashMap<DefinitionKey, Option<Definition>>>,
    max_concurrent_fetches: usize,
}

impl<'a> DefinitionResolver<'a> {
    pub fn new(store: &'a dyn DefinitionStore, max_concurrent_fetches: usize) -> Self {
        Self {
            store,
            pinned: None,
            cache: Mutex::new(FxHashMap::default()),
            max_concurrent_fetches: max_concurrent_fetches.max(1),
        }
    }

    /// Prefer the definitions recorded on `revision` over the store.
    pub fn with_pins(mut self, revision: &'a ApplicationRevision) -> Self {
        self.pinned = Some(revision);
        self
    }

    fn pinned(&self, kind: DefinitionKind, name: &str) -> Option<&'a Definition> {
        self.pinned.and_then(|rev| rev.pinned(kind, name))
    }

    fn cached(&self, kind: DefinitionKind, name: &str) -> Option<Option<Definition>> {
        self.cache
            .lock()
            .ok()
            .and_then(|c| c.get(&(kind, name.to_string())).cloned())
    }

    /// Cache a fetch outcome. Only definitions and not-found answers are
    /// kept; backend failures are not.
    fn remember(&self, kind: DefinitionKind, name: &str, result: &Result<Definition, CompileError>) {
        let entry = match result {
            Ok(def) => Some(def.clone()),
            Err(CompileError::DefinitionNotFound { .. }) => None,
            Err(_) => return,
        };
        if let Ok(mut c) = self.cache.lock() {
            c.insert((kind, name.to_string()), entry);
        }
    }

    /// Fetch from the store, translating not-found into `DefinitionNotFound`.
    async fn fetch(&self, kind: DefinitionKind, name: &str) -> Result<Definition, CompileError> {
        match self.store.get(kind, name).await {
            Ok(def) => {
                tracing::debug!(%kind, name, "fetched definition");
                Ok(def)
            }
            Err(StoreError::NotFound { .. }) => Err(CompileError::DefinitionNotFound {
                kind,
                type_name: name.to_string(),
            }),
            Err(e) => Err(CompileError::Store(e)),
        }
    }

    /// Resolve one reference: pinned revision first, then cache, then store.
    pub async fn resolve(&self, kind: DefinitionKind, name: &str) -> Result<Definition, CompileError> {
        if let Some(def) = self.pinned(kind, name) {
            tracing::debug!(%kind, name, "using pinned definition");
            return Ok(def.clone());
        }
        match self.cached(kind, name) {
            Some(Some(def)) => return Ok(def),
            Some(None) => {
                return Err(CompileError::DefinitionNotFound {
                    kind,
                    type_name: name.to_string(),
                })
            }
            None => {}
        }
        let result = self.fetch(kind, name).await;
        self.remember(kind, name, &result);
        result
    }

    /// Fetch every distinct unpinned, uncached reference concurrently.
    ///
    /// On failure the error of the earliest failing reference (in `refs`
    /// order) is returned; successful fetches stay cached either way.
    pub async fn prefetch(&self, refs: &[DefinitionKey]) -> Result<(), CompileError> {
        let pending: IndexSet<&DefinitionKey> = refs
            .iter()
            .filter(|(kind, name)| {
                self.pinned(*kind, name).is_none() && self.cached(*kind, name).is_none()
            })
            .collect();
        if pending.is_empty() {
            return Ok(());
        }
        tracing::debug!(count = pending.len(), "prefetching definitions");

        let mut results: Vec<(usize, &DefinitionKey, Result<Definition, CompileError>)> =
            stream::iter(pending.into_iter().enumerate())
                .map(|(index, key)| async move { (index, key, self.fetch(key.0, &key.1).await) })
                .buffer_unordered(self.max_concurrent_fetches)
                .collect()
                .await;
        results.sort_by_key(|(index, _, _)| *index);

        let mut first_error = None;
        for (_, (kind, name), result) in results {
            self.remember(*kind, name, &result);
            if let Err(e) = result {
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
