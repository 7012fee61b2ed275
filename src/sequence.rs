//! Ordered identifier sequences for circular previous/next navigation.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::cache::TtlCache;
use crate::error::Result;
use crate::source::RowSource;
use crate::types::TableIdentity;

/// Circular neighbors of an identifier.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Neighbors {
    pub prev: String,
    pub next: String,
}

/// Caches the full key listing of each table, keyed by its qualified identity.
#[derive(Debug)]
pub struct IdentifierSequenceCache {
    cache: TtlCache<TableIdentity, Vec<String>>,
}

impl IdentifierSequenceCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            cache: TtlCache::new(ttl),
        }
    }

    /// The cached sequence of `source`, listed on first use and after expiry.
    pub fn get_ids(&self, source: &dyn RowSource) -> Result<Arc<Vec<String>>> {
        self.cache
            .try_get_or_insert_with(source.identity().clone(), || {
                let ids = source.ordered_ids()?;
                debug!(
                    table = %source.identity(),
                    ids = ids.len(),
                    "built identifier sequence"
                );
                Ok(ids)
            })
    }

    pub fn invalidate(&self, identity: &TableIdentity) {
        self.cache.invalidate(identity);
    }

    /// Position of `id` in the sequence.
    ///
    /// A miss invalidates the entry and rebuilds it once; the returned
    /// sequence is the one the index refers to.
    pub fn index_of(
        &self,
        source: &dyn RowSource,
        id: &str,
    ) -> Result<Option<(usize, Arc<Vec<String>>)>> {
        let ids = self.get_ids(source)?;
        if let Some(index) = ids.iter().position(|v| v == id) {
            return Ok(Some((index, ids)));
        }

        self.invalidate(source.identity());
        let ids = self.get_ids(source)?;
        match ids.iter().position(|v| v == id) {
            Some(index) => Ok(Some((index, ids))),
            None => {
                warn!(table = %source.identity(), id, "identifier not in sequence after rebuild");
                Ok(None)
            }
        }
    }

    /// Circular previous and next identifiers of `id`, or `None` when `id` is
    /// not part of the table.
    pub fn neighbors(&self, source: &dyn RowSource, id: &str) -> Result<Option<Neighbors>> {
        let Some((index, ids)) = self.index_of(source, id)? else {
            return Ok(None);
        };
        let len = ids.len();
        Ok(Some(Neighbors {
            prev: ids[(index + len - 1) % len].clone(),
            next: ids[(index + 1) % len].clone(),
        }))
    }
}
