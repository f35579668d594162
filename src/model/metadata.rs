//! Column metadata cache.
//!
//! Metadata is fetched from the database the first time a table is compiled into a
//! plan and then reused for the life of the cache. Concurrent misses for the same
//! table may both query the database; the values are identical so the later insert
//! simply wins.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use super::column::ColumnMeta;
use super::login::Login;
use super::table::{ServerKey, Table};
use crate::driver::ConnectionPool;
use crate::error::{PlanError, PlanResult};

/// Metadata of one table, in table column order.
#[derive(Debug, Clone, PartialEq)]
pub struct TableMetadata {
    pub table: String,
    pub columns: Vec<ColumnMeta>,
}

impl TableMetadata {
    pub fn new(table: &str, columns: Vec<ColumnMeta>) -> Self {
        Self {
            table: table.to_string(),
            columns,
        }
    }

    /// Case-insensitive column lookup.
    pub fn column(&self, name: &str) -> Option<&ColumnMeta> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Like [`column`](Self::column) but an unknown column is a compile error.
    pub fn require(&self, name: &str) -> PlanResult<&ColumnMeta> {
        self.column(name).ok_or_else(|| {
            PlanError::IllegalArgument(format!(
                "column '{}' does not exist in table '{}'",
                name, self.table
            ))
        })
    }

    pub fn has_lob(&self) -> bool {
        self.columns.iter().any(ColumnMeta::is_lob)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    server: ServerKey,
    origin: Option<String>,
    table: String,
}

/// Per (server, table) metadata cache shared by every compiled plan.
pub struct ColumnMetadataCache {
    entries: DashMap<CacheKey, Arc<TableMetadata>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ColumnMetadataCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: DashMap::with_capacity(capacity),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Metadata for `table`, loading it through `pool` on a miss.
    pub fn lookup(
        &self,
        pool: &dyn ConnectionPool,
        login: &Login,
        table: &Table,
    ) -> PlanResult<Arc<TableMetadata>> {
        let key = CacheKey {
            server: table.server.clone(),
            origin: table.origin.clone(),
            table: table.name.to_ascii_uppercase(),
        };
        if let Some(entry) = self.entries.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Arc::clone(entry.value()));
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let mut connection = pool.acquire(login.datasource.as_deref())?;
        let fetched = connection.table_columns(table);
        if let Err(err) = pool.release(connection) {
            tracing::warn!("Failed to release metadata connection for {}: {}", login.server, err);
        }
        let columns = fetched?;
        if columns.is_empty() {
            return Err(PlanError::IllegalArgument(format!(
                "table '{}' has no columns on server {}",
                table.qualified_name(),
                table.server
            )));
        }

        tracing::debug!(
            "Loaded metadata for {} ({} columns) from {}",
            table.qualified_name(),
            columns.len(),
            table.server
        );
        let metadata = Arc::new(TableMetadata::new(&table.name, columns));
        self.entries.insert(key, Arc::clone(&metadata));
        Ok(metadata)
    }

    /// Drop every cached entry (e.g. after the mapping is redeployed).
    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> (u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }
}

impl Default for ColumnMetadataCache {
    fn default() -> Self {
        Self::new(256)
    }
}
