//! The spreadsheet-backed inventory.
//!
//! ```text
//! records ──▶ dedup ──▶ key (given | ZM<code>-<n>) ──▶ update | recycle | append
//!                                                        │
//!                                           TabularStore (retry + backoff)
//! ```
//!
//! * [`store`]     - the [`TabularStore`] port and cell helpers
//! * [`sheets`]    - Google Sheets implementation
//! * [`memory`]    - in-memory implementation for tests and dry runs
//! * [`columns`]   - header → column map and the protected price boundary
//! * [`reconcile`] - the upsert algorithm
//! * [`keys`]      - Zirkel key composition and sequencing
//! * [`providers`] - provider catalogue
//! * [`lookup`]    - rows back by key
//! * [`images`]    - companion image files
//!
//! ## Concurrent writers
//!
//! The sheet offers no transactions. Two `reconcile` calls running at the
//! same time against one spreadsheet can both claim the same blank row or
//! the same next sequential key. Run at most one writer per spreadsheet.

pub mod columns;
pub mod images;
pub mod keys;
pub mod lookup;
pub mod memory;
pub mod providers;
pub mod range;
pub mod reconcile;
pub mod sheets;
pub mod store;

pub use images::ImageStore;
pub use keys::ZirkelKey;
pub use memory::MemoryStore;
pub use providers::Provider;
pub use reconcile::ReconcileReport;
pub use sheets::GoogleSheetsStore;
pub use store::TabularStore;

use crate::config::InventoryConfig;
use crate::error::PipelineError;
use crate::records::{InventoryItem, InventoryRecord};
use crate::retry::with_retry;
use columns::{ColumnMap, Field};
use reconcile::Reconciler;
use tracing::info;

/// The inventory sheet behind a [`TabularStore`].
pub struct Inventory<S: TabularStore> {
    store: S,
    config: InventoryConfig,
}

impl<S: TabularStore> Inventory<S> {
    pub fn new(store: S, config: InventoryConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &InventoryConfig {
        &self.config
    }

    /// Upsert `records` into the inventory sheet, in order.
    ///
    /// # Errors
    /// * [`PipelineError::InventorySchema`] - the header has no key column,
    ///   or the key column sits inside the protected price columns
    /// * [`PipelineError::UnknownProvider`] - a keyless record names a
    ///   provider missing from the catalogue
    /// * [`PipelineError::RateLimited`] / [`PipelineError::ReconciliationFailed`]:
    ///   a sheet call failed for good; earlier rows stay written
    pub async fn reconcile(&self, records: Vec<InventoryRecord>) -> Result<ReconcileReport, PipelineError> {
        info!("Reconciling {} records into {}", records.len(), self.config.inventory_sheet);
        Reconciler::load(&self.store, &self.config).await?.run(records).await
    }

    /// Inventory items for `keys`, in request order.
    pub async fn media_by_keys(&self, keys: &[String]) -> Result<Vec<InventoryItem>, PipelineError> {
        let range = self.config.inventory_range();
        let rows = with_retry(&self.config.retry, "inventory read", || self.store.read(&range))
            .await
            .map_err(PipelineError::from_store)?;
        let Some(header) = rows.first() else {
            return Ok(Vec::new());
        };
        let columns = ColumnMap::from_header(header, &self.config.price_marker);
        if columns.get(Field::ClaveZirkel).is_none() {
            return Err(PipelineError::InventorySchema {
                sheet: self.config.inventory_sheet.clone(),
                detail: format!("no '{}' column", Field::ClaveZirkel.header()),
            });
        }
        let items = lookup::items_by_keys(&rows, &columns, keys, &self.config.image_base_url);
        info!("Found {} media items for {} keys", items.len(), keys.len());
        Ok(items)
    }

    /// The provider catalogue.
    pub async fn providers(&self) -> Result<Vec<Provider>, PipelineError> {
        let range = self.config.providers_range();
        let rows = with_retry(&self.config.retry, "providers read", || self.store.read(&range))
            .await
            .map_err(PipelineError::from_store)?;
        Ok(providers::parse_catalogue(&rows))
    }
}
