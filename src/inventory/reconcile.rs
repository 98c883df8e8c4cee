//! Upsert of inventory records into the inventory sheet.
//!
//! ## Per-call working state
//!
//! A [`Reconciler`] lives for exactly one `reconcile` call. It owns a mirror
//! of the sheet (header included), the [`ColumnMap`] derived from that header,
//! and the set of row indices already targeted by this batch. Each successful
//! write is applied to the mirror too, so later records in the batch see rows
//! written by earlier ones (key synthesis, blank-row recycling).
//!
//! ## Write rules
//!
//! 1. Existing key → rewrite the row's cells before the protected boundary.
//! 2. New key → recycle the first unconsumed row with no key and no provider.
//! 3. Otherwise append a new row.
//!
//! Every remote call goes through [`with_retry`]. The first terminal failure
//! aborts the rest of the batch; rows written before it stay written.

use super::columns::{ColumnMap, Field};
use super::keys::next_sequential;
use super::providers::{self, Provider};
use super::range::{column_letter, A1Range};
use super::store::{cell_is_blank, cell_text, Cell, Rows, TabularStore};
use crate::config::InventoryConfig;
use crate::error::PipelineError;
use crate::records::InventoryRecord;
use crate::retry::with_retry;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

/// What a `reconcile` call did, by key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReconcileReport {
    /// Keys whose existing row was rewritten.
    pub updated: Vec<String>,
    /// Keys placed into a recycled blank row.
    pub recycled: Vec<String>,
    /// Keys appended as new rows.
    pub appended: Vec<String>,
    /// Records dropped because a later record carried the same key.
    pub duplicates_dropped: usize,
}

impl ReconcileReport {
    pub fn total(&self) -> usize {
        self.updated.len() + self.recycled.len() + self.appended.len()
    }
}

/// Keep only the last occurrence of each key, at that occurrence's position.
/// Records without a key always pass through.
pub fn dedup_last_wins(records: Vec<InventoryRecord>) -> (Vec<InventoryRecord>, usize) {
    let key_of = |r: &InventoryRecord| {
        r.clave_zirkel
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
    };

    let mut last: HashMap<String, usize> = HashMap::new();
    let mut counts: HashMap<String, usize> = HashMap::new();
    for (i, r) in records.iter().enumerate() {
        if let Some(k) = key_of(r) {
            last.insert(k.clone(), i);
            *counts.entry(k).or_default() += 1;
        }
    }

    let mut groups: Vec<(&String, &usize)> = counts.iter().filter(|(_, n)| **n > 1).collect();
    groups.sort();
    for (key, n) in &groups {
        warn!("Key {key} appears {n} times in the batch; keeping the last occurrence");
    }
    let dropped = groups.iter().map(|(_, n)| **n - 1).sum();

    let kept = records
        .into_iter()
        .enumerate()
        .filter(|(i, r)| match key_of(r) {
            Some(k) => last.get(&k) == Some(i),
            None => true,
        })
        .map(|(_, r)| r)
        .collect();
    (kept, dropped)
}

pub(crate) struct Reconciler<'a, S: TabularStore + ?Sized> {
    store: &'a S,
    config: &'a InventoryConfig,
    rows: Rows,
    columns: ColumnMap,
    key_col: usize,
    consumed: HashSet<usize>,
    providers: Option<Vec<Provider>>,
    report: ReconcileReport,
}

impl<'a, S: TabularStore + ?Sized> Reconciler<'a, S> {
    /// Fetch the sheet and derive the column map.
    pub(crate) async fn load(store: &'a S, config: &'a InventoryConfig) -> Result<Self, PipelineError> {
        let range = config.inventory_range();
        let rows = with_retry(&config.retry, "inventory read", || store.read(&range))
            .await
            .map_err(PipelineError::from_store)?;

        let header = rows.first().ok_or_else(|| PipelineError::InventorySchema {
            sheet: config.inventory_sheet.clone(),
            detail: "no header row".into(),
        })?;
        let columns = ColumnMap::from_header(header, &config.price_marker);
        let key_col = columns
            .get(Field::ClaveZirkel)
            .ok_or_else(|| PipelineError::InventorySchema {
                sheet: config.inventory_sheet.clone(),
                detail: format!("no '{}' column", Field::ClaveZirkel.header()),
            })?;
        if key_col >= columns.boundary() {
            return Err(PipelineError::InventorySchema {
                sheet: config.inventory_sheet.clone(),
                detail: format!(
                    "key column {} lies inside the protected price columns",
                    column_letter(key_col)
                ),
            });
        }
        debug!(
            "Inventory loaded: {} data rows, protected from column {}",
            rows.len().saturating_sub(1),
            column_letter(columns.boundary())
        );

        Ok(Self {
            store,
            config,
            rows,
            columns,
            key_col,
            consumed: HashSet::new(),
            providers: None,
            report: ReconcileReport::default(),
        })
    }

    pub(crate) async fn run(mut self, records: Vec<InventoryRecord>) -> Result<ReconcileReport, PipelineError> {
        let (records, dropped) = dedup_last_wins(records);
        self.report.duplicates_dropped = dropped;

        for record in records {
            self.upsert(record).await?;
        }
        info!(
            "Reconciled {} records: {} updated, {} recycled, {} appended",
            self.report.total(),
            self.report.updated.len(),
            self.report.recycled.len(),
            self.report.appended.len()
        );
        Ok(self.report)
    }

    async fn upsert(&mut self, mut record: InventoryRecord) -> Result<(), PipelineError> {
        let key = match record.clave_zirkel.as_deref().map(str::trim) {
            Some(k) if !k.is_empty() => k.to_string(),
            _ => self.synthesize_key(&record).await?,
        };
        record.clave_zirkel = Some(key.clone());

        if let Some(idx) = self.find_key(&key) {
            let mut row = self.rows[idx].clone();
            row.truncate(self.columns.boundary());
            self.columns.apply(&record, &mut row);
            self.write_row(idx, row).await?;
            self.consumed.insert(idx);
            debug!("Updated {key} in row {}", idx + 1);
            self.report.updated.push(key);
        } else if let Some(idx) = self.find_blank() {
            let mut row = Vec::new();
            self.columns.apply(&record, &mut row);
            self.write_row(idx, row).await?;
            self.consumed.insert(idx);
            debug!("Placed {key} in recycled row {}", idx + 1);
            self.report.recycled.push(key);
        } else {
            let mut row = Vec::new();
            self.columns.apply(&record, &mut row);
            self.append_row(row).await?;
            self.consumed.insert(self.rows.len() - 1);
            debug!("Appended {key} as row {}", self.rows.len());
            self.report.appended.push(key);
        }
        Ok(())
    }

    /// Row index (0 = header) holding `key`.
    fn find_key(&self, key: &str) -> Option<usize> {
        self.rows
            .iter()
            .enumerate()
            .skip(1)
            .find(|(_, row)| cell_text(row.get(self.key_col)) == key)
            .map(|(i, _)| i)
    }

    /// First data row with no key and no provider not yet used by this batch.
    fn find_blank(&self) -> Option<usize> {
        let provider_col = self.columns.get(Field::Proveedor);
        self.rows
            .iter()
            .enumerate()
            .skip(1)
            .find(|(i, row)| {
                !self.consumed.contains(i)
                    && cell_is_blank(row.get(self.key_col))
                    && provider_col.map_or(true, |c| cell_is_blank(row.get(c)))
            })
            .map(|(i, _)| i)
    }

    async fn synthesize_key(&mut self, record: &InventoryRecord) -> Result<String, PipelineError> {
        let wanted = record.proveedor.clone().unwrap_or_default();
        let code = {
            let catalogue = self.providers().await?;
            providers::find(catalogue, &wanted)
                .map(|p| p.clave.clone())
                .ok_or_else(|| PipelineError::UnknownProvider {
                    provider: wanted.clone(),
                })?
        };
        let key_col = self.key_col;
        let existing: Vec<String> = self
            .rows
            .iter()
            .skip(1)
            .map(|r| cell_text(r.get(key_col)))
            .collect();
        let key = next_sequential(&code, existing.iter().map(String::as_str)).ok_or_else(|| {
            PipelineError::InventorySchema {
                sheet: self.config.inventory_sheet.clone(),
                detail: format!("no sequential key left for provider {code}"),
            }
        })?;
        debug!("Synthesised key {key} for provider {wanted}");
        Ok(key.into_string())
    }

    async fn providers(&mut self) -> Result<&[Provider], PipelineError> {
        if self.providers.is_none() {
            let range = self.config.providers_range();
            let store = self.store;
            let rows = with_retry(&self.config.retry, "providers read", || store.read(&range))
                .await
                .map_err(PipelineError::from_store)?;
            self.providers = Some(providers::parse_catalogue(&rows));
        }
        Ok(self.providers.as_deref().unwrap_or_default())
    }

    fn last_writable(&self) -> usize {
        self.columns.boundary() - 1
    }

    async fn write_row(&mut self, idx: usize, row: Vec<Cell>) -> Result<(), PipelineError> {
        let range = A1Range::row(&self.config.inventory_sheet, idx + 1, 0, self.last_writable()).to_string();
        let store = self.store;
        let values = vec![row.clone()];
        with_retry(&self.config.retry, "inventory write", || store.write(&range, values.clone()))
            .await
            .map_err(PipelineError::from_store)?;

        let mirror = &mut self.rows[idx];
        if mirror.len() < row.len() {
            mirror.resize(row.len(), Value::String(String::new()));
        }
        for (i, cell) in row.into_iter().enumerate() {
            mirror[i] = cell;
        }
        Ok(())
    }

    async fn append_row(&mut self, row: Vec<Cell>) -> Result<(), PipelineError> {
        let range = A1Range::columns(&self.config.inventory_sheet, 0, self.last_writable()).to_string();
        let store = self.store;
        let values = vec![row.clone()];
        with_retry(&self.config.retry, "inventory append", || store.append(&range, values.clone()))
            .await
            .map_err(PipelineError::from_store)?;
        self.rows.push(row);
        Ok(())
    }
}
