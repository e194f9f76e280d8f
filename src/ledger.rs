//! Label ledger: the authoritative index → label mapping for a session
//!
//! Labels are stored as plain strings so new categories can appear without a
//! schema change. The empty string is the unset sentinel and is never stored.

use std::collections::BTreeMap;
use std::ops::Range;

use crate::dataset::Dataset;
use crate::error::{AppError, Result};
use crate::export;
use crate::models::{Category, ExportRecord, SnapshotEntry, Stats, UNSET};

#[derive(Debug, Clone, Default)]
pub struct Ledger {
    dataset_size: usize,
    entries: BTreeMap<usize, String>,
    counts: BTreeMap<String, usize>,
}

impl Ledger {
    /// Create an empty ledger for a dataset of `dataset_size` items
    pub fn new(dataset_size: usize) -> Self {
        Self {
            dataset_size,
            entries: BTreeMap::new(),
            counts: BTreeMap::new(),
        }
    }

    /// Create a ledger pre-populated from a persisted snapshot.
    ///
    /// Entries whose index falls outside the dataset are dropped.
    pub fn from_snapshot(
        dataset_size: usize,
        entries: impl IntoIterator<Item = SnapshotEntry>,
    ) -> Self {
        let mut ledger = Self::new(dataset_size);
        let mut ignored = 0usize;
        for entry in entries {
            if ledger.set(entry.index, &entry.label).is_err() {
                ignored += 1;
            }
        }
        if ignored > 0 {
            tracing::warn!("Ignored {} snapshot entries outside the dataset", ignored);
        }
        ledger
    }

    pub fn dataset_size(&self) -> usize {
        self.dataset_size
    }

    fn check(&self, index: usize) -> Result<()> {
        if index < self.dataset_size {
            Ok(())
        } else {
            Err(AppError::IndexOutOfRange {
                index,
                len: self.dataset_size,
            })
        }
    }

    /// Current label, or [`UNSET`] when the item has none
    pub fn get(&self, index: usize) -> Result<&str> {
        self.check(index)?;
        Ok(self.entries.get(&index).map(String::as_str).unwrap_or(UNSET))
    }

    /// Set or clear a label. Returns whether the stored state changed.
    pub fn set(&mut self, index: usize, label: &str) -> Result<bool> {
        self.check(index)?;

        if label == UNSET {
            return Ok(match self.entries.remove(&index) {
                Some(previous) => {
                    self.decrement(&previous);
                    true
                }
                None => false,
            });
        }

        if self.entries.get(&index).map(String::as_str) == Some(label) {
            return Ok(false);
        }

        if let Some(previous) = self.entries.insert(index, label.to_string()) {
            self.decrement(&previous);
        }
        *self.counts.entry(label.to_string()).or_default() += 1;
        Ok(true)
    }

    fn decrement(&mut self, label: &str) {
        if let Some(count) = self.counts.get_mut(label) {
            *count -= 1;
            if *count == 0 {
                self.counts.remove(label);
            }
        }
    }

    pub fn labeled_total(&self) -> usize {
        self.entries.len()
    }

    /// Aggregate counts over the whole dataset.
    ///
    /// Every built-in category is reported, with zero when unused.
    pub fn stats(&self) -> Stats {
        let mut per_category_count: BTreeMap<String, usize> = Category::ALL
            .iter()
            .map(|c| (c.as_str().to_string(), 0))
            .collect();
        for (label, count) in &self.counts {
            per_category_count.insert(label.clone(), *count);
        }

        Stats {
            per_category_count,
            labeled_total: self.entries.len(),
            unlabeled_total: self.dataset_size - self.entries.len(),
        }
    }

    /// Aggregate counts restricted to `range` (clipped to the dataset)
    pub fn stats_in(&self, range: Range<usize>) -> Stats {
        let end = range.end.min(self.dataset_size);
        let range = range.start.min(end)..end;
        let mut per_category_count: BTreeMap<String, usize> = Category::ALL
            .iter()
            .map(|c| (c.as_str().to_string(), 0))
            .collect();
        let mut labeled_total = 0;
        for (_, label) in self.entries.range(range.clone()) {
            *per_category_count.entry(label.clone()).or_default() += 1;
            labeled_total += 1;
        }

        Stats {
            per_category_count,
            labeled_total,
            unlabeled_total: range.len() - labeled_total,
        }
    }

    /// First unlabeled index in `range`, if any
    pub fn first_unlabeled_in(&self, range: Range<usize>) -> Option<usize> {
        range
            .take_while(|&i| i < self.dataset_size)
            .find(|i| !self.entries.contains_key(i))
    }

    /// Labeled entries in ascending index order
    pub fn entries(&self) -> impl Iterator<Item = (usize, &str)> {
        self.entries.iter().map(|(i, l)| (*i, l.as_str()))
    }

    /// Snapshot of the full ledger for the caller to persist
    pub fn flush(&self, dataset: &Dataset) -> Result<Vec<ExportRecord>> {
        export::export_all(dataset, self)
    }
}
