//! Dataset store: the ordered, read-only sequence of items for a session

use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::Item;

/// Immutable item sequence with a stable index space
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dataset {
    items: Vec<Item>,
}

impl Dataset {
    /// Build a dataset from `(image, document)` pairs, indexing them in order
    pub fn from_pairs<I, S, T>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, T)>,
        S: Into<String>,
        T: Into<String>,
    {
        let items = pairs
            .into_iter()
            .enumerate()
            .map(|(index, (image, document))| Item {
                index,
                image: image.into(),
                document: document.into(),
            })
            .collect();
        Self { items }
    }

    /// Parse a JSON array of item records.
    ///
    /// Each record must be an object with a string `image`. The document is
    /// read from `document`, falling back to `html`, and is empty when absent.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(raw)
            .map_err(|e| AppError::DataUnavailable(format!("malformed dataset: {}", e)))?;
        let rows = value
            .as_array()
            .ok_or_else(|| AppError::DataUnavailable("dataset must be a JSON array".into()))?;

        let mut items = Vec::with_capacity(rows.len());
        for (index, row) in rows.iter().enumerate() {
            let obj = row.as_object().ok_or_else(|| {
                AppError::DataUnavailable(format!("item {} is not an object", index))
            })?;
            let image = obj
                .get("image")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    AppError::DataUnavailable(format!("item {} has no string `image` field", index))
                })?
                .to_string();
            let document = match obj
                .get("document")
                .filter(|v| !v.is_null())
                .or_else(|| obj.get("html"))
            {
                None | Some(Value::Null) => String::new(),
                Some(Value::String(s)) => s.clone(),
                Some(_) => {
                    return Err(AppError::DataUnavailable(format!(
                        "item {} has a non-string document",
                        index
                    )))
                }
            };
            items.push(Item {
                index,
                image,
                document,
            });
        }

        Ok(Self { items })
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Bounds-checked item lookup
    pub fn get(&self, index: usize) -> Result<&Item> {
        self.items.get(index).ok_or(AppError::IndexOutOfRange {
            index,
            len: self.items.len(),
        })
    }
}

/// A dataset file that is read at most once per process
#[derive(Debug)]
pub struct DatasetSource {
    path: PathBuf,
    cache: OnceLock<Arc<Dataset>>,
}

impl DatasetSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: OnceLock::new(),
        }
    }

    /// Load the dataset, returning the cached copy on every call after the first
    pub fn load(&self) -> Result<Arc<Dataset>> {
        if let Some(dataset) = self.cache.get() {
            return Ok(Arc::clone(dataset));
        }

        let raw = std::fs::read_to_string(&self.path).map_err(|e| {
            AppError::DataUnavailable(format!("cannot read {}: {}", self.path.display(), e))
        })?;
        let dataset = Arc::new(Dataset::from_json_str(&raw)?);
        tracing::info!(
            "Loaded {} items from {}",
            dataset.len(),
            self.path.display()
        );

        // A concurrent first load may have won; keep whichever landed first
        let _ = self.cache.set(dataset);
        self.cache
            .get()
            .cloned()
            .ok_or_else(|| AppError::Internal("dataset cache not populated".into()))
    }
}
