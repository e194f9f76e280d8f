//! Data models for items, labels and export records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The unset label sentinel
pub const UNSET: &str = "";

/// Document previews are cut at this many characters
pub const PREVIEW_CHARS: usize = 1000;

/// Category tags offered to annotators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Math,
    Physics,
    Chemistry,
    Life,
    Earth,
    Materials,
    Other,
}

impl Category {
    /// Display order, which is also the shortcut order
    pub const ALL: [Category; 7] = [
        Category::Math,
        Category::Physics,
        Category::Chemistry,
        Category::Life,
        Category::Earth,
        Category::Materials,
        Category::Other,
    ];

    /// The tag stored in the ledger and written to exports
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Math => "数学",
            Category::Physics => "物理",
            Category::Chemistry => "化学",
            Category::Life => "生命",
            Category::Earth => "地球",
            Category::Materials => "材料",
            Category::Other => "其他",
        }
    }

    /// Keyboard digit (1-7) bound to this category
    pub fn shortcut(&self) -> u8 {
        Category::ALL
            .iter()
            .position(|c| c == self)
            .map(|i| i as u8 + 1)
            .unwrap_or(0)
    }

    pub fn from_shortcut(digit: u8) -> Option<Self> {
        match digit {
            1..=7 => Some(Category::ALL[(digit - 1) as usize]),
            _ => None,
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("Invalid category: {}", s))
    }
}

impl From<Category> for String {
    fn from(category: Category) -> Self {
        category.as_str().to_string()
    }
}

/// One labelable (image, document) pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Item {
    pub index: usize,
    pub image: String,
    pub document: String,
}

impl Item {
    /// Document truncated to `limit` characters, plus whether it was cut
    pub fn preview(&self, limit: usize) -> (String, bool) {
        match self.document.char_indices().nth(limit) {
            Some((byte_idx, _)) => (format!("{}...", &self.document[..byte_idx]), true),
            None => (self.document.clone(), false),
        }
    }
}

/// Item as shown to an annotator, with its current label
#[derive(Debug, Clone, Serialize)]
pub struct ItemView {
    pub index: usize,
    pub image: String,
    pub document: String,
    pub preview: String,
    pub truncated: bool,
    pub label: Option<String>,
}

impl ItemView {
    pub fn new(item: &Item, label: Option<String>) -> Self {
        let (preview, truncated) = item.preview(PREVIEW_CHARS);
        Self {
            index: item.index,
            image: item.image.clone(),
            document: item.document.clone(),
            preview,
            truncated,
            label,
        }
    }
}

/// One row of an export
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRecord {
    pub index: usize,
    pub image: String,
    pub document: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participant_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// An `(index, label)` pair recovered from a persisted snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotEntry {
    pub index: usize,
    pub label: String,
}

impl SnapshotEntry {
    /// Extract an entry from a loosely-typed snapshot row.
    ///
    /// Returns `None` when `index` or `label` is missing or null. Numeric
    /// strings are accepted for `index`.
    pub fn from_value(value: &serde_json::Value) -> Option<Self> {
        let index = match value.get("index")? {
            serde_json::Value::Number(n) => usize::try_from(n.as_u64()?).ok()?,
            serde_json::Value::String(s) => s.trim().parse().ok()?,
            _ => return None,
        };
        let label = value.get("label")?.as_str()?.to_string();
        Some(Self { index, label })
    }
}

/// Aggregate label counts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    pub per_category_count: BTreeMap<String, usize>,
    pub labeled_total: usize,
    pub unlabeled_total: usize,
}

impl Stats {
    pub fn total(&self) -> usize {
        self.labeled_total + self.unlabeled_total
    }

    /// Fraction of items labeled, 0.0 for an empty dataset
    pub fn completion(&self) -> f64 {
        match self.total() {
            0 => 0.0,
            total => self.labeled_total as f64 / total as f64,
        }
    }
}

/// Which records an export should contain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportScope {
    #[default]
    All,
    Mine,
}

impl ExportScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportScope::All => "all",
            ExportScope::Mine => "mine",
        }
    }
}

impl std::str::FromStr for ExportScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(ExportScope::All),
            "mine" => Ok(ExportScope::Mine),
            _ => Err(format!("Invalid export scope: {}", s)),
        }
    }
}

/// Request to label an item
#[derive(Debug, Deserialize)]
pub struct ApplyLabelRequest {
    pub index: Option<usize>,
    pub label: Option<String>,
    /// Keyboard digit 1-7, used when `label` is absent
    pub shortcut: Option<u8>,
    pub participant_id: Option<String>,
}

/// Request to register a participant
#[derive(Debug, Default, Deserialize)]
pub struct RegisterParticipantRequest {
    pub id: Option<String>,
}

/// Cursor movement within a participant's assigned range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavAction {
    Next,
    Previous,
    NextUnlabeled,
    Jump,
}

/// Request to move a participant's cursor
#[derive(Debug, Deserialize)]
pub struct NavigateRequest {
    pub action: NavAction,
    pub index: Option<usize>,
}

/// Query for the export endpoint
#[derive(Debug, Default, Deserialize)]
pub struct ExportQuery {
    #[serde(default)]
    pub scope: ExportScope,
    pub participant_id: Option<String>,
}

/// Query for the progress endpoint
#[derive(Debug, Default, Deserialize)]
pub struct ProgressQuery {
    pub participant_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_round_trip_through_str() {
        for category in Category::ALL {
            let parsed: Category = category.as_str().parse().unwrap();
            assert_eq!(parsed, category);
        }
        assert!("biology".parse::<Category>().is_err());
    }

    #[test]
    fn test_category_shortcuts() {
        assert_eq!(Category::from_shortcut(1), Some(Category::Math));
        assert_eq!(Category::from_shortcut(2), Some(Category::Physics));
        assert_eq!(Category::from_shortcut(7), Some(Category::Other));
        assert_eq!(Category::from_shortcut(0), None);
        assert_eq!(Category::from_shortcut(8), None);
        assert_eq!(Category::Materials.shortcut(), 6);
    }

    #[test]
    fn test_preview_short_document_is_untouched() {
        let item = Item {
            index: 0,
            image: "a.png".into(),
            document: "<p>short</p>".into(),
        };
        assert_eq!(item.preview(1000), ("<p>short</p>".to_string(), false));
    }

    #[test]
    fn test_preview_cuts_on_char_boundary() {
        let item = Item {
            index: 0,
            image: "a.png".into(),
            document: "物理化学".into(),
        };
        let (preview, truncated) = item.preview(2);
        assert_eq!(preview, "物理...");
        assert!(truncated);
    }

    #[test]
    fn test_snapshot_entry_from_value() {
        let v = serde_json::json!({"index": 3, "label": "数学"});
        assert_eq!(
            SnapshotEntry::from_value(&v),
            Some(SnapshotEntry { index: 3, label: "数学".into() })
        );

        let v = serde_json::json!({"index": "4", "label": ""});
        assert_eq!(SnapshotEntry::from_value(&v).unwrap().index, 4);

        assert!(SnapshotEntry::from_value(&serde_json::json!({"index": null, "label": "x"})).is_none());
        assert!(SnapshotEntry::from_value(&serde_json::json!({"index": 1, "label": null})).is_none());
        assert!(SnapshotEntry::from_value(&serde_json::json!({"label": "x"})).is_none());
        assert!(SnapshotEntry::from_value(&serde_json::json!({"index": -1, "label": "x"})).is_none());
    }

    #[test]
    fn test_export_record_omits_missing_provenance() {
        let record = ExportRecord {
            index: 0,
            image: "a.png".into(),
            document: String::new(),
            label: String::new(),
            participant_id: None,
            timestamp: None,
        };
        let json = serde_json::to_string(&record).unwrap();
        assert!(!json.contains("participant_id"));
        assert!(!json.contains("timestamp"));
    }

    #[test]
    fn test_stats_completion() {
        let stats = Stats {
            per_category_count: BTreeMap::new(),
            labeled_total: 1,
            unlabeled_total: 3,
        };
        assert_eq!(stats.total(), 4);
        assert!((stats.completion() - 0.25).abs() < f64::EPSILON);

        let empty = Stats {
            per_category_count: BTreeMap::new(),
            labeled_total: 0,
            unlabeled_total: 0,
        };
        assert_eq!(empty.completion(), 0.0);
    }

    #[test]
    fn test_export_scope_parse() {
        assert_eq!("all".parse::<ExportScope>().unwrap(), ExportScope::All);
        assert_eq!("mine".parse::<ExportScope>().unwrap(), ExportScope::Mine);
        assert!("some".parse::<ExportScope>().is_err());
        assert_eq!(ExportScope::default(), ExportScope::All);
    }
}
