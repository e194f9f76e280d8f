//! Session export: ledger + dataset snapshots as portable record sets

use chrono::{DateTime, Utc};

use crate::dataset::Dataset;
use crate::error::Result;
use crate::ledger::Ledger;
use crate::models::ExportRecord;

fn record(dataset: &Dataset, ledger: &Ledger, index: usize) -> Result<ExportRecord> {
    let item = dataset.get(index)?;
    Ok(ExportRecord {
        index,
        image: item.image.clone(),
        document: item.document.clone(),
        label: ledger.get(index)?.to_string(),
        participant_id: None,
        timestamp: None,
    })
}

/// One record per dataset item, in index order
pub fn export_all(dataset: &Dataset, ledger: &Ledger) -> Result<Vec<ExportRecord>> {
    (0..dataset.len())
        .map(|index| record(dataset, ledger, index))
        .collect()
}

/// One record per index in `indices`, ascending and deduplicated, stamped
/// with the exporting participant and `exported_at`
pub fn export_scoped(
    dataset: &Dataset,
    ledger: &Ledger,
    indices: impl IntoIterator<Item = usize>,
    participant_id: &str,
    exported_at: DateTime<Utc>,
) -> Result<Vec<ExportRecord>> {
    let mut indices: Vec<usize> = indices.into_iter().collect();
    indices.sort_unstable();
    indices.dedup();

    indices
        .into_iter()
        .map(|index| {
            let mut rec = record(dataset, ledger, index)?;
            rec.participant_id = Some(participant_id.to_string());
            rec.timestamp = Some(exported_at);
            Ok(rec)
        })
        .collect()
}

/// Pretty-printed JSON document for download or disk
pub fn to_json(records: &[ExportRecord]) -> Result<String> {
    Ok(serde_json::to_string_pretty(records)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;

    fn fixture() -> (Dataset, Ledger) {
        let dataset = Dataset::from_pairs((0..6).map(|i| (format!("img/{}.png", i), format!("<p>{}</p>", i))));
        let mut ledger = Ledger::new(dataset.len());
        ledger.set(1, "数学").unwrap();
        ledger.set(4, "地球").unwrap();
        (dataset, ledger)
    }

    #[test]
    fn test_export_all_covers_dataset() {
        let (dataset, ledger) = fixture();
        let records = export_all(&dataset, &ledger).unwrap();

        assert_eq!(records.len(), dataset.len());
        assert!(records.iter().enumerate().all(|(i, r)| r.index == i));
        assert_eq!(records[0].label, "");
        assert_eq!(records[1].label, "数学");
        assert_eq!(records[4].image, "img/4.png");
        assert!(records.iter().all(|r| r.participant_id.is_none()));
    }

    #[test]
    fn test_export_scoped_sorted_and_stamped() {
        let (dataset, ledger) = fixture();
        let now = Utc::now();
        let records = export_scoped(&dataset, &ledger, [4, 2, 3, 2], "p-1", now).unwrap();

        let indices: Vec<usize> = records.iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![2, 3, 4]);
        assert!(records.iter().all(|r| r.participant_id.as_deref() == Some("p-1")));
        assert!(records.iter().all(|r| r.timestamp == Some(now)));
        assert_eq!(records[2].label, "地球");
    }

    #[test]
    fn test_export_scoped_range() {
        let (dataset, ledger) = fixture();
        let records = export_scoped(&dataset, &ledger, 2..5, "p", Utc::now()).unwrap();
        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| (2..5).contains(&r.index)));
    }

    #[test]
    fn test_export_does_not_mutate() {
        let (dataset, ledger) = fixture();
        let before = ledger.stats();
        export_all(&dataset, &ledger).unwrap();
        export_scoped(&dataset, &ledger, 0..6, "p", Utc::now()).unwrap();
        assert_eq!(ledger.stats(), before);
    }

    #[test]
    fn test_export_propagates_index_errors() {
        let (dataset, ledger) = fixture();
        let err = export_scoped(&dataset, &ledger, [9], "p", Utc::now()).unwrap_err();
        assert!(matches!(err, AppError::IndexOutOfRange { index: 9, .. }));
    }

    #[test]
    fn test_to_json_keeps_unicode() {
        let (dataset, ledger) = fixture();
        let json = to_json(&export_all(&dataset, &ledger).unwrap()).unwrap();
        assert!(json.contains("\"label\": \"数学\""));
    }
}
