//! Deterministic task partitioning
//!
//! Each participant id hashes to one of `shard_count` shards. Shards are
//! contiguous, disjoint ranges of the item index space; the first
//! `total_items % shard_count` shards carry one extra item. Participants whose
//! ids land on the same shard share the same range.

use std::ops::Range;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::{AppError, Result};

/// Stable 64-bit hash of a participant id.
///
/// Uses the first eight bytes of the SHA-256 digest so the value is identical
/// across runs, builds and platforms.
pub fn stable_hash(participant_id: &str) -> u64 {
    let digest = Sha256::digest(participant_id.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}

fn check_shard_count(shard_count: usize) -> Result<()> {
    if shard_count == 0 {
        return Err(AppError::InvalidConfiguration(
            "shard count must be at least 1".into(),
        ));
    }
    Ok(())
}

/// Shard a participant id belongs to
pub fn shard_index(participant_id: &str, shard_count: usize) -> Result<usize> {
    check_shard_count(shard_count)?;
    Ok((stable_hash(participant_id) % shard_count as u64) as usize)
}

/// Index range owned by shard `shard_index`.
///
/// Indices past the last shard produce an empty range at `total_items`.
pub fn shard_range(total_items: usize, shard_count: usize, shard_index: usize) -> Result<Range<usize>> {
    check_shard_count(shard_count)?;
    if total_items == 0 {
        return Ok(0..0);
    }

    let base = total_items / shard_count;
    let remainder = total_items % shard_count;
    let size = if shard_index < remainder { base + 1 } else { base };
    let start = shard_index
        .saturating_mul(base)
        .saturating_add(shard_index.min(remainder))
        .min(total_items);
    let end = start.saturating_add(size).min(total_items);

    Ok(start..end)
}

/// Range assigned to `participant_id`
pub fn assigned_range(total_items: usize, shard_count: usize, participant_id: &str) -> Result<Range<usize>> {
    let shard = shard_index(participant_id, shard_count)?;
    shard_range(total_items, shard_count, shard)
}

/// Validated partitioning parameters for one dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ShardPlan {
    total_items: usize,
    shard_count: usize,
}

/// One participant's place in a [`ShardPlan`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Assignment {
    pub shard_index: usize,
    pub range: Range<usize>,
}

impl ShardPlan {
    pub fn new(total_items: usize, shard_count: usize) -> Result<Self> {
        check_shard_count(shard_count)?;
        Ok(Self {
            total_items,
            shard_count,
        })
    }

    pub fn total_items(&self) -> usize {
        self.total_items
    }

    pub fn shard_count(&self) -> usize {
        self.shard_count
    }

    pub fn range_of(&self, shard_index: usize) -> Range<usize> {
        // shard_count was validated in `new`
        shard_range(self.total_items, self.shard_count, shard_index).unwrap_or(0..0)
    }

    pub fn assign(&self, participant_id: &str) -> Assignment {
        let shard_index = (stable_hash(participant_id) % self.shard_count as u64) as usize;
        Assignment {
            shard_index,
            range: self.range_of(shard_index),
        }
    }

    /// Every shard's range, in shard order
    pub fn ranges(&self) -> Vec<Range<usize>> {
        (0..self.shard_count).map(|s| self.range_of(s)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ten_items_three_shards() {
        assert_eq!(shard_range(10, 3, 0).unwrap(), 0..4);
        assert_eq!(shard_range(10, 3, 1).unwrap(), 4..7);
        assert_eq!(shard_range(10, 3, 2).unwrap(), 7..10);
    }

    #[test]
    fn test_empty_dataset_never_fails() {
        for shards in 1..10 {
            for s in 0..shards {
                assert!(shard_range(0, shards, s).unwrap().is_empty());
            }
            assert!(assigned_range(0, shards, "anyone").unwrap().is_empty());
        }
    }

    #[test]
    fn test_zero_shards_is_invalid() {
        assert!(matches!(
            shard_range(10, 0, 0),
            Err(AppError::InvalidConfiguration(_))
        ));
        assert!(matches!(
            shard_index("p", 0),
            Err(AppError::InvalidConfiguration(_))
        ));
        assert!(matches!(
            ShardPlan::new(10, 0),
            Err(AppError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_more_shards_than_items() {
        let ranges: Vec<_> = (0..5).map(|s| shard_range(2, 5, s).unwrap()).collect();
        assert_eq!(ranges[0], 0..1);
        assert_eq!(ranges[1], 1..2);
        assert!(ranges[2..].iter().all(|r| r.is_empty()));
    }

    #[test]
    fn test_shards_cover_exactly_once() {
        for total in 0..=200usize {
            for shards in 1..=40usize {
                let mut seen = vec![0u8; total];
                let mut next_start = 0;
                for s in 0..shards {
                    let range = shard_range(total, shards, s).unwrap();
                    assert!(range.end <= total);
                    // contiguous and ordered
                    assert_eq!(range.start, next_start, "total={} shards={} s={}", total, shards, s);
                    next_start = range.end;
                    for i in range.clone() {
                        seen[i] += 1;
                    }
                    let expected = total / shards + usize::from(s < total % shards);
                    assert_eq!(range.len(), expected);
                }
                assert_eq!(next_start, total);
                assert!(seen.iter().all(|&c| c == 1), "total={} shards={}", total, shards);
            }
        }
    }

    #[test]
    fn test_hash_is_reproducible() {
        assert_eq!(stable_hash("annotator-7"), stable_hash("annotator-7"));
        assert_ne!(stable_hash("annotator-7"), stable_hash("annotator-8"));
    }

    #[test]
    fn test_colliding_ids_share_a_range() {
        let shards = 4;
        let total = 103;
        let ids: Vec<String> = (0..64).map(|i| format!("p-{}", i)).collect();

        for a in &ids {
            for b in &ids {
                let sa = shard_index(a, shards).unwrap();
                let sb = shard_index(b, shards).unwrap();
                if sa == sb {
                    assert_eq!(
                        assigned_range(total, shards, a).unwrap(),
                        assigned_range(total, shards, b).unwrap()
                    );
                }
            }
        }
    }

    #[test]
    fn test_every_shard_is_reachable() {
        let shards = 5;
        let mut hit = [false; 5];
        for i in 0..500 {
            hit[shard_index(&format!("user-{}", i), shards).unwrap()] = true;
        }
        assert!(hit.iter().all(|&h| h));
    }

    #[test]
    fn test_plan_matches_free_functions() {
        let plan = ShardPlan::new(57, 6).unwrap();
        for id in ["a", "b", "c", "p-18f2c", "同学"] {
            let assignment = plan.assign(id);
            assert_eq!(assignment.shard_index, shard_index(id, 6).unwrap());
            assert_eq!(assignment.range, assigned_range(57, 6, id).unwrap());
        }
        assert_eq!(plan.ranges().iter().map(|r| r.len()).sum::<usize>(), 57);
    }

    #[test]
    fn test_single_shard_owns_everything() {
        let plan = ShardPlan::new(12, 1).unwrap();
        let assignment = plan.assign("whoever");
        assert_eq!(assignment.shard_index, 0);
        assert_eq!(assignment.range, 0..12);
        assert!(assignment.range.contains(&11));
        assert!(!assignment.range.contains(&12));
    }
}
