//! Participant model
//!
//! A participant is one annotator session. Its id is fixed for the session
//! and decides which shard of the dataset it works on.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::ops::Range;
use uuid::Uuid;

use crate::partition::ShardPlan;

/// An annotator session and its assigned work
#[derive(Debug, Clone, Serialize)]
pub struct Participant {
    /// Opaque id, stable for the session's lifetime
    pub id: String,
    /// Shard the id hashes to
    pub shard_index: usize,
    /// Item indices this participant is responsible for
    pub assigned_range: Range<usize>,
    /// Item the participant is currently looking at
    pub cursor: usize,
    /// When this participant joined
    pub joined_at: DateTime<Utc>,
    /// Last activity timestamp
    pub last_seen_at: DateTime<Utc>,
}

impl Participant {
    /// Create a participant with an id seeded from the session clock
    pub fn generate(plan: &ShardPlan, now: DateTime<Utc>) -> Self {
        let nonce = Uuid::new_v4().simple().to_string();
        let id = format!("p-{:x}-{}", now.timestamp_millis(), &nonce[..6]);
        Self::with_id(id, plan, now)
    }

    /// Create with a specific id (useful for reconnection)
    pub fn with_id(id: impl Into<String>, plan: &ShardPlan, now: DateTime<Utc>) -> Self {
        let id = id.into();
        let assignment = plan.assign(&id);

        Self {
            id,
            shard_index: assignment.shard_index,
            cursor: assignment.range.start,
            assigned_range: assignment.range,
            joined_at: now,
            last_seen_at: now,
        }
    }

    /// Whether the participant has any items at all
    pub fn has_work(&self) -> bool {
        !self.assigned_range.is_empty()
    }

    pub fn touch(&mut self) {
        self.last_seen_at = Utc::now();
    }

    /// Advance one item; stays put at the end of the range
    pub fn next(&mut self) -> usize {
        if self.cursor + 1 < self.assigned_range.end {
            self.cursor += 1;
        }
        self.cursor
    }

    /// Step back one item; stays put at the start of the range
    pub fn previous(&mut self) -> usize {
        if self.cursor > self.assigned_range.start {
            self.cursor -= 1;
        }
        self.cursor
    }

    /// Move to `index`, clamped into the assigned range
    pub fn jump(&mut self, index: usize) -> usize {
        if self.has_work() {
            self.cursor = index.clamp(self.assigned_range.start, self.assigned_range.end - 1);
        }
        self.cursor
    }
}
