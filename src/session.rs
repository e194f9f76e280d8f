//! Labeling session: dataset, ledger, shard plan and store wired together
//!
//! Every core operation goes through a `Session` value. The three editor
//! variants differ only in the store and shard count handed to [`Session::open`].

use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::dataset::Dataset;
use crate::error::{AppError, Result};
use crate::export;
use crate::ledger::Ledger;
use crate::models::{ExportRecord, ExportScope, ItemView, NavAction, Stats, UNSET};
use crate::participant::Participant;
use crate::partition::ShardPlan;
use crate::store::{FlushPolicy, LabelStore};

pub struct Session {
    dataset: Arc<Dataset>,
    ledger: Ledger,
    plan: ShardPlan,
    store: Arc<dyn LabelStore>,
    participants: HashMap<String, Participant>,
}

impl Session {
    /// Open a session, restoring any labels the store already holds
    pub fn open(dataset: Arc<Dataset>, store: Arc<dyn LabelStore>, shard_count: usize) -> Result<Self> {
        let plan = ShardPlan::new(dataset.len(), shard_count)?;
        let ledger = Ledger::from_snapshot(dataset.len(), store.load_snapshot()?);
        tracing::info!(
            "Session opened: {} items, {} labeled, {} shard(s)",
            dataset.len(),
            ledger.labeled_total(),
            shard_count
        );

        Ok(Self {
            dataset,
            ledger,
            plan,
            store,
            participants: HashMap::new(),
        })
    }

    pub fn dataset(&self) -> &Arc<Dataset> {
        &self.dataset
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn plan(&self) -> &ShardPlan {
        &self.plan
    }

    /// Item at `index` with its current label
    pub fn current_item(&self, index: usize) -> Result<ItemView> {
        let item = self.dataset.get(index)?;
        let label = self.ledger.get(index)?;
        let label = (label != UNSET).then(|| label.to_string());
        Ok(ItemView::new(item, label))
    }

    /// Set or clear the label on `index`.
    ///
    /// Returns whether the ledger changed. Stores that flush on every
    /// mutation receive a fresh snapshot whenever it does.
    pub fn apply_label(&mut self, index: usize, label: &str, participant_id: Option<&str>) -> Result<bool> {
        if let Some(id) = participant_id {
            if let Some(p) = self.participants.get_mut(id) {
                p.touch();
                if !p.assigned_range.contains(&index) {
                    tracing::debug!("Participant {} labeled {} outside its shard", id, index);
                }
            }
        }

        let changed = self.ledger.set(index, label)?;
        tracing::debug!(index, label, changed, "Label applied");

        if changed && self.store.policy() == FlushPolicy::EveryMutation {
            let snapshot = self.ledger.flush(&self.dataset)?;
            if let Err(e) = self.store.persist(&snapshot) {
                tracing::error!("Failed to persist labels: {}", e);
                return Err(e);
            }
        }

        Ok(changed)
    }

    pub fn progress(&self) -> Stats {
        self.ledger.stats()
    }

    /// Progress over one participant's assigned range
    pub fn progress_for(&self, participant_id: &str) -> Stats {
        self.ledger.stats_in(self.assigned_range(participant_id))
    }

    /// Range assigned to `participant_id`; needs no registration
    pub fn assigned_range(&self, participant_id: &str) -> Range<usize> {
        self.plan.assign(participant_id).range
    }

    /// Register a participant, generating an id when none is supplied.
    /// Joining with a known id returns the existing participant.
    pub fn join(&mut self, id: Option<String>, now: DateTime<Utc>) -> Participant {
        let participant = match id {
            Some(id) => {
                if let Some(existing) = self.participants.get_mut(&id) {
                    existing.touch();
                    return existing.clone();
                }
                Participant::with_id(id, &self.plan, now)
            }
            None => Participant::generate(&self.plan, now),
        };

        tracing::info!(
            "Participant {} joined on shard {} ({:?})",
            participant.id,
            participant.shard_index,
            participant.assigned_range
        );
        self.participants
            .insert(participant.id.clone(), participant.clone());
        participant
    }

    pub fn participant(&self, id: &str) -> Result<&Participant> {
        self.participants
            .get(id)
            .ok_or_else(|| AppError::NotFound(format!("Participant {} not found", id)))
    }

    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    /// Move a participant's cursor and return the item it lands on
    pub fn navigate(&mut self, participant_id: &str, action: NavAction, index: Option<usize>) -> Result<ItemView> {
        let participant = self
            .participants
            .get_mut(participant_id)
            .ok_or_else(|| AppError::NotFound(format!("Participant {} not found", participant_id)))?;
        if !participant.has_work() {
            return Err(AppError::NotFound(format!(
                "Participant {} has no assigned items",
                participant_id
            )));
        }

        participant.touch();
        let cursor = match action {
            NavAction::Next => participant.next(),
            NavAction::Previous => participant.previous(),
            NavAction::Jump => {
                let index = index
                    .ok_or_else(|| AppError::BadRequest("jump requires an index".into()))?;
                participant.jump(index)
            }
            NavAction::NextUnlabeled => {
                let range = participant.cursor..participant.assigned_range.end;
                match self.ledger.first_unlabeled_in(range) {
                    Some(index) => participant.jump(index),
                    None => participant.cursor,
                }
            }
        };

        self.current_item(cursor)
    }

    /// Build an export. `Mine` needs the exporting participant's id.
    ///
    /// Stores that only persist on export receive the full ledger here.
    pub fn export_snapshot(
        &self,
        scope: ExportScope,
        participant_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Vec<ExportRecord>> {
        let records = match scope {
            ExportScope::All => export::export_all(&self.dataset, &self.ledger)?,
            ExportScope::Mine => {
                let id = participant_id.ok_or_else(|| {
                    AppError::BadRequest("scope `mine` requires participant_id".into())
                })?;
                export::export_scoped(
                    &self.dataset,
                    &self.ledger,
                    self.assigned_range(id),
                    id,
                    now,
                )?
            }
        };

        if self.store.policy() == FlushPolicy::OnExport {
            self.store.persist(&self.ledger.flush(&self.dataset)?)?;
        }

        tracing::info!("Exported {} records (scope: {})", records.len(), scope.as_str());
        Ok(records)
    }
}
