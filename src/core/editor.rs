//! Fixed-slot editing surface for triggers
//!
//! The editor always shows exactly [`EDITOR_SLOTS`] rows. Loading pads with
//! empty rules or drops extras; saving snapshots every row, trimmed.

use crate::core::triggers::{TriggerRule, TriggerSet, TriggerStore, MAX_TRIGGERS};
use crate::storage::KeyValueStore;
use anyhow::Result;

pub const EDITOR_SLOTS: usize = MAX_TRIGGERS;

/// Ten editable rows, addressed by index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditorSlots {
    slots: Vec<TriggerRule>,
}

impl Default for EditorSlots {
    fn default() -> Self {
        Self {
            slots: vec![TriggerRule::default(); EDITOR_SLOTS],
        }
    }
}

impl EditorSlots {
    pub fn from_set(set: &TriggerSet) -> Self {
        let mut slots: Vec<TriggerRule> = set.iter().take(EDITOR_SLOTS).cloned().collect();
        slots.resize(EDITOR_SLOTS, TriggerRule::default());
        Self { slots }
    }

    /// Fill slots from rows in order; rows past the last slot are ignored
    pub fn from_rows<I>(rows: I) -> Self
    where
        I: IntoIterator<Item = TriggerRule>,
    {
        let mut editor = Self::default();
        for (slot, row) in editor.slots.iter_mut().zip(rows) {
            *slot = row;
        }
        editor
    }

    pub fn slots(&self) -> &[TriggerRule] {
        &self.slots
    }

    /// Snapshot all rows into a set, trimming both fields
    pub fn to_set(&self) -> TriggerSet {
        TriggerSet::from_rules(
            self.slots
                .iter()
                .map(|slot| TriggerRule::new(slot.trigger.trim(), slot.response.trim()))
                .collect(),
        )
    }
}

impl<S: KeyValueStore> TriggerStore<S> {
    /// Current set normalised to the editor's fixed rows
    pub fn load_slots(&self) -> EditorSlots {
        EditorSlots::from_set(&self.load())
    }

    /// Persist every editor row, including blank ones
    pub fn save_slots(&mut self, slots: &EditorSlots) -> Result<()> {
        let set = slots.to_set();
        self.save(&set)?;
        tracing::info!(
            "Saved trigger editor ({} armed)",
            set.iter().filter(|rule| rule.is_armed()).count()
        );
        Ok(())
    }
}
