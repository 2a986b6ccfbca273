//! Trigger rules and their persisted store.
//!
//! A trigger set holds at most [`MAX_TRIGGERS`] (trigger, response) pairs in
//! insertion order. Every mutation goes through [`TriggerStore`], which reads
//! the whole set, applies the change and writes it back under the
//! [`TRIGGERS_KEY`] key.

use crate::storage::{self, KeyValueStore};
use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Capacity of a trigger set
pub const MAX_TRIGGERS: usize = 10;

/// Key the trigger set is persisted under
pub const TRIGGERS_KEY: &str = "triggers";

/// Notice shown when an add is refused
pub const FULL_NOTICE: &str = "You can only add up to 10 triggers.";

/// A single (trigger substring, response text) pair
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerRule {
    #[serde(default)]
    pub trigger: String,
    #[serde(default)]
    pub response: String,
}

impl TriggerRule {
    pub fn new(trigger: impl Into<String>, response: impl Into<String>) -> Self {
        Self {
            trigger: trigger.into(),
            response: response.into(),
        }
    }

    /// Empty triggers never match
    pub fn is_armed(&self) -> bool {
        !self.trigger.is_empty()
    }

    pub fn field_mut(&mut self, field: TriggerField) -> &mut String {
        match field {
            TriggerField::Trigger => &mut self.trigger,
            TriggerField::Response => &mut self.response,
        }
    }
}

/// Which half of a rule an edit targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerField {
    Trigger,
    Response,
}

impl TriggerField {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Trigger => "trigger",
            Self::Response => "response",
        }
    }
}

/// Result of asking for a new rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// Appended at this index
    Added { index: usize },

    /// Set already holds `MAX_TRIGGERS` rules; nothing changed
    Full,
}

impl AddOutcome {
    #[cfg(test)]
    pub fn is_added(&self) -> bool {
        matches!(self, AddOutcome::Added { .. })
    }

    /// User-facing notice for a refused add
    pub fn notice(&self) -> Option<&'static str> {
        match self {
            AddOutcome::Added { .. } => None,
            AddOutcome::Full => Some(FULL_NOTICE),
        }
    }
}

/// A rule whose response would itself fire another rule when echoed back
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedbackHazard {
    /// Index of the rule whose response contains a trigger
    pub source: usize,
    /// Index of the rule that response would fire
    pub fires: usize,
}

/// Ordered, bounded collection of trigger rules
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct TriggerSet {
    rules: Vec<TriggerRule>,
}

impl TriggerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from stored rules, keeping the first `MAX_TRIGGERS`
    pub fn from_rules(mut rules: Vec<TriggerRule>) -> Self {
        if rules.len() > MAX_TRIGGERS {
            tracing::warn!(
                "Dropping {} trigger(s) beyond the limit of {}",
                rules.len() - MAX_TRIGGERS,
                MAX_TRIGGERS
            );
            rules.truncate(MAX_TRIGGERS);
        }
        Self { rules }
    }

    #[cfg(test)]
    pub fn rules(&self) -> &[TriggerRule] {
        &self.rules
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TriggerRule> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.rules.len() >= MAX_TRIGGERS
    }

    #[cfg(test)]
    pub fn get(&self, index: usize) -> Option<&TriggerRule> {
        self.rules.get(index)
    }

    /// Append a rule unless the set is full
    pub fn push(&mut self, rule: TriggerRule) -> AddOutcome {
        if self.is_full() {
            return AddOutcome::Full;
        }
        self.rules.push(rule);
        AddOutcome::Added {
            index: self.rules.len() - 1,
        }
    }

    /// Remove the rule at `index`; out-of-range is a no-op
    pub fn remove(&mut self, index: usize) -> Option<TriggerRule> {
        if index < self.rules.len() {
            Some(self.rules.remove(index))
        } else {
            None
        }
    }

    /// Overwrite one field of the rule at `index`; out-of-range is a no-op
    pub fn set_field(&mut self, index: usize, field: TriggerField, value: &str) -> bool {
        match self.rules.get_mut(index) {
            Some(rule) => {
                *rule.field_mut(field) = value.to_string();
                true
            }
            None => false,
        }
    }

    /// Pairs of rules where one response contains another rule's trigger.
    ///
    /// Nothing prevents such loops at match time; this only reports them.
    pub fn feedback_hazards(&self) -> Vec<FeedbackHazard> {
        let mut hazards = Vec::new();
        for (source, rule) in self.rules.iter().enumerate() {
            let response = rule.response.to_lowercase();
            for (fires, other) in self.rules.iter().enumerate() {
                if other.is_armed() && response.contains(&other.trigger.to_lowercase()) {
                    hazards.push(FeedbackHazard { source, fires });
                }
            }
        }
        hazards
    }
}

impl<'a> IntoIterator for &'a TriggerSet {
    type Item = &'a TriggerRule;
    type IntoIter = std::slice::Iter<'a, TriggerRule>;

    fn into_iter(self) -> Self::IntoIter {
        self.rules.iter()
    }
}

/// Handle over the persisted trigger set
#[derive(Debug, Clone)]
pub struct TriggerStore<S: KeyValueStore> {
    backend: S,
}

impl<S: KeyValueStore> TriggerStore<S> {
    pub fn new(backend: S) -> Self {
        Self { backend }
    }

    #[cfg(test)]
    pub fn backend(&self) -> &S {
        &self.backend
    }

    /// The underlying store, for other state kept alongside the triggers
    pub fn backend_mut(&mut self) -> &mut S {
        &mut self.backend
    }

    /// Read the persisted set; absent, unreadable or malformed data is an empty set
    pub fn load(&self) -> TriggerSet {
        match storage::load_json::<Vec<TriggerRule>>(&self.backend, TRIGGERS_KEY) {
            Ok(Some(rules)) => TriggerSet::from_rules(rules),
            Ok(None) => TriggerSet::new(),
            Err(e) => {
                tracing::warn!("Failed to read triggers, starting empty: {:#}", e);
                TriggerSet::new()
            }
        }
    }

    /// Overwrite the persisted set in one write
    pub fn save(&mut self, set: &TriggerSet) -> Result<()> {
        for hazard in set.feedback_hazards() {
            tracing::warn!(
                "Trigger {} responds with text that fires trigger {}",
                hazard.source + 1,
                hazard.fires + 1
            );
        }
        storage::save_json(&mut self.backend, TRIGGERS_KEY, set)?;
        tracing::debug!("Saved {} trigger(s)", set.len());
        Ok(())
    }

    /// Append a rule; a full set is left untouched and reported as `Full`
    pub fn add(&mut self, rule: TriggerRule) -> Result<AddOutcome> {
        let mut set = self.load();
        let outcome = set.push(rule);
        match outcome {
            AddOutcome::Added { index } => {
                self.save(&set)?;
                tracing::info!("Added trigger {}", index + 1);
            }
            AddOutcome::Full => {
                tracing::info!("{}", FULL_NOTICE);
            }
        }
        Ok(outcome)
    }

    /// Delete the rule at `index`; returns false (and writes nothing) if out of range
    pub fn remove_at(&mut self, index: usize) -> Result<bool> {
        let mut set = self.load();
        match set.remove(index) {
            Some(removed) => {
                self.save(&set)?;
                tracing::info!("Removed trigger {} ('{}')", index + 1, removed.trigger);
                Ok(true)
            }
            None => {
                tracing::debug!("Ignoring remove of trigger {}: out of range", index + 1);
                Ok(false)
            }
        }
    }

    /// Edit one field in place and persist; returns false if out of range
    pub fn update_field(&mut self, index: usize, field: TriggerField, value: &str) -> Result<bool> {
        let mut set = self.load();
        if !set.set_field(index, field, value) {
            tracing::debug!(
                "Ignoring {} update of trigger {}: out of range",
                field.name(),
                index + 1
            );
            return Ok(false);
        }
        self.save(&set)?;
        Ok(true)
    }
}
