//! Case-insensitive trigger matching
//!
//! A rule fires when its non-empty trigger occurs anywhere in the lowercased
//! message. Every firing rule yields its response, in stored order.

use crate::core::triggers::{TriggerRule, TriggerSet};
use aho_corasick::{AhoCorasick, AhoCorasickBuilder, MatchKind};
use std::collections::HashMap;

/// Lazily yield the responses of every rule that matches `message`
pub fn check<'a>(message: &str, set: &'a TriggerSet) -> Matches<'a> {
    Matches {
        lowered: message.to_lowercase(),
        rules: set.iter(),
    }
}

/// Single-pass iterator over matching responses
pub struct Matches<'a> {
    lowered: String,
    rules: std::slice::Iter<'a, TriggerRule>,
}

impl<'a> Iterator for Matches<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        let lowered = &self.lowered;
        self.rules
            .by_ref()
            .find(|rule| rule.is_armed() && lowered.contains(&rule.trigger.to_lowercase()))
            .map(|rule| rule.response.as_str())
    }
}

/// Trigger set compiled into one Aho-Corasick automaton.
///
/// Yields the same responses as [`check`] for the set it was built from.
pub struct TriggerMatcher {
    set: TriggerSet,
    /// None if the automaton failed to build; falls back to `check`
    automaton: Option<AhoCorasick>,
    /// Automaton pattern id -> indices of rules sharing that lowercased trigger
    pattern_rules: Vec<Vec<usize>>,
}

impl TriggerMatcher {
    pub fn new(set: TriggerSet) -> Self {
        let mut patterns: Vec<String> = Vec::new();
        let mut pattern_rules: Vec<Vec<usize>> = Vec::new();
        let mut seen: HashMap<String, usize> = HashMap::new();

        for (index, rule) in set.iter().enumerate() {
            if !rule.is_armed() {
                continue;
            }
            let lowered = rule.trigger.to_lowercase();
            match seen.get(&lowered) {
                Some(&pattern) => pattern_rules[pattern].push(index),
                None => {
                    seen.insert(lowered.clone(), patterns.len());
                    patterns.push(lowered);
                    pattern_rules.push(vec![index]);
                }
            }
        }

        let automaton = if patterns.is_empty() {
            None
        } else {
            match AhoCorasickBuilder::new()
                .match_kind(MatchKind::Standard)
                .build(&patterns)
            {
                Ok(ac) => Some(ac),
                Err(e) => {
                    tracing::warn!("Failed to build trigger automaton: {}", e);
                    None
                }
            }
        };

        tracing::debug!(
            "Compiled {} trigger pattern(s) from {} rule(s)",
            patterns.len(),
            set.len()
        );

        Self {
            set,
            automaton,
            pattern_rules,
        }
    }

    /// The set this matcher was compiled from
    pub fn set(&self) -> &TriggerSet {
        &self.set
    }

    /// Responses for every rule matching `message`, in stored order
    pub fn check<'a>(&'a self, message: &str) -> impl Iterator<Item = &'a str> + 'a {
        let lowered = message.to_lowercase();
        let mut fired = vec![false; self.set.len()];

        match &self.automaton {
            Some(ac) => {
                for found in ac.find_overlapping_iter(&lowered) {
                    for &index in &self.pattern_rules[found.pattern().as_usize()] {
                        fired[index] = true;
                    }
                }
            }
            None => {
                for (index, rule) in self.set.iter().enumerate() {
                    fired[index] =
                        rule.is_armed() && lowered.contains(&rule.trigger.to_lowercase());
                }
            }
        }

        self.set
            .iter()
            .zip(fired)
            .filter_map(|(rule, hit)| hit.then_some(rule.response.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(rules: &[(&str, &str)]) -> TriggerSet {
        TriggerSet::from_rules(
            rules
                .iter()
                .map(|(t, r)| TriggerRule::new(*t, *r))
                .collect(),
        )
    }

    fn both(message: &str, set: &TriggerSet) -> Vec<String> {
        let plain: Vec<String> = check(message, set).map(str::to_string).collect();
        let matcher = TriggerMatcher::new(set.clone());
        let compiled: Vec<String> = matcher.check(message).map(str::to_string).collect();
        assert_eq!(plain, compiled, "matchers disagree on {:?}", message);
        plain
    }

    #[test]
    fn test_case_insensitive_match() {
        let rules = set(&[("hello", "Hi!")]);
        assert_eq!(both("Hello there", &rules), vec!["Hi!"]);
    }

    #[test]
    fn test_uppercase_trigger_matches_lowercase_message() {
        let rules = set(&[("HELLO", "Hi!")]);
        assert_eq!(both("oh hello", &rules), vec!["Hi!"]);
    }

    #[test]
    fn test_no_match() {
        let rules = set(&[("hello", "Hi!")]);
        assert!(both("no match here", &rules).is_empty());
    }

    #[test]
    fn test_empty_trigger_never_matches() {
        let rules = set(&[("", "X")]);
        assert!(both("anything at all", &rules).is_empty());
        assert!(both("", &rules).is_empty());
    }

    #[test]
    fn test_all_matches_fire_in_stored_order() {
        let rules = set(&[("a", "R1"), ("b", "R2")]);
        assert_eq!(both("ab", &rules), vec!["R1", "R2"]);

        // Order follows the set, not the message
        assert_eq!(both("ba", &rules), vec!["R1", "R2"]);
    }

    #[test]
    fn test_duplicate_triggers_both_fire() {
        let rules = set(&[("hi", "one"), ("HI", "two"), ("bye", "three")]);
        assert_eq!(both("hi all", &rules), vec!["one", "two"]);
    }

    #[test]
    fn test_overlapping_triggers() {
        let rules = set(&[("abc", "long"), ("b", "short"), ("bcd", "tail")]);
        assert_eq!(both("xabcdx", &rules), vec!["long", "short", "tail"]);
    }

    #[test]
    fn test_repeated_occurrence_fires_once() {
        let rules = set(&[("ha", "lol")]);
        assert_eq!(both("hahaha", &rules), vec!["lol"]);
    }

    #[test]
    fn test_non_ascii_case_folding() {
        let rules = set(&[("ÉTÉ", "summer")]);
        assert_eq!(both("L'été arrive", &rules), vec!["summer"]);
    }

    #[test]
    fn test_check_is_lazy() {
        let rules = set(&[("a", "R1"), ("b", "R2")]);
        let mut matches = check("ab", &rules);
        assert_eq!(matches.next(), Some("R1"));
        assert_eq!(matches.next(), Some("R2"));
        assert_eq!(matches.next(), None);
    }

    #[test]
    fn test_matcher_keeps_set() {
        let rules = set(&[("a", "R1")]);
        let matcher = TriggerMatcher::new(rules.clone());
        assert_eq!(matcher.set(), &rules);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn arb_set(trigger: &'static str) -> impl Strategy<Value = TriggerSet> {
        prop::collection::vec((trigger, "[a-z]{1,4}"), 0..=10).prop_map(|rules| {
            TriggerSet::from_rules(
                rules
                    .into_iter()
                    .map(|(t, r)| TriggerRule::new(t, r))
                    .collect(),
            )
        })
    }

    fn agree(message: &str, set: TriggerSet) -> Result<(), TestCaseError> {
        let plain: Vec<String> = check(message, &set).map(str::to_string).collect();
        let matcher = TriggerMatcher::new(set);
        let compiled: Vec<String> = matcher.check(message).map(str::to_string).collect();
        prop_assert_eq!(plain, compiled);
        Ok(())
    }

    proptest! {
        // Small alphabet so triggers actually occur and overlap
        #[test]
        fn matchers_agree_on_dense_text(set in arb_set("[abAB]{0,3}"), message in "[abAB ]{0,24}") {
            agree(&message, set)?;
        }

        #[test]
        fn matchers_agree_on_any_text(set in arb_set("\\PC{0,4}"), message in any::<String>()) {
            agree(&message, set)?;
        }

        #[test]
        fn matchers_agree_with_case_folding(set in arb_set("[éÉßİiI]{1,2}"), message in "[éÉßİiIsS ]{0,16}") {
            agree(&message, set)?;
        }
    }
}
