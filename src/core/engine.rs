//! Inbound message handling: reload triggers, match, send responses.

use crate::core::matcher::TriggerMatcher;
use crate::core::triggers::TriggerStore;
use crate::storage::KeyValueStore;
use anyhow::Result;

/// Outbound side of the transport
pub trait MessageSink {
    /// Send one automated response
    fn send_custom_message(&mut self, message: &str) -> Result<()>;
}

/// Collects responses instead of sending them
impl MessageSink for Vec<String> {
    fn send_custom_message(&mut self, message: &str) -> Result<()> {
        self.push(message.to_string());
        Ok(())
    }
}

/// Runs incoming chat lines against the persisted trigger set
pub struct TriggerEngine<S: KeyValueStore> {
    store: TriggerStore<S>,
    /// Recompiled whenever the stored set differs from the one it was built from
    matcher: Option<TriggerMatcher>,
}

impl<S: KeyValueStore> TriggerEngine<S> {
    pub fn new(store: TriggerStore<S>) -> Self {
        Self {
            store,
            matcher: None,
        }
    }

    pub fn store_mut(&mut self) -> &mut TriggerStore<S> {
        &mut self.store
    }

    /// Check one incoming message; each matching rule sends its response.
    ///
    /// Returns the number of responses sent. Responses are not re-checked,
    /// so loops only happen if the far end echoes them back.
    pub fn check_triggers(&mut self, message: &str, sink: &mut dyn MessageSink) -> Result<usize> {
        let set = self.store.load();

        let stale = self
            .matcher
            .as_ref()
            .map_or(true, |matcher| matcher.set() != &set);
        if stale {
            self.matcher = Some(TriggerMatcher::new(set));
        }

        let Some(matcher) = self.matcher.as_ref() else {
            return Ok(0);
        };

        let mut sent = 0;
        for response in matcher.check(message) {
            tracing::debug!("Trigger matched, sending '{}'", response);
            sink.send_custom_message(response)?;
            sent += 1;
        }
        Ok(sent)
    }
}
