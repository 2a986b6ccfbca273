//! Per-sender chat history and the links seen in it.
//!
//! Every `From <user>: <text>` line is timestamped and appended to that
//! sender's history under [`CHATLOG_KEY`]. URLs in those lines are kept in a
//! separate list under [`HYPERLINKS_KEY`].

use crate::storage::{self, KeyValueStore};
use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use regex::{Regex, RegexSet};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Key the chatlog is persisted under
pub const CHATLOG_KEY: &str = "chatlog";

/// Key the link history is persisted under
pub const HYPERLINKS_KEY: &str = "hyperlinks";

/// Oldest messages are dropped once the serialized chatlog passes this (1 GiB)
pub const CHATLOG_MAX_BYTES: usize = 1024 * 1024 * 1024;

const TIMESTAMP_FORMAT: &str = "[%Y-%m-%d %H:%M:%S]";

/// Banner, prompt and command lines that never go in the chatlog
const SKIP_PATTERNS: &[&str] = &[
    r"You are in the",
    r"Topic:",
    r"Just press",
    r"are here with you",
    r"^\s*$",
    r"^\s*:.*$",
    r"^\s*\(.*\)\s*$",
];

/// `From <user>[@host][ (note)]: <text>`
const MESSAGE_PATTERN: &str = r"^From\s+(\S+?)(?:@[\w.]+)?(?:\s+\([^)]+\))?\s*:\s*(.+)$";

const URL_PATTERN: &str = r"https?://\S+";

/// A chat line attributed to a sender
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub sender: String,
    pub body: String,
}

/// Messages grouped by sender, oldest first
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Chatlog {
    by_sender: BTreeMap<String, Vec<String>>,
}

impl Chatlog {
    /// Load from `store`; missing or malformed data is an empty log
    pub fn load(store: &dyn KeyValueStore) -> Self {
        match storage::load_json(store, CHATLOG_KEY) {
            Ok(Some(chatlog)) => chatlog,
            Ok(None) => Self::default(),
            Err(e) => {
                tracing::warn!("Failed to read chatlog: {:#}", e);
                Self::default()
            }
        }
    }

    pub fn save(&self, store: &mut dyn KeyValueStore) -> Result<()> {
        storage::save_json(store, CHATLOG_KEY, self)
    }

    pub fn append(&mut self, sender: &str, entry: String) {
        self.by_sender.entry(sender.to_string()).or_default().push(entry);
    }

    pub fn senders(&self) -> impl Iterator<Item = &str> {
        self.by_sender.keys().map(String::as_str)
    }

    pub fn messages(&self, sender: &str) -> &[String] {
        self.by_sender.get(sender).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Empty one sender's history; the sender stays listed
    pub fn clear_sender(&mut self, sender: &str) -> bool {
        match self.by_sender.get_mut(sender) {
            Some(messages) if !messages.is_empty() => {
                messages.clear();
                true
            }
            _ => false,
        }
    }

    /// Drop oldest messages, one sender at a time in turn, until the
    /// serialized log fits in `max_bytes`. Returns how many were dropped.
    pub fn trim_to(&mut self, max_bytes: usize) -> usize {
        let mut size = self.serialized_len();
        let mut dropped = 0;

        while size > max_bytes {
            let mut progressed = false;
            for messages in self.by_sender.values_mut() {
                if messages.is_empty() {
                    continue;
                }
                let oldest = messages.remove(0);
                // The entry and, if others remain, its separating comma
                let freed = json_len(&oldest) + usize::from(!messages.is_empty());
                size = size.saturating_sub(freed);
                dropped += 1;
                progressed = true;
                if size <= max_bytes {
                    break;
                }
            }
            if !progressed {
                break;
            }
        }
        dropped
    }

    fn serialized_len(&self) -> usize {
        serde_json::to_string(self).map(|s| s.len()).unwrap_or(0)
    }
}

fn json_len(text: &str) -> usize {
    serde_json::to_string(text)
        .map(|s| s.len())
        .unwrap_or(text.len() + 2)
}

/// One stored link
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hyperlink {
    pub url: String,
    #[serde(default = "unknown_sender")]
    pub sender: String,
    #[serde(default)]
    pub timestamp: String,
}

fn unknown_sender() -> String {
    "Unknown".to_string()
}

/// Links seen in chat, in arrival order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LinkHistory {
    links: Vec<Hyperlink>,
}

impl LinkHistory {
    pub fn load(store: &dyn KeyValueStore) -> Self {
        match storage::load_json(store, HYPERLINKS_KEY) {
            Ok(Some(history)) => history,
            Ok(None) => Self::default(),
            Err(e) => {
                tracing::warn!("Failed to read link history: {:#}", e);
                Self::default()
            }
        }
    }

    pub fn save(&self, store: &mut dyn KeyValueStore) -> Result<()> {
        storage::save_json(store, HYPERLINKS_KEY, self)
    }

    pub fn push(&mut self, link: Hyperlink) {
        self.links.push(link);
    }

    pub fn links(&self) -> &[Hyperlink] {
        &self.links
    }

    pub fn clear(&mut self) {
        self.links.clear();
    }
}

/// Recognises chat lines and files them into the chatlog and link history
pub struct ChatRecorder {
    skip: RegexSet,
    message: Regex,
    url: Regex,
    max_bytes: usize,
}

impl ChatRecorder {
    pub fn new() -> Result<Self> {
        let skip = RegexSet::new(SKIP_PATTERNS.iter().map(|p| format!("(?i){}", p)))
            .context("Failed to compile chatlog skip patterns")?;
        Ok(Self {
            skip,
            message: Regex::new(MESSAGE_PATTERN).context("Failed to compile message pattern")?,
            url: Regex::new(URL_PATTERN).context("Failed to compile URL pattern")?,
            max_bytes: CHATLOG_MAX_BYTES,
        })
    }

    #[cfg(test)]
    fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Sender and text of a chat line, if it is one worth logging
    pub fn parse(&self, line: &str) -> Option<ChatMessage> {
        if self.skip.is_match(line) {
            return None;
        }
        let caps = self.message.captures(line)?;
        Some(ChatMessage {
            sender: caps[1].to_string(),
            body: caps[2].to_string(),
        })
    }

    pub fn urls<'a>(&'a self, text: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.url.find_iter(text).map(|m| m.as_str())
    }

    /// Log `line` (already stripped of color codes) if it is a chat message.
    ///
    /// The stored entry is `[YYYY-MM-DD HH:MM:SS] <line>`; any URLs in it go
    /// into the link history.
    pub fn record(
        &self,
        store: &mut dyn KeyValueStore,
        line: &str,
        now: DateTime<Local>,
    ) -> Result<Option<ChatMessage>> {
        let Some(message) = self.parse(line) else {
            return Ok(None);
        };

        let stamp = now.format(TIMESTAMP_FORMAT).to_string();
        let entry = format!("{} {}", stamp, line);

        let mut chatlog = Chatlog::load(store);
        chatlog.append(&message.sender, entry.clone());
        let dropped = chatlog.trim_to(self.max_bytes);
        if dropped > 0 {
            tracing::warn!("Chatlog over size limit, dropped {} old message(s)", dropped);
        }
        chatlog.save(store)?;

        let urls: Vec<&str> = self.urls(&entry).collect();
        if !urls.is_empty() {
            let mut history = LinkHistory::load(store);
            for url in urls {
                history.push(Hyperlink {
                    url: url.to_string(),
                    sender: message.sender.clone(),
                    timestamp: stamp.clone(),
                });
            }
            history.save(store)?;
            tracing::debug!("Stored link(s) from {}", message.sender);
        }

        Ok(Some(message))
    }
}
