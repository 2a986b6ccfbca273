//! Reassembles raw inbound chunks into complete lines.

use anyhow::{Context, Result};
use regex::Regex;

/// SGR color/attribute sequences (`ESC [ ... m`)
const ANSI_SGR: &str = r"\x1b\[[0-9;]*m";

/// Accumulates partial data until a line ending arrives
pub struct LineBuffer {
    partial: String,
    ansi: Regex,
}

impl LineBuffer {
    pub fn new() -> Result<Self> {
        Ok(Self {
            partial: String::new(),
            ansi: Regex::new(ANSI_SGR).context("Failed to compile ANSI pattern")?,
        })
    }

    /// Feed a chunk and return every line it completed.
    ///
    /// `\r\n` and lone `\r` count as line endings. Text after the last ending
    /// is kept for the next chunk, and so is a trailing `\r` in case its `\n`
    /// arrives next.
    pub fn push(&mut self, chunk: &str) -> Vec<String> {
        self.partial.push_str(chunk);

        let held_cr = self.partial.ends_with('\r');
        let body = if held_cr {
            &self.partial[..self.partial.len() - 1]
        } else {
            self.partial.as_str()
        };
        let normalized = body.replace("\r\n", "\n").replace('\r', "\n");

        let mut lines: Vec<String> = normalized.split('\n').map(str::to_string).collect();
        let mut rest = lines.pop().unwrap_or_default();
        if held_cr {
            rest.push('\r');
        }
        self.partial = rest;
        lines
    }

    /// Hand back the unfinished line, e.g. when the stream closes
    pub fn flush(&mut self) -> Option<String> {
        let mut rest = std::mem::take(&mut self.partial);
        if rest.ends_with('\r') {
            rest.pop();
        }
        if rest.is_empty() {
            None
        } else {
            Some(rest)
        }
    }

    /// Remove color codes, leaving the visible text
    pub fn strip_ansi<'a>(&self, line: &'a str) -> std::borrow::Cow<'a, str> {
        self.ansi.replace_all(line, "")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_splits_complete_lines() {
        let mut buffer = LineBuffer::new().unwrap();
        assert_eq!(buffer.push("one\r\ntwo\nthree\rfour\n"), vec!["one", "two", "three", "four"]);
        assert_eq!(buffer.flush(), None);
    }

    #[test]
    fn test_carries_partial_line() {
        let mut buffer = LineBuffer::new().unwrap();
        assert!(buffer.push("Hel").is_empty());
        assert_eq!(buffer.push("lo there\nnext"), vec!["Hello there"]);
        assert_eq!(buffer.flush().as_deref(), Some("next"));
        assert_eq!(buffer.flush(), None);
    }

    #[test]
    fn test_crlf_split_across_chunks_is_one_ending() {
        let mut buffer = LineBuffer::new().unwrap();
        assert!(buffer.push("hello\r").is_empty());
        assert_eq!(buffer.push("\nworld\r"), vec!["hello"]);
        assert_eq!(buffer.push("\r\n"), vec!["world", ""]);
    }

    #[test]
    fn test_lone_cr_completes_on_next_chunk_or_flush() {
        let mut buffer = LineBuffer::new().unwrap();
        assert!(buffer.push("one\r").is_empty());
        assert_eq!(buffer.push("two\r"), vec!["one"]);
        assert_eq!(buffer.flush().as_deref(), Some("two"));
    }

    #[test]
    fn test_keeps_blank_lines() {
        let mut buffer = LineBuffer::new().unwrap();
        assert_eq!(buffer.push("a\n\nb\n"), vec!["a", "", "b"]);
    }

    #[test]
    fn test_strip_ansi() {
        let buffer = LineBuffer::new().unwrap();
        assert_eq!(
            buffer.strip_ansi("\x1b[1;31mFrom Bob\x1b[0m: hi"),
            "From Bob: hi"
        );
        assert_eq!(buffer.strip_ansi("plain"), "plain");
    }
}
