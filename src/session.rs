//! Live session loop
//!
//! Takes inbound chunks from the transport, assembles them into lines and
//! runs every line through the trigger engine. Chat lines are also filed in
//! the chatlog. Logon prompts and keep-alive are handled here too, when the
//! profile turns them on.

use crate::config::Config;
use crate::core::logon::{self, LogonPrompt, LOGON_REPLY_DELAY};
use crate::core::{ChatRecorder, LineBuffer, TriggerEngine};
use crate::storage::KeyValueStore;
use crate::transport::{ChannelSink, ServerMessage, LINE_ENDING};
use anyhow::Result;
use std::time::Duration;
use tokio::sync::mpsc;

pub struct Session<S: KeyValueStore> {
    engine: TriggerEngine<S>,
    lines: LineBuffer,
    chat: ChatRecorder,
    sink: ChannelSink,
    config: Config,
    logon_delay: Duration,
}

impl<S: KeyValueStore> Session<S> {
    pub fn new(engine: TriggerEngine<S>, config: Config, sink: ChannelSink) -> Result<Self> {
        Ok(Self {
            engine,
            lines: LineBuffer::new()?,
            chat: ChatRecorder::new()?,
            sink,
            config,
            logon_delay: LOGON_REPLY_DELAY,
        })
    }

    #[cfg(test)]
    pub fn with_logon_delay(mut self, delay: Duration) -> Self {
        self.logon_delay = delay;
        self
    }

    /// Process one inbound chunk; returns how many trigger responses went out
    pub fn handle_chunk(&mut self, chunk: &str) -> Result<usize> {
        let mut sent = 0;
        for line in self.lines.push(chunk) {
            sent += self.handle_line(&line)?;
        }
        Ok(sent)
    }

    fn handle_line(&mut self, line: &str) -> Result<usize> {
        let clean = self.lines.strip_ansi(line).into_owned();

        let sent = self.engine.check_triggers(&clean, &mut self.sink)?;

        let store = self.engine.store_mut().backend_mut();
        if let Some(message) = self.chat.record(store, &clean, chrono::Local::now())? {
            tracing::debug!("Logged message from {}: {}", message.sender, message.body);
        }

        if self.config.settings.answers_logon_prompts() {
            if let Some(prompt) = logon::detect(&clean) {
                self.answer_prompt(prompt);
            }
        }

        Ok(sent)
    }

    /// Send the matching credential after a short pause
    fn answer_prompt(&self, prompt: LogonPrompt) {
        let credential = match prompt {
            LogonPrompt::Username => self.config.credentials.username.clone(),
            LogonPrompt::Password => self.config.credentials.password.clone(),
        };

        let Some(credential) = credential else {
            tracing::warn!("Logon prompt {:?} seen but no credential is saved", prompt);
            return;
        };

        tracing::info!("Answering {:?} prompt", prompt);
        let sink = self.sink.clone();
        let delay = self.logon_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = sink.send_raw(format!("{}{}", credential, LINE_ENDING)) {
                tracing::warn!("Failed to send logon reply: {}", e);
            }
        });
    }

    /// Run until the transport disconnects
    pub async fn run(mut self, mut server_rx: mpsc::UnboundedReceiver<ServerMessage>) -> Result<()> {
        let keep_alive = self.config.settings.keep_alive;
        let period = Duration::from_secs(self.config.settings.keep_alive_secs.max(1));
        let mut ticker = tokio::time::interval(period);
        // First tick fires immediately; skip it
        ticker.tick().await;

        loop {
            tokio::select! {
                message = server_rx.recv() => match message {
                    Some(ServerMessage::Chunk(chunk)) => {
                        let sent = self.handle_chunk(&chunk)?;
                        if sent > 0 {
                            tracing::debug!("Sent {} trigger response(s)", sent);
                        }
                    }
                    Some(ServerMessage::Disconnected) | None => break,
                },
                _ = ticker.tick(), if keep_alive => {
                    tracing::debug!("Keep-alive");
                    self.sink.send_raw(LINE_ENDING.to_string())?;
                }
            }
        }

        // A final unterminated line still counts as a message
        if let Some(rest) = self.lines.flush() {
            self.handle_line(&rest)?;
        }

        tracing::info!("Session ended");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Chatlog, LinkHistory, TriggerRule, TriggerStore};
    use crate::storage::MemoryStore;
    use crate::transport::StreamConnection;

    fn session(
        rules: &[(&str, &str)],
        config: Config,
    ) -> (Session<MemoryStore>, mpsc::UnboundedReceiver<String>) {
        let mut store = TriggerStore::new(MemoryStore::new());
        for (t, r) in rules {
            store.add(TriggerRule::new(*t, *r)).unwrap();
        }
        let (tx, rx) = mpsc::unbounded_channel();
        let session = Session::new(TriggerEngine::new(store), config, ChannelSink::new(tx))
            .unwrap()
            .with_logon_delay(Duration::ZERO);
        (session, rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<String>) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(text) = rx.try_recv() {
            out.push(text);
        }
        out
    }

    #[test]
    fn test_split_chunks_fire_once_line_completes() {
        let (mut session, mut rx) = session(&[("hello", "Hi!")], Config::default());
        assert_eq!(session.handle_chunk("From Bob: hel").unwrap(), 0);
        assert_eq!(session.handle_chunk("lo all\r\n").unwrap(), 1);
        assert_eq!(drain(&mut rx), vec!["Hi!\r\n"]);
    }

    #[test]
    fn test_color_codes_do_not_hide_triggers() {
        let (mut session, mut rx) = session(&[("hello", "Hi!")], Config::default());
        session.handle_chunk("\x1b[1mhel\x1b[0mlo\n").unwrap();
        assert_eq!(drain(&mut rx), vec!["Hi!\r\n"]);
    }

    #[test]
    fn test_multiple_rules_fire_in_order() {
        let (mut session, mut rx) = session(&[("a", "R1"), ("b", "R2")], Config::default());
        session.handle_chunk("ab\n").unwrap();
        assert_eq!(drain(&mut rx), vec!["R1\r\n", "R2\r\n"]);
    }

    #[tokio::test]
    async fn test_logon_prompt_answered_when_enabled() {
        let mut config = Config::default();
        config.settings.auto_login = true;
        config.credentials.username = Some("guest".to_string());

        let (mut session, mut rx) = session(&[], config);
        session
            .handle_chunk("Otherwise type \"new\": \r\n")
            .unwrap();

        let reply = rx.recv().await.unwrap();
        assert_eq!(reply, "guest\r\n");
    }

    #[tokio::test]
    async fn test_logon_prompt_ignored_when_disabled() {
        let mut config = Config::default();
        config.credentials.password = Some("secret".to_string());

        let (mut session, mut rx) = session(&[], config);
        session.handle_chunk("Enter your password: \n").unwrap();
        tokio::task::yield_now().await;
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_chat_lines_go_to_chatlog() {
        let (mut session, _rx) = session(&[], Config::default());
        session
            .handle_chunk("\x1b[32mFrom Bob\x1b[0m: look https://example.com\r\nYou are in the lobby\r\n")
            .unwrap();

        let store = session.engine.store_mut().backend_mut();
        let chatlog = Chatlog::load(store);
        assert_eq!(chatlog.senders().collect::<Vec<_>>(), vec!["Bob"]);
        assert!(chatlog.messages("Bob")[0].ends_with("] From Bob: look https://example.com"));

        let links = LinkHistory::load(store);
        assert_eq!(links.links().len(), 1);
        assert_eq!(links.links()[0].url, "https://example.com");
        assert_eq!(links.links()[0].sender, "Bob");
    }

    #[tokio::test(start_paused = true)]
    async fn test_keep_alive_sends_blank_line() {
        let mut config = Config::default();
        config.settings.keep_alive = true;
        config.settings.keep_alive_secs = 30;

        let (session, mut rx) = session(&[], config);
        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let start = tokio::time::Instant::now();
        let running = tokio::spawn(session.run(server_rx));

        assert_eq!(rx.recv().await.unwrap(), "\r\n");
        assert!(start.elapsed() >= Duration::from_secs(30));

        server_tx.send(ServerMessage::Disconnected).unwrap();
        running.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_keep_alive_off_sends_nothing() {
        let (session, mut rx) = session(&[], Config::default());
        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let running = tokio::spawn(session.run(server_rx));

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert!(rx.try_recv().is_err());

        server_tx.send(ServerMessage::Disconnected).unwrap();
        running.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_trigger_split_mid_character_still_fires() {
        use tokio::io::AsyncReadExt;

        let (session, mut rx) = session(&[("café", "Bonjour!")], Config::default());
        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (_command_tx, command_rx) = mpsc::unbounded_channel::<String>();

        let inbound = (&b"caf\xc3"[..]).chain(&b"\xa9\n"[..]);
        let connection = tokio::spawn(StreamConnection::start(
            inbound,
            tokio::io::sink(),
            server_tx,
            command_rx,
        ));

        session.run(server_rx).await.unwrap();
        assert_eq!(drain(&mut rx), vec!["Bonjour!\r\n"]);
        connection.abort();
    }

    #[tokio::test]
    async fn test_run_flushes_final_line() {
        let (session, mut rx) = session(&[("bye", "Later!")], Config::default());
        let (server_tx, server_rx) = mpsc::unbounded_channel();
        server_tx
            .send(ServerMessage::Chunk("ok\ngood".to_string()))
            .unwrap();
        server_tx.send(ServerMessage::Chunk("bye".to_string())).unwrap();
        server_tx.send(ServerMessage::Disconnected).unwrap();

        session.run(server_rx).await.unwrap();
        assert_eq!(drain(&mut rx), vec!["Later!\r\n"]);
    }
}
