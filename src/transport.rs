use crate::core::MessageSink;
use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// Line terminator the BBS expects on everything we send
pub const LINE_ENDING: &str = "\r\n";

#[derive(Debug, Clone)]
pub enum ServerMessage {
    /// Raw inbound data; may hold several lines or part of one
    Chunk(String),
    Disconnected,
}

/// Pumps an inbound byte stream into `ServerMessage`s and queued outbound
/// text onto a writer. The session only ever sees the two channels.
pub struct StreamConnection;

impl StreamConnection {
    pub async fn start<R, W>(
        reader: R,
        mut writer: W,
        server_tx: mpsc::UnboundedSender<ServerMessage>,
        mut command_rx: mpsc::UnboundedReceiver<String>,
    ) -> Result<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin,
    {
        info!("Session stream opened");

        // Spawn reader task
        let read_handle = tokio::spawn(async move {
            let mut reader = reader;
            let mut buf = vec![0u8; 4096];
            // Bytes of a character cut off by the previous read
            let mut carry: Vec<u8> = Vec::new();
            loop {
                match reader.read(&mut buf).await {
                    Ok(0) => {
                        info!("Inbound stream closed");
                        if !carry.is_empty() {
                            let rest = String::from_utf8_lossy(&carry).into_owned();
                            let _ = server_tx.send(ServerMessage::Chunk(rest));
                        }
                        let _ = server_tx.send(ServerMessage::Disconnected);
                        break;
                    }
                    Ok(n) => {
                        carry.extend_from_slice(&buf[..n]);
                        let chunk = decode_complete(&mut carry);
                        if chunk.is_empty() {
                            continue;
                        }
                        if server_tx.send(ServerMessage::Chunk(chunk)).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        error!("Error reading inbound stream: {}", e);
                        let _ = server_tx.send(ServerMessage::Disconnected);
                        break;
                    }
                }
            }
        });

        // Writer runs here until every sender is dropped
        while let Some(text) = command_rx.recv().await {
            debug!("Sending: {:?}", text);
            writer
                .write_all(text.as_bytes())
                .await
                .context("Failed to write outbound text")?;
            writer.flush().await.context("Failed to flush outbound text")?;
        }

        // Wait for reader to finish
        let _ = read_handle.await;
        Ok(())
    }
}

/// Decode `bytes` up to the last complete character and leave an unfinished
/// multi-byte sequence at the end in place for the next read.
fn decode_complete(bytes: &mut Vec<u8>) -> String {
    let keep = incomplete_tail_len(bytes);
    let complete = bytes.len() - keep;
    let text = String::from_utf8_lossy(&bytes[..complete]).into_owned();
    bytes.drain(..complete);
    text
}

/// Length of a truncated UTF-8 sequence at the end of `bytes`, or 0
fn incomplete_tail_len(bytes: &[u8]) -> usize {
    // A sequence is at most 4 bytes, so its lead byte is within the last 3
    for back in 1..=bytes.len().min(3) {
        let byte = bytes[bytes.len() - back];
        if byte & 0xC0 == 0x80 {
            continue;
        }
        let needed = match byte {
            0xC0..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF7 => 4,
            _ => 1,
        };
        return if needed > back { back } else { 0 };
    }
    0
}

/// Queues trigger responses for the writer, one line each
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<String>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::UnboundedSender<String>) -> Self {
        Self { tx }
    }

    /// Queue raw text (already terminated)
    pub fn send_raw(&self, text: String) -> Result<()> {
        self.tx
            .send(text)
            .map_err(|_| anyhow::anyhow!("Outbound stream is closed"))
    }
}

impl MessageSink for ChannelSink {
    fn send_custom_message(&mut self, message: &str) -> Result<()> {
        self.send_raw(format!("{}{}", message, LINE_ENDING))
    }
}
