//! CLI channel — JSON-lines events on stdin, outbound actions on stdout.
//!
//! Each stdin line is one [`InboundEvent`]. Outbound sends are printed as
//! JSON lines and answered with fresh ids, which makes the whole relay
//! drivable from a shell for local testing.

use std::pin::Pin;

use async_trait::async_trait;
use futures::{stream, Stream};
use serde_json::json;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::channels::transport::Transport;
use crate::error::ChannelError;
use crate::pipeline::types::{Document, InboundEvent};

/// Stream of events produced by a channel.
pub type EventStream = Pin<Box<dyn Stream<Item = InboundEvent> + Send>>;

/// Stdin/stdout channel.
#[derive(Debug, Default)]
pub struct CliChannel;

impl CliChannel {
    pub fn new() -> Self {
        Self
    }

    /// Start reading stdin. The stream ends at EOF.
    pub fn start(&self) -> EventStream {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

        tokio::spawn(async move {
            let stdin = tokio::io::stdin();
            let reader = BufReader::new(stdin);
            let mut lines = reader.lines();

            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        match parse_event(line) {
                            Ok(event) => {
                                if tx.send(event).is_err() {
                                    break;
                                }
                            }
                            Err(e) => tracing::warn!(error = %e, "Skipping malformed input line"),
                        }
                    }
                    Ok(None) => break, // EOF
                    Err(e) => {
                        tracing::error!("Error reading stdin: {}", e);
                        break;
                    }
                }
            }
        });

        let stream = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        });

        Box::pin(stream)
    }

    fn emit(&self, mut action: serde_json::Value) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        action["id"] = json!(id);
        println!("{action}");
        id
    }
}

/// Parse one input line into an event.
pub fn parse_event(line: &str) -> Result<InboundEvent, ChannelError> {
    serde_json::from_str(line).map_err(|e| ChannelError::InvalidMessage(e.to_string()))
}

#[async_trait]
impl Transport for CliChannel {
    fn name(&self) -> &str {
        "cli"
    }

    async fn send_text(&self, chat_id: &str, text: &str) -> Result<String, ChannelError> {
        Ok(self.emit(json!({ "action": "send_text", "chat_id": chat_id, "text": text })))
    }

    async fn send_document(
        &self,
        chat_id: &str,
        document: &Document,
        caption: Option<&str>,
    ) -> Result<String, ChannelError> {
        Ok(self.emit(json!({
            "action": "send_document",
            "chat_id": chat_id,
            "file_name": document.file_name,
            "bytes": document.bytes.len(),
            "caption": caption,
        })))
    }

    async fn reply(
        &self,
        chat_id: &str,
        quoted_message_id: &str,
        text: &str,
    ) -> Result<String, ChannelError> {
        Ok(self.emit(json!({
            "action": "reply",
            "chat_id": chat_id,
            "quoted_message_id": quoted_message_id,
            "text": text,
        })))
    }

    async fn react(
        &self,
        chat_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<(), ChannelError> {
        self.emit(json!({
            "action": "react",
            "chat_id": chat_id,
            "message_id": message_id,
            "emoji": emoji,
        }));
        Ok(())
    }
}
