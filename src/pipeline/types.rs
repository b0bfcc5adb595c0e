//! Shared types for the relay pipeline.

use serde::{Deserialize, Serialize};

// ── Inbound events ──────────────────────────────────────────────────

/// A file attached to an inbound message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub file_name: String,
    /// MIME type reported by the transport.
    pub mime_type: String,
    #[serde(default)]
    pub bytes: Vec<u8>,
}

impl Document {
    pub fn is_pdf(&self) -> bool {
        self.mime_type.eq_ignore_ascii_case("application/pdf")
            || self.file_name.to_ascii_lowercase().ends_with(".pdf")
    }
}

/// Unified inbound message from the transport.
///
/// Direct chats only; transports drop group traffic before it gets here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Transport message id.
    pub message_id: String,
    /// Chat the message arrived in. Replies and forwards go back here.
    pub chat_id: String,
    /// Sender address, matched against the routing directory.
    pub sender_id: String,
    #[serde(default)]
    pub body: String,
    /// Id of the message this one quotes, if any.
    #[serde(default)]
    pub quoted_message_id: Option<String>,
    #[serde(default)]
    pub document: Option<Document>,
}

/// A reaction someone placed on a message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactionEvent {
    /// The message that was reacted to.
    pub message_id: String,
    pub chat_id: String,
    pub sender_id: String,
    pub emoji: String,
}

/// Anything a transport delivers to the relay.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum InboundEvent {
    Message(InboundMessage),
    Reaction(ReactionEvent),
}

// ── Outcomes ────────────────────────────────────────────────────────

/// What the relay decided to do with an inbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// Nothing to do (unknown sender, no keyword, command, ...).
    Ignored { reason: String },
    /// Rejected with a reply to the sender.
    Rejected { reason: String },
    /// Request handed to the dispatch queue for forwarding.
    Queued { destination: String, keys: Vec<String> },
    /// Office break/resume notice broadcast.
    Notice { on_break: bool },
    /// Delivered document reconciled.
    Delivery { status: String },
    /// Reply or reaction threaded back to the original chat.
    Threaded { original_chat: String },
}

impl Outcome {
    pub fn ignored(reason: impl Into<String>) -> Self {
        Self::Ignored {
            reason: reason.into(),
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }

    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Ignored { .. } => "ignored",
            Self::Rejected { .. } => "rejected",
            Self::Queued { .. } => "queued",
            Self::Notice { .. } => "notice",
            Self::Delivery { .. } => "delivery",
            Self::Threaded { .. } => "threaded",
        }
    }
}
