//! Transport and document-text seams.
//!
//! The relay core only talks to these traits; concrete adapters live
//! next to them.

use async_trait::async_trait;

use crate::error::{ChannelError, ExtractionError};
use crate::pipeline::types::Document;

/// Minimal messaging transport contract.
///
/// Every send returns the transport id of the new outbound message.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Adapter name, for logs.
    fn name(&self) -> &str;

    async fn send_text(&self, chat_id: &str, text: &str) -> Result<String, ChannelError>;

    async fn send_document(
        &self,
        chat_id: &str,
        document: &Document,
        caption: Option<&str>,
    ) -> Result<String, ChannelError>;

    /// Send `text` quoting `quoted_message_id` in `chat_id`.
    async fn reply(
        &self,
        chat_id: &str,
        quoted_message_id: &str,
        text: &str,
    ) -> Result<String, ChannelError>;

    async fn react(&self, chat_id: &str, message_id: &str, emoji: &str)
        -> Result<(), ChannelError>;
}

/// Raw document bytes to plain text.
pub trait TextExtractor: Send + Sync {
    fn extract_text(&self, document: &Document) -> Result<String, ExtractionError>;
}

/// Run an extractor, degrading any failure to empty text.
pub fn extract_or_empty(extractor: &dyn TextExtractor, document: &Document) -> String {
    match extractor.extract_text(document) {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!(file = %document.file_name, error = %e, "Text extraction failed");
            String::new()
        }
    }
}

/// Treats the document bytes as UTF-8 text.
///
/// Suits transports that hand over pre-extracted text layers. Compressed PDF
/// content streams decode to noise, so raw PDFs will not match anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn extract_text(&self, document: &Document) -> Result<String, ExtractionError> {
        if document.bytes.is_empty() {
            return Err(ExtractionError::Decode(format!(
                "{} is empty",
                document.file_name
            )));
        }
        Ok(String::from_utf8_lossy(&document.bytes).into_owned())
    }
}
