//! Reply and reaction threading through the message index.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use crate::config::{DestinationKind, RoutingConfig};
use crate::dispatch::ActionKind;
use crate::error::Result;
use crate::pipeline::relay::{index_outbound, Relay};
use crate::pipeline::types::{InboundMessage, Outcome, ReactionEvent};

const NOT_FOUND_REPLY: &str = "ভোটার তথ্য খুঁজে পাওয়া যায়নি";

impl Relay {
    /// Relay a quoted reply to the message it ultimately answers.
    pub(crate) async fn relay_reply(
        &self,
        routing: &RoutingConfig,
        msg: &InboundMessage,
        quoted: &str,
    ) -> Result<Outcome> {
        let body = msg.body.trim();
        if body.is_empty() || body.starts_with('/') {
            return Ok(Outcome::ignored("command"));
        }
        let allowed = routing.pre_customer(&msg.sender_id).is_some()
            || routing.customer(&msg.sender_id).is_some()
            || routing.destination_kind_of(&msg.sender_id) == Some(DestinationKind::SignCopy);
        if !allowed {
            return Ok(Outcome::ignored("reply from unknown sender"));
        }

        let Some(original) = self.db.find_message_index(quoted).await? else {
            debug!(quoted, "Quoted message is not a relayed one");
            return Ok(Outcome::ignored("quoted message not indexed"));
        };

        let db = Arc::clone(&self.db);
        let transport = Arc::clone(&self.transport);
        let day = self.day(Utc::now());
        let text = body.to_string();
        let (reply_id, reply_chat) = (msg.message_id.clone(), msg.chat_id.clone());
        let target = original.clone();
        self.queue.enqueue(
            ActionKind::Reply,
            format!("thread reply {reply_id}"),
            async move {
                let sent = transport
                    .reply(&target.original_chat_id, &target.original_message_id, &text)
                    .await?;
                index_outbound(db.as_ref(), day, sent, &reply_id, &reply_chat).await?;
                Ok(())
            },
        );

        info!(from = %msg.sender_id, to = %original.original_chat_id, "Reply threaded");
        Ok(Outcome::Threaded {
            original_chat: original.original_chat_id,
        })
    }

    /// Mirror the office's not-found reaction onto the requester's message.
    pub async fn handle_reaction(&self, reaction: ReactionEvent) -> Result<Outcome> {
        let routing = self.routing_snapshot();
        if reaction.emoji != routing.reactions.not_found {
            return Ok(Outcome::ignored("reaction"));
        }
        if routing.destination_kind_of(&reaction.sender_id) != Some(DestinationKind::SignCopy) {
            return Ok(Outcome::ignored("reaction from non-office sender"));
        }

        let Some(original) = self.db.find_message_index(&reaction.message_id).await? else {
            return Ok(Outcome::ignored("reacted message not indexed"));
        };

        self.react_later(
            &original.original_chat_id,
            &original.original_message_id,
            &routing.reactions.not_found,
        );
        self.reply_later(
            &original.original_chat_id,
            &original.original_message_id,
            NOT_FOUND_REPLY,
        );
        info!(chat = %original.original_chat_id, "Not-found reaction mirrored");
        Ok(Outcome::Threaded {
            original_chat: original.original_chat_id,
        })
    }
}
