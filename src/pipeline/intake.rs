//! Request intake — turns a requester's message into a queued forward.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::config::{normalize_number, DestinationKind, ReactProfile, RoutingConfig};
use crate::dispatch::ActionKind;
use crate::error::Result;
use crate::pipeline::relay::{index_outbound, pause_notice, Relay};
use crate::pipeline::types::{InboundMessage, Outcome};
use crate::reconcile::{duplicate_keys, has_bengali_digits, request_keys};
use crate::store::{ForwardLogEntry, ForwardStatus, OrderKeys, RequesterType};

/// Tag given to every pre-customer request.
pub const PRE_CUSTOMER_TAG: &str = "SignCopy";

const BENGALI_DIGITS_REPLY: &str =
    "❌ বাংলা সংখ্যা গ্রহণযোগ্য নয়! অনুগ্রহ করে ইংরেজি সংখ্যায় নম্বর লিখে পাঠান।";

/// A request that passed every gate, ready to forward.
struct ForwardRequest {
    requester_id: String,
    requester_type: RequesterType,
    name: String,
    tag: String,
    keys: Vec<String>,
    destination_id: String,
    destination_kind: DestinationKind,
}

impl ForwardRequest {
    fn relayed_text(&self, body: &str) -> String {
        match self.requester_type {
            RequesterType::PreCustomer => format!("{body}\n\nuser: {}", self.name),
            RequesterType::Customer => format!("{body}\n\nuser: {} : {}", self.name, self.tag),
        }
    }
}

fn display_name(name: &str) -> String {
    let name = name.trim();
    if name.is_empty() {
        "Unknown".to_string()
    } else {
        name.to_string()
    }
}

fn overdue_reply(due: Decimal) -> String {
    format!(
        "⚠️ আপনার পূর্বের বকেয়া রয়েছে\nআপনার বকেয়া: {due}৳\nবকেয়া পরিশোধ করে আবার অর্ডার দিন।"
    )
}

impl Relay {
    pub(crate) async fn intake(
        &self,
        routing: &RoutingConfig,
        msg: &InboundMessage,
    ) -> Result<Outcome> {
        let body = msg.body.trim();
        if body.starts_with('/') {
            return Ok(Outcome::ignored("command"));
        }

        let (contact, requester_type) = match (
            routing.pre_customer(&msg.sender_id),
            routing.customer(&msg.sender_id),
        ) {
            (Some(c), _) => (c, RequesterType::PreCustomer),
            (None, Some(c)) => (c, RequesterType::Customer),
            (None, None) => return Ok(Outcome::ignored("unknown sender")),
        };
        let reactions = &routing.reactions;

        if has_bengali_digits(body) {
            self.react_later(&msg.chat_id, &msg.message_id, &reactions.rejected);
            self.reply_later(&msg.chat_id, &msg.message_id, BENGALI_DIGITS_REPLY);
            return Ok(Outcome::rejected("bengali digits"));
        }

        let keys = request_keys(body);
        let (kind, tag) = match requester_type {
            RequesterType::PreCustomer => {
                if keys.is_empty() {
                    return Ok(Outcome::ignored("no order keys"));
                }
                (DestinationKind::SignCopy, PRE_CUSTOMER_TAG.to_string())
            }
            RequesterType::Customer => match routing.route_for(body) {
                Some(route) => (route.destination, route.tag.clone()),
                None => return Ok(Outcome::ignored("no keyword")),
            },
        };

        if let Some(reply) = pause_notice(self) {
            self.reply_later(&msg.chat_id, &msg.message_id, reply);
            return Ok(Outcome::rejected("paused"));
        }

        let Some(destination_id) = routing.destination(kind) else {
            warn!(destination = %kind, "No destination configured");
            return Ok(Outcome::ignored("destination not configured"));
        };

        let requester_id = normalize_number(&msg.sender_id);
        if !routing.is_due_exempt(&requester_id) {
            let overdue = self.ledger.overdue_amount(&requester_id).await?;
            if overdue > Decimal::ZERO {
                info!(requester = %requester_id, %overdue, "Request refused: overdue");
                self.reply_later(&msg.chat_id, &msg.message_id, &overdue_reply(overdue));
                return Ok(Outcome::rejected("overdue"));
            }
        }

        let request = ForwardRequest {
            requester_id,
            requester_type,
            name: display_name(&contact.name),
            tag,
            keys: keys.clone(),
            destination_id: destination_id.to_string(),
            destination_kind: kind,
        };
        self.queue_forward(msg, request, reactions.clone());

        Ok(Outcome::Queued {
            destination: destination_id.to_string(),
            keys,
        })
    }

    /// Dedup, acknowledge, forward, then record. Runs as one queued task so
    /// checks and writes for consecutive requests never interleave.
    fn queue_forward(&self, msg: &InboundMessage, request: ForwardRequest, reactions: ReactProfile) {
        let db = Arc::clone(&self.db);
        let transport = Arc::clone(&self.transport);
        let settings = self.settings.clone();
        let msg = msg.clone();
        let label = format!("forward {} to {}", msg.message_id, request.destination_id);

        self.queue.enqueue(ActionKind::Forward, label, async move {
            let now = Utc::now();
            let earlier = db.forward_entries_since(settings.lookback_start(now)).await?;
            let dups = duplicate_keys(&request.keys, &request.destination_id, &earlier);
            if !dups.is_empty() {
                info!(requester = %request.requester_id, keys = ?dups, "Duplicate request");
                transport
                    .react(&msg.chat_id, &msg.message_id, &reactions.duplicate_request)
                    .await?;
                let notice = format!(
                    "⚠️ এই অর্ডারটি আগে থেকেই অফিসে পাঠানো হয়েছে। মিলেছে: {}",
                    dups.join(", ")
                );
                transport.reply(&msg.chat_id, &msg.message_id, &notice).await?;
                return Ok(());
            }

            transport
                .react(&msg.chat_id, &msg.message_id, &reactions.forwarded)
                .await?;
            let body = msg.body.trim();
            let relayed = transport
                .send_text(&request.destination_id, &request.relayed_text(body))
                .await?;

            let day = settings.business_day(now);
            index_outbound(db.as_ref(), day, relayed.clone(), &msg.message_id, &msg.chat_id)
                .await?;

            let status = if request.keys.is_empty() {
                ForwardStatus::LoggedWithoutKeys
            } else {
                ForwardStatus::Forwarded
            };
            let entry = ForwardLogEntry {
                timestamp: now,
                order_keys: OrderKeys::new(request.keys),
                order_tag: request.tag,
                requester_id: request.requester_id,
                message_body: body.to_string(),
                message_id: msg.message_id.clone(),
                chat_id: msg.chat_id.clone(),
                relayed_message_id: relayed,
                destination_id: request.destination_id,
                destination_type: request.destination_kind.as_str().to_string(),
                status,
                requester_type: request.requester_type,
            };
            db.append_forward(day, &entry).await?;
            info!(
                requester = %entry.requester_id,
                keys = %entry.order_keys,
                tag = %entry.order_tag,
                status = entry.status.as_str(),
                "Request forwarded"
            );
            Ok(())
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relayed_text_by_requester_type() {
        let mut req = ForwardRequest {
            requester_id: "1".into(),
            requester_type: RequesterType::PreCustomer,
            name: "Rahim".into(),
            tag: "NidPdf".into(),
            keys: vec![],
            destination_id: "o".into(),
            destination_kind: DestinationKind::SignCopy,
        };
        assert_eq!(req.relayed_text("12345"), "12345\n\nuser: Rahim");
        req.requester_type = RequesterType::Customer;
        assert_eq!(req.relayed_text("12345"), "12345\n\nuser: Rahim : NidPdf");
    }

    #[test]
    fn blank_names_read_unknown() {
        assert_eq!(display_name("  "), "Unknown");
        assert_eq!(display_name(" Karim "), "Karim");
    }
}
