//! End-to-end tests for the relay pipeline.
//!
//! Each test builds a relay over an in-memory database and a recording
//! transport with zero dispatch delays, feeds it inbound events and checks
//! what was sent, logged and billed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal_macros::dec;
use tokio::time::timeout;

use doc_relay::channels::{Transport, PlainTextExtractor};
use doc_relay::config::{
    ConfigHandle, Contact, Destination, DestinationKind, RelayConfig, RoutingConfig,
};
use doc_relay::dispatch::DelayProfile;
use doc_relay::error::ChannelError;
use doc_relay::ledger::Account;
use doc_relay::pipeline::{Document, InboundMessage, Outcome, ReactionEvent, Relay};
use doc_relay::store::{Database, DeliveryStatus, LibSqlBackend};

/// Maximum time any queue drain may take before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

const OFFICE: &str = "8801900000001";
const NID_OFFICE: &str = "8801900000002";
const PRE: &str = "8801711111111";
const CUSTOMER: &str = "8801822222222";

// ── Recording transport ─────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Sent {
    Text { chat: String, text: String, id: String },
    Document { chat: String, file: String, caption: Option<String>, id: String },
    Reply { chat: String, quoted: String, text: String, id: String },
    React { chat: String, message: String, emoji: String },
}

#[derive(Default)]
struct RecordingTransport {
    sent: Mutex<Vec<Sent>>,
    next_id: AtomicU64,
}

impl RecordingTransport {
    fn id(&self) -> String {
        format!("out-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn push(&self, sent: Sent) {
        self.sent.lock().unwrap().push(sent);
    }

    fn all(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    fn texts_to(&self, chat: &str) -> Vec<(String, String)> {
        self.all()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Text { chat: c, text, id } if c == chat => Some((text, id)),
                _ => None,
            })
            .collect()
    }

    fn documents(&self) -> Vec<(String, Option<String>)> {
        self.all()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Document { chat, caption, .. } => Some((chat, caption)),
                _ => None,
            })
            .collect()
    }

    fn reactions_on(&self, message: &str) -> Vec<String> {
        self.all()
            .into_iter()
            .filter_map(|s| match s {
                Sent::React { message: m, emoji, .. } if m == message => Some(emoji),
                _ => None,
            })
            .collect()
    }

    fn replies_to(&self, quoted: &str) -> Vec<(String, String)> {
        self.all()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Reply { chat, quoted: q, text, .. } if q == quoted => Some((chat, text)),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send_text(&self, chat_id: &str, text: &str) -> Result<String, ChannelError> {
        let id = self.id();
        self.push(Sent::Text {
            chat: chat_id.into(),
            text: text.into(),
            id: id.clone(),
        });
        Ok(id)
    }

    async fn send_document(
        &self,
        chat_id: &str,
        document: &Document,
        caption: Option<&str>,
    ) -> Result<String, ChannelError> {
        let id = self.id();
        self.push(Sent::Document {
            chat: chat_id.into(),
            file: document.file_name.clone(),
            caption: caption.map(str::to_string),
            id: id.clone(),
        });
        Ok(id)
    }

    async fn reply(
        &self,
        chat_id: &str,
        quoted_message_id: &str,
        text: &str,
    ) -> Result<String, ChannelError> {
        let id = self.id();
        self.push(Sent::Reply {
            chat: chat_id.into(),
            quoted: quoted_message_id.into(),
            text: text.into(),
            id: id.clone(),
        });
        Ok(id)
    }

    async fn react(
        &self,
        chat_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<(), ChannelError> {
        self.push(Sent::React {
            chat: chat_id.into(),
            message: message_id.into(),
            emoji: emoji.into(),
        });
        Ok(())
    }
}

// ── Harness ─────────────────────────────────────────────────────────

struct Harness {
    relay: Relay,
    db: Arc<dyn Database>,
    transport: Arc<RecordingTransport>,
}

impl Harness {
    async fn new() -> Self {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let transport = Arc::new(RecordingTransport::default());
        let routing = RoutingConfig {
            destinations: vec![
                Destination {
                    kind: DestinationKind::SignCopy,
                    id: OFFICE.into(),
                },
                Destination {
                    kind: DestinationKind::NidMake,
                    id: NID_OFFICE.into(),
                },
            ],
            pre_customers: vec![Contact {
                number: PRE.into(),
                name: "Rahim".into(),
            }],
            customers: vec![Contact {
                number: CUSTOMER.into(),
                name: "Karim".into(),
            }],
            delays: DelayProfile::immediate(),
            ..Default::default()
        };
        let settings = RelayConfig {
            task_timeout: Duration::from_secs(2),
            ..Default::default()
        };
        let relay = Relay::new(
            settings,
            Arc::clone(&db),
            transport.clone(),
            Arc::new(PlainTextExtractor),
            Arc::new(ConfigHandle::new(routing)),
        );
        relay.ledger().add_rate("default", dec!(50)).await.unwrap();
        Self {
            relay,
            db,
            transport,
        }
    }

    async fn send(&self, msg: InboundMessage) -> Outcome {
        let outcome = self.relay.handle_message(msg).await.unwrap();
        self.settle().await;
        outcome
    }

    async fn settle(&self) {
        timeout(TEST_TIMEOUT, self.relay.queue().wait_idle())
            .await
            .expect("dispatch queue did not drain");
    }

    /// Id the relay gave the forwarded copy of a request.
    fn relayed_id(&self, body_prefix: &str) -> String {
        self.transport
            .texts_to(OFFICE)
            .into_iter()
            .find(|(text, _)| text.starts_with(body_prefix))
            .map(|(_, id)| id)
            .expect("request was not forwarded")
    }
}

fn text(id: &str, from: &str, body: &str) -> InboundMessage {
    InboundMessage {
        message_id: id.into(),
        chat_id: from.into(),
        sender_id: from.into(),
        body: body.into(),
        quoted_message_id: None,
        document: None,
    }
}

fn pdf(id: &str, from: &str, contents: &str) -> InboundMessage {
    InboundMessage {
        document: Some(Document {
            file_name: format!("{id}.pdf"),
            mime_type: "application/pdf".into(),
            bytes: contents.as_bytes().to_vec(),
        }),
        ..text(id, from, "")
    }
}

fn delivered(status: DeliveryStatus) -> Outcome {
    Outcome::Delivery {
        status: status.as_str().to_string(),
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[tokio::test]
async fn request_is_forwarded_matched_and_billed_once() {
    let h = Harness::new().await;

    let outcome = h.send(text("m1", PRE, "please process 12345678901")).await;
    assert_eq!(
        outcome,
        Outcome::Queued {
            destination: OFFICE.into(),
            keys: vec!["12345678901".into()],
        }
    );
    let forwards = h.db.forward_entries_since(Utc::now().date_naive().pred_opt().unwrap()).await.unwrap();
    assert_eq!(forwards.len(), 1);
    assert_eq!(forwards[0].order_keys.as_slice(), ["12345678901".to_string()]);
    assert_eq!(forwards[0].requester_id, PRE);
    assert_eq!(h.transport.reactions_on("m1"), vec!["👍"]);
    let relayed = h.relayed_id("please process 12345678901\n\nuser: Rahim");

    let doc = "Header\nName(English): MD RAHIM\nNational ID12345678901\n";
    assert_eq!(h.send(pdf("d1", OFFICE, doc)).await, delivered(DeliveryStatus::Delivered));
    assert_eq!(
        h.transport.documents(),
        vec![(PRE.to_string(), Some("MD RAHIM".to_string()))]
    );
    assert_eq!(h.transport.reactions_on(&relayed), vec!["👍"]);
    assert_eq!(h.transport.reactions_on("d1"), vec!["✅"]);

    let account = h.relay.ledger().account(PRE).await.unwrap();
    assert_eq!(account.due, dec!(50));

    // Same bytes again under a new message id.
    assert_eq!(h.send(pdf("d2", OFFICE, doc)).await, delivered(DeliveryStatus::Duplicate));
    assert_eq!(h.transport.documents().len(), 1);
    assert_eq!(h.transport.reactions_on("d2"), vec!["❌"]);
    let account = h.relay.ledger().account(PRE).await.unwrap();
    assert_eq!(account.due, dec!(50));
}

#[tokio::test]
async fn earlier_label_wins_over_later_one() {
    let h = Harness::new().await;
    h.send(text("a1", PRE, "11111111111")).await;
    h.send(text("b1", CUSTOMER, "nidpdf 22222222222")).await;

    // National ID points at the pre-customer, Pin at the customer.
    let doc = "National ID11111111111\nPin22222222222\n";
    assert_eq!(h.send(pdf("d1", OFFICE, doc)).await, delivered(DeliveryStatus::Delivered));
    assert_eq!(h.transport.documents()[0].0, PRE);
}

#[tokio::test]
async fn repeated_request_key_is_flagged_not_forwarded() {
    let h = Harness::new().await;
    h.send(text("m1", PRE, "12345678901")).await;
    h.send(text("m2", PRE, "again 12345678901 and 99999")).await;

    assert_eq!(h.transport.texts_to(OFFICE).len(), 1);
    assert_eq!(h.transport.reactions_on("m2"), vec!["⚠️"]);
    let replies = h.transport.replies_to("m2");
    assert_eq!(replies.len(), 1);
    assert!(replies[0].1.ends_with("12345678901"));
}

#[tokio::test]
async fn customer_needs_a_keyword() {
    let h = Harness::new().await;
    assert_eq!(
        h.send(text("c1", CUSTOMER, "12345678901")).await,
        Outcome::ignored("no keyword")
    );
    h.send(text("c2", CUSTOMER, "NID PDF 12345678901")).await;
    assert_eq!(
        h.transport.texts_to(OFFICE)[0].0,
        "NID PDF 12345678901\n\nuser: Karim : NidPdf"
    );
}

#[tokio::test]
async fn unknown_sender_and_unmatched_documents() {
    let h = Harness::new().await;
    assert_eq!(
        h.send(text("x1", "8801000000000", "12345678901")).await,
        Outcome::ignored("unknown sender")
    );
    assert_eq!(
        h.send(pdf("d1", OFFICE, "National ID55555555555")).await,
        delivered(DeliveryStatus::Unmatched)
    );
    assert_eq!(h.transport.reactions_on("d1"), vec!["❌"]);
    assert!(h.transport.documents().is_empty());
}

#[tokio::test]
async fn nid_pdf_goes_through_nid_make_and_back() {
    let h = Harness::new().await;
    h.send(text("c1", CUSTOMER, "nidpdf 1234567890")).await;

    let doc = "Name(English): KARIM\nNational ID1234567890\n";
    assert_eq!(h.send(pdf("d1", OFFICE, doc)).await, delivered(DeliveryStatus::Delivered));
    assert_eq!(h.transport.documents()[0].0, NID_OFFICE);

    let made = "Card for NID 1234567890\nKARIM AHMED\n";
    assert_eq!(h.send(pdf("n1", NID_OFFICE, made)).await, delivered(DeliveryStatus::NidMade));
    assert_eq!(
        h.transport.documents()[1],
        (CUSTOMER.to_string(), Some("KARIM AHMED".to_string()))
    );
}

#[tokio::test]
async fn server_copy_without_phrase_is_withheld_and_not_billed() {
    let h = Harness::new().await;
    h.send(text("c1", CUSTOMER, "server copy 55555555555")).await;

    let doc = "National ID55555555555\n";
    assert_eq!(h.send(pdf("d1", OFFICE, doc)).await, delivered(DeliveryStatus::Withheld));
    assert!(h.transport.documents().is_empty());
    assert_eq!(h.relay.ledger().account(CUSTOMER).await.unwrap().due, dec!(0));

    let doc = "National ID55555555555\nThis is a Software Generated Report From Bangladesh Election Commission, Signature & Seal Aren't Required.";
    assert_eq!(h.send(pdf("d2", OFFICE, doc)).await, delivered(DeliveryStatus::Delivered));
    assert_eq!(h.relay.ledger().account(CUSTOMER).await.unwrap().due, dec!(50));
}

#[tokio::test]
async fn replies_and_not_found_reactions_thread_back() {
    let h = Harness::new().await;
    h.send(text("m1", PRE, "12345678901")).await;
    let relayed = h.relayed_id("12345678901");

    let mut reply = text("o1", OFFICE, "working on it");
    reply.quoted_message_id = Some(relayed.clone());
    assert_eq!(
        h.send(reply).await,
        Outcome::Threaded {
            original_chat: PRE.into()
        }
    );
    assert_eq!(
        h.transport.replies_to("m1"),
        vec![(PRE.to_string(), "working on it".to_string())]
    );

    let outcome = h
        .relay
        .handle_reaction(ReactionEvent {
            message_id: relayed,
            chat_id: OFFICE.into(),
            sender_id: OFFICE.into(),
            emoji: "😢".into(),
        })
        .await
        .unwrap();
    h.settle().await;
    assert!(matches!(outcome, Outcome::Threaded { .. }));
    assert_eq!(h.transport.reactions_on("m1"), vec!["👍", "😢"]);
    assert_eq!(h.transport.replies_to("m1").len(), 2);
}

#[tokio::test]
async fn quoted_request_is_still_forwarded() {
    let h = Harness::new().await;

    let mut request = text("q1", PRE, "please process 12345678901");
    request.quoted_message_id = Some("some-earlier-chat-message".into());
    assert_eq!(
        h.send(request).await,
        Outcome::Queued {
            destination: OFFICE.into(),
            keys: vec!["12345678901".into()],
        }
    );
    h.relayed_id("please process 12345678901");
    assert_eq!(h.transport.reactions_on("q1"), vec!["👍"]);
}

#[tokio::test]
async fn quoted_request_on_relayed_message_is_forwarded_and_threaded() {
    let h = Harness::new().await;
    h.send(text("m1", PRE, "11111111111")).await;
    let relayed = h.relayed_id("11111111111");

    // Office answers the relayed copy; the requester replies with a new order.
    let mut answer = text("o1", OFFICE, "done");
    answer.quoted_message_id = Some(relayed);
    h.send(answer).await;
    let answered = h
        .transport
        .all()
        .into_iter()
        .find_map(|s| match s {
            Sent::Reply { quoted, id, .. } if quoted == "m1" => Some(id),
            _ => None,
        })
        .expect("office answer was not threaded");

    let mut request = text("m2", PRE, "also 22222222222");
    request.quoted_message_id = Some(answered);
    assert!(matches!(h.send(request).await, Outcome::Queued { .. }));
    h.relayed_id("also 22222222222");
    assert_eq!(h.transport.replies_to("o1").len(), 1);
}

#[tokio::test]
async fn quoted_office_break_still_pauses() {
    let h = Harness::new().await;
    let mut notice = text("o1", OFFICE, "আজ অফিস বন্ধ");
    notice.quoted_message_id = Some("unrelated".into());
    assert_eq!(h.send(notice).await, Outcome::Notice { on_break: true });
    assert!(h.relay.is_on_break());
}

#[tokio::test]
async fn nid_make_skips_newer_unresolved_delivery() {
    let h = Harness::new().await;
    h.send(text("c1", CUSTOMER, "nidpdf 1234567890")).await;
    let doc = "Name(English): KARIM\nNational ID1234567890\n";
    assert_eq!(h.send(pdf("d1", OFFICE, doc)).await, delivered(DeliveryStatus::Delivered));

    // A newer row for the same NID that resolved to nobody.
    let since = Utc::now().date_naive().pred_opt().unwrap();
    let mut unresolved = h.db.delivery_entries_since(since).await.unwrap().remove(0);
    unresolved.timestamp = Utc::now();
    unresolved.status = DeliveryStatus::Unmatched;
    unresolved.resolved_ids.clear();
    unresolved.message_id = "d9".into();
    unresolved.content_hash = "other".into();
    let today = RelayConfig::default().business_day(Utc::now());
    h.db.append_delivery(today, &unresolved).await.unwrap();

    let made = "Card for NID 1234567890\nKARIM AHMED\n";
    assert_eq!(h.send(pdf("n1", NID_OFFICE, made)).await, delivered(DeliveryStatus::NidMade));
    assert_eq!(
        h.transport.documents()[1],
        (CUSTOMER.to_string(), Some("KARIM AHMED".to_string()))
    );
}

#[tokio::test]
async fn office_break_pauses_intake_until_resume() {
    let h = Harness::new().await;
    assert_eq!(
        h.send(text("o1", OFFICE, "আজ অফিস বন্ধ")).await,
        Outcome::Notice { on_break: true }
    );
    assert!(h.relay.is_on_break());
    assert!(h.transport.texts_to(PRE)[0].0.contains("(SignCopy_Office)"));
    assert!(!h.transport.texts_to(CUSTOMER)[0].0.contains("(SignCopy_Office)"));

    assert_eq!(
        h.send(text("m1", PRE, "12345678901")).await,
        Outcome::rejected("paused")
    );

    h.send(text("o2", OFFICE, "কাজ শুরু")).await;
    assert!(!h.relay.is_on_break());
    assert!(matches!(
        h.send(text("m2", PRE, "12345678901")).await,
        Outcome::Queued { .. }
    ));
}

#[tokio::test]
async fn overdue_requester_is_refused() {
    let h = Harness::new().await;
    let mut account = Account::new(PRE, Utc::now());
    account.due = dec!(30);
    assert!(h.db.insert_account(&account).await.unwrap());

    assert_eq!(
        h.send(text("m1", PRE, "12345678901")).await,
        Outcome::rejected("overdue")
    );
    assert!(h.transport.replies_to("m1")[0].1.contains("30"));
    assert!(h.transport.texts_to(OFFICE).is_empty());
}

#[tokio::test]
async fn bengali_digits_are_rejected() {
    let h = Harness::new().await;
    assert_eq!(
        h.send(text("m1", PRE, "১২৩৪৫৬৭৮৯০১")).await,
        Outcome::rejected("bengali digits")
    );
    assert_eq!(h.transport.reactions_on("m1"), vec!["❌"]);
}
