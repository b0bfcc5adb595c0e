//! The relay — routes every inbound event to intake, delivery or threading.
//!
//! Handlers do their reads, checks and log writes inline and push every
//! outbound effect onto the dispatch queue, so they return as soon as the
//! decision is made.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, info, warn};

use crate::channels::{TextExtractor, Transport};
use crate::config::{ConfigHandle, DestinationKind, RelayConfig, RoutingConfig};
use crate::dispatch::{ActionKind, DispatchQueue};
use crate::error::Result;
use crate::ledger::AccountLedger;
use crate::pipeline::types::{InboundEvent, InboundMessage, Outcome};
use crate::store::{Database, MessageIndexEntry};

/// Relay state shared by every handler.
pub struct Relay {
    pub(crate) settings: RelayConfig,
    pub(crate) db: Arc<dyn Database>,
    pub(crate) ledger: Arc<AccountLedger>,
    pub(crate) queue: Arc<DispatchQueue>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) extractor: Arc<dyn TextExtractor>,
    routing: Arc<ConfigHandle>,
    closed: AtomicBool,
    on_break: AtomicBool,
}

impl Relay {
    pub fn new(
        settings: RelayConfig,
        db: Arc<dyn Database>,
        transport: Arc<dyn Transport>,
        extractor: Arc<dyn TextExtractor>,
        routing: Arc<ConfigHandle>,
    ) -> Self {
        let ledger = Arc::new(AccountLedger::new(
            Arc::clone(&db),
            settings.offset(),
            settings.history_days,
        ));
        let queue = DispatchQueue::new(routing.snapshot().delays.clone(), settings.task_timeout);
        Self {
            settings,
            db,
            ledger,
            queue,
            transport,
            extractor,
            routing,
            closed: AtomicBool::new(false),
            on_break: AtomicBool::new(false),
        }
    }

    pub fn ledger(&self) -> &Arc<AccountLedger> {
        &self.ledger
    }

    pub fn queue(&self) -> &Arc<DispatchQueue> {
        &self.queue
    }

    /// The routing directory in force right now.
    pub fn routing_snapshot(&self) -> Arc<RoutingConfig> {
        self.routing.snapshot()
    }

    /// Swap the routing directory and pick up its delay profile.
    pub fn reload_routing(&self, routing: RoutingConfig) {
        self.queue.set_profile(routing.delays.clone());
        self.routing.replace(routing);
    }

    /// Operator switch: while closed no request is forwarded.
    pub fn set_closed(&self, closed: bool) {
        self.closed.store(closed, Ordering::SeqCst);
        info!(closed, "Relay closed flag changed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn set_on_break(&self, on_break: bool) {
        self.on_break.store(on_break, Ordering::SeqCst);
    }

    pub fn is_on_break(&self) -> bool {
        self.on_break.load(Ordering::SeqCst)
    }

    /// Handle one transport event.
    pub async fn handle_event(&self, event: InboundEvent) -> Result<Outcome> {
        match event {
            InboundEvent::Message(msg) => self.handle_message(msg).await,
            InboundEvent::Reaction(reaction) => self.handle_reaction(reaction).await,
        }
    }

    /// Route an inbound message by sender and shape.
    pub async fn handle_message(&self, msg: InboundMessage) -> Result<Outcome> {
        let routing = self.routing_snapshot();
        debug!(
            id = %msg.message_id,
            sender = %msg.sender_id,
            has_document = msg.document.is_some(),
            "Inbound message"
        );

        let routed = match routing.destination_kind_of(&msg.sender_id) {
            Some(kind) => self.from_destination(&routing, kind, &msg).await?,
            None => self.intake(&routing, &msg).await?,
        };

        // A quoted text is routed like any other and also threaded back when
        // the quoted message is one we relayed.
        let outcome = match (msg.quoted_message_id.as_deref(), &msg.document) {
            (Some(quoted), None) => {
                let threaded = self.relay_reply(&routing, &msg, quoted).await?;
                primary_outcome(routed, threaded)
            }
            _ => routed,
        };

        debug!(id = %msg.message_id, outcome = outcome.label(), "Message handled");
        Ok(outcome)
    }

    async fn from_destination(
        &self,
        routing: &RoutingConfig,
        kind: DestinationKind,
        msg: &InboundMessage,
    ) -> Result<Outcome> {
        match (&msg.document, kind) {
            (None, DestinationKind::SignCopy) => Ok(self.office_notice(routing, msg)),
            (None, _) => Ok(Outcome::ignored("destination text")),
            (Some(doc), DestinationKind::NidMake) => self.deliver_nid_make(routing, msg, doc).await,
            (Some(doc), DestinationKind::SignCopy | DestinationKind::Etin) => {
                self.deliver(routing, kind, msg, doc).await
            }
            (Some(_), _) => Ok(Outcome::ignored("destination does not deliver documents")),
        }
    }

    /// Business day of a timestamp.
    pub(crate) fn day(&self, at: DateTime<Utc>) -> NaiveDate {
        self.settings.business_day(at)
    }

    /// First day the matcher and dedup checks look at.
    pub(crate) fn window_start(&self, at: DateTime<Utc>) -> NaiveDate {
        self.settings.lookback_start(at)
    }

    // ── Queued effects ──────────────────────────────────────────────

    pub(crate) fn react_later(&self, chat_id: &str, message_id: &str, emoji: &str) {
        let transport = Arc::clone(&self.transport);
        let (chat, id, emoji) = (chat_id.to_string(), message_id.to_string(), emoji.to_string());
        self.queue
            .enqueue(ActionKind::React, format!("react {emoji} {id}"), async move {
                transport.react(&chat, &id, &emoji).await?;
                Ok(())
            });
    }

    pub(crate) fn reply_later(&self, chat_id: &str, quoted_message_id: &str, text: &str) {
        let transport = Arc::clone(&self.transport);
        let (chat, quoted, text) = (
            chat_id.to_string(),
            quoted_message_id.to_string(),
            text.to_string(),
        );
        self.queue
            .enqueue(ActionKind::Reply, format!("reply {quoted}"), async move {
                transport.reply(&chat, &quoted, &text).await?;
                Ok(())
            });
    }

    pub(crate) fn send_later(&self, kind: ActionKind, chat_id: &str, text: String) {
        let transport = Arc::clone(&self.transport);
        let chat = chat_id.to_string();
        self.queue
            .enqueue(kind, format!("send to {chat}"), async move {
                transport.send_text(&chat, &text).await?;
                Ok(())
            });
    }
}

/// Outcome reported for a quoted text that went through routing and threading.
///
/// Routing wins unless it ignored the message.
fn primary_outcome(routed: Outcome, threaded: Outcome) -> Outcome {
    match (&routed, &threaded) {
        (Outcome::Ignored { .. }, Outcome::Threaded { .. }) => threaded,
        _ => routed,
    }
}

/// Record `outbound` as a relay of `original` so replies can be threaded back.
pub(crate) async fn index_outbound(
    db: &dyn Database,
    day: NaiveDate,
    outbound: String,
    original_message_id: &str,
    original_chat_id: &str,
) -> anyhow::Result<()> {
    db.append_message_index(
        day,
        &MessageIndexEntry {
            outbound_message_id: outbound,
            original_message_id: original_message_id.to_string(),
            original_chat_id: original_chat_id.to_string(),
        },
    )
    .await?;
    Ok(())
}

/// Refuse work if the relay is closed or the office is on break.
pub(crate) fn pause_notice(relay: &Relay) -> Option<&'static str> {
    if relay.is_closed() {
        warn!("Request refused: relay closed");
        return Some(CLOSED_REPLY);
    }
    if relay.is_on_break() {
        return Some(ON_BREAK_REPLY);
    }
    None
}

const CLOSED_REPLY: &str = "❌ অফিস বন্ধ আছে, এডমিন কে কল দিয়ে যোগাযোগ করুন!";
const ON_BREAK_REPLY: &str =
    "❌ অফিস বিরতি সময় চলে আছে, জরুরি প্রয়জনে এডমিন কে কল দিয়ে যোগাযোগ করুন!";
