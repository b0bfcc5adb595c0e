//! Delivery reconciliation — documents coming back from the destinations.
//!
//! Reads, dedup, billing and the delivery log entry happen inline so a
//! second copy arriving right behind the first is already seen as a
//! duplicate. Sends are queued.

use std::sync::Arc;

use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::{error, info, warn};

use crate::channels::extract_or_empty;
use crate::config::{DestinationKind, RoutingConfig};
use crate::dispatch::ActionKind;
use crate::error::Result;
use crate::ledger::{ChargeContext, OrderContext};
use crate::pipeline::relay::{index_outbound, Relay};
use crate::pipeline::types::{Document, InboundMessage, Outcome};
use crate::reconcile::{
    extract, is_duplicate_delivery, match_candidates, nid_make_target, ten_digit_numbers,
    DeliveryProbe, IdLabel, OrderMatch,
};
use crate::store::{excerpt, DeliveryLogEntry, DeliveryStatus, OrderKeys};

/// Order tag whose documents go to the NID-make destination.
pub const NID_PDF_TAG: &str = "NidPdf";

/// Order tag that requires the generated-copy phrase.
pub const SERVER_COPY_TAG: &str = "SarverCopy";

/// Lowercase hex SHA-256 of the document bytes.
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Everything a delivery log entry needs besides its outcome.
struct Received<'a> {
    msg: &'a InboundMessage,
    doc: &'a Document,
    source: DestinationKind,
    hash: String,
    text: String,
}

impl Received<'_> {
    fn entry(
        &self,
        status: DeliveryStatus,
        key: Option<&str>,
        national_id: Option<&str>,
        resolved: Option<&str>,
    ) -> DeliveryLogEntry {
        DeliveryLogEntry {
            timestamp: Utc::now(),
            order_keys: OrderKeys::new(key),
            file_name: self.doc.file_name.clone(),
            extracted_id_value: national_id.map(str::to_string),
            resolved_ids: resolved.into_iter().map(str::to_string).collect(),
            excerpt: excerpt(&self.text),
            message_id: self.msg.message_id.clone(),
            status,
            source_type: self.source.as_str().to_string(),
            content_hash: self.hash.clone(),
        }
    }
}

impl Relay {
    async fn receive<'a>(
        &self,
        source: DestinationKind,
        msg: &'a InboundMessage,
        doc: &'a Document,
    ) -> Option<Received<'a>> {
        if !doc.is_pdf() {
            return None;
        }
        let hash = content_hash(&doc.bytes);
        let extractor = Arc::clone(&self.extractor);
        let owned = doc.clone();
        let text = tokio::task::spawn_blocking(move || extract_or_empty(extractor.as_ref(), &owned))
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "Text extraction task failed");
                String::new()
            });
        Some(Received {
            msg,
            doc,
            source,
            hash,
            text,
        })
    }

    async fn log_delivery(&self, entry: &DeliveryLogEntry) -> Result<()> {
        self.db
            .append_delivery(self.day(entry.timestamp), entry)
            .await?;
        Ok(())
    }

    /// Reconcile a document from a sign-copy or e-TIN destination.
    pub(crate) async fn deliver(
        &self,
        routing: &RoutingConfig,
        source: DestinationKind,
        msg: &InboundMessage,
        doc: &Document,
    ) -> Result<Outcome> {
        let Some(received) = self.receive(source, msg, doc).await else {
            return Ok(Outcome::ignored("not a pdf"));
        };
        let reactions = &routing.reactions;
        let extraction = extract(&received.text);
        let national_id = extraction.value_of(IdLabel::NationalId);

        let from = self.window_start(Utc::now());
        let forwards = self.db.forward_entries_since(from).await?;
        let matched = match_candidates(&extraction.candidates, &forwards);

        let deliveries = self.db.delivery_entries_since(from).await?;
        let probe = DeliveryProbe {
            identifier: matched.as_ref().map(|m| m.identifier.as_str()),
            message_id: Some(&msg.message_id),
            content_hash: Some(&received.hash),
        };
        if is_duplicate_delivery(&probe, &deliveries) {
            info!(file = %doc.file_name, hash = %received.hash, "Duplicate delivery");
            self.react_later(&msg.chat_id, &msg.message_id, &reactions.duplicate_document);
            let entry = received.entry(
                DeliveryStatus::Duplicate,
                probe.identifier,
                national_id,
                matched.as_ref().map(|m| m.entry.chat_id.as_str()),
            );
            self.log_delivery(&entry).await?;
            return Ok(delivery_outcome(DeliveryStatus::Duplicate));
        }

        let Some(matched) = matched else {
            info!(file = %doc.file_name, candidates = extraction.candidates.len(), "No matching request");
            self.react_later(&msg.chat_id, &msg.message_id, &reactions.unmatched);
            let entry = received.entry(DeliveryStatus::Unmatched, None, national_id, None);
            self.log_delivery(&entry).await?;
            return Ok(delivery_outcome(DeliveryStatus::Unmatched));
        };

        if matched.order_tag().eq_ignore_ascii_case(SERVER_COPY_TAG) && !extraction.generated_copy {
            info!(requester = %matched.requester_id(), "Server copy without generated-report phrase");
            self.react_later(&msg.chat_id, &msg.message_id, &reactions.rejected);
            let entry = received.entry(
                DeliveryStatus::Withheld,
                Some(&matched.identifier),
                national_id,
                Some(&matched.entry.chat_id),
            );
            self.log_delivery(&entry).await?;
            return Ok(delivery_outcome(DeliveryStatus::Withheld));
        }

        self.bill(&matched, msg, source).await;

        self.react_later(
            &matched.entry.destination_id,
            &matched.entry.relayed_message_id,
            &reactions.matched,
        );

        let target = if matched.order_tag().eq_ignore_ascii_case(NID_PDF_TAG) {
            match routing.destination(DestinationKind::NidMake) {
                Some(nid_make) => nid_make.to_string(),
                None => {
                    warn!("No nid_make destination configured, delivering to requester");
                    matched.entry.chat_id.clone()
                }
            }
        } else {
            matched.entry.chat_id.clone()
        };

        let entry = received.entry(
            DeliveryStatus::Delivered,
            Some(&matched.identifier),
            national_id,
            Some(&matched.entry.chat_id),
        );
        self.log_delivery(&entry).await?;
        info!(
            requester = %matched.requester_id(),
            identifier = %matched.identifier,
            label = %matched.label,
            target = %target,
            "Document matched"
        );

        self.send_document_later(
            &target,
            doc,
            extraction.name_english.clone(),
            msg,
            reactions.delivered.clone(),
        );
        Ok(delivery_outcome(DeliveryStatus::Delivered))
    }

    /// Charge the requester once per order key per business day.
    async fn bill(&self, matched: &OrderMatch, msg: &InboundMessage, source: DestinationKind) {
        let requester = matched.requester_id();
        match self
            .ledger
            .already_charged_today(requester, &matched.identifier)
            .await
        {
            Ok(true) => {
                info!(requester, key = %matched.identifier, "Already charged today, skipping");
                return;
            }
            Ok(false) => {}
            Err(e) => {
                error!(requester, error = %e, "Charge check failed");
                return;
            }
        }

        let ctx = ChargeContext {
            order_tag: Some(matched.order_tag().to_string()),
            reason: "Auto Charge".to_string(),
            order: OrderContext {
                order_key: Some(matched.identifier.clone()),
                destination_id: Some(msg.sender_id.clone()),
                destination_type: Some(source.as_str().to_string()),
            },
        };
        let result = match self.ledger.rates().await {
            Ok(rates) => self.ledger.charge(requester, &rates, &ctx).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            error!(requester, error = %e, "Charge failed");
        }
    }

    /// Route a document from the NID-make destination back to its requester.
    pub(crate) async fn deliver_nid_make(
        &self,
        routing: &RoutingConfig,
        msg: &InboundMessage,
        doc: &Document,
    ) -> Result<Outcome> {
        let Some(received) = self.receive(DestinationKind::NidMake, msg, doc).await else {
            return Ok(Outcome::ignored("not a pdf"));
        };
        let reactions = &routing.reactions;
        let extraction = extract(&received.text);

        let deliveries = self
            .db
            .delivery_entries_since(self.window_start(Utc::now()))
            .await?;
        let probe = DeliveryProbe {
            identifier: None,
            message_id: Some(&msg.message_id),
            content_hash: Some(&received.hash),
        };
        if is_duplicate_delivery(&probe, &deliveries) {
            self.react_later(&msg.chat_id, &msg.message_id, &reactions.duplicate_document);
            let entry = received.entry(DeliveryStatus::Duplicate, None, None, None);
            self.log_delivery(&entry).await?;
            return Ok(delivery_outcome(DeliveryStatus::Duplicate));
        }

        let numbers = ten_digit_numbers(&received.text);
        let Some(target) = nid_make_target(&numbers, &deliveries) else {
            info!(file = %doc.file_name, numbers = numbers.len(), "NID-make document has no requester");
            self.react_later(&msg.chat_id, &msg.message_id, &reactions.unmatched);
            let entry = received.entry(DeliveryStatus::Unmatched, None, None, None);
            self.log_delivery(&entry).await?;
            return Ok(delivery_outcome(DeliveryStatus::Unmatched));
        };

        let entry = received.entry(
            DeliveryStatus::NidMade,
            Some(&target.nid_number),
            Some(&target.nid_number),
            Some(&target.requester_chat),
        );
        self.log_delivery(&entry).await?;
        info!(nid = %target.nid_number, chat = %target.requester_chat, "NID-make document routed");

        self.send_document_later(
            &target.requester_chat,
            doc,
            extraction.name_english,
            msg,
            reactions.delivered.clone(),
        );
        Ok(delivery_outcome(DeliveryStatus::NidMade))
    }

    /// Send the document, index it against the office message, then confirm to the office.
    fn send_document_later(
        &self,
        target: &str,
        doc: &Document,
        caption: Option<String>,
        office_msg: &InboundMessage,
        delivered_emoji: String,
    ) {
        let db = Arc::clone(&self.db);
        let transport = Arc::clone(&self.transport);
        let day = self.day(Utc::now());
        let target = target.to_string();
        let doc = doc.clone();
        let office_msg_id = office_msg.message_id.clone();
        let office_chat = office_msg.chat_id.clone();
        let label = format!("deliver {} to {target}", doc.file_name);

        self.queue.enqueue(ActionKind::Document, label, async move {
            let sent = transport
                .send_document(&target, &doc, caption.as_deref())
                .await?;
            index_outbound(db.as_ref(), day, sent, &office_msg_id, &office_chat).await?;
            transport
                .react(&office_chat, &office_msg_id, &delivered_emoji)
                .await?;
            Ok(())
        });
    }
}

fn delivery_outcome(status: DeliveryStatus) -> Outcome {
    Outcome::Delivery {
        status: status.as_str().to_string(),
    }
}
