//! Office break/resume notices from the sign-copy destination.

use tracing::info;

use crate::config::RoutingConfig;
use crate::dispatch::ActionKind;
use crate::pipeline::relay::Relay;
use crate::pipeline::types::{InboundMessage, Outcome};

const BREAK_KEYWORDS: &[&str] = &[
    "বিরতি", "বিরোতি", "বিরতী", "বিরোতী", "বন্ধ", "কাজ বন্ধ", "আজ বন্ধ", "অফিস বন্ধ", "pause",
];

const RESUME_KEYWORDS: &[&str] = &["শুরু", "চালু", "কাজ চালু", "কাজ শুরু", "kaj suru", "resume"];

const NOTICE_PREFIX: &str = "📢 অফিস নোটিশ: \n";

/// Label shown to pre-customers so they know which office spoke.
const PRE_CUSTOMER_LABEL: &str = "(SignCopy_Office) \n";

/// `Some(true)` for a break, `Some(false)` for a resume. Break wins when both appear.
pub fn classify_notice(text: &str) -> Option<bool> {
    let lower = text.to_lowercase();
    if BREAK_KEYWORDS.iter().any(|k| lower.contains(k)) {
        Some(true)
    } else if RESUME_KEYWORDS.iter().any(|k| lower.contains(k)) {
        Some(false)
    } else {
        None
    }
}

impl Relay {
    pub(crate) fn office_notice(&self, routing: &RoutingConfig, msg: &InboundMessage) -> Outcome {
        let body = msg.body.trim();
        let Some(on_break) = classify_notice(body) else {
            return Outcome::ignored("office chatter");
        };

        self.set_on_break(on_break);
        let recipients = routing.all_requesters();
        info!(on_break, recipients = recipients.len(), "Office notice");

        for (number, is_pre) in recipients {
            let text = if is_pre {
                format!("{NOTICE_PREFIX}{PRE_CUSTOMER_LABEL}{body}")
            } else {
                format!("{NOTICE_PREFIX}{body}")
            };
            self.send_later(ActionKind::Notice, &number, text);
        }
        self.react_later(&msg.chat_id, &msg.message_id, &routing.reactions.notice);

        Outcome::Notice { on_break }
    }
}
