//! Configuration types.
//!
//! `RelayConfig` carries process settings read from the environment.
//! `RoutingConfig` is the operator-maintained directory of destinations,
//! requesters and keyword routes. Core components never read it from a
//! global: they take an `Arc<RoutingConfig>` snapshot from [`ConfigHandle`]
//! at the start of an operation and use it until the operation ends.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};
use serde::{Deserialize, Serialize};

use crate::dispatch::DelayProfile;
use crate::error::ConfigError;

/// Process-level configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Path of the libSQL database file.
    pub db_path: PathBuf,
    /// Path of the routing directory JSON file.
    pub routing_path: PathBuf,
    /// Offset used to compute the business day of a timestamp.
    pub utc_offset_hours: i32,
    /// How many per-day log collections the matcher and dedup index scan (1 = today).
    pub lookback_days: u32,
    /// Hard timeout for each dispatched task.
    pub task_timeout: Duration,
    /// Rolling window kept in `Account.history`.
    pub history_days: i64,
    /// Optional directory for the daily-rolling log file.
    pub log_dir: Option<PathBuf>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data/doc-relay.db"),
            routing_path: PathBuf::from("./config/routing.json"),
            utc_offset_hours: 6,
            lookback_days: 1,
            task_timeout: Duration::from_secs(15),
            history_days: 7,
            log_dir: None,
        }
    }
}

impl RelayConfig {
    /// Build from `DOC_RELAY_*` environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let utc_offset_hours = env_parse("DOC_RELAY_UTC_OFFSET_HOURS", defaults.utc_offset_hours)?;
        if !(-23..=23).contains(&utc_offset_hours) {
            return Err(ConfigError::InvalidValue {
                key: "DOC_RELAY_UTC_OFFSET_HOURS".into(),
                message: format!("{utc_offset_hours} is outside -23..=23"),
            });
        }

        let lookback_days = env_parse("DOC_RELAY_LOOKBACK_DAYS", defaults.lookback_days)?;
        if lookback_days == 0 {
            return Err(ConfigError::InvalidValue {
                key: "DOC_RELAY_LOOKBACK_DAYS".into(),
                message: "must be at least 1".into(),
            });
        }

        Ok(Self {
            db_path: std::env::var("DOC_RELAY_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            routing_path: std::env::var("DOC_RELAY_ROUTING")
                .map(PathBuf::from)
                .unwrap_or(defaults.routing_path),
            utc_offset_hours,
            lookback_days,
            task_timeout: Duration::from_secs(env_parse(
                "DOC_RELAY_TASK_TIMEOUT_SECS",
                defaults.task_timeout.as_secs(),
            )?),
            history_days: env_parse("DOC_RELAY_HISTORY_DAYS", defaults.history_days)?,
            log_dir: std::env::var("DOC_RELAY_LOG_DIR").ok().map(PathBuf::from),
        })
    }

    /// The business-day offset as a chrono `FixedOffset`.
    pub fn offset(&self) -> FixedOffset {
        business_offset(self.utc_offset_hours)
    }

    /// Business day a timestamp falls on.
    pub fn business_day(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.offset()).date_naive()
    }

    /// First business day inside the matcher/dedup lookback window ending at `at`.
    pub fn lookback_start(&self, at: DateTime<Utc>) -> NaiveDate {
        let today = self.business_day(at);
        today - chrono::Days::new(u64::from(self.lookback_days.saturating_sub(1)))
    }
}

/// Convert whole hours to a `FixedOffset`, clamping to UTC when out of range.
pub fn business_offset(hours: i32) -> FixedOffset {
    FixedOffset::east_opt(hours * 3600).unwrap_or(Utc.fix())
}

fn env_parse<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

// ── Routing directory ───────────────────────────────────────────────

/// Kind of back-office destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DestinationKind {
    SignCopy,
    NidMake,
    Biometric,
    Birth,
    Etin,
}

impl DestinationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SignCopy => "sign_copy",
            Self::NidMake => "nid_make",
            Self::Biometric => "biometric",
            Self::Birth => "birth",
            Self::Etin => "etin",
        }
    }
}

impl std::fmt::Display for DestinationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DestinationKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sign_copy" => Ok(Self::SignCopy),
            "nid_make" => Ok(Self::NidMake),
            "biometric" => Ok(Self::Biometric),
            "birth" => Ok(Self::Birth),
            "etin" => Ok(Self::Etin),
            _ => Err(format!("Unknown destination kind: {s}")),
        }
    }
}

/// A configured back-office destination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Destination {
    pub kind: DestinationKind,
    /// Transport address of the destination.
    pub id: String,
}

/// A requester directory entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub number: String,
    #[serde(default)]
    pub name: String,
}

/// A keyword route for customers: any keyword in the body selects the destination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordRoute {
    pub keywords: Vec<String>,
    pub destination: DestinationKind,
    pub tag: String,
}

/// Emoji used for each reaction the relay posts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReactProfile {
    pub forwarded: String,
    pub duplicate_request: String,
    pub duplicate_document: String,
    pub delivered: String,
    pub matched: String,
    pub unmatched: String,
    pub notice: String,
    pub rejected: String,
    pub not_found: String,
}

impl Default for ReactProfile {
    fn default() -> Self {
        Self {
            forwarded: "👍".into(),
            duplicate_request: "⚠️".into(),
            duplicate_document: "❌".into(),
            delivered: "✅".into(),
            matched: "👍".into(),
            unmatched: "❌".into(),
            notice: "👍".into(),
            rejected: "❌".into(),
            not_found: "😢".into(),
        }
    }
}

/// Operator-maintained routing directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    pub destinations: Vec<Destination>,
    pub pre_customers: Vec<Contact>,
    pub customers: Vec<Contact>,
    /// Requesters that skip the overdue gate.
    pub due_exempt: Vec<Contact>,
    pub keyword_routes: Vec<KeywordRoute>,
    pub reactions: ReactProfile,
    pub delays: DelayProfile,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            destinations: Vec::new(),
            pre_customers: Vec::new(),
            customers: Vec::new(),
            due_exempt: Vec::new(),
            keyword_routes: default_keyword_routes(),
            reactions: ReactProfile::default(),
            delays: DelayProfile::default(),
        }
    }
}

fn default_keyword_routes() -> Vec<KeywordRoute> {
    fn route(keywords: &[&str], destination: DestinationKind, tag: &str) -> KeywordRoute {
        KeywordRoute {
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            destination,
            tag: tag.to_string(),
        }
    }

    vec![
        route(&["nidpdf", "nid pdf", "nid-pdf"], DestinationKind::SignCopy, "NidPdf"),
        route(
            &[
                "sarvercopy",
                "sarver copy",
                "sarver-copy",
                "server copy",
                "server-copy",
                "sarvar copy",
                "sarvarcopy",
                "sarvar-copy",
            ],
            DestinationKind::SignCopy,
            "SarverCopy",
        ),
        route(&["birthpdf", "birth pdf", "birth-pdf"], DestinationKind::Birth, "BirthPdf"),
        route(&["bio-metric", "biometric", "bio metric"], DestinationKind::Biometric, "Biometric"),
        route(&["etinpdf", "etin pdf", "etin-pdf"], DestinationKind::Etin, "Etinpdf"),
    ]
}

/// Strip a leading `+`, any transport suffix (`@c.us`) and every non-digit.
pub fn normalize_number(raw: &str) -> String {
    let local = raw.split('@').next().unwrap_or(raw);
    local.chars().filter(|c| c.is_ascii_digit()).collect()
}

fn find_contact<'a>(list: &'a [Contact], number: &str) -> Option<&'a Contact> {
    let wanted = normalize_number(number);
    if wanted.is_empty() {
        return None;
    }
    list.iter().find(|c| normalize_number(&c.number) == wanted)
}

impl RoutingConfig {
    /// Load a routing directory from a JSON file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw).map_err(|e| ConfigError::ParseError(format!("{}: {e}", path.display())))
    }

    /// Transport id of the first destination of the given kind.
    pub fn destination(&self, kind: DestinationKind) -> Option<&str> {
        self.destinations
            .iter()
            .find(|d| d.kind == kind)
            .map(|d| d.id.as_str())
    }

    /// Which destination (if any) a sender id belongs to.
    pub fn destination_kind_of(&self, sender: &str) -> Option<DestinationKind> {
        let wanted = normalize_number(sender);
        if wanted.is_empty() {
            return None;
        }
        self.destinations
            .iter()
            .find(|d| normalize_number(&d.id) == wanted)
            .map(|d| d.kind)
    }

    pub fn pre_customer(&self, number: &str) -> Option<&Contact> {
        find_contact(&self.pre_customers, number)
    }

    pub fn customer(&self, number: &str) -> Option<&Contact> {
        find_contact(&self.customers, number)
    }

    pub fn is_due_exempt(&self, number: &str) -> bool {
        find_contact(&self.due_exempt, number).is_some()
    }

    /// First keyword route (in declared order) whose keyword occurs in the body.
    pub fn route_for(&self, body: &str) -> Option<&KeywordRoute> {
        let lower = body.to_lowercase();
        self.keyword_routes
            .iter()
            .find(|r| r.keywords.iter().any(|k| lower.contains(&k.to_lowercase())))
    }

    /// Every requester number, pre-customers first, deduplicated.
    pub fn all_requesters(&self) -> Vec<(String, bool)> {
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        for (list, is_pre) in [(&self.pre_customers, true), (&self.customers, false)] {
            for c in list {
                let n = normalize_number(&c.number);
                if !n.is_empty() && seen.insert(n.clone()) {
                    out.push((n, is_pre));
                }
            }
        }
        out
    }
}

/// Snapshot holder with atomic swap-on-reload semantics.
#[derive(Debug)]
pub struct ConfigHandle {
    current: RwLock<Arc<RoutingConfig>>,
}

impl ConfigHandle {
    pub fn new(config: RoutingConfig) -> Self {
        Self {
            current: RwLock::new(Arc::new(config)),
        }
    }

    /// The configuration in force right now. Hold it for one whole operation.
    pub fn snapshot(&self) -> Arc<RoutingConfig> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Swap in a new configuration. Operations holding an older snapshot finish with it.
    pub fn replace(&self, config: RoutingConfig) {
        let next = Arc::new(config);
        match self.current.write() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
        tracing::info!("Routing configuration replaced");
    }
}
