//! Account ledger — balances, dues, rates and reporting projections.

pub mod manager;
pub mod model;
pub mod reports;

pub use manager::AccountLedger;
pub use model::{
    Account, ChargeContext, EntryType, LedgerEntry, OrderContext, RateTable, BASELINE_ROLE,
};
pub use reports::{AccountHistory, AccountSummary, DailyStats, DeliveryCounts, DueItem, DueList};
