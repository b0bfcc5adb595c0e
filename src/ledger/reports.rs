//! Read-only projections over accounts and the delivery log.
//!
//! Formatting for humans is left to the caller.

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::LedgerError;
use crate::ledger::manager::AccountLedger;
use crate::ledger::model::{EntryType, LedgerEntry};
use crate::store::DeliveryStatus;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountSummary {
    pub id: String,
    pub role: String,
    pub balance: Decimal,
    pub due: Decimal,
    pub last_entry: Option<LedgerEntry>,
}

/// One account's entries on one business day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountHistory {
    pub id: String,
    pub role: String,
    pub entries: Vec<LedgerEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DueItem {
    pub id: String,
    pub role: String,
    pub due: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DueList {
    pub items: Vec<DueItem>,
    pub total: Decimal,
}

/// Per-day activity of one account.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DailyStats {
    pub auto_count: u32,
    pub manual_count: u32,
    pub refund_count: u32,
    /// Billed jobs net of refunds.
    pub work_count: i64,
    pub deposit: Decimal,
    pub auto_charge: Decimal,
    pub manual_charge: Decimal,
    pub refund: Decimal,
    /// Charges minus refunds.
    pub effective_charge: Decimal,
}

/// Delivery outcomes on one business day.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryCounts {
    pub delivered: u32,
    pub withheld: u32,
    pub duplicate: u32,
    pub unmatched: u32,
    pub nid_made: u32,
}

impl AccountLedger {
    /// Role, balances and the latest entry. Unknown ids read as fresh accounts.
    pub async fn summary(&self, id: &str) -> Result<AccountSummary, LedgerError> {
        let account = self.account(id).await?;
        Ok(AccountSummary {
            last_entry: account.last_entry().cloned(),
            id: account.id,
            role: account.role,
            balance: account.balance,
            due: account.due,
        })
    }

    /// Entries on `date` (default today) for one account or all of them.
    ///
    /// Accounts with no entries that day are left out.
    pub async fn history(
        &self,
        id: Option<&str>,
        date: Option<NaiveDate>,
    ) -> Result<Vec<AccountHistory>, LedgerError> {
        let day = date.unwrap_or_else(|| self.day_of(Utc::now()));
        let accounts = match id {
            Some(id) => self.db.get_account(id.trim()).await?.into_iter().collect(),
            None => self.db.list_accounts().await?,
        };

        Ok(accounts
            .into_iter()
            .filter_map(|acc| {
                let entries: Vec<LedgerEntry> = acc
                    .history
                    .into_iter()
                    .filter(|e| self.day_of(e.timestamp) == day)
                    .collect();
                (!entries.is_empty()).then(|| AccountHistory {
                    id: acc.id,
                    role: acc.role,
                    entries,
                })
            })
            .collect())
    }

    /// Every account with due > 0 and the grand total.
    pub async fn due_list(&self) -> Result<DueList, LedgerError> {
        let mut list = DueList::default();
        for acc in self.db.list_accounts().await? {
            if acc.due > Decimal::ZERO {
                list.total += acc.due;
                list.items.push(DueItem {
                    id: acc.id,
                    role: acc.role,
                    due: acc.due,
                });
            }
        }
        Ok(list)
    }

    /// Counts and totals for one account on one day. `None` when nothing happened.
    pub async fn daily_stats(
        &self,
        id: &str,
        date: Option<NaiveDate>,
    ) -> Result<Option<DailyStats>, LedgerError> {
        let day = date.unwrap_or_else(|| self.day_of(Utc::now()));
        let account = self.account(id).await?;

        let mut stats = DailyStats::default();
        let mut any = false;
        for entry in account
            .history
            .iter()
            .filter(|e| self.day_of(e.timestamp) == day)
        {
            any = true;
            match entry.entry_type {
                EntryType::Deposit => stats.deposit += entry.amount,
                EntryType::Charge => {
                    stats.auto_count += 1;
                    stats.auto_charge += entry.amount;
                }
                EntryType::ManualCharge => {
                    stats.manual_count += 1;
                    stats.manual_charge += entry.amount;
                }
                EntryType::Refund => {
                    stats.refund_count += 1;
                    stats.refund += entry.amount;
                }
                EntryType::DueClear => {}
            }
        }
        if !any {
            return Ok(None);
        }

        stats.work_count = i64::from(stats.auto_count) - i64::from(stats.refund_count)
            + i64::from(stats.manual_count);
        stats.effective_charge = stats.auto_charge + stats.manual_charge - stats.refund;
        Ok(Some(stats))
    }

    /// Delivery log outcomes on `date` (default today).
    pub async fn delivery_counts(
        &self,
        date: Option<NaiveDate>,
    ) -> Result<DeliveryCounts, LedgerError> {
        let day = date.unwrap_or_else(|| self.day_of(Utc::now()));
        let mut counts = DeliveryCounts::default();
        for entry in self.db.delivery_entries_on(day).await? {
            match entry.status {
                DeliveryStatus::Delivered => counts.delivered += 1,
                DeliveryStatus::Withheld => counts.withheld += 1,
                DeliveryStatus::Duplicate => counts.duplicate += 1,
                DeliveryStatus::Unmatched => counts.unmatched += 1,
                DeliveryStatus::NidMade => counts.nid_made += 1,
            }
        }
        Ok(counts)
    }
}
