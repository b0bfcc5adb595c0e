//! Account ledger — balance/due state machine over persisted accounts.
//!
//! Every operation is one load → mutate → save of the whole account. Saves
//! are guarded by the account version, so two writers racing on the same
//! account cannot both win; the loser reloads and reapplies.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::error::LedgerError;
use crate::ledger::model::{
    Account, ChargeContext, EntryType, LedgerEntry, OrderContext, RateTable,
};
use crate::store::Database;

/// Save attempts before a version conflict is reported.
const MAX_SAVE_ATTEMPTS: u32 = 5;

/// Ledger operations over a [`Database`].
pub struct AccountLedger {
    pub(crate) db: Arc<dyn Database>,
    pub(crate) offset: FixedOffset,
    history_window: chrono::Duration,
}

impl AccountLedger {
    pub fn new(db: Arc<dyn Database>, offset: FixedOffset, history_days: i64) -> Self {
        Self {
            db,
            offset,
            history_window: chrono::Duration::days(history_days.max(1)),
        }
    }

    /// Business day of a timestamp.
    pub(crate) fn day_of(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.offset).date_naive()
    }

    /// The stored account, or a fresh unsaved one for an unknown id.
    pub async fn account(&self, id: &str) -> Result<Account, LedgerError> {
        let id = validate_id(id)?;
        Ok(self
            .db
            .get_account(id)
            .await?
            .unwrap_or_else(|| Account::new(id, Utc::now())))
    }

    /// Credit the account, clearing as much due as the new balance covers.
    pub async fn deposit(
        &self,
        id: &str,
        amount: Decimal,
        reason: &str,
    ) -> Result<Account, LedgerError> {
        if amount < Decimal::ZERO {
            return Err(LedgerError::InvalidAmount {
                operation: "deposit",
                amount,
            });
        }
        let account = self
            .mutate(id, |acc, now| {
                apply_deposit(acc, amount, reason, now);
                true
            })
            .await?;
        info!(account = %account.id, %amount, balance = %account.balance, due = %account.due, "Deposit");
        Ok(account)
    }

    /// Debit the resolved rate. A rate of zero or less changes nothing.
    pub async fn charge(
        &self,
        id: &str,
        rates: &RateTable,
        ctx: &ChargeContext,
    ) -> Result<Account, LedgerError> {
        let mut booked = Decimal::ZERO;
        let account = self
            .mutate(id, |acc, now| {
                let rate = rates.resolve(ctx.order_tag.as_deref(), &acc.role);
                booked = rate;
                if rate <= Decimal::ZERO {
                    return false;
                }
                apply_charge(acc, rate, ctx, now);
                true
            })
            .await?;

        if booked > Decimal::ZERO {
            info!(
                account = %account.id,
                rate = %booked,
                order_key = ctx.order.order_key.as_deref().unwrap_or(""),
                balance = %account.balance,
                due = %account.due,
                "Charge"
            );
        } else {
            debug!(account = %account.id, "No rate configured, charge skipped");
        }
        Ok(account)
    }

    /// Debit a caller-supplied amount. Rejects amounts ≤ 0 before touching the account.
    pub async fn manual_charge(
        &self,
        id: &str,
        amount: Decimal,
        reason: &str,
    ) -> Result<Account, LedgerError> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount {
                operation: "manualCharge",
                amount,
            });
        }
        let account = self
            .mutate(id, |acc, now| {
                apply_manual_charge(acc, amount, reason, now);
                true
            })
            .await?;
        info!(account = %account.id, %amount, "Manual charge");
        Ok(account)
    }

    /// Reduce due first, then credit the remainder to the balance.
    pub async fn refund(
        &self,
        id: &str,
        amount: Decimal,
        reason: &str,
        order: &OrderContext,
    ) -> Result<Account, LedgerError> {
        if amount < Decimal::ZERO {
            return Err(LedgerError::InvalidAmount {
                operation: "refund",
                amount,
            });
        }
        let account = self
            .mutate(id, |acc, now| {
                apply_refund(acc, amount, reason, order, now);
                true
            })
            .await?;
        info!(account = %account.id, %amount, "Refund");
        Ok(account)
    }

    pub async fn set_role(&self, id: &str, role: &str) -> Result<Account, LedgerError> {
        let role = role.trim();
        if role.is_empty() {
            return Err(LedgerError::InvalidRole(role.to_string()));
        }
        let account = self
            .mutate(id, |acc, _| {
                acc.role = role.to_string();
                true
            })
            .await?;
        info!(account = %account.id, role, "Role set");
        Ok(account)
    }

    /// Due carried over from earlier days: current due minus today's debits.
    pub async fn overdue_amount(&self, id: &str) -> Result<Decimal, LedgerError> {
        let account = self.account(id).await?;
        let today = self.day_of(Utc::now());
        let todays_debits: Decimal = account
            .history
            .iter()
            .filter(|e| e.entry_type.is_debit() && self.day_of(e.timestamp) == today)
            .map(|e| e.amount)
            .sum();
        Ok((account.due - todays_debits).max(Decimal::ZERO))
    }

    /// Whether the account already has a `charge` for this order key today.
    pub async fn already_charged_today(
        &self,
        id: &str,
        order_key: &str,
    ) -> Result<bool, LedgerError> {
        let account = self.account(id).await?;
        let today = self.day_of(Utc::now());
        Ok(account.history.iter().any(|e| {
            e.entry_type == EntryType::Charge
                && e.order_key.as_deref() == Some(order_key)
                && self.day_of(e.timestamp) == today
        }))
    }

    // ── Rates ───────────────────────────────────────────────────────

    pub async fn rates(&self) -> Result<RateTable, LedgerError> {
        Ok(RateTable::new(self.db.get_rates().await?))
    }

    /// Change an existing rate. Returns the tag as stored.
    pub async fn set_rate(&self, tag: &str, amount: Decimal) -> Result<String, LedgerError> {
        validate_rate(amount, "set_rate")?;
        let table = self.rates().await?;
        let Some(existing) = table.canonical_tag(tag.trim()) else {
            return Err(LedgerError::UnknownRate {
                tag: tag.trim().to_string(),
                existing: table.tags(),
            });
        };
        let existing = existing.to_string();
        self.db.upsert_rate(&existing, amount).await?;
        Ok(existing)
    }

    /// Add a new rate tag. Fails if the tag exists in any letter case.
    pub async fn add_rate(&self, tag: &str, amount: Decimal) -> Result<String, LedgerError> {
        validate_rate(amount, "add_rate")?;
        let tag = tag.trim();
        if tag.is_empty() {
            return Err(LedgerError::UnknownRate {
                tag: String::new(),
                existing: self.rates().await?.tags(),
            });
        }
        let table = self.rates().await?;
        if let Some(existing) = table.canonical_tag(tag) {
            return Err(LedgerError::RateExists(existing.to_string()));
        }
        self.db.upsert_rate(tag, amount).await?;
        Ok(tag.to_string())
    }

    // ── Persistence ─────────────────────────────────────────────────

    /// Load (or create), apply `op`, prune and save with a version check.
    ///
    /// `op` returns false to leave the account untouched; nothing is saved then.
    async fn mutate<F>(&self, id: &str, mut op: F) -> Result<Account, LedgerError>
    where
        F: FnMut(&mut Account, DateTime<Utc>) -> bool + Send,
    {
        let id = validate_id(id)?;

        for attempt in 1..=MAX_SAVE_ATTEMPTS {
            let now = Utc::now();
            let stored = self.db.get_account(id).await?;
            let exists = stored.is_some();
            let mut account = stored.unwrap_or_else(|| Account::new(id, now));
            let expected = account.version;

            if !op(&mut account, now) {
                return Ok(account);
            }

            account.prune_history(now - self.history_window);
            account.updated_at = now;
            account.version = expected + 1;

            let saved = if exists {
                self.db.update_account(&account, expected).await?
            } else {
                self.db.insert_account(&account).await?
            };
            if saved {
                return Ok(account);
            }
            debug!(account = %id, attempt, "Account changed underneath, retrying");
        }

        warn!(account = %id, "Giving up after repeated version conflicts");
        Err(LedgerError::Conflict {
            id: id.to_string(),
            attempts: MAX_SAVE_ATTEMPTS,
        })
    }
}

fn validate_id(id: &str) -> Result<&str, LedgerError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        return Err(LedgerError::InvalidAccountId(id.to_string()));
    }
    Ok(trimmed)
}

fn validate_rate(amount: Decimal, operation: &'static str) -> Result<(), LedgerError> {
    if amount < Decimal::ZERO {
        return Err(LedgerError::InvalidAmount { operation, amount });
    }
    Ok(())
}

// ── State transitions ───────────────────────────────────────────────

/// Take `amount` from the balance; whatever the balance cannot cover becomes due.
fn debit(acc: &mut Account, amount: Decimal) {
    if acc.balance >= amount {
        acc.balance -= amount;
    } else {
        acc.due += amount - acc.balance;
        acc.balance = Decimal::ZERO;
    }
}

pub(crate) fn apply_deposit(acc: &mut Account, amount: Decimal, reason: &str, now: DateTime<Utc>) {
    acc.balance += amount;
    if acc.due > Decimal::ZERO {
        let cleared = acc.due.min(acc.balance);
        if cleared > Decimal::ZERO {
            acc.due -= cleared;
            acc.balance -= cleared;
            acc.history.push(LedgerEntry::new(
                EntryType::DueClear,
                cleared,
                "Auto clear due on deposit",
                now,
            ));
        }
    }
    acc.history
        .push(LedgerEntry::new(EntryType::Deposit, amount, reason, now));
}

pub(crate) fn apply_charge(acc: &mut Account, rate: Decimal, ctx: &ChargeContext, now: DateTime<Utc>) {
    debit(acc, rate);
    acc.history.push(
        LedgerEntry::new(EntryType::Charge, rate, ctx.reason.as_str(), now).with_order(&ctx.order),
    );
}

pub(crate) fn apply_manual_charge(
    acc: &mut Account,
    amount: Decimal,
    reason: &str,
    now: DateTime<Utc>,
) {
    debit(acc, amount);
    acc.history
        .push(LedgerEntry::new(EntryType::ManualCharge, amount, reason, now));
}

pub(crate) fn apply_refund(
    acc: &mut Account,
    amount: Decimal,
    reason: &str,
    order: &OrderContext,
    now: DateTime<Utc>,
) {
    if acc.due > Decimal::ZERO {
        let reduced = acc.due.min(amount);
        acc.due -= reduced;
        acc.balance += amount - reduced;
    } else {
        acc.balance += amount;
    }
    acc.history
        .push(LedgerEntry::new(EntryType::Refund, amount, reason, now).with_order(order));
}
