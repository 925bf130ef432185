use crate::domain::money::{Amount, Balance};
use crate::error::{PlatformError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum WalletStatus {
    Active,
    Frozen,
}

/// A user's internal NGN balance.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Wallet {
    pub user_id: Uuid,
    pub balance: Balance,
    pub status: WalletStatus,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    pub fn new(user_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            balance: Balance::ZERO,
            status: WalletStatus::Active,
            updated_at: now,
        }
    }

    pub fn credit(&mut self, amount: Amount, now: DateTime<Utc>) -> Result<()> {
        self.ensure_active()?;
        self.balance += amount.into();
        self.updated_at = now;
        Ok(())
    }

    /// Debits funds if the balance covers them.
    pub fn debit(&mut self, amount: Amount, now: DateTime<Utc>) -> Result<()> {
        self.ensure_active()?;
        if !self.balance.covers(amount) {
            return Err(PlatformError::InsufficientBalance {
                available: self.balance.value(),
                required: amount.value(),
            });
        }
        self.balance -= amount.into();
        self.updated_at = now;
        Ok(())
    }

    fn ensure_active(&self) -> Result<()> {
        match self.status {
            WalletStatus::Active => Ok(()),
            WalletStatus::Frozen => Err(PlatformError::WalletFrozen(self.user_id)),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum EntryDirection {
    Credit,
    Debit,
}

/// Journal row for one wallet movement. The reference is unique across the
/// journal, which makes credits and debits replay-safe.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct WalletEntry {
    pub reference: String,
    pub user_id: Uuid,
    pub direction: EntryDirection,
    pub amount: Amount,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, PartialEq, Clone)]
#[serde(rename_all = "snake_case", tag = "outcome", content = "wallet")]
pub enum WalletMovement {
    Applied(Wallet),
    /// The reference was already journaled; nothing changed.
    Duplicate(Wallet),
}

impl WalletMovement {
    pub fn wallet(&self) -> &Wallet {
        match self {
            Self::Applied(w) | Self::Duplicate(w) => w,
        }
    }

    pub fn was_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum TopUpStatus {
    Pending,
    Credited,
    Failed,
}

/// A wallet funding attempt through the payment gateway.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct WalletTopUp {
    pub reference: String,
    pub user_id: Uuid,
    pub amount: Amount,
    pub status: TopUpStatus,
    pub created_at: DateTime<Utc>,
}

impl WalletTopUp {
    pub const REFERENCE_PREFIX: &'static str = "topup_";

    pub fn new(user_id: Uuid, amount: Amount, now: DateTime<Utc>) -> Self {
        Self {
            reference: format!("{}{}", Self::REFERENCE_PREFIX, Uuid::new_v4().simple()),
            user_id,
            amount,
            status: TopUpStatus::Pending,
            created_at: now,
        }
    }

    pub fn is_top_up_reference(reference: &str) -> bool {
        reference.starts_with(Self::REFERENCE_PREFIX)
    }
}
