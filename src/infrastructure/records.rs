//! Row encoding shared by every storage backend.
//!
//! Rows are serialized with `serde_json` and addressed by `(Table, key)`.
//! A [`UnitOfWork`] buffers writes over a backend so a procedure either
//! commits all of its rows or none of them.

use crate::domain::dividend::{DividendDistribution, DividendPayment};
use crate::domain::governance::{GovernanceProposal, Vote};
use crate::domain::investment::{Investment, TokenHolding};
use crate::domain::property::{ChatMember, Notification, Property, User};
use crate::domain::tokenization::Tokenization;
use crate::domain::treasury::{Treasury, TreasuryWithdrawal};
use crate::domain::wallet::{Wallet, WalletEntry, WalletTopUp};
use crate::error::{PlatformError, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Table {
    Users,
    Properties,
    Tokenizations,
    Investments,
    Holdings,
    Notifications,
    ChatMembers,
    Wallets,
    WalletEntries,
    TopUps,
    Distributions,
    DividendPayments,
    Proposals,
    Votes,
    Treasuries,
    Withdrawals,
}

impl Table {
    pub const ALL: [Table; 16] = [
        Table::Users,
        Table::Properties,
        Table::Tokenizations,
        Table::Investments,
        Table::Holdings,
        Table::Notifications,
        Table::ChatMembers,
        Table::Wallets,
        Table::WalletEntries,
        Table::TopUps,
        Table::Distributions,
        Table::DividendPayments,
        Table::Proposals,
        Table::Votes,
        Table::Treasuries,
        Table::Withdrawals,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Table::Users => "users",
            Table::Properties => "properties",
            Table::Tokenizations => "tokenizations",
            Table::Investments => "investments",
            Table::Holdings => "token_holdings",
            Table::Notifications => "notifications",
            Table::ChatMembers => "chat_members",
            Table::Wallets => "wallets",
            Table::WalletEntries => "wallet_entries",
            Table::TopUps => "wallet_top_ups",
            Table::Distributions => "dividend_distributions",
            Table::DividendPayments => "dividend_payments",
            Table::Proposals => "governance_proposals",
            Table::Votes => "governance_votes",
            Table::Treasuries => "treasuries",
            Table::Withdrawals => "treasury_withdrawals",
        }
    }
}

pub trait Record: Serialize + DeserializeOwned {
    const TABLE: Table;
    const ENTITY: &'static str;

    fn key(&self) -> String;
}

pub fn holding_key(tokenization_id: Uuid, user_id: Uuid) -> String {
    format!("{}:{}", tokenization_id, user_id)
}

pub fn vote_key(proposal_id: Uuid, voter_id: Uuid) -> String {
    format!("{}:{}", proposal_id, voter_id)
}

pub fn chat_member_key(property_id: Uuid, user_id: Uuid) -> String {
    format!("{}:{}", property_id, user_id)
}

macro_rules! record {
    ($ty:ty, $table:expr, $entity:literal, |$r:ident| $key:expr) => {
        impl Record for $ty {
            const TABLE: Table = $table;
            const ENTITY: &'static str = $entity;

            fn key(&self) -> String {
                let $r = self;
                $key
            }
        }
    };
}

record!(User, Table::Users, "User", |r| r.id.to_string());
record!(Property, Table::Properties, "Property", |r| r.id.to_string());
record!(Tokenization, Table::Tokenizations, "Tokenization", |r| r.id.to_string());
record!(Investment, Table::Investments, "Investment", |r| r.id.to_string());
record!(TokenHolding, Table::Holdings, "Token holding", |r| {
    holding_key(r.tokenization_id, r.user_id)
});
record!(Notification, Table::Notifications, "Notification", |r| r.id.to_string());
record!(ChatMember, Table::ChatMembers, "Chat member", |r| {
    chat_member_key(r.property_id, r.user_id)
});
record!(Wallet, Table::Wallets, "Wallet", |r| r.user_id.to_string());
record!(WalletEntry, Table::WalletEntries, "Wallet entry", |r| r.reference.clone());
record!(WalletTopUp, Table::TopUps, "Wallet top-up", |r| r.reference.clone());
record!(DividendDistribution, Table::Distributions, "Dividend distribution", |r| r.id.to_string());
record!(DividendPayment, Table::DividendPayments, "Dividend payment", |r| r.id.to_string());
record!(GovernanceProposal, Table::Proposals, "Proposal", |r| r.id.to_string());
record!(Vote, Table::Votes, "Vote", |r| vote_key(r.proposal_id, r.voter_id));
record!(Treasury, Table::Treasuries, "Treasury", |r| r.tokenization_id.to_string());
record!(TreasuryWithdrawal, Table::Withdrawals, "Withdrawal", |r| r.id.to_string());

#[derive(Debug, Clone, PartialEq)]
pub struct RowWrite {
    pub table: Table,
    pub key: String,
    pub value: Vec<u8>,
}

/// Raw row storage. Implementations only need point reads, full-table scans
/// ordered by key, and an all-or-nothing batch commit.
pub trait KvBackend: Send + Sync {
    fn read(&self, table: Table, key: &str) -> Result<Option<Vec<u8>>>;
    fn scan(&self, table: Table) -> Result<Vec<(String, Vec<u8>)>>;
    fn commit(&self, writes: Vec<RowWrite>) -> Result<()>;
}

/// Read-your-writes view over a backend with buffered, uncommitted writes.
pub struct UnitOfWork<'a, B: KvBackend> {
    backend: &'a B,
    pending: BTreeMap<(Table, String), Vec<u8>>,
}

impl<'a, B: KvBackend> UnitOfWork<'a, B> {
    pub fn new(backend: &'a B) -> Self {
        Self {
            backend,
            pending: BTreeMap::new(),
        }
    }

    pub fn get<T: Record>(&self, key: &str) -> Result<Option<T>> {
        let bytes = match self.pending.get(&(T::TABLE, key.to_string())) {
            Some(bytes) => Some(bytes.clone()),
            None => self.backend.read(T::TABLE, key)?,
        };
        bytes
            .map(|b| serde_json::from_slice(&b).map_err(PlatformError::from))
            .transpose()
    }

    pub fn require<T: Record>(&self, key: &str) -> Result<T> {
        self.get(key)?
            .ok_or_else(|| PlatformError::not_found(T::ENTITY, key))
    }

    pub fn put<T: Record>(&mut self, record: &T) -> Result<()> {
        let value = serde_json::to_vec(record)?;
        self.pending.insert((T::TABLE, record.key()), value);
        Ok(())
    }

    pub fn insert_new<T: Record>(&mut self, record: &T) -> Result<()> {
        let key = record.key();
        if self.get::<T>(&key)?.is_some() {
            return Err(PlatformError::Conflict(format!(
                "{} {} already exists",
                T::ENTITY,
                key
            )));
        }
        self.put(record)
    }

    pub fn scan<T: Record>(&self) -> Result<Vec<T>> {
        let mut rows: BTreeMap<String, Vec<u8>> =
            self.backend.scan(T::TABLE)?.into_iter().collect();
        for ((table, key), value) in &self.pending {
            if *table == T::TABLE {
                rows.insert(key.clone(), value.clone());
            }
        }
        rows.values()
            .map(|b| serde_json::from_slice(b).map_err(PlatformError::from))
            .collect()
    }

    pub fn into_writes(self) -> Vec<RowWrite> {
        self.pending
            .into_iter()
            .map(|((table, key), value)| RowWrite { table, key, value })
            .collect()
    }
}
