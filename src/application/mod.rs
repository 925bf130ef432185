//! Application layer orchestrating the database procedures, the payment
//! gateway and the ledger.
//!
//! Each service owns `Arc` handles to the ports it needs. [`Services`] wires
//! them all from one set of ports so the HTTP layer and the CLI share a
//! single construction path.

pub mod audit;
pub mod dividends;
pub mod governance;
pub mod investments;
pub mod properties;
pub mod reservations;
pub mod tokenizations;
pub mod treasury;
pub mod wallets;

use crate::domain::ports::{DatabaseRef, LedgerClientRef, PaymentGatewayRef};
use audit::AuditTrail;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct Settings {
    /// How long a pending reservation holds its units.
    pub reservation_ttl: chrono::Duration,
    /// Where the gateway sends the payer after checkout.
    pub callback_url: Option<String>,
    /// Ledger topic receiving audit events. Auditing is off when unset.
    pub audit_topic: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            reservation_ttl: chrono::Duration::minutes(15),
            callback_url: None,
            audit_topic: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BatchFailure {
    pub id: Uuid,
    pub reason: String,
}

/// Aggregate result of a fan-out where each item succeeds or fails alone.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct BatchOutcome {
    pub succeeded: usize,
    pub failed: usize,
    pub failures: Vec<BatchFailure>,
}

impl BatchOutcome {
    pub fn success(&mut self) {
        self.succeeded += 1;
    }

    pub fn failure(&mut self, id: Uuid, reason: impl ToString) {
        self.failed += 1;
        self.failures.push(BatchFailure {
            id,
            reason: reason.to_string(),
        });
    }
}

#[derive(Clone)]
pub struct Services {
    pub db: DatabaseRef,
    pub properties: Arc<properties::PropertyService>,
    pub tokenizations: Arc<tokenizations::TokenizationService>,
    pub investments: Arc<investments::InvestmentService>,
    pub reservations: Arc<reservations::ReservationSweeper>,
    pub wallets: Arc<wallets::WalletService>,
    pub dividends: Arc<dividends::DividendService>,
    pub governance: Arc<governance::GovernanceService>,
    pub treasury: Arc<treasury::TreasuryService>,
}

impl Services {
    pub fn new(
        db: DatabaseRef,
        gateway: PaymentGatewayRef,
        ledger: LedgerClientRef,
        settings: Settings,
    ) -> Self {
        let audit = Arc::new(AuditTrail::new(ledger.clone(), settings.audit_topic.clone()));
        Self {
            properties: Arc::new(properties::PropertyService::new(db.clone(), ledger.clone())),
            tokenizations: Arc::new(tokenizations::TokenizationService::new(
                db.clone(),
                ledger,
                audit.clone(),
            )),
            investments: Arc::new(investments::InvestmentService::new(
                db.clone(),
                gateway.clone(),
                audit.clone(),
                settings.clone(),
            )),
            reservations: Arc::new(reservations::ReservationSweeper::new(
                db.clone(),
                audit.clone(),
            )),
            wallets: Arc::new(wallets::WalletService::new(
                db.clone(),
                gateway,
                audit.clone(),
                settings,
            )),
            dividends: Arc::new(dividends::DividendService::new(db.clone(), audit.clone())),
            governance: Arc::new(governance::GovernanceService::new(db.clone(), audit.clone())),
            treasury: Arc::new(treasury::TreasuryService::new(db.clone(), audit)),
            db,
        }
    }
}
