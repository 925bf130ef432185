use super::Settings;
use super::audit::AuditTrail;
use crate::domain::money::Amount;
use crate::domain::ports::{
    CheckoutRequest, CheckoutSession, DatabaseRef, GatewayPaymentStatus, PaymentGatewayRef,
    TransferReceipt, TransferRequest,
};
use crate::domain::wallet::{TopUpStatus, Wallet, WalletStatus, WalletTopUp};
use crate::error::{PlatformError, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct TopUpSession {
    pub top_up: WalletTopUp,
    pub checkout: CheckoutSession,
}

#[derive(Debug, Clone, Serialize)]
pub struct BankWithdrawal {
    pub reference: String,
    pub wallet: Wallet,
    pub transfer: TransferReceipt,
}

/// Funding the wallet through the gateway and paying it out to a bank.
pub struct WalletService {
    db: DatabaseRef,
    gateway: PaymentGatewayRef,
    audit: Arc<AuditTrail>,
    settings: Settings,
}

impl WalletService {
    pub fn new(
        db: DatabaseRef,
        gateway: PaymentGatewayRef,
        audit: Arc<AuditTrail>,
        settings: Settings,
    ) -> Self {
        Self {
            db,
            gateway,
            audit,
            settings,
        }
    }

    /// Returns the wallet, or an empty one for users that never funded it.
    pub async fn wallet(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<Wallet> {
        self.db
            .get_user(user_id)
            .await?
            .ok_or_else(|| PlatformError::not_found("User", user_id))?;
        Ok(self
            .db
            .get_wallet(user_id)
            .await?
            .unwrap_or_else(|| Wallet::new(user_id, now)))
    }

    pub async fn set_frozen(
        &self,
        user_id: Uuid,
        frozen: bool,
        now: DateTime<Utc>,
    ) -> Result<Wallet> {
        let status = if frozen {
            WalletStatus::Frozen
        } else {
            WalletStatus::Active
        };
        let wallet = self.db.set_wallet_status(user_id, status, now).await?;
        info!(user = %user_id, ?status, "wallet status changed");
        Ok(wallet)
    }

    pub async fn start_top_up(
        &self,
        user_id: Uuid,
        amount: Amount,
        now: DateTime<Utc>,
    ) -> Result<TopUpSession> {
        let user = self
            .db
            .get_user(user_id)
            .await?
            .ok_or_else(|| PlatformError::not_found("User", user_id))?;
        let top_up = WalletTopUp::new(user_id, amount, now);
        self.db.insert_top_up(top_up.clone()).await?;

        let checkout = self
            .gateway
            .initialize(CheckoutRequest {
                email: user.email,
                amount,
                reference: top_up.reference.clone(),
                callback_url: self.settings.callback_url.clone(),
                metadata: json!({ "purpose": "wallet_top_up", "user_id": user_id }),
            })
            .await;
        match checkout {
            Ok(checkout) => Ok(TopUpSession { top_up, checkout }),
            Err(e) => {
                self.db.fail_top_up(&top_up.reference).await?;
                Err(e)
            }
        }
    }

    /// Credits the wallet once the gateway reports success. Replays are
    /// harmless: the credit is journaled under the top-up reference.
    pub async fn verify_top_up(&self, reference: &str, now: DateTime<Utc>) -> Result<WalletTopUp> {
        let top_up = self
            .db
            .get_top_up(reference)
            .await?
            .ok_or_else(|| PlatformError::not_found("Wallet top-up", reference))?;
        if top_up.status != TopUpStatus::Pending {
            return Ok(top_up);
        }

        let verification = self.gateway.verify(reference).await?;
        match verification.status {
            GatewayPaymentStatus::Success if verification.amount >= top_up.amount.value() => {
                let settled = self.db.settle_top_up(reference, now).await?;
                info!(reference, amount = %settled.amount, "wallet topped up");
                self.audit
                    .record(
                        "wallet_topped_up",
                        json!({ "user_id": settled.user_id, "amount": settled.amount }),
                    )
                    .await;
                Ok(settled)
            }
            GatewayPaymentStatus::Success => {
                warn!(reference, captured = %verification.amount, "top-up amount mismatch");
                self.db.fail_top_up(reference).await
            }
            GatewayPaymentStatus::Failed | GatewayPaymentStatus::Abandoned => {
                self.db.fail_top_up(reference).await
            }
            GatewayPaymentStatus::Pending => Ok(top_up),
        }
    }

    /// Debits the wallet, then asks the gateway to pay the bank recipient.
    /// A rejected transfer puts the money back.
    pub async fn withdraw_to_bank(
        &self,
        user_id: Uuid,
        amount: Amount,
        recipient_code: String,
        now: DateTime<Utc>,
    ) -> Result<BankWithdrawal> {
        let id = Uuid::new_v4().simple();
        let reference = format!("withdrawal_{}", id);
        self.db
            .debit_wallet(user_id, amount, reference.clone(), now)
            .await?;

        let transfer = self
            .gateway
            .transfer(TransferRequest {
                recipient_code,
                amount,
                reference: reference.clone(),
                reason: "Wallet withdrawal".to_string(),
            })
            .await;
        match transfer {
            Ok(transfer) => {
                let wallet = self.wallet(user_id, now).await?;
                info!(user = %user_id, %amount, "bank withdrawal initiated");
                Ok(BankWithdrawal {
                    reference,
                    wallet,
                    transfer,
                })
            }
            Err(e) => {
                warn!(user = %user_id, error = %e, "transfer rejected; reversing debit");
                self.db
                    .credit_wallet(user_id, amount, format!("withdrawal_reversal_{}", id), now)
                    .await?;
                Err(e)
            }
        }
    }
}
