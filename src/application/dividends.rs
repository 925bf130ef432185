use super::audit::AuditTrail;
use crate::domain::dividend::{DividendDistribution, DividendPayment};
use crate::domain::money::Amount;
use crate::domain::ports::DatabaseRef;
use crate::error::{PlatformError, Result};
use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Rental income fan-out to token holders' wallets.
pub struct DividendService {
    db: DatabaseRef,
    audit: Arc<AuditTrail>,
}

impl DividendService {
    pub fn new(db: DatabaseRef, audit: Arc<AuditTrail>) -> Self {
        Self { db, audit }
    }

    /// Snapshots current holdings into one pending payment row per holder.
    pub async fn create_distribution(
        &self,
        tokenization_id: Uuid,
        total_amount: Amount,
        now: DateTime<Utc>,
    ) -> Result<(DividendDistribution, Vec<DividendPayment>)> {
        let tokenization = self
            .db
            .get_tokenization(tokenization_id)
            .await?
            .ok_or_else(|| PlatformError::not_found("Tokenization", tokenization_id))?;
        if !tokenization.has_holders() {
            return Err(PlatformError::InvalidState(format!(
                "Tokenization {} has not been minted",
                tokenization_id
            )));
        }
        let holdings = self.db.list_holdings(tokenization_id).await?;
        let (distribution, payments) =
            DividendDistribution::plan(tokenization_id, total_amount, &holdings, now)?;
        self.db
            .create_distribution(distribution.clone(), payments.clone())
            .await?;
        info!(
            distribution = %distribution.id,
            recipients = distribution.recipients,
            amount = %total_amount,
            "dividend distribution created"
        );
        Ok((distribution, payments))
    }

    /// Pays every unpaid row in turn. A row that fails is recorded and the
    /// loop moves on; running it again retries only the failed rows.
    pub async fn process_distribution(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<DividendDistribution> {
        self.get(id).await?;
        let payments = self.db.list_dividend_payments(id).await?;
        for payment in payments.iter().filter(|p| p.is_payable()) {
            if let Err(e) = self.db.pay_dividend(payment.id, now).await {
                warn!(
                    payment = %payment.id,
                    recipient = %payment.recipient_id,
                    error = %e,
                    "dividend payment failed"
                );
                self.db
                    .mark_dividend_failed(payment.id, e.to_string())
                    .await?;
            }
        }

        let distribution = self.db.finalize_distribution(id, now).await?;
        info!(
            distribution = %id,
            status = ?distribution.status,
            successful = distribution.successful_payments,
            failed = distribution.failed_payments,
            "dividend distribution processed"
        );
        self.audit
            .record(
                "dividends_distributed",
                json!({
                    "distribution_id": id,
                    "status": distribution.status,
                    "successful_payments": distribution.successful_payments,
                    "failed_payments": distribution.failed_payments,
                }),
            )
            .await;
        Ok(distribution)
    }

    /// Pays a single row on its recipient's request.
    pub async fn claim(
        &self,
        payment_id: Uuid,
        claimant: Uuid,
        now: DateTime<Utc>,
    ) -> Result<DividendPayment> {
        let payment = self
            .db
            .get_dividend_payment(payment_id)
            .await?
            .ok_or_else(|| PlatformError::not_found("Dividend payment", payment_id))?;
        if payment.recipient_id != claimant {
            return Err(PlatformError::Unauthorized(format!(
                "Dividend payment {} belongs to another holder",
                payment_id
            )));
        }
        let paid = self.db.pay_dividend(payment_id, now).await?;
        self.db
            .finalize_distribution(paid.distribution_id, now)
            .await?;
        Ok(paid)
    }

    pub async fn get(&self, id: Uuid) -> Result<DividendDistribution> {
        self.db
            .get_distribution(id)
            .await?
            .ok_or_else(|| PlatformError::not_found("Dividend distribution", id))
    }

    pub async fn payments(&self, id: Uuid) -> Result<Vec<DividendPayment>> {
        self.db.list_dividend_payments(id).await
    }
}
