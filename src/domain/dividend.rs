use crate::domain::investment::TokenHolding;
use crate::domain::money::{Amount, floor_kobo};
use crate::error::{PlatformError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum DistributionStatus {
    Pending,
    Completed,
    PartiallyCompleted,
    Failed,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum DividendPaymentStatus {
    Pending,
    Completed,
    Failed,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct DividendDistribution {
    pub id: Uuid,
    pub tokenization_id: Uuid,
    pub total_amount: Amount,
    /// Informational; payments are allocated to the kobo from `total_amount`.
    pub per_token_amount: Decimal,
    pub total_tokens: u64,
    pub recipients: usize,
    pub successful_payments: usize,
    pub failed_payments: usize,
    pub status: DistributionStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct DividendPayment {
    pub id: Uuid,
    pub distribution_id: Uuid,
    pub recipient_id: Uuid,
    pub tokens_held: u64,
    pub amount: Amount,
    pub status: DividendPaymentStatus,
    pub failure_reason: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl DividendPayment {
    /// Wallet journal reference; one credit per payment row.
    pub fn wallet_reference(&self) -> String {
        format!("dividend:{}", self.id)
    }

    pub fn is_payable(&self) -> bool {
        matches!(
            self.status,
            DividendPaymentStatus::Pending | DividendPaymentStatus::Failed
        )
    }

    pub fn complete(&mut self, now: DateTime<Utc>) -> Result<()> {
        if !self.is_payable() {
            return Err(PlatformError::Conflict(format!(
                "Dividend payment {} was already paid",
                self.id
            )));
        }
        self.status = DividendPaymentStatus::Completed;
        self.failure_reason = None;
        self.paid_at = Some(now);
        Ok(())
    }

    pub fn fail(&mut self, reason: String) {
        if self.status != DividendPaymentStatus::Completed {
            self.status = DividendPaymentStatus::Failed;
            self.failure_reason = Some(reason);
        }
    }
}

impl DividendDistribution {
    /// Builds a distribution and its payment rows from current holdings.
    ///
    /// Amounts are allocated in whole kobo by largest remainder, so the rows
    /// always sum to `total_amount` exactly. Holders whose share rounds to
    /// zero kobo get no row.
    pub fn plan(
        tokenization_id: Uuid,
        total_amount: Amount,
        holdings: &[TokenHolding],
        now: DateTime<Utc>,
    ) -> Result<(Self, Vec<DividendPayment>)> {
        if floor_kobo(total_amount.value()) != total_amount.value() {
            return Err(PlatformError::ValidationError(
                "Dividend amount must be in whole kobo".to_string(),
            ));
        }
        let mut holders: Vec<&TokenHolding> = holdings.iter().filter(|h| h.tokens > 0).collect();
        if holders.is_empty() {
            return Err(PlatformError::ValidationError(format!(
                "Tokenization {} has no token holders",
                tokenization_id
            )));
        }
        holders.sort_by_key(|h| h.user_id);

        let total_tokens: u64 = holders.iter().map(|h| h.tokens).sum();
        let total_kobo = total_amount.to_kobo()? as i128;
        let denominator = total_tokens as i128;

        let mut shares: Vec<(i128, i128)> = holders
            .iter()
            .map(|h| {
                let exact = total_kobo * h.tokens as i128;
                (exact / denominator, exact % denominator)
            })
            .collect();

        let allocated: i128 = shares.iter().map(|(base, _)| base).sum();
        let mut leftover = total_kobo - allocated;
        let mut order: Vec<usize> = (0..holders.len()).collect();
        order.sort_by(|&a, &b| {
            shares[b]
                .1
                .cmp(&shares[a].1)
                .then(holders[b].tokens.cmp(&holders[a].tokens))
        });
        for idx in order {
            if leftover == 0 {
                break;
            }
            shares[idx].0 += 1;
            leftover -= 1;
        }

        let distribution_id = Uuid::new_v4();
        let payments: Vec<DividendPayment> = holders
            .iter()
            .zip(shares.iter())
            .filter(|(_, (kobo, _))| *kobo > 0)
            .map(|(holding, (kobo, _))| {
                Ok(DividendPayment {
                    id: Uuid::new_v4(),
                    distribution_id,
                    recipient_id: holding.user_id,
                    tokens_held: holding.tokens,
                    amount: Amount::from_kobo(*kobo as i64)?,
                    status: DividendPaymentStatus::Pending,
                    failure_reason: None,
                    paid_at: None,
                })
            })
            .collect::<Result<_>>()?;

        let distribution = Self {
            id: distribution_id,
            tokenization_id,
            total_amount,
            per_token_amount: (total_amount.value() / Decimal::from(total_tokens)).round_dp(6),
            total_tokens,
            recipients: payments.len(),
            successful_payments: 0,
            failed_payments: 0,
            status: DistributionStatus::Pending,
            created_at: now,
            completed_at: None,
        };
        Ok((distribution, payments))
    }

    /// Recomputes counters and status from the payment rows.
    pub fn settle(&mut self, payments: &[DividendPayment], now: DateTime<Utc>) {
        self.successful_payments = payments
            .iter()
            .filter(|p| p.status == DividendPaymentStatus::Completed)
            .count();
        self.failed_payments = payments
            .iter()
            .filter(|p| p.status == DividendPaymentStatus::Failed)
            .count();
        let pending = payments.len() - self.successful_payments - self.failed_payments;

        self.status = if pending > 0 {
            DistributionStatus::Pending
        } else if self.failed_payments == 0 {
            DistributionStatus::Completed
        } else if self.successful_payments == 0 {
            DistributionStatus::Failed
        } else {
            DistributionStatus::PartiallyCompleted
        };
        if self.status != DistributionStatus::Pending {
            self.completed_at = Some(now);
        }
    }
}
