use crate::domain::money::{Amount, Balance};
use crate::error::{PlatformError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Property treasury guarded by an N-of-M signer policy.
///
/// `available` funds can be locked for a passed proposal. A withdrawal linked
/// to a proposal settles the whole lock and hands back what it did not spend;
/// all others draw from `available`.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Treasury {
    pub tokenization_id: Uuid,
    pub available: Balance,
    pub locked: Balance,
    pub signers: BTreeSet<Uuid>,
    pub threshold: usize,
    pub updated_at: DateTime<Utc>,
}

impl Treasury {
    pub fn new(tokenization_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            tokenization_id,
            available: Balance::ZERO,
            locked: Balance::ZERO,
            signers: BTreeSet::new(),
            threshold: 0,
            updated_at: now,
        }
    }

    pub fn configure_signers(&mut self, signers: BTreeSet<Uuid>, threshold: usize) -> Result<()> {
        if threshold == 0 || threshold > signers.len() {
            return Err(PlatformError::ValidationError(format!(
                "Threshold must be between 1 and {} signers",
                signers.len()
            )));
        }
        self.signers = signers;
        self.threshold = threshold;
        Ok(())
    }

    pub fn is_signer(&self, user_id: Uuid) -> bool {
        self.signers.contains(&user_id)
    }

    pub fn deposit(&mut self, amount: Amount, now: DateTime<Utc>) {
        self.available += amount.into();
        self.updated_at = now;
    }

    pub fn lock(&mut self, amount: Amount, now: DateTime<Utc>) -> Result<()> {
        if !self.available.covers(amount) {
            return Err(PlatformError::InsufficientBalance {
                available: self.available.value(),
                required: amount.value(),
            });
        }
        self.available -= amount.into();
        self.locked += amount.into();
        self.updated_at = now;
        Ok(())
    }

    pub fn release(&mut self, amount: Amount, now: DateTime<Utc>) -> Result<()> {
        if !self.available.covers(amount) {
            return Err(PlatformError::InsufficientBalance {
                available: self.available.value(),
                required: amount.value(),
            });
        }
        self.available -= amount.into();
        self.updated_at = now;
        Ok(())
    }

    /// Pays `spent` out of a proposal's locked `budget` and returns the
    /// unspent remainder to `available`.
    pub fn settle_locked(
        &mut self,
        budget: Amount,
        spent: Amount,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if spent > budget {
            return Err(PlatformError::ValidationError(format!(
                "Withdrawal of {} exceeds the locked budget of {}",
                spent, budget
            )));
        }
        if !self.locked.covers(budget) {
            return Err(PlatformError::InsufficientBalance {
                available: self.locked.value(),
                required: budget.value(),
            });
        }
        self.locked -= budget.into();
        self.available += Balance::from(budget) - Balance::from(spent);
        self.updated_at = now;
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum WithdrawalStatus {
    Pending,
    Executed,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct TreasuryWithdrawal {
    pub id: Uuid,
    pub tokenization_id: Uuid,
    pub proposal_id: Option<Uuid>,
    pub recipient_id: Uuid,
    pub amount: Amount,
    pub reason: String,
    pub requested_by: Uuid,
    pub approvals: BTreeSet<Uuid>,
    pub status: WithdrawalStatus,
    pub created_at: DateTime<Utc>,
    pub executed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewWithdrawal {
    pub tokenization_id: Uuid,
    pub proposal_id: Option<Uuid>,
    pub recipient_id: Uuid,
    pub amount: Amount,
    #[serde(default)]
    pub reason: String,
    pub requested_by: Uuid,
}

impl TreasuryWithdrawal {
    /// The requesting signer's approval is recorded with the request.
    pub fn request(draft: NewWithdrawal, treasury: &Treasury, now: DateTime<Utc>) -> Result<Self> {
        if !treasury.is_signer(draft.requested_by) {
            return Err(PlatformError::Unauthorized(format!(
                "{} is not a treasury signer",
                draft.requested_by
            )));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            tokenization_id: draft.tokenization_id,
            proposal_id: draft.proposal_id,
            recipient_id: draft.recipient_id,
            amount: draft.amount,
            reason: draft.reason,
            requested_by: draft.requested_by,
            approvals: BTreeSet::from([draft.requested_by]),
            status: WithdrawalStatus::Pending,
            created_at: now,
            executed_at: None,
        })
    }

    pub fn approve(&mut self, signer: Uuid, treasury: &Treasury) -> Result<()> {
        self.ensure_pending()?;
        if !treasury.is_signer(signer) {
            return Err(PlatformError::Unauthorized(format!(
                "{} is not a treasury signer",
                signer
            )));
        }
        if !self.approvals.insert(signer) {
            return Err(PlatformError::Conflict(format!(
                "{} already approved withdrawal {}",
                signer, self.id
            )));
        }
        Ok(())
    }

    /// Approvals from signers removed since they approved do not count.
    pub fn valid_approvals(&self, treasury: &Treasury) -> usize {
        self.approvals
            .iter()
            .filter(|s| treasury.is_signer(**s))
            .count()
    }

    pub fn ensure_executable(&self, treasury: &Treasury) -> Result<()> {
        self.ensure_pending()?;
        let approvals = self.valid_approvals(treasury);
        if treasury.threshold == 0 || approvals < treasury.threshold {
            return Err(PlatformError::InsufficientApprovals {
                approvals,
                threshold: treasury.threshold,
            });
        }
        Ok(())
    }

    pub fn mark_executed(&mut self, now: DateTime<Utc>) {
        self.status = WithdrawalStatus::Executed;
        self.executed_at = Some(now);
    }

    fn ensure_pending(&self) -> Result<()> {
        if self.status != WithdrawalStatus::Pending {
            return Err(PlatformError::InvalidState(format!(
                "Withdrawal {} was already executed",
                self.id
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn treasury_with(signers: &[Uuid], threshold: usize) -> Treasury {
        let mut t = Treasury::new(Uuid::new_v4(), Utc::now());
        t.configure_signers(signers.iter().copied().collect(), threshold)
            .unwrap();
        t.deposit(Amount::new(dec!(1000)).unwrap(), Utc::now());
        t
    }

    fn withdrawal(t: &Treasury, by: Uuid) -> TreasuryWithdrawal {
        TreasuryWithdrawal::request(
            NewWithdrawal {
                tokenization_id: t.tokenization_id,
                proposal_id: None,
                recipient_id: Uuid::new_v4(),
                amount: Amount::new(dec!(100)).unwrap(),
                reason: "repairs".to_string(),
                requested_by: by,
            },
            t,
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn test_threshold_validation() {
        let mut t = Treasury::new(Uuid::new_v4(), Utc::now());
        let signers: BTreeSet<Uuid> = [Uuid::new_v4(), Uuid::new_v4()].into();
        assert!(t.configure_signers(signers.clone(), 3).is_err());
        assert!(t.configure_signers(signers.clone(), 0).is_err());
        assert!(t.configure_signers(signers, 2).is_ok());
    }

    #[test]
    fn test_execution_refused_below_threshold() {
        let signers = [Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()];
        let t = treasury_with(&signers, 2);
        let mut w = withdrawal(&t, signers[0]);
        assert!(matches!(
            w.ensure_executable(&t),
            Err(PlatformError::InsufficientApprovals {
                approvals: 1,
                threshold: 2
            })
        ));
        w.approve(signers[1], &t).unwrap();
        assert!(w.ensure_executable(&t).is_ok());
    }

    #[test]
    fn test_outsider_and_duplicate_approvals_rejected() {
        let signers = [Uuid::new_v4(), Uuid::new_v4()];
        let t = treasury_with(&signers, 2);
        let mut w = withdrawal(&t, signers[0]);
        assert!(matches!(
            w.approve(Uuid::new_v4(), &t),
            Err(PlatformError::Unauthorized(_))
        ));
        assert!(matches!(
            w.approve(signers[0], &t),
            Err(PlatformError::Conflict(_))
        ));
    }

    #[test]
    fn test_removed_signer_approval_not_counted() {
        let signers = [Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()];
        let mut t = treasury_with(&signers, 2);
        let mut w = withdrawal(&t, signers[0]);
        w.approve(signers[1], &t).unwrap();
        t.configure_signers([signers[1], signers[2]].into(), 2)
            .unwrap();
        assert_eq!(w.valid_approvals(&t), 1);
        assert!(w.ensure_executable(&t).is_err());
    }

    #[test]
    fn test_lock_and_release() {
        let mut t = treasury_with(&[Uuid::new_v4()], 1);
        t.lock(Amount::new(dec!(400)).unwrap(), Utc::now()).unwrap();
        assert_eq!(t.available, Balance::new(dec!(600)));
        assert_eq!(t.locked, Balance::new(dec!(400)));
        assert!(
            t.release(Amount::new(dec!(700)).unwrap(), Utc::now())
                .is_err()
        );
        t.release(Amount::new(dec!(600)).unwrap(), Utc::now())
            .unwrap();
        assert_eq!(t.available, Balance::ZERO);
        assert_eq!(t.locked, Balance::new(dec!(400)));
    }

    #[test]
    fn test_settling_a_lock_returns_the_unspent_budget() {
        let mut t = treasury_with(&[Uuid::new_v4()], 1);
        let budget = Amount::new(dec!(400)).unwrap();
        t.lock(budget, Utc::now()).unwrap();
        assert!(
            t.settle_locked(budget, Amount::new(dec!(401)).unwrap(), Utc::now())
                .is_err()
        );
        t.settle_locked(budget, Amount::new(dec!(150)).unwrap(), Utc::now())
            .unwrap();
        assert_eq!(t.locked, Balance::ZERO);
        assert_eq!(t.available, Balance::new(dec!(850)));
    }
}
