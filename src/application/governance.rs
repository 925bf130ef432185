use super::audit::AuditTrail;
use crate::domain::governance::{GovernanceProposal, NewProposal, Vote, VoteChoice};
use crate::domain::ports::DatabaseRef;
use crate::domain::treasury::Treasury;
use crate::error::{PlatformError, Result};
use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Holder-weighted proposals for spending treasury funds.
pub struct GovernanceService {
    db: DatabaseRef,
    audit: Arc<AuditTrail>,
}

impl GovernanceService {
    pub fn new(db: DatabaseRef, audit: Arc<AuditTrail>) -> Self {
        Self { db, audit }
    }

    pub async fn create_proposal(
        &self,
        draft: NewProposal,
        now: DateTime<Utc>,
    ) -> Result<GovernanceProposal> {
        let holding = self
            .db
            .get_holding(draft.proposer_id, draft.tokenization_id)
            .await?;
        if holding.is_none_or(|h| h.tokens == 0) {
            return Err(PlatformError::Unauthorized(format!(
                "{} holds no units of tokenization {}",
                draft.proposer_id, draft.tokenization_id
            )));
        }
        let proposal = GovernanceProposal::new(draft, now)?;
        self.db.insert_proposal(proposal.clone()).await?;
        info!(proposal = %proposal.id, budget = %proposal.budget, "proposal created");
        self.audit
            .record(
                "proposal_created",
                json!({
                    "proposal_id": proposal.id,
                    "tokenization_id": proposal.tokenization_id,
                    "budget": proposal.budget,
                }),
            )
            .await;
        Ok(proposal)
    }

    pub async fn cast_vote(
        &self,
        proposal_id: Uuid,
        voter_id: Uuid,
        choice: VoteChoice,
        now: DateTime<Utc>,
    ) -> Result<GovernanceProposal> {
        // Weight is filled in from the voter's holding by the store.
        self.db
            .record_vote(Vote {
                proposal_id,
                voter_id,
                choice,
                weight: 0,
                cast_at: now,
            })
            .await
    }

    pub async fn finalize(&self, id: Uuid, now: DateTime<Utc>) -> Result<GovernanceProposal> {
        let proposal = self.db.finalize_proposal(id, now).await?;
        info!(
            proposal = %id,
            status = ?proposal.status,
            turnout = proposal.turnout(),
            "proposal finalized"
        );
        self.audit
            .record(
                "proposal_finalized",
                json!({
                    "proposal_id": id,
                    "status": proposal.status,
                    "votes_for": proposal.votes_for,
                    "votes_against": proposal.votes_against,
                    "votes_abstain": proposal.votes_abstain,
                }),
            )
            .await;
        Ok(proposal)
    }

    /// Sets aside the budget of a passed proposal in the treasury.
    pub async fn lock_funds(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(GovernanceProposal, Treasury)> {
        let (proposal, treasury) = self.db.lock_proposal_funds(id, now).await?;
        self.audit
            .record(
                "proposal_funds_locked",
                json!({ "proposal_id": id, "amount": proposal.budget }),
            )
            .await;
        Ok((proposal, treasury))
    }

    pub async fn get(&self, id: Uuid) -> Result<GovernanceProposal> {
        self.db
            .get_proposal(id)
            .await?
            .ok_or_else(|| PlatformError::not_found("Proposal", id))
    }
}
