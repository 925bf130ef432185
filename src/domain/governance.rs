use crate::domain::money::Amount;
use crate::error::{PlatformError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const BPS_DENOMINATOR: u64 = 10_000;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    Active,
    Passed,
    Rejected,
    Executed,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum VoteChoice {
    For,
    Against,
    Abstain,
}

/// A holder proposal to spend treasury funds on the property.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct GovernanceProposal {
    pub id: Uuid,
    pub tokenization_id: Uuid,
    pub proposer_id: Uuid,
    pub title: String,
    pub description: String,
    pub budget: Amount,
    pub voting_start: DateTime<Utc>,
    pub voting_end: DateTime<Utc>,
    /// Share of total supply that must vote, in basis points.
    pub quorum_bps: u32,
    /// Share of for-votes among for+against, in basis points.
    pub approval_bps: u32,
    pub votes_for: u64,
    pub votes_against: u64,
    pub votes_abstain: u64,
    pub status: ProposalStatus,
    pub funds_locked: bool,
    pub created_at: DateTime<Utc>,
    pub finalized_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewProposal {
    pub tokenization_id: Uuid,
    pub proposer_id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub budget: Amount,
    pub voting_start: DateTime<Utc>,
    pub voting_end: DateTime<Utc>,
    pub quorum_bps: u32,
    pub approval_bps: u32,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Vote {
    pub proposal_id: Uuid,
    pub voter_id: Uuid,
    pub choice: VoteChoice,
    /// Units held by the voter when the vote was cast.
    pub weight: u64,
    pub cast_at: DateTime<Utc>,
}

impl GovernanceProposal {
    pub fn new(draft: NewProposal, now: DateTime<Utc>) -> Result<Self> {
        if draft.voting_end <= draft.voting_start {
            return Err(PlatformError::ValidationError(
                "Voting window must end after it starts".to_string(),
            ));
        }
        let bps_range = 1..=BPS_DENOMINATOR as u32;
        if !bps_range.contains(&draft.quorum_bps) || !bps_range.contains(&draft.approval_bps) {
            return Err(PlatformError::ValidationError(
                "Quorum and approval thresholds must be between 1 and 10000 bps".to_string(),
            ));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            tokenization_id: draft.tokenization_id,
            proposer_id: draft.proposer_id,
            title: draft.title,
            description: draft.description,
            budget: draft.budget,
            voting_start: draft.voting_start,
            voting_end: draft.voting_end,
            quorum_bps: draft.quorum_bps,
            approval_bps: draft.approval_bps,
            votes_for: 0,
            votes_against: 0,
            votes_abstain: 0,
            status: ProposalStatus::Active,
            funds_locked: false,
            created_at: now,
            finalized_at: None,
        })
    }

    pub fn tally(&mut self, vote: &Vote) -> Result<()> {
        if self.status != ProposalStatus::Active {
            return Err(PlatformError::InvalidState(format!(
                "Proposal {} is no longer accepting votes",
                self.id
            )));
        }
        if vote.cast_at < self.voting_start || vote.cast_at >= self.voting_end {
            return Err(PlatformError::ValidationError(format!(
                "Voting for proposal {} is open from {} to {}",
                self.id, self.voting_start, self.voting_end
            )));
        }
        if vote.weight == 0 {
            return Err(PlatformError::Unauthorized(
                "Only token holders can vote".to_string(),
            ));
        }
        match vote.choice {
            VoteChoice::For => self.votes_for += vote.weight,
            VoteChoice::Against => self.votes_against += vote.weight,
            VoteChoice::Abstain => self.votes_abstain += vote.weight,
        }
        Ok(())
    }

    pub fn turnout(&self) -> u64 {
        self.votes_for + self.votes_against + self.votes_abstain
    }

    /// Closes voting. Abstentions count towards quorum only.
    pub fn finalize(&mut self, total_supply: u64, now: DateTime<Utc>) -> Result<ProposalStatus> {
        if self.status != ProposalStatus::Active {
            return Err(PlatformError::InvalidState(format!(
                "Proposal {} was already finalized",
                self.id
            )));
        }
        if now < self.voting_end {
            return Err(PlatformError::InvalidState(format!(
                "Voting on proposal {} closes at {}",
                self.id, self.voting_end
            )));
        }
        let quorum_met = self.turnout() as u128 * BPS_DENOMINATOR as u128
            >= self.quorum_bps as u128 * total_supply as u128;
        let decisive = (self.votes_for + self.votes_against) as u128;
        let approved = decisive > 0
            && self.votes_for as u128 * BPS_DENOMINATOR as u128
                >= self.approval_bps as u128 * decisive;

        self.status = if quorum_met && approved {
            ProposalStatus::Passed
        } else {
            ProposalStatus::Rejected
        };
        self.finalized_at = Some(now);
        Ok(self.status)
    }

    pub fn mark_funds_locked(&mut self) -> Result<()> {
        if self.status != ProposalStatus::Passed || self.funds_locked {
            return Err(PlatformError::InvalidState(format!(
                "Funds for proposal {} cannot be locked in status {:?}",
                self.id, self.status
            )));
        }
        self.funds_locked = true;
        Ok(())
    }

    pub fn mark_executed(&mut self) -> Result<()> {
        if self.status != ProposalStatus::Passed || !self.funds_locked {
            return Err(PlatformError::InvalidState(format!(
                "Proposal {} must pass and lock funds before execution",
                self.id
            )));
        }
        self.status = ProposalStatus::Executed;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn proposal(now: DateTime<Utc>) -> GovernanceProposal {
        GovernanceProposal::new(
            NewProposal {
                tokenization_id: Uuid::new_v4(),
                proposer_id: Uuid::new_v4(),
                title: "Replace roof".to_string(),
                description: String::new(),
                budget: Amount::new(dec!(2000000)).unwrap(),
                voting_start: now,
                voting_end: now + Duration::days(7),
                quorum_bps: 5_000,
                approval_bps: 6_000,
            },
            now,
        )
        .unwrap()
    }

    fn vote(choice: VoteChoice, weight: u64, at: DateTime<Utc>) -> Vote {
        Vote {
            proposal_id: Uuid::nil(),
            voter_id: Uuid::new_v4(),
            choice,
            weight,
            cast_at: at,
        }
    }

    #[test]
    fn test_passes_with_quorum_and_approval() {
        let now = Utc::now();
        let mut p = proposal(now);
        p.tally(&vote(VoteChoice::For, 400, now)).unwrap();
        p.tally(&vote(VoteChoice::Against, 200, now)).unwrap();
        let status = p.finalize(1_000, now + Duration::days(8)).unwrap();
        assert_eq!(status, ProposalStatus::Passed);
    }

    #[test]
    fn test_rejected_without_quorum() {
        let now = Utc::now();
        let mut p = proposal(now);
        p.tally(&vote(VoteChoice::For, 400, now)).unwrap();
        let status = p.finalize(1_000, now + Duration::days(8)).unwrap();
        assert_eq!(status, ProposalStatus::Rejected);
    }

    #[test]
    fn test_abstain_counts_for_quorum_only() {
        let now = Utc::now();
        let mut p = proposal(now);
        p.tally(&vote(VoteChoice::Abstain, 500, now)).unwrap();
        p.tally(&vote(VoteChoice::For, 10, now)).unwrap();
        let status = p.finalize(1_000, now + Duration::days(8)).unwrap();
        assert_eq!(status, ProposalStatus::Passed);
    }

    #[test]
    fn test_vote_outside_window_rejected() {
        let now = Utc::now();
        let mut p = proposal(now);
        let late = vote(VoteChoice::For, 1, now + Duration::days(7));
        assert!(matches!(
            p.tally(&late),
            Err(PlatformError::ValidationError(_))
        ));
    }

    #[test]
    fn test_finalize_before_end_rejected() {
        let now = Utc::now();
        let mut p = proposal(now);
        assert!(matches!(
            p.finalize(1_000, now),
            Err(PlatformError::InvalidState(_))
        ));
    }

    #[test]
    fn test_execution_requires_locked_funds() {
        let now = Utc::now();
        let mut p = proposal(now);
        p.tally(&vote(VoteChoice::For, 900, now)).unwrap();
        p.finalize(1_000, now + Duration::days(8)).unwrap();
        assert!(p.mark_executed().is_err());
        p.mark_funds_locked().unwrap();
        assert!(p.mark_funds_locked().is_err());
        p.mark_executed().unwrap();
        assert_eq!(p.status, ProposalStatus::Executed);
    }
}
