use crate::domain::money::Amount;
use crate::error::{PlatformError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum TokenizationStatus {
    Upcoming,
    Active,
    MintingReady,
    /// The ledger token is being created; only one caller gets here.
    Minting,
    Failed,
    Minted,
    Distributed,
}

/// A fundraising campaign selling fractional units of one property.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Tokenization {
    pub id: Uuid,
    pub property_id: Uuid,
    pub token_name: String,
    pub token_symbol: String,
    pub total_supply: u64,
    pub price_per_token: Amount,
    pub funding_start: DateTime<Utc>,
    pub funding_end: DateTime<Utc>,
    pub minimum_raise: Decimal,
    pub target_raise: Decimal,
    pub current_raise: Decimal,
    pub tokens_sold: u64,
    /// Units held by pending reservations.
    pub tokens_reserved: u64,
    pub status: TokenizationStatus,
    /// Ledger token id once minted.
    pub token_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewTokenization {
    pub property_id: Uuid,
    pub token_name: String,
    pub token_symbol: String,
    pub total_supply: u64,
    pub price_per_token: Amount,
    pub funding_start: DateTime<Utc>,
    pub funding_end: DateTime<Utc>,
    pub minimum_raise: Decimal,
    pub target_raise: Decimal,
}

impl Tokenization {
    pub fn new(draft: NewTokenization, now: DateTime<Utc>) -> Result<Self> {
        if draft.total_supply == 0 {
            return Err(PlatformError::ValidationError(
                "Total supply must be positive".to_string(),
            ));
        }
        if draft.funding_end <= draft.funding_start {
            return Err(PlatformError::ValidationError(
                "Funding window must end after it starts".to_string(),
            ));
        }
        if draft.minimum_raise < Decimal::ZERO || draft.minimum_raise > draft.target_raise {
            return Err(PlatformError::ValidationError(
                "Minimum raise must be between zero and the target raise".to_string(),
            ));
        }
        let symbol = draft.token_symbol.trim().to_uppercase();
        if symbol.is_empty() {
            return Err(PlatformError::ValidationError(
                "Token symbol is required".to_string(),
            ));
        }

        let mut tokenization = Self {
            id: Uuid::new_v4(),
            property_id: draft.property_id,
            token_name: draft.token_name,
            token_symbol: symbol,
            total_supply: draft.total_supply,
            price_per_token: draft.price_per_token,
            funding_start: draft.funding_start,
            funding_end: draft.funding_end,
            minimum_raise: draft.minimum_raise,
            target_raise: draft.target_raise,
            current_raise: Decimal::ZERO,
            tokens_sold: 0,
            tokens_reserved: 0,
            status: TokenizationStatus::Upcoming,
            token_id: None,
            created_at: now,
        };
        if now >= tokenization.funding_start {
            tokenization.status = TokenizationStatus::Active;
        }
        Ok(tokenization)
    }

    /// Units neither sold nor held by a live reservation.
    pub fn remaining_tokens(&self) -> u64 {
        self.total_supply
            .saturating_sub(self.tokens_sold)
            .saturating_sub(self.tokens_reserved)
    }

    pub fn is_accepting_investments(&self, now: DateTime<Utc>) -> bool {
        self.status == TokenizationStatus::Active
            && now >= self.funding_start
            && now < self.funding_end
    }

    /// Whole tokens purchasable with `amount`; any remainder is not charged
    /// against supply.
    pub fn tokens_for(&self, amount: Amount) -> Result<u64> {
        use rust_decimal::prelude::ToPrimitive;
        amount
            .value()
            .checked_div(self.price_per_token.value())
            .and_then(|units| units.floor().to_u64())
            .ok_or_else(|| {
                PlatformError::ValidationError(format!(
                    "{} buys more units than can be counted at {}",
                    amount, self.price_per_token
                ))
            })
    }

    pub fn activate(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.status != TokenizationStatus::Upcoming {
            return Err(self.transition_error("activate"));
        }
        if now < self.funding_start {
            return Err(PlatformError::InvalidState(format!(
                "Funding for {} opens at {}",
                self.token_symbol, self.funding_start
            )));
        }
        self.status = TokenizationStatus::Active;
        Ok(())
    }

    /// Closes funding once the window has elapsed or the supply is sold out.
    pub fn close_funding(&mut self, now: DateTime<Utc>) -> Result<TokenizationStatus> {
        if self.status != TokenizationStatus::Active {
            return Err(self.transition_error("close funding for"));
        }
        let sold_out = self.tokens_sold >= self.total_supply;
        if now < self.funding_end && !sold_out {
            return Err(PlatformError::InvalidState(format!(
                "Funding for {} is open until {}",
                self.token_symbol, self.funding_end
            )));
        }
        self.status = if self.current_raise >= self.minimum_raise {
            TokenizationStatus::MintingReady
        } else {
            TokenizationStatus::Failed
        };
        Ok(self.status)
    }

    pub fn begin_minting(&mut self) -> Result<()> {
        if self.status != TokenizationStatus::MintingReady {
            return Err(self.transition_error("mint"));
        }
        self.status = TokenizationStatus::Minting;
        Ok(())
    }

    /// Returns a failed minting attempt to `MintingReady` so it can be retried.
    pub fn abort_minting(&mut self) -> Result<()> {
        if self.status != TokenizationStatus::Minting {
            return Err(self.transition_error("abort minting for"));
        }
        self.status = TokenizationStatus::MintingReady;
        Ok(())
    }

    pub fn mark_minted(&mut self, token_id: String) -> Result<()> {
        if self.status != TokenizationStatus::Minting {
            return Err(self.transition_error("finish minting"));
        }
        self.token_id = Some(token_id);
        self.status = TokenizationStatus::Minted;
        Ok(())
    }

    pub fn mark_distributed(&mut self) -> Result<()> {
        if self.status != TokenizationStatus::Minted {
            return Err(self.transition_error("distribute"));
        }
        self.status = TokenizationStatus::Distributed;
        Ok(())
    }

    /// Holders exist only once units are on the ledger.
    pub fn has_holders(&self) -> bool {
        matches!(
            self.status,
            TokenizationStatus::Minted | TokenizationStatus::Distributed
        )
    }

    fn transition_error(&self, action: &str) -> PlatformError {
        PlatformError::InvalidState(format!(
            "Cannot {} tokenization {} in status {:?}",
            action, self.id, self.status
        ))
    }
}
