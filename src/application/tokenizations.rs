use super::BatchOutcome;
use super::audit::AuditTrail;
use crate::domain::investment::{Investment, PaymentStatus};
use crate::domain::ports::{DatabaseRef, LedgerClientRef, TokenDefinition};
use crate::domain::property::PropertyStatus;
use crate::domain::tokenization::{NewTokenization, Tokenization, TokenizationStatus};
use crate::error::{PlatformError, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Result of comparing a recorded holding with the ledger balance.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HoldingReconciliation {
    pub user_id: Uuid,
    pub tokenization_id: Uuid,
    pub recorded: u64,
    pub on_ledger: u64,
    pub in_sync: bool,
}

/// Campaign lifecycle from creation through on-ledger distribution.
pub struct TokenizationService {
    db: DatabaseRef,
    ledger: LedgerClientRef,
    audit: Arc<AuditTrail>,
}

impl TokenizationService {
    pub fn new(db: DatabaseRef, ledger: LedgerClientRef, audit: Arc<AuditTrail>) -> Self {
        Self { db, ledger, audit }
    }

    pub async fn create(&self, draft: NewTokenization, now: DateTime<Utc>) -> Result<Tokenization> {
        let property = self
            .db
            .get_property(draft.property_id)
            .await?
            .ok_or_else(|| PlatformError::not_found("Property", draft.property_id))?;
        if property.status != PropertyStatus::Approved {
            return Err(PlatformError::InvalidState(format!(
                "Property {} is not approved for tokenization",
                property.id
            )));
        }
        let tokenization = Tokenization::new(draft, now)?;
        self.db.insert_tokenization(tokenization.clone()).await?;
        info!(
            tokenization = %tokenization.id,
            symbol = %tokenization.token_symbol,
            supply = tokenization.total_supply,
            "tokenization created"
        );
        self.audit
            .record(
                "tokenization_created",
                json!({
                    "tokenization_id": tokenization.id,
                    "property_id": tokenization.property_id,
                    "total_supply": tokenization.total_supply,
                }),
            )
            .await;
        Ok(tokenization)
    }

    pub async fn get(&self, id: Uuid) -> Result<Tokenization> {
        self.db
            .get_tokenization(id)
            .await?
            .ok_or_else(|| PlatformError::not_found("Tokenization", id))
    }

    pub async fn list(&self) -> Result<Vec<Tokenization>> {
        self.db.list_tokenizations().await
    }

    pub async fn activate(&self, id: Uuid, now: DateTime<Utc>) -> Result<Tokenization> {
        self.db.activate_tokenization(id, now).await
    }

    /// Ends funding. Expired holds are released first; live holds block
    /// closing until they settle or expire.
    pub async fn close_funding(&self, id: Uuid, now: DateTime<Utc>) -> Result<Tokenization> {
        let tokenization = self.db.close_funding(id, now).await?;
        let status = tokenization.status;
        info!(tokenization = %id, ?status, raise = %tokenization.current_raise, "funding closed");
        self.audit
            .record(
                "funding_closed",
                json!({
                    "tokenization_id": id,
                    "status": status,
                    "current_raise": tokenization.current_raise,
                }),
            )
            .await;
        Ok(tokenization)
    }

    /// Creates the ledger token and mints exactly the units sold. The
    /// campaign is claimed before the ledger is touched, so concurrent calls
    /// mint once.
    pub async fn mint(&self, id: Uuid) -> Result<Tokenization> {
        let claimed = self.db.begin_minting(id).await?;
        let (token_id, mint_tx) = match self.mint_on_ledger(&claimed).await {
            Ok(minted) => minted,
            Err(e) => {
                warn!(tokenization = %id, error = %e, "minting failed");
                self.db.abort_minting(id).await?;
                return Err(e);
            }
        };
        let tokenization = self.db.finish_minting(id, token_id.clone()).await?;
        info!(tokenization = %id, token = %token_id, units = tokenization.tokens_sold, "minted");
        self.audit
            .record(
                "tokens_minted",
                json!({
                    "tokenization_id": id,
                    "token_id": token_id,
                    "units": tokenization.tokens_sold,
                    "transaction_id": mint_tx,
                }),
            )
            .await;
        Ok(tokenization)
    }

    async fn mint_on_ledger(&self, tokenization: &Tokenization) -> Result<(String, String)> {
        let token_id = self
            .ledger
            .create_token(TokenDefinition {
                name: tokenization.token_name.clone(),
                symbol: tokenization.token_symbol.clone(),
                decimals: 0,
                memo: format!("property:{}", tokenization.property_id),
            })
            .await?;
        let mint_tx = self
            .ledger
            .mint_tokens(&token_id, tokenization.tokens_sold)
            .await?;
        Ok((token_id, mint_tx))
    }

    /// Transfers minted units to every confirmed investor. Each investment
    /// is claimed before its transfer and succeeds or fails on its own;
    /// investments another caller is delivering are skipped. The campaign is
    /// marked distributed once no confirmed investment is left.
    pub async fn distribute_tokens(&self, id: Uuid) -> Result<BatchOutcome> {
        let tokenization = self.get(id).await?;
        let token_id = match (&tokenization.status, &tokenization.token_id) {
            (TokenizationStatus::Minted, Some(token_id)) => token_id.clone(),
            _ => {
                return Err(PlatformError::InvalidState(format!(
                    "Tokenization {} has not been minted",
                    id
                )));
            }
        };

        let investments = self.db.list_investments(id).await?;
        let mut outcome = BatchOutcome::default();
        for investment in investments
            .iter()
            .filter(|i| i.payment_status == PaymentStatus::Confirmed)
        {
            let Some(claimed) = self.db.claim_token_transfer(investment.id).await? else {
                continue;
            };
            match self.distribute_one(&token_id, &claimed).await {
                Ok(_) => outcome.success(),
                Err(e) => {
                    warn!(investment = %claimed.id, error = %e, "token transfer failed");
                    self.db.release_claim(claimed.id).await?;
                    outcome.failure(claimed.id, e);
                }
            }
        }

        if outcome.failed == 0 {
            self.db.finish_token_distribution(id).await?;
        }
        info!(
            tokenization = %id,
            succeeded = outcome.succeeded,
            failed = outcome.failed,
            "distribution batch finished"
        );
        self.audit
            .record(
                "tokens_distributed",
                json!({
                    "tokenization_id": id,
                    "succeeded": outcome.succeeded,
                    "failed": outcome.failed,
                }),
            )
            .await;
        Ok(outcome)
    }

    async fn distribute_one(&self, token_id: &str, investment: &Investment) -> Result<Investment> {
        let account_id = self.ledger_account_for(investment.investor_id).await?;
        let tx = self
            .ledger
            .transfer_tokens(token_id, &account_id, investment.tokens)
            .await?;
        self.db.mark_tokens_distributed(investment.id, tx).await
    }

    /// The user's ledger account, created on first use. When two callers
    /// race, the first recorded account wins and both use it.
    async fn ledger_account_for(&self, user_id: Uuid) -> Result<String> {
        let user = self
            .db
            .get_user(user_id)
            .await?
            .ok_or_else(|| PlatformError::not_found("User", user_id))?;
        if let Some(account_id) = user.ledger_account_id {
            return Ok(account_id);
        }
        let account = self.ledger.create_account().await?;
        self.db
            .assign_ledger_account(user_id, account.account_id)
            .await
    }

    pub async fn reconcile_holding(
        &self,
        user_id: Uuid,
        tokenization_id: Uuid,
    ) -> Result<HoldingReconciliation> {
        let tokenization = self.get(tokenization_id).await?;
        let user = self
            .db
            .get_user(user_id)
            .await?
            .ok_or_else(|| PlatformError::not_found("User", user_id))?;
        let recorded = self
            .db
            .get_holding(user_id, tokenization_id)
            .await?
            .map(|h| h.tokens)
            .unwrap_or(0);

        let on_ledger = match (&tokenization.token_id, &user.ledger_account_id) {
            (Some(token_id), Some(account_id)) => {
                self.ledger.token_balance(account_id, token_id).await?
            }
            _ => 0,
        };
        if recorded != on_ledger {
            warn!(
                user = %user_id,
                tokenization = %tokenization_id,
                recorded,
                on_ledger,
                "holding out of sync with ledger"
            );
        }
        Ok(HoldingReconciliation {
            user_id,
            tokenization_id,
            recorded,
            on_ledger,
            in_sync: recorded == on_ledger,
        })
    }
}
