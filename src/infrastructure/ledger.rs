//! Distributed-ledger access over HTTP.
//!
//! Writes (accounts, tokens, topic messages, files) go through a signing
//! relay that holds the operator key. Balances are read from the public
//! mirror node REST API.

use crate::domain::ports::{LedgerAccount, LedgerClient, TokenDefinition};
use crate::error::{PlatformError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct LedgerConfig {
    pub relay_url: String,
    pub mirror_url: String,
    pub request_timeout: Duration,
}

impl LedgerConfig {
    pub fn new(relay_url: impl Into<String>, mirror_url: impl Into<String>) -> Self {
        Self {
            relay_url: relay_url.into().trim_end_matches('/').to_string(),
            mirror_url: mirror_url.into().trim_end_matches('/').to_string(),
            request_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Deserialize)]
struct TokenCreated {
    token_id: String,
}

#[derive(Deserialize)]
struct TransactionSubmitted {
    transaction_id: String,
}

#[derive(Deserialize)]
struct MessageSubmitted {
    sequence_number: u64,
}

#[derive(Deserialize)]
struct FileStored {
    file_id: String,
}

#[derive(Deserialize)]
struct MirrorTokenBalance {
    token_id: String,
    balance: u64,
}

#[derive(Deserialize)]
struct MirrorTokenBalances {
    #[serde(default)]
    tokens: Vec<MirrorTokenBalance>,
}

pub struct HttpLedger {
    config: LedgerConfig,
    http_client: reqwest::Client,
}

impl HttpLedger {
    pub fn new(config: LedgerConfig) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent("proptoken/0.1")
            .build()
            .unwrap_or_default();
        Self {
            config,
            http_client,
        }
    }

    async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PlatformError::Ledger(format!("{}: {}", status, body)));
        }
        Ok(response.json().await?)
    }

    async fn relay<T: DeserializeOwned>(&self, path: &str, body: serde_json::Value) -> Result<T> {
        let response = self
            .http_client
            .post(format!("{}{}", self.config.relay_url, path))
            .json(&body)
            .send()
            .await?;
        Self::read_json(response).await
    }
}

#[async_trait]
impl LedgerClient for HttpLedger {
    async fn create_account(&self) -> Result<LedgerAccount> {
        let account: LedgerAccount = self.relay("/accounts", json!({})).await?;
        info!(account = %account.account_id, "created ledger account");
        Ok(account)
    }

    async fn create_token(&self, definition: TokenDefinition) -> Result<String> {
        let created: TokenCreated = self
            .relay("/tokens", serde_json::to_value(&definition)?)
            .await?;
        info!(token = %created.token_id, symbol = %definition.symbol, "created ledger token");
        Ok(created.token_id)
    }

    async fn mint_tokens(&self, token_id: &str, amount: u64) -> Result<String> {
        let tx: TransactionSubmitted = self
            .relay(&format!("/tokens/{}/mint", token_id), json!({ "amount": amount }))
            .await?;
        Ok(tx.transaction_id)
    }

    async fn transfer_tokens(
        &self,
        token_id: &str,
        to_account: &str,
        amount: u64,
    ) -> Result<String> {
        let tx: TransactionSubmitted = self
            .relay(
                &format!("/tokens/{}/transfers", token_id),
                json!({ "to": to_account, "amount": amount }),
            )
            .await?;
        debug!(token = token_id, to = to_account, amount, "transferred units");
        Ok(tx.transaction_id)
    }

    async fn submit_message(&self, topic_id: &str, message: String) -> Result<u64> {
        let submitted: MessageSubmitted = self
            .relay(
                &format!("/topics/{}/messages", topic_id),
                json!({ "message": message }),
            )
            .await?;
        Ok(submitted.sequence_number)
    }

    async fn store_file(&self, contents: Vec<u8>) -> Result<String> {
        let response = self
            .http_client
            .post(format!("{}/files", self.config.relay_url))
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(contents)
            .send()
            .await?;
        let stored: FileStored = Self::read_json(response).await?;
        Ok(stored.file_id)
    }

    async fn token_balance(&self, account_id: &str, token_id: &str) -> Result<u64> {
        let response = self
            .http_client
            .get(format!(
                "{}/api/v1/accounts/{}/tokens",
                self.config.mirror_url, account_id
            ))
            .query(&[("token.id", token_id)])
            .send()
            .await?;
        let balances: MirrorTokenBalances = Self::read_json(response).await?;
        Ok(balances
            .tokens
            .into_iter()
            .find(|t| t.token_id == token_id)
            .map(|t| t.balance)
            .unwrap_or(0))
    }
}
