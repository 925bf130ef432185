#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use proptoken::application::investments::InvestRequest;
use proptoken::application::{Services, Settings};
use proptoken::domain::investment::{Investment, PaymentMethod};
use proptoken::domain::money::Amount;
use proptoken::domain::ports::{
    CheckoutRequest, CheckoutSession, DatabaseRef, GatewayPaymentStatus, LedgerAccount,
    LedgerClient, PaymentGateway, PaymentVerification, RefundReceipt, TokenDefinition,
    TransferReceipt, TransferRequest,
};
use proptoken::domain::property::{NewProperty, NewUser, User};
use proptoken::domain::tokenization::{NewTokenization, Tokenization};
use proptoken::error::{PlatformError, Result};
use proptoken::infrastructure::in_memory::InMemoryDatabase;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration as StdDuration;
use uuid::Uuid;

pub const AUDIT_TOPIC: &str = "0.0.9000";

pub fn ngn(value: Decimal) -> Amount {
    Amount::new(value).unwrap()
}

/// Scripted stand-in for the payment gateway. References verify as
/// `Pending` with the initialized amount until a test settles them.
#[derive(Default)]
pub struct MockGateway {
    charges: Mutex<HashMap<String, Decimal>>,
    outcomes: Mutex<HashMap<String, (GatewayPaymentStatus, Option<Decimal>)>>,
    pub refunds: Mutex<Vec<(String, Amount)>>,
    pub transfers: Mutex<Vec<TransferRequest>>,
    pub fail_initialize: AtomicBool,
    pub fail_refund: AtomicBool,
    pub fail_transfer: AtomicBool,
    pub initialize_calls: AtomicUsize,
    /// Milliseconds each refund waits before it lands.
    pub refund_delay_ms: AtomicU64,
}

impl MockGateway {
    pub fn settle(&self, reference: &str, status: GatewayPaymentStatus) {
        self.outcomes
            .lock()
            .unwrap()
            .insert(reference.to_string(), (status, None));
    }

    pub fn capture(&self, reference: &str, amount: Decimal) {
        self.outcomes.lock().unwrap().insert(
            reference.to_string(),
            (GatewayPaymentStatus::Success, Some(amount)),
        );
    }

    pub fn refund_count(&self) -> usize {
        self.refunds.lock().unwrap().len()
    }

    pub fn initialize_count(&self) -> usize {
        self.initialize_calls.load(Ordering::SeqCst)
    }
}

async fn pause(delay_ms: &AtomicU64) {
    let ms = delay_ms.load(Ordering::SeqCst);
    if ms > 0 {
        tokio::time::sleep(StdDuration::from_millis(ms)).await;
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn initialize(&self, request: CheckoutRequest) -> Result<CheckoutSession> {
        self.initialize_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_initialize.load(Ordering::SeqCst) {
            return Err(PlatformError::Gateway("initialize rejected".to_string()));
        }
        self.charges
            .lock()
            .unwrap()
            .insert(request.reference.clone(), request.amount.value());
        Ok(CheckoutSession {
            authorization_url: format!("https://checkout.test/{}", request.reference),
            access_code: "access".to_string(),
            reference: request.reference,
        })
    }

    async fn verify(&self, reference: &str) -> Result<PaymentVerification> {
        let charged = self
            .charges
            .lock()
            .unwrap()
            .get(reference)
            .copied()
            .ok_or_else(|| PlatformError::Gateway(format!("unknown reference {}", reference)))?;
        let (status, captured) = self
            .outcomes
            .lock()
            .unwrap()
            .get(reference)
            .copied()
            .unwrap_or((GatewayPaymentStatus::Pending, None));
        Ok(PaymentVerification {
            reference: reference.to_string(),
            status,
            amount: captured.unwrap_or(charged),
            paid_at: None,
        })
    }

    async fn refund(&self, reference: &str, amount: Amount) -> Result<RefundReceipt> {
        if self.fail_refund.load(Ordering::SeqCst) {
            return Err(PlatformError::Gateway("refund rejected".to_string()));
        }
        pause(&self.refund_delay_ms).await;
        self.refunds
            .lock()
            .unwrap()
            .push((reference.to_string(), amount));
        Ok(RefundReceipt {
            reference: reference.to_string(),
            status: "pending".to_string(),
        })
    }

    async fn transfer(&self, request: TransferRequest) -> Result<TransferReceipt> {
        if self.fail_transfer.load(Ordering::SeqCst) {
            return Err(PlatformError::Gateway("transfer rejected".to_string()));
        }
        let code = format!("TRF_{}", request.reference);
        self.transfers.lock().unwrap().push(request);
        Ok(TransferReceipt {
            transfer_code: code,
            status: "pending".to_string(),
        })
    }
}

/// In-process ledger. Transfers to accounts listed in `rejecting` fail.
#[derive(Default)]
pub struct MockLedger {
    next_id: AtomicU64,
    balances: Mutex<HashMap<(String, String), u64>>,
    pub minted: Mutex<Vec<(String, u64)>>,
    pub messages: Mutex<Vec<(String, String)>>,
    pub files: Mutex<Vec<Vec<u8>>>,
    pub rejecting: Mutex<HashSet<String>>,
    /// Milliseconds token creation and transfers wait before they land.
    pub delay_ms: AtomicU64,
    pub fail_create_token: AtomicBool,
}

impl MockLedger {
    fn next(&self) -> String {
        format!("0.0.{}", 1000 + self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    pub fn reject_transfers_to(&self, account_id: &str) {
        self.rejecting
            .lock()
            .unwrap()
            .insert(account_id.to_string());
    }

    pub fn accept_transfers_to(&self, account_id: &str) {
        self.rejecting.lock().unwrap().remove(account_id);
    }

    pub fn audit_events(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .filter(|(topic, _)| topic == AUDIT_TOPIC)
            .filter_map(|(_, body)| {
                let value: serde_json::Value = serde_json::from_str(body).ok()?;
                value["event"].as_str().map(str::to_string)
            })
            .collect()
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    async fn create_account(&self) -> Result<LedgerAccount> {
        Ok(LedgerAccount {
            account_id: self.next(),
            public_key: "302a300506032b6570032100".to_string(),
        })
    }

    async fn create_token(&self, _definition: TokenDefinition) -> Result<String> {
        pause(&self.delay_ms).await;
        if self.fail_create_token.load(Ordering::SeqCst) {
            return Err(PlatformError::Ledger("INSUFFICIENT_PAYER_BALANCE".to_string()));
        }
        Ok(self.next())
    }

    async fn mint_tokens(&self, token_id: &str, amount: u64) -> Result<String> {
        self.minted
            .lock()
            .unwrap()
            .push((token_id.to_string(), amount));
        Ok(format!("{}@mint", token_id))
    }

    async fn transfer_tokens(
        &self,
        token_id: &str,
        to_account: &str,
        amount: u64,
    ) -> Result<String> {
        pause(&self.delay_ms).await;
        if self.rejecting.lock().unwrap().contains(to_account) {
            return Err(PlatformError::Ledger(format!(
                "TOKEN_NOT_ASSOCIATED_TO_ACCOUNT: {}",
                to_account
            )));
        }
        *self
            .balances
            .lock()
            .unwrap()
            .entry((to_account.to_string(), token_id.to_string()))
            .or_default() += amount;
        Ok(format!("{}@{}", to_account, self.next()))
    }

    async fn submit_message(&self, topic_id: &str, message: String) -> Result<u64> {
        let mut messages = self.messages.lock().unwrap();
        messages.push((topic_id.to_string(), message));
        Ok(messages.len() as u64)
    }

    async fn store_file(&self, contents: Vec<u8>) -> Result<String> {
        self.files.lock().unwrap().push(contents);
        Ok(self.next())
    }

    async fn token_balance(&self, account_id: &str, token_id: &str) -> Result<u64> {
        Ok(self
            .balances
            .lock()
            .unwrap()
            .get(&(account_id.to_string(), token_id.to_string()))
            .copied()
            .unwrap_or(0))
    }
}

pub struct Harness {
    pub services: Services,
    pub db: DatabaseRef,
    pub gateway: Arc<MockGateway>,
    pub ledger: Arc<MockLedger>,
}

pub fn harness() -> Harness {
    let db: DatabaseRef = Arc::new(InMemoryDatabase::new());
    let gateway = Arc::new(MockGateway::default());
    let ledger = Arc::new(MockLedger::default());
    let settings = Settings {
        audit_topic: Some(AUDIT_TOPIC.to_string()),
        ..Settings::default()
    };
    let services = Services::new(db.clone(), gateway.clone(), ledger.clone(), settings);
    Harness {
        services,
        db,
        gateway,
        ledger,
    }
}

impl Harness {
    pub async fn user(&self, name: &str) -> User {
        self.services
            .properties
            .register_user(
                NewUser {
                    email: format!("{}@example.com", name),
                    display_name: name.to_string(),
                },
                Utc::now(),
            )
            .await
            .unwrap()
    }

    /// An approved property with an active campaign open for thirty days.
    pub async fn campaign(
        &self,
        supply: u64,
        price: Decimal,
        minimum_raise: Decimal,
        now: DateTime<Utc>,
    ) -> Tokenization {
        let owner = self.user("owner").await;
        let property = self
            .services
            .properties
            .submit(
                NewProperty {
                    owner_id: owner.id,
                    title: "Banana Island Duplex".to_string(),
                    location: "Lagos".to_string(),
                    valuation: price * Decimal::from(supply),
                },
                now,
            )
            .await
            .unwrap();
        self.services
            .properties
            .review(property.id, true)
            .await
            .unwrap();
        self.services
            .tokenizations
            .create(
                NewTokenization {
                    property_id: property.id,
                    token_name: "Banana Island".to_string(),
                    token_symbol: "BID".to_string(),
                    total_supply: supply,
                    price_per_token: ngn(price),
                    funding_start: now - Duration::hours(1),
                    funding_end: now + Duration::days(30),
                    minimum_raise,
                    target_raise: price * Decimal::from(supply),
                },
                now,
            )
            .await
            .unwrap()
    }

    pub async fn fund_wallet(&self, user_id: Uuid, amount: Decimal) {
        self.db
            .credit_wallet(
                user_id,
                ngn(amount),
                format!("seed:{}", Uuid::new_v4()),
                Utc::now(),
            )
            .await
            .unwrap();
    }

    pub async fn invest(
        &self,
        tokenization_id: Uuid,
        investor_id: Uuid,
        amount: Decimal,
        payment_method: PaymentMethod,
        now: DateTime<Utc>,
    ) -> Result<Investment> {
        self.services
            .investments
            .reserve(
                InvestRequest {
                    tokenization_id,
                    investor_id,
                    amount: ngn(amount),
                    payment_method,
                },
                now,
            )
            .await
            .map(|r| r.investment)
    }

    /// Sells out a campaign priced at 1000 per unit to the given holders
    /// through their wallets, then closes it ready for minting.
    pub async fn closed_campaign(&self, holders: &[(Uuid, u64)]) -> Tokenization {
        let now = Utc::now();
        let supply = holders.iter().map(|(_, units)| units).sum();
        let tokenization = self.campaign(supply, dec!(1000), dec!(0), now).await;
        for (user_id, units) in holders {
            let cost = dec!(1000) * Decimal::from(*units);
            self.fund_wallet(*user_id, cost).await;
            self.invest(tokenization.id, *user_id, cost, PaymentMethod::Wallet, now)
                .await
                .unwrap();
        }
        self.services
            .tokenizations
            .close_funding(tokenization.id, now)
            .await
            .unwrap()
    }

    pub async fn minted_campaign(&self, holders: &[(Uuid, u64)]) -> Tokenization {
        let closed = self.closed_campaign(holders).await;
        self.services
            .tokenizations
            .mint(closed.id)
            .await
            .unwrap()
    }

    pub async fn tokenization(&self, id: Uuid) -> Tokenization {
        self.services.tokenizations.get(id).await.unwrap()
    }

    pub async fn balance(&self, user_id: Uuid) -> Decimal {
        self.services
            .wallets
            .wallet(user_id, Utc::now())
            .await
            .unwrap()
            .balance
            .value()
    }
}
