//! JSON API over the application services.

pub mod handlers;
pub mod response;

use crate::application::Services;
use axum::Router;
use axum::routing::{get, post, put};
use handlers::*;

/// Shared handler state. Cloning is cheap; every service sits behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub services: Services,
}

impl AppState {
    pub fn new(services: Services) -> Self {
        Self { services }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/users", post(register_user))
        .route("/users/:id", get(get_user))
        .route("/users/:id/notifications", get(list_notifications))
        .route("/users/:id/wallet", get(get_wallet))
        .route("/users/:id/wallet/status", put(set_wallet_status))
        .route("/users/:id/wallet/top-ups", post(start_top_up))
        .route("/users/:id/wallet/withdrawals", post(withdraw_to_bank))
        .route("/properties", post(submit_property))
        .route("/properties/:id", get(get_property))
        .route("/properties/:id/review", post(review_property))
        .route("/properties/:id/documents/:name", post(upload_document))
        .route(
            "/tokenizations",
            get(list_tokenizations).post(create_tokenization),
        )
        .route("/tokenizations/:id", get(get_tokenization))
        .route("/tokenizations/:id/activate", post(activate_tokenization))
        .route("/tokenizations/:id/close", post(close_funding))
        .route("/tokenizations/:id/mint", post(mint_tokens))
        .route("/tokenizations/:id/distribute", post(distribute_tokens))
        .route("/tokenizations/:id/refunds", post(refund_tokenization))
        .route("/tokenizations/:id/dividends", post(create_distribution))
        .route(
            "/tokenizations/:id/holdings/:user_id/reconcile",
            get(reconcile_holding),
        )
        .route("/investments", post(invest))
        .route("/investments/:id", get(get_investment))
        .route("/investments/:id/refund", post(refund_investment))
        .route("/payments/verify/:reference", get(verify_payment))
        .route("/reservations/sweep", post(sweep_reservations))
        .route("/dividends/:id", get(get_distribution))
        .route("/dividends/:id/payments", get(list_dividend_payments))
        .route("/dividends/:id/process", post(process_distribution))
        .route("/dividend-payments/:id/claim", post(claim_dividend))
        .route("/proposals", post(create_proposal))
        .route("/proposals/:id", get(get_proposal))
        .route("/proposals/:id/votes", post(cast_vote))
        .route("/proposals/:id/finalize", post(finalize_proposal))
        .route("/proposals/:id/lock-funds", post(lock_proposal_funds))
        .route("/treasuries/:id", get(get_treasury))
        .route("/treasuries/:id/signers", put(configure_treasury))
        .route("/treasuries/:id/deposits", post(deposit_treasury))
        .route("/withdrawals", post(request_withdrawal))
        .route("/withdrawals/:id", get(get_withdrawal))
        .route("/withdrawals/:id/approvals", post(approve_withdrawal))
        .route("/withdrawals/:id/execute", post(execute_withdrawal))
        .with_state(state)
}
