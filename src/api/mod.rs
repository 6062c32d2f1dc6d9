//! REST API over a finished settlement run.
//!
//! Provides three GET endpoints:
//! - `/state`: scenario and annual summaries
//! - `/months`: monthly settlements with optional period range filtering
//! - `/ledger`: credit lots with their lifecycle state

mod handlers;
mod types;

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tracing::info;

use crate::config::ScenarioConfig;
use crate::settlement::ledger::CreditLedger;
use crate::settlement::types::AnnualSettlement;

pub use types::{ErrorResponse, LedgerResponse, LotRecord, MonthQuery, StateResponse, YearSummary};

/// Immutable application state shared across all request handlers.
///
/// Built once after the settlement run completes and wrapped in `Arc`.
pub struct AppState {
    /// Scenario that produced the run.
    pub scenario: ScenarioConfig,
    /// Settled years in order.
    pub years: Vec<AnnualSettlement>,
    /// Ledger as left by the last settled month.
    pub ledger: CreditLedger,
}

/// Builds the axum router with all API routes.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/state", get(handlers::get_state))
        .route("/months", get(handlers::get_months))
        .route("/ledger", get(handlers::get_ledger))
        .with_state(state)
}

/// Binds to the given address and serves the API until the process stops.
///
/// # Errors
///
/// Returns an `io::Error` if the listener cannot bind or the server fails.
pub async fn serve(state: Arc<AppState>, addr: SocketAddr) -> io::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "API server listening");
    axum::serve(listener, app).await
}
