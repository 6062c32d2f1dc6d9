//! Request handlers for the API endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;

use crate::model::period::MonthYear;
use crate::settlement::types::MonthlySettlement;

use super::AppState;
use super::types::{
    ErrorResponse, LedgerResponse, LotRecord, MonthQuery, StateResponse, YearSummary,
};

type ApiError = (StatusCode, Json<ErrorResponse>);

fn bad_request(error: String) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(ErrorResponse { error }))
}

/// Returns the scenario and annual summaries.
///
/// `GET /state` → 200 + `StateResponse` JSON
pub async fn get_state(State(state): State<Arc<AppState>>) -> Json<StateResponse> {
    let ledger_balance_kwh = state
        .years
        .last()
        .and_then(|y| y.months.last())
        .map_or(0.0, |m| m.ledger_balance_kwh);

    Json(StateResponse {
        scenario: state.scenario.clone(),
        years: state.years.iter().map(YearSummary::from).collect(),
        ledger_balance_kwh,
    })
}

/// Returns monthly settlements, optionally filtered by period.
///
/// `GET /months` → 200 + every settled month
/// `GET /months?from=03/2024&to=2024-06` → inclusive range
/// `GET /months?from=2024-06&to=2024-03` → 400 + `ErrorResponse`
pub async fn get_months(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MonthQuery>,
) -> Result<Json<Vec<MonthlySettlement>>, ApiError> {
    let from = parse_bound(query.from.as_deref(), "from")?;
    let to = parse_bound(query.to.as_deref(), "to")?;

    if let Some((from, to)) = from.zip(to).filter(|(f, t)| f > t) {
        return Err(bad_request(format!(
            "`from` ({from}) must be <= `to` ({to})"
        )));
    }

    let months: Vec<MonthlySettlement> = state
        .years
        .iter()
        .flat_map(|y| y.months.iter())
        .filter(|m| {
            let p = m.energy.period;
            from.is_none_or(|f| p >= f) && to.is_none_or(|t| p <= t)
        })
        .cloned()
        .collect();

    Ok(Json(months))
}

fn parse_bound(raw: Option<&str>, name: &str) -> Result<Option<MonthYear>, ApiError> {
    raw.map(|s| s.parse::<MonthYear>())
        .transpose()
        .map_err(|e| bad_request(format!("`{name}`: {e}")))
}

/// Returns every credit lot in expiry order.
///
/// `GET /ledger` → 200 + `LedgerResponse` JSON
pub async fn get_ledger(State(state): State<Arc<AppState>>) -> Json<LedgerResponse> {
    Json(LedgerResponse {
        validity_months: state.ledger.validity_months(),
        lots: state.ledger.lots().iter().map(LotRecord::from).collect(),
    })
}
