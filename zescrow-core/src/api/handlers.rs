use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{blocking, ApiError, ApiJson, AppState};
use crate::domain::{ChainTransaction, Deal, EscrowIntent, Pool};
use crate::services::{
    CreateDeal, LogEvent, MonitorReport, ResolveDispute, StatusSummary, SubmitWork, WalletView,
};

type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateWalletRequest {
    pub user_id: String,
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportWalletRequest {
    pub user_id: String,
    pub seed_phrase: String,
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FundWalletRequest {
    pub amount_zec: Decimal,
    #[serde(default)]
    pub pool: Pool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitWorkRequest {
    pub freelancer_id: String,
    #[serde(flatten)]
    pub work: SubmitWork,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientRequest {
    pub client_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisputeRequest {
    pub client_id: String,
    pub reason: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveRequest {
    pub admin_id: String,
    #[serde(flatten)]
    pub resolution: ResolveDispute,
}

/// A deal after a lifecycle action
#[derive(Debug, Serialize)]
pub struct DealResponse {
    #[serde(flatten)]
    pub deal: Deal,
    pub message: &'static str,
}

fn deal_event(event: &str, deal: &Deal, user_id: &str) -> LogEvent {
    LogEvent::new(event)
        .with_deal(&deal.deal_id)
        .with_user(user_id)
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "zescrow",
        "version": env!("CARGO_PKG_VERSION"),
        "network": state.context.config.network,
    }))
}

pub async fn status(State(state): State<AppState>) -> ApiResult<StatusSummary> {
    let summary = blocking(&state, |s| Ok(s.context.status_service.get_status()?)).await?;
    Ok(Json(summary))
}

// === Wallets ===

pub async fn create_wallet(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<CreateWalletRequest>,
) -> Result<(StatusCode, Json<WalletView>), ApiError> {
    let view = blocking(&state, move |s| {
        let escrow = &s.context.escrow_service;
        escrow.create_user_wallet(&req.user_id, req.label.as_deref())?;
        s.audit(LogEvent::new("wallet_created").with_user(&req.user_id));
        escrow.get_wallet(&req.user_id)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn import_wallet(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<ImportWalletRequest>,
) -> Result<(StatusCode, Json<WalletView>), ApiError> {
    let view = blocking(&state, move |s| {
        let escrow = &s.context.escrow_service;
        escrow.import_user_wallet(&req.user_id, &req.seed_phrase, req.label.as_deref())?;
        s.audit(LogEvent::new("wallet_imported").with_user(&req.user_id));
        escrow.get_wallet(&req.user_id)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn get_wallet(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<WalletView> {
    let view = blocking(&state, move |s| s.context.escrow_service.get_wallet(&user_id)).await?;
    Ok(Json(view))
}

pub async fn fund_wallet(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    ApiJson(req): ApiJson<FundWalletRequest>,
) -> ApiResult<WalletView> {
    let view = blocking(&state, move |s| {
        s.context
            .escrow_service
            .fund_wallet(&user_id, req.amount_zec, req.pool)
    })
    .await?;
    Ok(Json(view))
}

// === Deals ===

pub async fn create_deal(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<CreateDeal>,
) -> Result<(StatusCode, Json<Deal>), ApiError> {
    let deal = blocking(&state, move |s| {
        let deal = s.context.escrow_service.create_deal(req)?;
        s.audit(deal_event("deal_created", &deal, &deal.client.id));
        Ok(deal)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(deal)))
}

pub async fn get_deal(
    State(state): State<AppState>,
    Path(deal_id): Path<String>,
) -> ApiResult<Deal> {
    let deal = blocking(&state, move |s| s.context.escrow_service.get_deal(&deal_id)).await?;
    Ok(Json(deal))
}

pub async fn deal_transactions(
    State(state): State<AppState>,
    Path(deal_id): Path<String>,
) -> ApiResult<Vec<ChainTransaction>> {
    let txs = blocking(&state, move |s| {
        s.context.escrow_service.get_deal_transactions(&deal_id)
    })
    .await?;
    Ok(Json(txs))
}

pub async fn submit_work(
    State(state): State<AppState>,
    Path(deal_id): Path<String>,
    ApiJson(req): ApiJson<SubmitWorkRequest>,
) -> ApiResult<DealResponse> {
    let deal = blocking(&state, move |s| {
        let deal = s
            .context
            .escrow_service
            .submit_work(&deal_id, &req.freelancer_id, req.work)?;
        s.audit(deal_event("work_submitted", &deal, &req.freelancer_id));
        Ok(deal)
    })
    .await?;
    Ok(Json(DealResponse {
        deal,
        message: "Work submitted successfully",
    }))
}

pub async fn approve_work(
    State(state): State<AppState>,
    Path(deal_id): Path<String>,
    ApiJson(req): ApiJson<ClientRequest>,
) -> ApiResult<DealResponse> {
    let deal = blocking(&state, move |s| {
        let deal = s.context.escrow_service.approve_work(&deal_id, &req.client_id)?;
        s.audit(deal_event("work_approved", &deal, &req.client_id));
        Ok(deal)
    })
    .await?;
    Ok(Json(DealResponse {
        deal,
        message: "Work approved and funds released",
    }))
}

pub async fn dispute_work(
    State(state): State<AppState>,
    Path(deal_id): Path<String>,
    ApiJson(req): ApiJson<DisputeRequest>,
) -> ApiResult<DealResponse> {
    let deal = blocking(&state, move |s| {
        let deal = s
            .context
            .escrow_service
            .dispute_work(&deal_id, &req.client_id, &req.reason)?;
        s.audit(deal_event("work_disputed", &deal, &req.client_id));
        Ok(deal)
    })
    .await?;
    Ok(Json(DealResponse {
        deal,
        message: "Dispute opened",
    }))
}

pub async fn resolve_dispute(
    State(state): State<AppState>,
    Path(deal_id): Path<String>,
    ApiJson(req): ApiJson<ResolveRequest>,
) -> ApiResult<DealResponse> {
    let deal = blocking(&state, move |s| {
        let deal = s
            .context
            .escrow_service
            .resolve_dispute(&deal_id, &req.admin_id, req.resolution)?;
        s.audit(deal_event("dispute_resolved", &deal, &req.admin_id));
        Ok(deal)
    })
    .await?;
    Ok(Json(DealResponse {
        deal,
        message: "Dispute resolved",
    }))
}

pub async fn cancel_deal(
    State(state): State<AppState>,
    Path(deal_id): Path<String>,
    ApiJson(req): ApiJson<ClientRequest>,
) -> ApiResult<DealResponse> {
    let deal = blocking(&state, move |s| {
        let deal = s.context.escrow_service.cancel_deal(&deal_id, &req.client_id)?;
        s.audit(deal_event("deal_cancelled", &deal, &req.client_id));
        Ok(deal)
    })
    .await?;
    Ok(Json(DealResponse {
        deal,
        message: "Deal cancelled and funds refunded",
    }))
}

pub async fn user_deals(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<Vec<Deal>> {
    let deals = blocking(&state, move |s| s.context.escrow_service.get_user_deals(&user_id)).await?;
    Ok(Json(deals))
}

pub async fn user_intents(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<Vec<EscrowIntent>> {
    let intents =
        blocking(&state, move |s| s.context.escrow_service.get_user_intents(&user_id)).await?;
    Ok(Json(intents))
}

pub async fn get_intent(
    State(state): State<AppState>,
    Path(intent_id): Path<String>,
) -> ApiResult<EscrowIntent> {
    let intent = blocking(&state, move |s| s.context.escrow_service.get_intent(&intent_id)).await?;
    Ok(Json(intent))
}

pub async fn check_monitor(State(state): State<AppState>) -> ApiResult<MonitorReport> {
    let report = blocking(&state, |s| {
        let report = s.context.monitor.check_transactions()?;
        for deal_id in &report.completed_deals {
            s.audit(LogEvent::new("deal_completed").with_deal(deal_id));
        }
        Ok(report)
    })
    .await?;
    Ok(Json(report))
}
