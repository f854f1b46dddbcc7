use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::claims::{estimate_insurance_payment, ortho_benefit_availability, OrthoCoverage};
use crate::db;
use crate::error::{AppError, AppResult};

use super::engine::RecurringBillingEngine;
use super::gateway::PaymentGateway;
use super::models::{
    BillingConfigOverrides, PaymentFrequency, PaymentsNeedingAttention, ProcessingResult,
    RecurringBillingConfig, ScheduledPayment,
};
use super::notifications::NotificationHandle;

/// key: billing-api -> rest endpoints over the engine

fn build_engine(
    pool: PgPool,
    gateway: Arc<dyn PaymentGateway>,
    base: &RecurringBillingConfig,
    overrides: Option<&BillingConfigOverrides>,
    notifications: NotificationHandle,
) -> RecurringBillingEngine {
    let config = match overrides {
        Some(overrides) => base.apply_overrides(overrides),
        None => base.clone(),
    };
    RecurringBillingEngine::new(pool, gateway, config).with_notifications(notifications)
}

#[derive(Debug, Default, Deserialize)]
pub struct ProcessDueRequest {
    #[serde(default)]
    pub config: Option<BillingConfigOverrides>,
}

pub async fn process_due_payments(
    Extension(pool): Extension<PgPool>,
    Extension(gateway): Extension<Arc<dyn PaymentGateway>>,
    Extension(base_config): Extension<RecurringBillingConfig>,
    Extension(notifications): Extension<NotificationHandle>,
    Path(clinic_id): Path<Uuid>,
    payload: Option<Json<ProcessDueRequest>>,
) -> AppResult<Json<Vec<ProcessingResult>>> {
    let overrides = payload.as_ref().and_then(|p| p.config.as_ref());
    let engine = build_engine(pool, gateway, &base_config, overrides, notifications);
    let results = engine
        .process_due_payments(clinic_id, Utc::now())
        .await
        .map_err(|err| AppError::Message(err.to_string()))?;
    Ok(Json(results))
}

#[derive(Debug, Default, Deserialize)]
pub struct RetryRequest {
    #[serde(default)]
    pub config: Option<BillingConfigOverrides>,
}

pub async fn retry_scheduled_payment(
    Extension(pool): Extension<PgPool>,
    Extension(gateway): Extension<Arc<dyn PaymentGateway>>,
    Extension(base_config): Extension<RecurringBillingConfig>,
    Extension(notifications): Extension<NotificationHandle>,
    Path(id): Path<Uuid>,
    payload: Option<Json<RetryRequest>>,
) -> AppResult<Json<ProcessingResult>> {
    let overrides = payload.as_ref().and_then(|p| p.config.as_ref());
    let engine = build_engine(pool, gateway, &base_config, overrides, notifications);
    let result = engine
        .retry_scheduled_payment(id, Utc::now())
        .await
        .map_err(|err| AppError::Message(err.to_string()))?;
    Ok(Json(result))
}

#[derive(Debug, Deserialize)]
pub struct SkipRequest {
    pub reason: String,
}

pub async fn skip_scheduled_payment(
    Extension(pool): Extension<PgPool>,
    Extension(gateway): Extension<Arc<dyn PaymentGateway>>,
    Extension(base_config): Extension<RecurringBillingConfig>,
    Extension(notifications): Extension<NotificationHandle>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SkipRequest>,
) -> AppResult<Json<ProcessingResult>> {
    if payload.reason.trim().is_empty() {
        return Err(AppError::BadRequest("skip reason is required".to_string()));
    }
    let engine = build_engine(pool, gateway, &base_config, None, notifications);
    let result = engine
        .skip_scheduled_payment(id, payload.reason.trim())
        .await
        .map_err(|err| AppError::Message(err.to_string()))?;
    Ok(Json(result))
}

#[derive(Debug, Deserialize)]
pub struct GenerateScheduleRequest {
    pub start_date: DateTime<Utc>,
    pub count: u32,
    pub amount: Decimal,
    pub frequency: PaymentFrequency,
}

pub async fn generate_schedule(
    Extension(pool): Extension<PgPool>,
    Extension(gateway): Extension<Arc<dyn PaymentGateway>>,
    Extension(base_config): Extension<RecurringBillingConfig>,
    Extension(notifications): Extension<NotificationHandle>,
    Path(plan_id): Path<Uuid>,
    Json(payload): Json<GenerateScheduleRequest>,
) -> AppResult<Json<Vec<ScheduledPayment>>> {
    if payload.count == 0 {
        return Err(AppError::BadRequest(
            "installment count must be positive".to_string(),
        ));
    }
    if payload.amount <= Decimal::ZERO {
        return Err(AppError::BadRequest(
            "installment amount must be positive".to_string(),
        ));
    }

    let engine = build_engine(pool, gateway, &base_config, None, notifications);
    let rows = engine
        .generate_scheduled_payments(
            plan_id,
            payload.start_date,
            payload.count,
            payload.amount,
            payload.frequency,
            Utc::now(),
        )
        .await
        .map_err(|err| AppError::Message(err.to_string()))?
        .ok_or(AppError::NotFound)?;
    Ok(Json(rows))
}

pub async fn payments_needing_attention(
    Extension(pool): Extension<PgPool>,
    Path(clinic_id): Path<Uuid>,
) -> AppResult<Json<PaymentsNeedingAttention>> {
    let counts =
        db::scheduled_payments::attention_counts(&pool, clinic_id, Utc::now()).await?;
    Ok(Json(counts))
}

pub async fn list_plan_payments(
    Extension(pool): Extension<PgPool>,
    Path(plan_id): Path<Uuid>,
) -> AppResult<Json<Vec<ScheduledPayment>>> {
    let rows = db::scheduled_payments::find_by_plan(&pool, plan_id).await?;
    Ok(Json(rows))
}

#[derive(Debug, Deserialize)]
pub struct FileClaimRequest {
    #[serde(default)]
    pub account_id: Option<Uuid>,
    pub amount: Decimal,
}

pub async fn file_claim(
    Extension(pool): Extension<PgPool>,
    Path(clinic_id): Path<Uuid>,
    Json(payload): Json<FileClaimRequest>,
) -> AppResult<Json<db::insurance_claims::InsuranceClaim>> {
    if payload.amount < Decimal::ZERO {
        return Err(AppError::BadRequest(
            "claim amount must be non-negative".to_string(),
        ));
    }
    let claim = db::insurance_claims::file_claim(
        &pool,
        clinic_id,
        payload.account_id,
        payload.amount,
        Utc::now(),
    )
    .await?;
    Ok(Json(claim))
}

pub async fn claim_aging(
    Extension(pool): Extension<PgPool>,
    Path(clinic_id): Path<Uuid>,
) -> AppResult<Json<db::insurance_claims::ClaimAgingSummary>> {
    let summary = db::insurance_claims::aging_summary(&pool, clinic_id, Utc::now()).await?;
    Ok(Json(summary))
}

#[derive(Debug, Deserialize)]
pub struct EstimateRequest {
    pub charge: Decimal,
    pub coverage: OrthoCoverage,
}

#[derive(Debug, Serialize)]
pub struct EstimateResponse {
    pub availability: crate::claims::BenefitAvailability,
    pub estimate: crate::claims::InsuranceEstimate,
}

/// Pure calculation over submitted coverage data; nothing is persisted.
pub async fn estimate_insurance(
    Json(payload): Json<EstimateRequest>,
) -> AppResult<Json<EstimateResponse>> {
    if payload.charge < Decimal::ZERO {
        return Err(AppError::BadRequest("charge must be non-negative".to_string()));
    }
    let availability =
        ortho_benefit_availability(&payload.coverage, Utc::now().date_naive());
    let estimate = estimate_insurance_payment(payload.charge, &payload.coverage);
    Ok(Json(EstimateResponse {
        availability,
        estimate,
    }))
}
