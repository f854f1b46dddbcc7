use axum::{
    routing::{get, post},
    Router,
};

use crate::billing::api;

pub fn api_routes() -> Router {
    Router::new()
        .route(
            "/api/clinics/:clinic_id/billing/process-due",
            post(api::process_due_payments),
        )
        .route(
            "/api/clinics/:clinic_id/billing/attention",
            get(api::payments_needing_attention),
        )
        .route(
            "/api/clinics/:clinic_id/claims",
            post(api::file_claim),
        )
        .route(
            "/api/clinics/:clinic_id/claims/aging",
            get(api::claim_aging),
        )
        .route(
            "/api/scheduled-payments/:id/retry",
            post(api::retry_scheduled_payment),
        )
        .route(
            "/api/scheduled-payments/:id/skip",
            post(api::skip_scheduled_payment),
        )
        .route(
            "/api/payment-plans/:id/schedule",
            post(api::generate_schedule),
        )
        .route(
            "/api/payment-plans/:id/scheduled-payments",
            get(api::list_plan_payments),
        )
        .route("/api/insurance/estimate", post(api::estimate_insurance))
}
