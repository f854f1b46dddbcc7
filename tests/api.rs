use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::{Extension, Router};
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use sqlx::PgPool;
use tower::ServiceExt; // for `oneshot`
use uuid::Uuid;

use ortho_billing::billing::{
    start_notification_worker, PaymentGateway, RecurringBillingConfig, StripeLikeGateway,
};
use ortho_billing::routes::api_routes;

// key: billing-api-tests -> rest surface over the engine

fn app(pool: PgPool) -> Router {
    let gateway: Arc<dyn PaymentGateway> = Arc::new(StripeLikeGateway);
    api_routes()
        .layer(Extension(pool))
        .layer(Extension(gateway))
        .layer(Extension(RecurringBillingConfig::default()))
        .layer(Extension(start_notification_worker()))
}

async fn seed_billable_installment(pool: &PgPool) -> (Uuid, Uuid, Uuid) {
    let clinic_id = Uuid::new_v4();
    sqlx::query("INSERT INTO clinics (id, name) VALUES ($1, 'Archwire Orthodontics')")
        .bind(clinic_id)
        .execute(pool)
        .await
        .unwrap();

    let account_id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO patient_accounts \
         (id, clinic_id, patient_name, gateway_customer_id, default_payment_method_id, \
          total_billed, balance) \
         VALUES ($1, $2, 'Dana Whitfield', 'cus_api', 'pm_api', $3, $3)",
    )
    .bind(account_id)
    .bind(clinic_id)
    .bind(Decimal::new(150_00, 2))
    .execute(pool)
    .await
    .unwrap();

    let plan_id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO payment_plans (id, clinic_id, account_id, auto_charge) \
         VALUES ($1, $2, $3, TRUE)",
    )
    .bind(plan_id)
    .bind(clinic_id)
    .bind(account_id)
    .execute(pool)
    .await
    .unwrap();

    let payment_id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO scheduled_payments \
         (id, clinic_id, plan_id, amount, due_date, status, retry_count) \
         VALUES ($1, $2, $3, $4, $5, 'PENDING', 0)",
    )
    .bind(payment_id)
    .bind(clinic_id)
    .bind(plan_id)
    .bind(Decimal::new(150_00, 2))
    .bind(Utc::now() - Duration::days(1))
    .execute(pool)
    .await
    .unwrap();

    (clinic_id, plan_id, payment_id)
}

fn json_request(uri: String, payload: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(payload.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn process_due_endpoint_charges_and_reports_results(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    let (clinic_id, _plan_id, payment_id) = seed_billable_installment(&pool).await;

    let response = app(pool.clone())
        .oneshot(json_request(
            format!("/api/clinics/{clinic_id}/billing/process-due"),
            json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    let results = body.as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["success"], json!(true));
    assert_eq!(
        results[0]["scheduled_payment_id"],
        json!(payment_id.to_string())
    );

    let status: String =
        sqlx::query_scalar("SELECT status FROM scheduled_payments WHERE id = $1")
            .bind(payment_id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(status, "COMPLETED");
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn skip_endpoint_marks_the_row_and_requires_a_reason(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    let (_clinic_id, _plan_id, payment_id) = seed_billable_installment(&pool).await;

    let rejected = app(pool.clone())
        .oneshot(json_request(
            format!("/api/scheduled-payments/{payment_id}/skip"),
            json!({"reason": "  "}),
        ))
        .await
        .unwrap();
    assert_eq!(rejected.status(), StatusCode::BAD_REQUEST);

    let response = app(pool.clone())
        .oneshot(json_request(
            format!("/api/scheduled-payments/{payment_id}/skip"),
            json!({"reason": "treatment paused"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["success"], json!(true));

    let (status, reason): (String, Option<String>) = sqlx::query_as(
        "SELECT status, skip_reason FROM scheduled_payments WHERE id = $1",
    )
    .bind(payment_id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(status, "SKIPPED");
    assert_eq!(reason.as_deref(), Some("treatment paused"));
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn attention_endpoint_reports_clinic_counts(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    let (clinic_id, plan_id, _payment_id) = seed_billable_installment(&pool).await;

    sqlx::query(
        "INSERT INTO scheduled_payments \
         (id, clinic_id, plan_id, amount, due_date, status, retry_count) \
         VALUES ($1, $2, $3, $4, NOW(), 'FAILED', 3)",
    )
    .bind(Uuid::new_v4())
    .bind(clinic_id)
    .bind(plan_id)
    .bind(Decimal::new(75_00, 2))
    .execute(&pool)
    .await
    .unwrap();

    let response = app(pool.clone())
        .oneshot(
            Request::builder()
                .uri(format!("/api/clinics/{clinic_id}/billing/attention"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["failed"], json!(1));
    assert_eq!(body["overdue"], json!(1));
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn schedule_endpoint_creates_installments(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    let (_clinic_id, plan_id, _payment_id) = seed_billable_installment(&pool).await;

    let response = app(pool.clone())
        .oneshot(json_request(
            format!("/api/payment-plans/{plan_id}/schedule"),
            json!({
                "start_date": "2024-05-01T00:00:00Z",
                "count": 4,
                "amount": "120.00",
                "frequency": "BIWEEKLY",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body.as_array().unwrap().len(), 4);

    let created: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM scheduled_payments WHERE plan_id = $1 AND due_date >= '2024-05-01'",
    )
    .bind(plan_id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(created, 4);

    let missing_plan = app(pool.clone())
        .oneshot(json_request(
            format!("/api/payment-plans/{}/schedule", Uuid::new_v4()),
            json!({
                "start_date": "2024-05-01T00:00:00Z",
                "count": 2,
                "amount": "10.00",
                "frequency": "WEEKLY",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(missing_plan.status(), StatusCode::NOT_FOUND);
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn filed_claims_get_sequential_numbers_and_age_into_buckets(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();

    let clinic_id = Uuid::new_v4();
    sqlx::query("INSERT INTO clinics (id, name) VALUES ($1, 'Claims Test Orthodontics')")
        .bind(clinic_id)
        .execute(&pool)
        .await
        .unwrap();

    for _ in 0..2 {
        let response = app(pool.clone())
            .oneshot(json_request(
                format!("/api/clinics/{clinic_id}/claims"),
                json!({"amount": "350.00"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let numbers: Vec<String> = sqlx::query_scalar(
        "SELECT claim_number FROM insurance_claims WHERE clinic_id = $1 ORDER BY claim_number",
    )
    .bind(clinic_id)
    .fetch_all(&pool)
    .await
    .unwrap();
    let year = Utc::now().format("%Y").to_string();
    assert_eq!(
        numbers,
        vec![format!("CLM-{year}-00001"), format!("CLM-{year}-00002")]
    );

    // Age one claim past the 31-60 day boundary.
    sqlx::query(
        "UPDATE insurance_claims SET filed_at = NOW() - INTERVAL '45 days' \
         WHERE claim_number = $1",
    )
    .bind(format!("CLM-{year}-00001"))
    .execute(&pool)
    .await
    .unwrap();

    let response = app(pool.clone())
        .oneshot(
            Request::builder()
                .uri(format!("/api/clinics/{clinic_id}/claims/aging"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["current"], json!(1));
    assert_eq!(body["days_31_to_60"], json!(1));
    assert_eq!(body["over_120"], json!(0));
}

#[tokio::test]
async fn estimate_endpoint_is_pure_arithmetic() {
    use axum::routing::post;
    use ortho_billing::billing::api::estimate_insurance;

    let app = Router::new().route("/api/insurance/estimate", post(estimate_insurance));
    let response = app
        .oneshot(json_request(
            "/api/insurance/estimate".to_string(),
            json!({
                "charge": "500.00",
                "coverage": {
                    "effective_date": "2023-01-01",
                    "termination_date": null,
                    "waiting_period_months": 0,
                    "lifetime_maximum": "2000.00",
                    "lifetime_used": "500.00",
                    "coverage_percent": "50",
                    "annual_deductible": "100.00",
                    "deductible_met": "25.00",
                },
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["availability"]["available"], json!(true));

    let amount = |field: &str| -> Decimal {
        body["estimate"][field]
            .as_str()
            .expect("decimal serialized as string")
            .parse()
            .unwrap()
    };
    assert_eq!(amount("deductible_applied"), Decimal::new(75_00, 2));
    assert_eq!(amount("estimated_payment"), Decimal::new(212_50, 2));
    assert_eq!(amount("patient_responsibility"), Decimal::new(287_50, 2));
}
