use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use ortho_billing::billing::{
    scheduler, PaymentGateway, PaymentIntent, PaymentIntentRequest, RecurringBillingConfig,
};

// key: billing-scheduler-tests -> tick-driven due-payment sweeps

struct SucceedingGateway;

#[async_trait]
impl PaymentGateway for SucceedingGateway {
    async fn create_payment_intent(&self, _request: PaymentIntentRequest) -> Result<PaymentIntent> {
        Ok(PaymentIntent {
            id: format!("pi_{}", Uuid::new_v4().simple()),
            status: "succeeded".to_string(),
        })
    }
}

async fn seed_clinic_with_due_payment(pool: &PgPool, due_days_ago: i64) -> (Uuid, Uuid) {
    let clinic_id = Uuid::new_v4();
    sqlx::query("INSERT INTO clinics (id, name) VALUES ($1, $2)")
        .bind(clinic_id)
        .bind("Tick Test Orthodontics")
        .execute(pool)
        .await
        .unwrap();

    let account_id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO patient_accounts \
         (id, clinic_id, patient_name, gateway_customer_id, default_payment_method_id, \
          total_billed, balance) \
         VALUES ($1, $2, 'Sam Okafor', 'cus_tick', 'pm_tick', $3, $3)",
    )
    .bind(account_id)
    .bind(clinic_id)
    .bind(Decimal::new(100_00, 2))
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
    .bind(Decimal::new(100_00, 2))
    .bind(Utc::now() - Duration::days(due_days_ago))
    .execute(pool)
    .await
    .unwrap();

    (clinic_id, payment_id)
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn tick_sweeps_every_clinic_with_due_work(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();

    let (_, first_payment) = seed_clinic_with_due_payment(&pool, 2).await;
    let (_, second_payment) = seed_clinic_with_due_payment(&pool, 5).await;

    scheduler::process_tick(
        &pool,
        Arc::new(SucceedingGateway),
        &RecurringBillingConfig::default(),
        None,
        Utc::now(),
    )
    .await
    .unwrap();

    for payment_id in [first_payment, second_payment] {
        let status: String =
            sqlx::query_scalar("SELECT status FROM scheduled_payments WHERE id = $1")
                .bind(payment_id)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(status, "COMPLETED");
    }
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn tick_leaves_future_installments_alone(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();

    let (_, payment_id) = seed_clinic_with_due_payment(&pool, -10).await;

    scheduler::process_tick(
        &pool,
        Arc::new(SucceedingGateway),
        &RecurringBillingConfig::default(),
        None,
        Utc::now(),
    )
    .await
    .unwrap();

    let status: String =
        sqlx::query_scalar("SELECT status FROM scheduled_payments WHERE id = $1")
            .bind(payment_id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(status, "PENDING");
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn tick_with_no_due_work_is_a_noop(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();

    scheduler::process_tick(
        &pool,
        Arc::new(SucceedingGateway),
        &RecurringBillingConfig::default(),
        None,
        Utc::now(),
    )
    .await
    .unwrap();
}
