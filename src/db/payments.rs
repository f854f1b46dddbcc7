use sqlx::{Executor, Postgres};
use uuid::Uuid;

use crate::billing::models::Payment;
use crate::claims::numbers;

/// Next `PAY-YYYY-NNNNN` identifier for the clinic. Runs inside the success
/// transaction so two concurrent completions cannot mint the same number
/// (the unique index is the final arbiter).
pub async fn generate_payment_number<'c, E>(
    executor: E,
    clinic_id: Uuid,
    year: i32,
) -> Result<String, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    let existing = sqlx::query_scalar::<_, String>(
        "SELECT payment_number FROM payments WHERE clinic_id = $1 AND payment_number LIKE $2",
    )
    .bind(clinic_id)
    .bind(format!("PAY-{year}-%"))
    .fetch_all(executor)
    .await?;

    Ok(numbers::next_payment_number(
        year,
        existing.iter().map(String::as_str),
    ))
}

pub async fn insert<'c, E>(executor: E, payment: &Payment) -> Result<(), sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    sqlx::query(
        "INSERT INTO payments \
         (id, clinic_id, account_id, payment_number, amount, paid_at, method, status, \
          gateway_transaction_id, source_type, source_id, plan_id) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
    )
    .bind(payment.id)
    .bind(payment.clinic_id)
    .bind(payment.account_id)
    .bind(&payment.payment_number)
    .bind(payment.amount)
    .bind(payment.paid_at)
    .bind(&payment.method)
    .bind(&payment.status)
    .bind(&payment.gateway_transaction_id)
    .bind(&payment.source_type)
    .bind(payment.source_id)
    .bind(payment.plan_id)
    .execute(executor)
    .await?;

    Ok(())
}
