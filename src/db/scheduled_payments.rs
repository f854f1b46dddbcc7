use chrono::{DateTime, Duration, Utc};
use sqlx::{postgres::PgRow, Executor, PgPool, Postgres, Row};
use uuid::Uuid;

use crate::billing::models::{PaymentStatus, PaymentsNeedingAttention, ScheduledPayment};

const COLUMNS: &str = "id, clinic_id, plan_id, amount, due_date, status, retry_count, \
     last_attempt_at, last_error, payment_id, skip_reason, created_at, updated_at";

pub async fn get<'c, E>(executor: E, id: Uuid) -> Result<Option<ScheduledPayment>, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    let row = sqlx::query(&format!(
        "SELECT {COLUMNS} FROM scheduled_payments WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(executor)
    .await?;

    Ok(row.map(|row| map_row(&row)))
}

/// Due rows for one clinic, earliest due date first.
pub async fn find_due(
    pool: &PgPool,
    clinic_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Vec<ScheduledPayment>, sqlx::Error> {
    let rows = sqlx::query(&format!(
        "SELECT {COLUMNS} FROM scheduled_payments \
         WHERE clinic_id = $1 AND status = 'PENDING' AND due_date <= $2 \
         ORDER BY due_date ASC"
    ))
    .bind(clinic_id)
    .bind(now)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(map_row).collect())
}

pub async fn find_by_plan(
    pool: &PgPool,
    plan_id: Uuid,
) -> Result<Vec<ScheduledPayment>, sqlx::Error> {
    let rows = sqlx::query(&format!(
        "SELECT {COLUMNS} FROM scheduled_payments WHERE plan_id = $1 ORDER BY due_date ASC"
    ))
    .bind(plan_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(map_row).collect())
}

/// Clinics that currently have due PENDING work; drives the scheduler tick.
pub async fn clinics_with_due_work(
    pool: &PgPool,
    now: DateTime<Utc>,
) -> Result<Vec<Uuid>, sqlx::Error> {
    let rows = sqlx::query_scalar::<_, Uuid>(
        "SELECT DISTINCT clinic_id FROM scheduled_payments \
         WHERE status = 'PENDING' AND due_date <= $1",
    )
    .bind(now)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Atomic PENDING -> PROCESSING claim. Returns None when another invocation
/// already holds the row, which is how a concurrent batch avoids a double
/// charge: the status guard and the claim are one statement.
pub async fn claim_processing(
    pool: &PgPool,
    id: Uuid,
    now: DateTime<Utc>,
) -> Result<Option<ScheduledPayment>, sqlx::Error> {
    let row = sqlx::query(&format!(
        "UPDATE scheduled_payments \
         SET status = 'PROCESSING', last_attempt_at = $2, updated_at = NOW() \
         WHERE id = $1 AND status = 'PENDING' \
         RETURNING {COLUMNS}"
    ))
    .bind(id)
    .bind(now)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|row| map_row(&row)))
}

/// PROCESSING -> COMPLETED with the ledger back-reference. Returns the number
/// of rows updated; zero means the processing lock was lost.
pub async fn mark_completed<'c, E>(
    executor: E,
    id: Uuid,
    payment_id: Uuid,
) -> Result<u64, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    let result = sqlx::query(
        "UPDATE scheduled_payments \
         SET status = 'COMPLETED', payment_id = $2, last_error = NULL, updated_at = NOW() \
         WHERE id = $1 AND status = 'PROCESSING'",
    )
    .bind(id)
    .bind(payment_id)
    .execute(executor)
    .await?;

    Ok(result.rows_affected())
}

/// PROCESSING -> PENDING with the retry bookkeeping: incremented retry count,
/// recorded error, and the new due date.
pub async fn schedule_retry(
    pool: &PgPool,
    id: Uuid,
    error: &str,
    next_due: DateTime<Utc>,
) -> Result<Option<ScheduledPayment>, sqlx::Error> {
    let row = sqlx::query(&format!(
        "UPDATE scheduled_payments \
         SET status = 'PENDING', retry_count = retry_count + 1, last_error = $2, \
             due_date = $3, updated_at = NOW() \
         WHERE id = $1 AND status = 'PROCESSING' \
         RETURNING {COLUMNS}"
    ))
    .bind(id)
    .bind(error)
    .bind(next_due)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|row| map_row(&row)))
}

/// Terminal FAILED, from PENDING (precondition failure) or PROCESSING
/// (retry exhaustion). retry_count stays put, so it never exceeds the
/// configured maximum.
pub async fn mark_failed(
    pool: &PgPool,
    id: Uuid,
    error: &str,
) -> Result<Option<ScheduledPayment>, sqlx::Error> {
    let row = sqlx::query(&format!(
        "UPDATE scheduled_payments \
         SET status = 'FAILED', last_error = $2, updated_at = NOW() \
         WHERE id = $1 AND status IN ('PENDING', 'PROCESSING') \
         RETURNING {COLUMNS}"
    ))
    .bind(id)
    .bind(error)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|row| map_row(&row)))
}

/// Terminal SKIPPED. The caller has already validated the transition; the
/// status guard repeats it so a concurrent writer cannot slip past.
pub async fn mark_skipped(
    pool: &PgPool,
    id: Uuid,
    reason: &str,
) -> Result<Option<ScheduledPayment>, sqlx::Error> {
    let row = sqlx::query(&format!(
        "UPDATE scheduled_payments \
         SET status = 'SKIPPED', skip_reason = $2, updated_at = NOW() \
         WHERE id = $1 AND status NOT IN ('COMPLETED', 'SKIPPED') \
         RETURNING {COLUMNS}"
    ))
    .bind(id)
    .bind(reason)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|row| map_row(&row)))
}

/// Operator reset ahead of a manual retry: back to PENDING, due now.
pub async fn reset_for_retry(
    pool: &PgPool,
    id: Uuid,
    now: DateTime<Utc>,
) -> Result<Option<ScheduledPayment>, sqlx::Error> {
    let row = sqlx::query(&format!(
        "UPDATE scheduled_payments \
         SET status = 'PENDING', due_date = $2, updated_at = NOW() \
         WHERE id = $1 AND status <> 'COMPLETED' \
         RETURNING {COLUMNS}"
    ))
    .bind(id)
    .bind(now)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|row| map_row(&row)))
}

pub async fn insert_batch(
    pool: &PgPool,
    rows: &[ScheduledPayment],
) -> Result<(), sqlx::Error> {
    for payment in rows {
        sqlx::query(
            "INSERT INTO scheduled_payments \
             (id, clinic_id, plan_id, amount, due_date, status, retry_count) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(payment.id)
        .bind(payment.clinic_id)
        .bind(payment.plan_id)
        .bind(payment.amount)
        .bind(payment.due_date)
        .bind(payment.status.as_str())
        .bind(payment.retry_count)
        .execute(pool)
        .await?;
    }

    Ok(())
}

/// Non-terminal children of a plan; zero means the plan is settled.
pub async fn open_count_for_plan<'c, E>(executor: E, plan_id: Uuid) -> Result<i64, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM scheduled_payments \
         WHERE plan_id = $1 AND status IN ('PENDING', 'PROCESSING')",
    )
    .bind(plan_id)
    .fetch_one(executor)
    .await
}

pub async fn attention_counts(
    pool: &PgPool,
    clinic_id: Uuid,
    now: DateTime<Utc>,
) -> Result<PaymentsNeedingAttention, sqlx::Error> {
    let today_start = now
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|naive| DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc))
        .unwrap_or(now);
    let tomorrow_start = today_start + Duration::days(1);
    let week_end = today_start + Duration::days(7);

    let row = sqlx::query(
        "SELECT \
             COUNT(*) FILTER (WHERE status = 'FAILED') AS failed, \
             COUNT(*) FILTER (WHERE status = 'PENDING' AND due_date < $2) AS overdue, \
             COUNT(*) FILTER (WHERE status = 'PENDING' AND due_date >= $2 AND due_date < $3) AS due_today, \
             COUNT(*) FILTER (WHERE status = 'PENDING' AND due_date >= $3 AND due_date < $4) AS upcoming_week \
         FROM scheduled_payments WHERE clinic_id = $1",
    )
    .bind(clinic_id)
    .bind(today_start)
    .bind(tomorrow_start)
    .bind(week_end)
    .fetch_one(pool)
    .await?;

    Ok(PaymentsNeedingAttention {
        failed: row.get("failed"),
        overdue: row.get("overdue"),
        due_today: row.get("due_today"),
        upcoming_week: row.get("upcoming_week"),
    })
}

fn map_row(row: &PgRow) -> ScheduledPayment {
    let status: String = row.get("status");
    ScheduledPayment {
        id: row.get("id"),
        clinic_id: row.get("clinic_id"),
        plan_id: row.get("plan_id"),
        amount: row.get("amount"),
        due_date: row.get("due_date"),
        status: PaymentStatus::parse(&status).unwrap_or(PaymentStatus::Failed),
        retry_count: row.get("retry_count"),
        last_attempt_at: row.try_get("last_attempt_at").ok().flatten(),
        last_error: row.try_get("last_error").ok().flatten(),
        payment_id: row.try_get("payment_id").ok().flatten(),
        skip_reason: row.try_get("skip_reason").ok().flatten(),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}
