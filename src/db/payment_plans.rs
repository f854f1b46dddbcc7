use sqlx::{postgres::PgRow, Executor, Postgres, Row};
use uuid::Uuid;

use crate::billing::models::{PaymentPlan, PlanStatus};

const COLUMNS: &str =
    "id, clinic_id, account_id, auto_charge, payment_method_id, status, created_at, updated_at";

pub async fn get<'c, E>(executor: E, id: Uuid) -> Result<Option<PaymentPlan>, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    let row = sqlx::query(&format!(
        "SELECT {COLUMNS} FROM payment_plans WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(executor)
    .await?;

    Ok(row.map(|row| map_row(&row)))
}

/// ACTIVE -> COMPLETED; a no-op when the plan is already completed.
pub async fn mark_completed<'c, E>(executor: E, id: Uuid) -> Result<u64, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    let result = sqlx::query(
        "UPDATE payment_plans SET status = 'COMPLETED', updated_at = NOW() \
         WHERE id = $1 AND status = 'ACTIVE'",
    )
    .bind(id)
    .execute(executor)
    .await?;

    Ok(result.rows_affected())
}

fn map_row(row: &PgRow) -> PaymentPlan {
    let status: String = row.get("status");
    PaymentPlan {
        id: row.get("id"),
        clinic_id: row.get("clinic_id"),
        account_id: row.get("account_id"),
        auto_charge: row.get("auto_charge"),
        payment_method_id: row.try_get("payment_method_id").ok().flatten(),
        status: PlanStatus::parse(&status).unwrap_or(PlanStatus::Active),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}
