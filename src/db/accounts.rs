use rust_decimal::Decimal;
use sqlx::{postgres::PgRow, Executor, Postgres, Row};
use uuid::Uuid;

use crate::billing::models::PatientAccount;

const COLUMNS: &str = "id, clinic_id, patient_name, gateway_customer_id, \
     default_payment_method_id, total_billed, balance, created_at, updated_at";

pub async fn get<'c, E>(executor: E, id: Uuid) -> Result<Option<PatientAccount>, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    let row = sqlx::query(&format!(
        "SELECT {COLUMNS} FROM patient_accounts WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(executor)
    .await?;

    Ok(row.map(|row| map_row(&row)))
}

/// Recomputes the derived balance from the ledger: total billed minus every
/// completed payment. The stored column is a cache, never the authority.
pub async fn recompute_balance<'c, E>(executor: E, account_id: Uuid) -> Result<Decimal, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    sqlx::query_scalar::<_, Decimal>(
        "UPDATE patient_accounts \
         SET balance = total_billed - COALESCE(( \
                 SELECT SUM(amount) FROM payments \
                 WHERE account_id = $1 AND status = 'COMPLETED' \
             ), 0), \
             updated_at = NOW() \
         WHERE id = $1 \
         RETURNING balance",
    )
    .bind(account_id)
    .fetch_one(executor)
    .await
}

fn map_row(row: &PgRow) -> PatientAccount {
    PatientAccount {
        id: row.get("id"),
        clinic_id: row.get("clinic_id"),
        patient_name: row.get("patient_name"),
        gateway_customer_id: row.try_get("gateway_customer_id").ok().flatten(),
        default_payment_method_id: row.try_get("default_payment_method_id").ok().flatten(),
        total_billed: row.get("total_billed"),
        balance: row.get("balance"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}
