use chrono::{DateTime, Datelike, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::claims::aging::{aging_bucket, AgingBucket};
use crate::claims::numbers;

#[derive(Debug, Clone, Serialize)]
pub struct InsuranceClaim {
    pub id: Uuid,
    pub clinic_id: Uuid,
    pub account_id: Option<Uuid>,
    pub claim_number: String,
    pub amount: Decimal,
    pub filed_at: DateTime<Utc>,
    pub status: String,
}

/// Files a claim: mints the next clinic-scoped claim number and inserts the
/// row. The unique index on (clinic_id, claim_number) backstops two
/// concurrent filings racing for the same suffix.
pub async fn file_claim(
    pool: &PgPool,
    clinic_id: Uuid,
    account_id: Option<Uuid>,
    amount: Decimal,
    now: DateTime<Utc>,
) -> Result<InsuranceClaim, sqlx::Error> {
    let claim_number = generate_claim_number(pool, clinic_id, now).await?;
    let claim = InsuranceClaim {
        id: Uuid::new_v4(),
        clinic_id,
        account_id,
        claim_number,
        amount,
        filed_at: now,
        status: "SUBMITTED".to_string(),
    };

    sqlx::query(
        "INSERT INTO insurance_claims \
         (id, clinic_id, account_id, claim_number, amount, filed_at, status) \
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(claim.id)
    .bind(claim.clinic_id)
    .bind(claim.account_id)
    .bind(&claim.claim_number)
    .bind(claim.amount)
    .bind(claim.filed_at)
    .bind(&claim.status)
    .execute(pool)
    .await?;

    Ok(claim)
}

/// Next `CLM-YYYY-NNNNN` identifier for the clinic in the given year.
pub async fn generate_claim_number(
    pool: &PgPool,
    clinic_id: Uuid,
    now: DateTime<Utc>,
) -> Result<String, sqlx::Error> {
    let year = now.year();
    let existing = sqlx::query_scalar::<_, String>(
        "SELECT claim_number FROM insurance_claims WHERE clinic_id = $1 AND claim_number LIKE $2",
    )
    .bind(clinic_id)
    .bind(format!("CLM-{year}-%"))
    .fetch_all(pool)
    .await?;

    Ok(numbers::next_claim_number(
        year,
        existing.iter().map(String::as_str),
    ))
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct ClaimAgingSummary {
    pub current: i64,
    pub days_31_to_60: i64,
    pub days_61_to_90: i64,
    pub days_91_to_120: i64,
    pub over_120: i64,
}

/// Open claims for a clinic bucketed by days since filing.
pub async fn aging_summary(
    pool: &PgPool,
    clinic_id: Uuid,
    now: DateTime<Utc>,
) -> Result<ClaimAgingSummary, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT filed_at FROM insurance_claims \
         WHERE clinic_id = $1 AND status NOT IN ('PAID', 'CLOSED')",
    )
    .bind(clinic_id)
    .fetch_all(pool)
    .await?;

    let mut summary = ClaimAgingSummary::default();
    for row in rows {
        let filed_at: DateTime<Utc> = row.get("filed_at");
        match aging_bucket(filed_at, now) {
            AgingBucket::Current => summary.current += 1,
            AgingBucket::Days31To60 => summary.days_31_to_60 += 1,
            AgingBucket::Days61To90 => summary.days_61_to_90 += 1,
            AgingBucket::Days91To120 => summary.days_91_to_120 += 1,
            AgingBucket::Over120 => summary.over_120 += 1,
        }
    }

    Ok(summary)
}
