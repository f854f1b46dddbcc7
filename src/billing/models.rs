use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Months, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// key: billing-status -> scheduled payment state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Skipped,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Processing => "PROCESSING",
            PaymentStatus::Completed => "COMPLETED",
            PaymentStatus::Failed => "FAILED",
            PaymentStatus::Skipped => "SKIPPED",
        }
    }

    pub fn parse(raw: &str) -> Option<PaymentStatus> {
        match raw {
            "PENDING" => Some(PaymentStatus::Pending),
            "PROCESSING" => Some(PaymentStatus::Processing),
            "COMPLETED" => Some(PaymentStatus::Completed),
            "FAILED" => Some(PaymentStatus::Failed),
            "SKIPPED" => Some(PaymentStatus::Skipped),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Completed | PaymentStatus::Failed | PaymentStatus::Skipped
        )
    }

    /// Every status write goes through this table. PENDING -> FAILED covers
    /// precondition failures that never reach the gateway; FAILED/SKIPPED ->
    /// PENDING are the operator resurrection edges. COMPLETED has no exits.
    pub fn can_transition(self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, Failed)
                | (Pending, Skipped)
                | (Processing, Completed)
                | (Processing, Pending)
                | (Processing, Failed)
                | (Processing, Skipped)
                | (Failed, Pending)
                | (Failed, Skipped)
                | (Skipped, Pending)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PlanStatus {
    Active,
    Completed,
}

impl PlanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanStatus::Active => "ACTIVE",
            PlanStatus::Completed => "COMPLETED",
        }
    }

    pub fn parse(raw: &str) -> Option<PlanStatus> {
        match raw {
            "ACTIVE" => Some(PlanStatus::Active),
            "COMPLETED" => Some(PlanStatus::Completed),
            _ => None,
        }
    }
}

/// key: billing-frequency -> installment date stepping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PaymentFrequency {
    Weekly,
    Biweekly,
    Monthly,
}

impl PaymentFrequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentFrequency::Weekly => "WEEKLY",
            PaymentFrequency::Biweekly => "BIWEEKLY",
            PaymentFrequency::Monthly => "MONTHLY",
        }
    }

    /// Due date of the nth installment counted from `start` (n = 0 is the
    /// start date itself). Monthly stepping is calendar-month arithmetic, so
    /// month-length variation follows chrono's rules.
    pub fn nth_due_date(&self, start: DateTime<Utc>, n: u32) -> DateTime<Utc> {
        match self {
            PaymentFrequency::Weekly => start + Duration::days(7 * i64::from(n)),
            PaymentFrequency::Biweekly => start + Duration::days(14 * i64::from(n)),
            PaymentFrequency::Monthly => {
                start.checked_add_months(Months::new(n)).unwrap_or(start)
            }
        }
    }
}

/// key: billing-config -> retry policy + notification gates
#[derive(Debug, Clone)]
pub struct RecurringBillingConfig {
    pub max_retry_attempts: u32,
    pub retry_delay_days: Vec<i64>,
    pub gateway_timeout: StdDuration,
    pub notify_on_failure: bool,
    pub notify_on_success: bool,
}

impl Default for RecurringBillingConfig {
    fn default() -> Self {
        Self {
            max_retry_attempts: 3,
            retry_delay_days: vec![1, 3, 7],
            gateway_timeout: StdDuration::from_secs(30),
            notify_on_failure: true,
            notify_on_success: false,
        }
    }
}

impl RecurringBillingConfig {
    /// Delay before the next attempt for a payment that has already failed
    /// `retry_count` times. Past the end of the table the last entry applies,
    /// or 7 days when the table is empty.
    pub fn retry_delay_for(&self, retry_count: u32) -> Duration {
        let days = self
            .retry_delay_days
            .get(retry_count as usize)
            .or_else(|| self.retry_delay_days.last())
            .copied()
            .unwrap_or(7);
        Duration::days(days)
    }

    pub fn apply_overrides(&self, overrides: &BillingConfigOverrides) -> Self {
        let mut merged = self.clone();
        if let Some(max) = overrides.max_retry_attempts {
            merged.max_retry_attempts = max;
        }
        if let Some(delays) = &overrides.retry_delay_days {
            merged.retry_delay_days = delays.clone();
        }
        if let Some(flag) = overrides.notify_on_failure {
            merged.notify_on_failure = flag;
        }
        if let Some(flag) = overrides.notify_on_success {
            merged.notify_on_success = flag;
        }
        merged
    }
}

/// Per-call overrides accepted by the operator-facing endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BillingConfigOverrides {
    #[serde(default)]
    pub max_retry_attempts: Option<u32>,
    #[serde(default)]
    pub retry_delay_days: Option<Vec<i64>>,
    #[serde(default)]
    pub notify_on_failure: Option<bool>,
    #[serde(default)]
    pub notify_on_success: Option<bool>,
}

/// key: billing-models -> installment obligation
#[derive(Debug, Clone, Serialize)]
pub struct ScheduledPayment {
    pub id: Uuid,
    pub clinic_id: Uuid,
    pub plan_id: Uuid,
    pub amount: Decimal,
    pub due_date: DateTime<Utc>,
    pub status: PaymentStatus,
    pub retry_count: i32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub payment_id: Option<Uuid>,
    pub skip_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// key: billing-models -> parent aggregate for one patient account
#[derive(Debug, Clone, Serialize)]
pub struct PaymentPlan {
    pub id: Uuid,
    pub clinic_id: Uuid,
    pub account_id: Uuid,
    pub auto_charge: bool,
    pub payment_method_id: Option<String>,
    pub status: PlanStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Immutable ledger entry; created exactly once per successful charge.
#[derive(Debug, Clone, Serialize)]
pub struct Payment {
    pub id: Uuid,
    pub clinic_id: Uuid,
    pub account_id: Uuid,
    pub payment_number: String,
    pub amount: Decimal,
    pub paid_at: DateTime<Utc>,
    pub method: String,
    pub status: String,
    pub gateway_transaction_id: Option<String>,
    pub source_type: String,
    pub source_id: Uuid,
    pub plan_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PatientAccount {
    pub id: Uuid,
    pub clinic_id: Uuid,
    pub patient_name: String,
    pub gateway_customer_id: Option<String>,
    pub default_payment_method_id: Option<String>,
    pub total_billed: Decimal,
    pub balance: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// key: billing-result -> per-payment outcome envelope
#[derive(Debug, Clone, Serialize)]
pub struct ProcessingResult {
    pub scheduled_payment_id: Uuid,
    pub success: bool,
    pub payment_id: Option<Uuid>,
    pub error: Option<String>,
    pub retry_scheduled: bool,
    pub next_retry_date: Option<DateTime<Utc>>,
}

impl ProcessingResult {
    pub fn succeeded(scheduled_payment_id: Uuid, payment_id: Uuid) -> Self {
        Self {
            scheduled_payment_id,
            success: true,
            payment_id: Some(payment_id),
            error: None,
            retry_scheduled: false,
            next_retry_date: None,
        }
    }

    pub fn failed(scheduled_payment_id: Uuid, error: impl Into<String>) -> Self {
        Self {
            scheduled_payment_id,
            success: false,
            payment_id: None,
            error: Some(error.into()),
            retry_scheduled: false,
            next_retry_date: None,
        }
    }

    pub fn retry_scheduled(
        scheduled_payment_id: Uuid,
        error: impl Into<String>,
        next_retry_date: DateTime<Utc>,
    ) -> Self {
        Self {
            scheduled_payment_id,
            success: false,
            payment_id: None,
            error: Some(error.into()),
            retry_scheduled: true,
            next_retry_date: Some(next_retry_date),
        }
    }
}

/// Read-only operator alert counts for a clinic.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentsNeedingAttention {
    pub failed: i64,
    pub overdue: i64,
    pub due_today: i64,
    pub upcoming_week: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn transition_table_rejects_exits_from_completed() {
        use PaymentStatus::*;
        for next in [Pending, Processing, Completed, Failed, Skipped] {
            assert!(!Completed.can_transition(next));
        }
    }

    #[test]
    fn transition_table_allows_the_documented_edges() {
        use PaymentStatus::*;
        assert!(Pending.can_transition(Processing));
        assert!(Pending.can_transition(Failed));
        assert!(Processing.can_transition(Completed));
        assert!(Processing.can_transition(Pending));
        assert!(Processing.can_transition(Failed));
        assert!(Failed.can_transition(Pending));
        assert!(!Skipped.can_transition(Skipped));
        assert!(!Pending.can_transition(Completed));
    }

    #[test]
    fn retry_delays_follow_the_table_then_fall_back() {
        let config = RecurringBillingConfig::default();
        assert_eq!(config.retry_delay_for(0), Duration::days(1));
        assert_eq!(config.retry_delay_for(1), Duration::days(3));
        assert_eq!(config.retry_delay_for(2), Duration::days(7));
        assert_eq!(config.retry_delay_for(3), Duration::days(7));
        assert_eq!(config.retry_delay_for(10), Duration::days(7));

        let empty = RecurringBillingConfig {
            retry_delay_days: vec![],
            ..RecurringBillingConfig::default()
        };
        assert_eq!(empty.retry_delay_for(0), Duration::days(7));
    }

    #[test]
    fn monthly_stepping_uses_calendar_months() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let freq = PaymentFrequency::Monthly;
        assert_eq!(
            freq.nth_due_date(start, 1),
            Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(
            freq.nth_due_date(start, 2),
            Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
        );

        // Jan 31 + 1 month clamps to the end of February.
        let end_of_jan = Utc.with_ymd_and_hms(2024, 1, 31, 0, 0, 0).unwrap();
        assert_eq!(
            freq.nth_due_date(end_of_jan, 1),
            Utc.with_ymd_and_hms(2024, 2, 29, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn weekly_and_biweekly_step_by_fixed_days() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(
            PaymentFrequency::Weekly.nth_due_date(start, 3),
            start + Duration::days(21)
        );
        assert_eq!(
            PaymentFrequency::Biweekly.nth_due_date(start, 2),
            start + Duration::days(28)
        );
    }

    #[test]
    fn overrides_merge_onto_base_config() {
        let base = RecurringBillingConfig::default();
        let merged = base.apply_overrides(&BillingConfigOverrides {
            max_retry_attempts: Some(5),
            retry_delay_days: Some(vec![2, 4]),
            ..BillingConfigOverrides::default()
        });
        assert_eq!(merged.max_retry_attempts, 5);
        assert_eq!(merged.retry_delay_days, vec![2, 4]);
        assert!(merged.notify_on_failure);
    }
}
