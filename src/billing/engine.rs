use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Datelike, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db;

use super::gateway::{PaymentGateway, PaymentIntentRequest};
use super::models::{
    Payment, PaymentFrequency, PaymentPlan, PaymentStatus, PaymentsNeedingAttention,
    PatientAccount, ProcessingResult, RecurringBillingConfig, ScheduledPayment,
};
use super::notifications::{NotificationHandle, PaymentEvent};

/// key: billing-engine -> scheduled payment state machine
///
/// Drives PENDING -> PROCESSING -> {COMPLETED | PENDING(retry) | FAILED}
/// per installment. Expected business failures travel in the returned
/// `ProcessingResult`; only infrastructure errors (store connectivity)
/// propagate as `Err`.
pub struct RecurringBillingEngine {
    pool: PgPool,
    gateway: Arc<dyn PaymentGateway>,
    config: RecurringBillingConfig,
    notifications: Option<NotificationHandle>,
}

impl RecurringBillingEngine {
    pub fn new(
        pool: PgPool,
        gateway: Arc<dyn PaymentGateway>,
        config: RecurringBillingConfig,
    ) -> Self {
        Self {
            pool,
            gateway,
            config,
            notifications: None,
        }
    }

    pub fn with_notifications(mut self, handle: NotificationHandle) -> Self {
        self.notifications = Some(handle);
        self
    }

    pub fn config(&self) -> &RecurringBillingConfig {
        &self.config
    }

    /// Processes every due PENDING payment for the clinic, earliest due date
    /// first, sequentially. One payment's failure never aborts the batch.
    pub async fn process_due_payments(
        &self,
        clinic_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<ProcessingResult>> {
        let due = db::scheduled_payments::find_due(&self.pool, clinic_id, now).await?;
        let mut results = Vec::with_capacity(due.len());

        for payment in due {
            let id = payment.id;
            match self.process_scheduled_payment(&payment, now).await {
                Ok(result) => results.push(result),
                Err(err) => {
                    warn!(?err, scheduled_payment = %id, "scheduled payment processing aborted");
                    results.push(ProcessingResult::failed(id, format!("internal error: {err}")));
                }
            }
        }

        Ok(results)
    }

    /// The per-installment core: preconditions, atomic PROCESSING claim,
    /// gateway charge, then either the success transaction or the retry
    /// policy.
    pub async fn process_scheduled_payment(
        &self,
        payment: &ScheduledPayment,
        now: DateTime<Utc>,
    ) -> Result<ProcessingResult> {
        if payment.status != PaymentStatus::Pending {
            return Ok(ProcessingResult::failed(
                payment.id,
                format!("payment is {}, not PENDING", payment.status.as_str()),
            ));
        }

        let plan = db::payment_plans::get(&self.pool, payment.plan_id)
            .await?
            .context("payment plan missing for scheduled payment")?;
        let account = db::accounts::get(&self.pool, plan.account_id)
            .await?
            .context("patient account missing for payment plan")?;

        if !plan.auto_charge {
            return self
                .fail_precondition(payment, "Auto-charge is disabled for this payment plan")
                .await;
        }
        let Some(customer_id) = account.gateway_customer_id.clone() else {
            return self
                .fail_precondition(payment, "No gateway customer on file")
                .await;
        };
        let method_id = plan
            .payment_method_id
            .clone()
            .or_else(|| account.default_payment_method_id.clone());
        let Some(payment_method_id) = method_id else {
            return self
                .fail_precondition(payment, "No payment method on file")
                .await;
        };

        // Concurrency guard: the claim and the status check are one UPDATE.
        let Some(claimed) =
            db::scheduled_payments::claim_processing(&self.pool, payment.id, now).await?
        else {
            return Ok(ProcessingResult::failed(
                payment.id,
                "already claimed by a concurrent invocation",
            ));
        };

        let request = PaymentIntentRequest {
            amount: claimed.amount,
            currency: "usd".to_string(),
            customer_id,
            payment_method_id,
            description: format!("Orthodontic payment plan installment due {}", claimed.due_date.date_naive()),
            receipt_email: None,
            metadata: serde_json::json!({
                "scheduled_payment_id": claimed.id,
                "payment_plan_id": claimed.plan_id,
                "clinic_id": claimed.clinic_id,
            }),
        };

        let charge = match tokio::time::timeout(
            self.config.gateway_timeout,
            self.gateway.create_payment_intent(request),
        )
        .await
        {
            Err(_) => Err(format!(
                "gateway timeout after {:?}",
                self.config.gateway_timeout
            )),
            Ok(Err(err)) => Err(format!("gateway error: {err}")),
            Ok(Ok(intent)) if !intent.is_successful() => {
                Err(format!("gateway declined: {}", intent.status))
            }
            Ok(Ok(intent)) => Ok(intent),
        };

        match charge {
            Ok(intent) => {
                self.finalize_success(&claimed, &plan, &account, &intent.id, now)
                    .await
            }
            Err(reason) => self.handle_charge_failure(&claimed, &reason, now).await,
        }
    }

    /// Operator-triggered retry. Rejects COMPLETED (terminal) and PROCESSING
    /// (another invocation holds the lock); otherwise resets the row to
    /// PENDING due now and re-enters the normal state machine.
    pub async fn retry_scheduled_payment(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<ProcessingResult> {
        let Some(payment) = db::scheduled_payments::get(&self.pool, id).await? else {
            return Ok(ProcessingResult::failed(id, "scheduled payment not found"));
        };

        match payment.status {
            PaymentStatus::Completed => {
                return Ok(ProcessingResult::failed(id, "payment already completed"));
            }
            PaymentStatus::Processing => {
                return Ok(ProcessingResult::failed(id, "payment is currently processing"));
            }
            _ => {}
        }

        let Some(reset) = db::scheduled_payments::reset_for_retry(&self.pool, id, now).await?
        else {
            return Ok(ProcessingResult::failed(id, "payment state changed concurrently"));
        };

        info!(scheduled_payment = %id, "manual retry requested");
        self.process_scheduled_payment(&reset, now).await
    }

    /// Escape hatch used during plan restructuring. Transition validation
    /// applies: a COMPLETED (or already SKIPPED) payment cannot be skipped.
    pub async fn skip_scheduled_payment(
        &self,
        id: Uuid,
        reason: &str,
    ) -> Result<ProcessingResult> {
        let Some(payment) = db::scheduled_payments::get(&self.pool, id).await? else {
            return Ok(ProcessingResult::failed(id, "scheduled payment not found"));
        };

        if !payment.status.can_transition(PaymentStatus::Skipped) {
            return Ok(ProcessingResult::failed(
                id,
                format!("cannot skip a {} payment", payment.status.as_str()),
            ));
        }

        if db::scheduled_payments::mark_skipped(&self.pool, id, reason)
            .await?
            .is_none()
        {
            return Ok(ProcessingResult::failed(id, "payment state changed concurrently"));
        }

        info!(scheduled_payment = %id, reason, "scheduled payment skipped");
        self.complete_plan_if_settled(payment.plan_id).await?;

        Ok(ProcessingResult {
            scheduled_payment_id: id,
            success: true,
            payment_id: None,
            error: None,
            retry_scheduled: false,
            next_retry_date: None,
        })
    }

    /// Bulk-creates `count` PENDING installments. Returns None when the plan
    /// does not exist.
    pub async fn generate_scheduled_payments(
        &self,
        plan_id: Uuid,
        start_date: DateTime<Utc>,
        count: u32,
        amount: Decimal,
        frequency: PaymentFrequency,
        now: DateTime<Utc>,
    ) -> Result<Option<Vec<ScheduledPayment>>> {
        let Some(plan) = db::payment_plans::get(&self.pool, plan_id).await? else {
            return Ok(None);
        };

        let rows: Vec<ScheduledPayment> = (0..count)
            .map(|n| ScheduledPayment {
                id: Uuid::new_v4(),
                clinic_id: plan.clinic_id,
                plan_id,
                amount,
                due_date: frequency.nth_due_date(start_date, n),
                status: PaymentStatus::Pending,
                retry_count: 0,
                last_attempt_at: None,
                last_error: None,
                payment_id: None,
                skip_reason: None,
                created_at: now,
                updated_at: now,
            })
            .collect();

        db::scheduled_payments::insert_batch(&self.pool, &rows).await?;
        info!(
            plan = %plan_id,
            installments = rows.len(),
            frequency = frequency.as_str(),
            "generated payment schedule"
        );

        Ok(Some(rows))
    }

    /// Read-only operator alert counts; no state mutation.
    pub async fn get_payments_needing_attention(
        &self,
        clinic_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<PaymentsNeedingAttention> {
        Ok(db::scheduled_payments::attention_counts(&self.pool, clinic_id, now).await?)
    }

    async fn fail_precondition(
        &self,
        payment: &ScheduledPayment,
        reason: &str,
    ) -> Result<ProcessingResult> {
        let updated =
            db::scheduled_payments::mark_failed(&self.pool, payment.id, reason).await?;
        if updated.is_none() {
            return Ok(ProcessingResult::failed(
                payment.id,
                "payment state changed concurrently",
            ));
        }

        warn!(
            scheduled_payment = %payment.id,
            plan = %payment.plan_id,
            reason,
            "scheduled payment failed precondition check"
        );
        self.complete_plan_if_settled(payment.plan_id).await?;

        if self.config.notify_on_failure {
            self.notify(PaymentEvent::Failed {
                clinic_id: payment.clinic_id,
                scheduled_payment_id: payment.id,
                error: reason.to_string(),
            })
            .await;
        }

        Ok(ProcessingResult::failed(payment.id, reason))
    }

    /// Success path, atomically: ledger insert, COMPLETED transition, balance
    /// recompute, plan-completion check. The gateway charge itself cannot be
    /// rolled back; the intent metadata carries the scheduled-payment id so
    /// the provider can deduplicate a re-submission.
    async fn finalize_success(
        &self,
        claimed: &ScheduledPayment,
        plan: &PaymentPlan,
        account: &PatientAccount,
        gateway_transaction_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ProcessingResult> {
        let mut tx = self.pool.begin().await?;

        let payment_number =
            db::payments::generate_payment_number(&mut tx, claimed.clinic_id, now.year()).await?;
        let ledger = Payment {
            id: Uuid::new_v4(),
            clinic_id: claimed.clinic_id,
            account_id: account.id,
            payment_number,
            amount: claimed.amount,
            paid_at: now,
            method: "CARD_ON_FILE".to_string(),
            status: "COMPLETED".to_string(),
            gateway_transaction_id: Some(gateway_transaction_id.to_string()),
            source_type: "SCHEDULED_PAYMENT".to_string(),
            source_id: claimed.id,
            plan_id: plan.id,
            created_at: now,
        };
        db::payments::insert(&mut tx, &ledger).await?;

        let updated = db::scheduled_payments::mark_completed(&mut tx, claimed.id, ledger.id).await?;
        if updated == 0 {
            tx.rollback().await?;
            bail!("processing lock lost for scheduled payment {}", claimed.id);
        }

        db::accounts::recompute_balance(&mut tx, account.id).await?;

        let open = db::scheduled_payments::open_count_for_plan(&mut tx, plan.id).await?;
        if open == 0 {
            db::payment_plans::mark_completed(&mut tx, plan.id).await?;
        }

        tx.commit().await?;

        info!(
            scheduled_payment = %claimed.id,
            payment = %ledger.id,
            payment_number = %ledger.payment_number,
            amount = %ledger.amount,
            plan_settled = open == 0,
            "scheduled payment collected"
        );

        if self.config.notify_on_success {
            self.notify(PaymentEvent::Succeeded {
                clinic_id: claimed.clinic_id,
                scheduled_payment_id: claimed.id,
                payment_id: ledger.id,
                amount: ledger.amount,
            })
            .await;
        }

        Ok(ProcessingResult::succeeded(claimed.id, ledger.id))
    }

    async fn handle_charge_failure(
        &self,
        claimed: &ScheduledPayment,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<ProcessingResult> {
        let failures_so_far = claimed.retry_count as u32;

        if failures_so_far < self.config.max_retry_attempts {
            let next_due = now + self.config.retry_delay_for(failures_so_far);
            let Some(updated) =
                db::scheduled_payments::schedule_retry(&self.pool, claimed.id, reason, next_due)
                    .await?
            else {
                return Ok(ProcessingResult::failed(
                    claimed.id,
                    "payment state changed concurrently",
                ));
            };

            warn!(
                scheduled_payment = %claimed.id,
                retry_count = updated.retry_count,
                next_retry = %next_due,
                reason,
                "charge failed, retry scheduled"
            );

            if self.config.notify_on_failure {
                self.notify(PaymentEvent::RetryScheduled {
                    clinic_id: claimed.clinic_id,
                    scheduled_payment_id: claimed.id,
                    retry_count: updated.retry_count,
                    next_retry_date: next_due,
                    error: reason.to_string(),
                })
                .await;
            }

            return Ok(ProcessingResult::retry_scheduled(claimed.id, reason, next_due));
        }

        let updated = db::scheduled_payments::mark_failed(&self.pool, claimed.id, reason).await?;
        if updated.is_none() {
            return Ok(ProcessingResult::failed(
                claimed.id,
                "payment state changed concurrently",
            ));
        }

        warn!(
            scheduled_payment = %claimed.id,
            retry_count = claimed.retry_count,
            reason,
            "charge failed, retries exhausted"
        );
        self.complete_plan_if_settled(claimed.plan_id).await?;

        if self.config.notify_on_failure {
            self.notify(PaymentEvent::Failed {
                clinic_id: claimed.clinic_id,
                scheduled_payment_id: claimed.id,
                error: reason.to_string(),
            })
            .await;
        }

        Ok(ProcessingResult::failed(claimed.id, reason))
    }

    /// A plan completes exactly when zero PENDING/PROCESSING children remain.
    async fn complete_plan_if_settled(&self, plan_id: Uuid) -> Result<()> {
        let open = db::scheduled_payments::open_count_for_plan(&self.pool, plan_id).await?;
        if open == 0 {
            let updated = db::payment_plans::mark_completed(&self.pool, plan_id).await?;
            if updated > 0 {
                info!(plan = %plan_id, "payment plan completed");
            }
        }
        Ok(())
    }

    async fn notify(&self, event: PaymentEvent) {
        if let Some(handle) = &self.notifications {
            if let Err(err) = handle.dispatch(event).await {
                warn!(?err, "payment notification dropped");
            }
        }
    }
}
