use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tokio::time::{self, Duration as TokioDuration};
use tracing::{debug, info, warn};

use crate::{config, db};

use super::engine::RecurringBillingEngine;
use super::gateway::PaymentGateway;
use super::models::RecurringBillingConfig;
use super::notifications::NotificationHandle;

/// key: billing-scheduler -> periodic due-payment scan
pub fn spawn(
    pool: PgPool,
    gateway: Arc<dyn PaymentGateway>,
    billing_config: RecurringBillingConfig,
    notifications: NotificationHandle,
) {
    let interval = TokioDuration::from_secs(*config::BILLING_SCAN_INTERVAL_SECS);

    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        loop {
            ticker.tick().await;
            let now = Utc::now();
            if let Err(err) = process_tick(
                &pool,
                gateway.clone(),
                &billing_config,
                Some(notifications.clone()),
                now,
            )
            .await
            {
                warn!(?err, "recurring billing tick failed");
            }
        }
    });
}

/// key: billing-scheduler -> tick handler
///
/// One pass over every clinic that has due PENDING work. A clinic whose
/// batch fails is logged and skipped; the tick keeps going.
pub async fn process_tick(
    pool: &PgPool,
    gateway: Arc<dyn PaymentGateway>,
    billing_config: &RecurringBillingConfig,
    notifications: Option<NotificationHandle>,
    now: DateTime<Utc>,
) -> Result<()> {
    let clinics = db::scheduled_payments::clinics_with_due_work(pool, now).await?;
    if clinics.is_empty() {
        debug!("no clinics with due scheduled payments");
        return Ok(());
    }

    let mut engine =
        RecurringBillingEngine::new(pool.clone(), gateway, billing_config.clone());
    if let Some(handle) = notifications {
        engine = engine.with_notifications(handle);
    }

    for clinic_id in clinics {
        match engine.process_due_payments(clinic_id, now).await {
            Ok(results) => {
                let succeeded = results.iter().filter(|r| r.success).count();
                let retries = results.iter().filter(|r| r.retry_scheduled).count();
                info!(
                    %clinic_id,
                    processed = results.len(),
                    succeeded,
                    retries,
                    "processed due scheduled payments"
                );
            }
            Err(err) => warn!(
                ?err,
                %clinic_id,
                "failed to process due payments for clinic"
            ),
        }
    }

    Ok(())
}
