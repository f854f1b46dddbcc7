use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::mpsc::{channel, Sender};
use tracing::{info, warn};
use uuid::Uuid;

/// key: billing-notifications -> outcome events for the notification collaborator
#[derive(Debug)]
pub enum PaymentEvent {
    Succeeded {
        clinic_id: Uuid,
        scheduled_payment_id: Uuid,
        payment_id: Uuid,
        amount: Decimal,
    },
    RetryScheduled {
        clinic_id: Uuid,
        scheduled_payment_id: Uuid,
        retry_count: i32,
        next_retry_date: DateTime<Utc>,
        error: String,
    },
    Failed {
        clinic_id: Uuid,
        scheduled_payment_id: Uuid,
        error: String,
    },
}

/// key: billing-notifications-handle -> enqueue interface
#[derive(Clone)]
pub struct NotificationHandle {
    sender: Sender<PaymentEvent>,
}

impl NotificationHandle {
    pub async fn dispatch(&self, event: PaymentEvent) -> Result<()> {
        self.sender
            .send(event)
            .await
            .map_err(|err| anyhow!("failed to enqueue payment notification: {err}"))
    }
}

/// Spawns the worker that drains payment events. Delivery channels (email,
/// SMS) live outside this service; the sink here is the structured log.
pub fn start_notification_worker() -> NotificationHandle {
    let (tx, mut rx) = channel(64);
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                PaymentEvent::Succeeded {
                    clinic_id,
                    scheduled_payment_id,
                    payment_id,
                    amount,
                } => {
                    info!(
                        %clinic_id,
                        scheduled_payment = %scheduled_payment_id,
                        payment = %payment_id,
                        %amount,
                        "scheduled payment collected"
                    );
                }
                PaymentEvent::RetryScheduled {
                    clinic_id,
                    scheduled_payment_id,
                    retry_count,
                    next_retry_date,
                    error,
                } => {
                    warn!(
                        %clinic_id,
                        scheduled_payment = %scheduled_payment_id,
                        retry_count,
                        next_retry = %next_retry_date,
                        error,
                        "scheduled payment failed, retry queued"
                    );
                }
                PaymentEvent::Failed {
                    clinic_id,
                    scheduled_payment_id,
                    error,
                } => {
                    warn!(
                        %clinic_id,
                        scheduled_payment = %scheduled_payment_id,
                        error,
                        "scheduled payment failed permanently"
                    );
                }
            }
        }
    });

    NotificationHandle { sender: tx }
}
