pub mod api;
pub mod engine;
pub mod gateway;
pub mod models;
pub mod notifications;
pub mod scheduler;

pub use engine::RecurringBillingEngine;
pub use gateway::{PaymentGateway, PaymentIntent, PaymentIntentRequest, StripeLikeGateway};
pub use models::{
    BillingConfigOverrides, PaymentFrequency, PaymentPlan, PaymentStatus,
    PaymentsNeedingAttention, PlanStatus, ProcessingResult, RecurringBillingConfig,
    ScheduledPayment,
};
pub use notifications::{start_notification_worker, NotificationHandle, PaymentEvent};
pub use scheduler::{process_tick as run_billing_tick, spawn as spawn_billing_scheduler};
