use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// key: billing-gateway -> charge request sent to the provider
#[derive(Debug, Clone, Serialize)]
pub struct PaymentIntentRequest {
    pub amount: Decimal,
    pub currency: String,
    pub customer_id: String,
    pub payment_method_id: String,
    pub description: String,
    pub receipt_email: Option<String>,
    /// Carries the scheduled-payment and plan ids so the provider can
    /// deduplicate a re-submitted charge.
    pub metadata: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub status: String,
}

impl PaymentIntent {
    pub fn is_successful(&self) -> bool {
        matches!(self.status.as_str(), "succeeded" | "processing_capture")
    }
}

/// key: billing-gateway -> provider integration seam
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_payment_intent(&self, request: PaymentIntentRequest) -> Result<PaymentIntent>;
}

/// key: billing-gateway-stripe -> stub implementation
pub struct StripeLikeGateway;

#[async_trait]
impl PaymentGateway for StripeLikeGateway {
    async fn create_payment_intent(&self, request: PaymentIntentRequest) -> Result<PaymentIntent> {
        tracing::debug!(
            amount = %request.amount,
            customer = %request.customer_id,
            "issuing stubbed payment intent"
        );
        Ok(PaymentIntent {
            id: format!("pi_{}", Uuid::new_v4().simple()),
            status: "succeeded".to_string(),
        })
    }
}
