pub mod aging;
pub mod benefits;
pub mod numbers;

pub use aging::{aging_bucket, AgingBucket};
pub use benefits::{
    estimate_insurance_payment, ortho_benefit_availability, BenefitAvailability,
    InsuranceEstimate, OrthoCoverage,
};
pub use numbers::{next_claim_number, next_payment_number};
