use chrono::{Months, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Orthodontic rider on a patient's insurance coverage. Percentages are
/// whole numbers (50 = 50%), money is the plan's currency unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrthoCoverage {
    pub effective_date: NaiveDate,
    pub termination_date: Option<NaiveDate>,
    pub waiting_period_months: u32,
    pub lifetime_maximum: Decimal,
    pub lifetime_used: Decimal,
    pub coverage_percent: Decimal,
    pub annual_deductible: Decimal,
    pub deductible_met: Decimal,
}

impl OrthoCoverage {
    pub fn remaining_lifetime_benefit(&self) -> Decimal {
        (self.lifetime_maximum - self.lifetime_used)
            .max(Decimal::ZERO)
            .round_dp(2)
    }

    pub fn remaining_deductible(&self) -> Decimal {
        (self.annual_deductible - self.deductible_met)
            .max(Decimal::ZERO)
            .round_dp(2)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BenefitAvailability {
    pub available: bool,
    pub reason: Option<String>,
    pub remaining_lifetime_benefit: Decimal,
}

/// Whether ortho benefits can be drawn on `as_of`: coverage must not be
/// terminated, the waiting period must have elapsed, and lifetime maximum
/// must not be exhausted.
pub fn ortho_benefit_availability(coverage: &OrthoCoverage, as_of: NaiveDate) -> BenefitAvailability {
    let remaining = coverage.remaining_lifetime_benefit();

    if let Some(terminated) = coverage.termination_date {
        if terminated < as_of {
            return BenefitAvailability {
                available: false,
                reason: Some("coverage terminated".to_string()),
                remaining_lifetime_benefit: remaining,
            };
        }
    }

    let waiting_period_ends = coverage
        .effective_date
        .checked_add_months(Months::new(coverage.waiting_period_months))
        .unwrap_or(coverage.effective_date);
    if as_of < waiting_period_ends {
        return BenefitAvailability {
            available: false,
            reason: Some("waiting period not satisfied".to_string()),
            remaining_lifetime_benefit: remaining,
        };
    }

    if remaining <= Decimal::ZERO {
        return BenefitAvailability {
            available: false,
            reason: Some("lifetime maximum exhausted".to_string()),
            remaining_lifetime_benefit: remaining,
        };
    }

    BenefitAvailability {
        available: true,
        reason: None,
        remaining_lifetime_benefit: remaining,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InsuranceEstimate {
    pub deductible_applied: Decimal,
    pub covered_amount: Decimal,
    pub estimated_payment: Decimal,
    pub patient_responsibility: Decimal,
}

/// Expected carrier payment for a charge: remaining deductible comes off the
/// top, the coverage percentage applies to the rest, and the result is capped
/// at the remaining lifetime benefit. Every returned amount is rounded to
/// 2 decimal places.
pub fn estimate_insurance_payment(charge: Decimal, coverage: &OrthoCoverage) -> InsuranceEstimate {
    let charge = charge.max(Decimal::ZERO);
    let deductible_applied = charge.min(coverage.remaining_deductible()).round_dp(2);
    let after_deductible = charge - deductible_applied;
    let covered_amount = (after_deductible * coverage.coverage_percent / Decimal::from(100))
        .round_dp(2);
    let estimated_payment = covered_amount
        .min(coverage.remaining_lifetime_benefit())
        .round_dp(2);
    let patient_responsibility = (charge - estimated_payment).round_dp(2);

    InsuranceEstimate {
        deductible_applied,
        covered_amount,
        estimated_payment,
        patient_responsibility,
    }
}
