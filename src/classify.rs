//! Savings classification: one category per billing record, first match wins.

use std::fmt;

use serde::Serialize;

use crate::record::BillingRecord;

const AHB_MARKERS: [&str; 3] = ["ahb", "hybridbenefit", "hybrid benefit"];
const DEVTEST_MARKERS: [&str; 3] = ["devtest", "dev/test", "dev-test"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum SavingsCategory {
    ReservedInstance,
    SavingsPlan,
    AzureHybridBenefit,
    DevTestPricing,
    NegotiatedRate,
}

impl SavingsCategory {
    /// All categories, in report order.
    pub const ALL: [SavingsCategory; 5] = [
        SavingsCategory::NegotiatedRate,
        SavingsCategory::ReservedInstance,
        SavingsCategory::SavingsPlan,
        SavingsCategory::AzureHybridBenefit,
        SavingsCategory::DevTestPricing,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            SavingsCategory::ReservedInstance => "Reserved Instances",
            SavingsCategory::SavingsPlan => "Savings Plans",
            SavingsCategory::AzureHybridBenefit => "Azure Hybrid Benefit",
            SavingsCategory::DevTestPricing => "Dev/Test Pricing",
            SavingsCategory::NegotiatedRate => "Negotiated Discount",
        }
    }

    /// Only reservations and savings plans carry a commitment layer.
    pub fn has_commitment_layer(&self) -> bool {
        matches!(
            self,
            SavingsCategory::ReservedInstance | SavingsCategory::SavingsPlan
        )
    }
}

impl fmt::Display for SavingsCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Assign the savings category for a record.
///
/// Precedence:
/// 1. committed + `usage` commitment → reservation
/// 2. committed + `spend` commitment → savings plan
/// 3. SKU details mention hybrid benefit → AHB
/// 4. subscription name marks dev/test → Dev/Test pricing
/// 5. everything else → negotiated rate
pub fn classify(record: &BillingRecord) -> SavingsCategory {
    if record.pricing_category.eq_ignore_ascii_case("committed") {
        let commitment = record.commitment_discount_category.to_lowercase();
        match commitment.as_str() {
            "usage" => return SavingsCategory::ReservedInstance,
            "spend" => return SavingsCategory::SavingsPlan,
            // Other committed charges fall through to the license/env checks
            _ => {}
        }
    }

    if contains_any(&record.sku_details, &AHB_MARKERS) {
        return SavingsCategory::AzureHybridBenefit;
    }

    if contains_any(&record.subscription_name, &DEVTEST_MARKERS) {
        return SavingsCategory::DevTestPricing;
    }

    SavingsCategory::NegotiatedRate
}

fn contains_any(field: &str, markers: &[&str]) -> bool {
    let haystack = field.to_lowercase();
    markers.iter().any(|m| haystack.contains(m))
}

/// A record with its category and the three savings deltas, computed once.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedRecord {
    pub record: BillingRecord,
    pub category: SavingsCategory,
    /// list - billed
    pub negotiated_savings: f64,
    /// billed - effective
    pub commitment_savings: f64,
    /// list - effective
    pub total_savings: f64,
}

impl ClassifiedRecord {
    pub fn new(record: BillingRecord) -> Self {
        let category = classify(&record);
        Self {
            negotiated_savings: record.list_cost - record.billed_cost,
            commitment_savings: record.billed_cost - record.effective_cost,
            total_savings: record.list_cost - record.effective_cost,
            category,
            record,
        }
    }
}

pub fn classify_all(records: Vec<BillingRecord>) -> Vec<ClassifiedRecord> {
    records.into_iter().map(ClassifiedRecord::new).collect()
}
