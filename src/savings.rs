//! Savings aggregation: per-category summaries, dimensional rollups and the
//! report that ties them together.
//!
//! Every record is classified once on construction. Summaries and rollups
//! only sum the stored costs and deltas, they never reclassify.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::classify::{classify_all, ClassifiedRecord, SavingsCategory};
use crate::error::{Result, SavingsError};
use crate::record::BillingRecord;
use crate::utils::{round_to, savings_percentage};

/// Retail multiplier for hybrid-benefit charges exported without a list
/// price. Heuristic: AHB typically takes ~40% off compute, so list ≈ 1.67×.
pub const AHB_RETAIL_MULTIPLIER: f64 = 1.67;

pub const DEFAULT_TOP_N: usize = 20;

// ── Types ──

/// Savings for one category. `total_savings` is always `retail - effective`,
/// even where the commitment layer is skipped.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SavingsSummary {
    pub category: SavingsCategory,
    pub retail_cost: f64,
    pub negotiated_cost: f64,
    pub effective_cost: f64,
    pub negotiated_savings: f64,
    pub commitment_savings: f64,
    pub total_savings: f64,
    pub savings_percentage: f64,
}

/// Running cost sums for one rollup bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CostBreakdown {
    pub retail_cost: f64,
    pub negotiated_cost: f64,
    pub effective_cost: f64,
    pub negotiated_savings: f64,
    pub commitment_savings: f64,
    pub total_savings: f64,
    /// Rounded to two decimals.
    pub savings_percentage: f64,
}

impl CostBreakdown {
    fn add(&mut self, record: &ClassifiedRecord) {
        self.retail_cost += record.record.list_cost;
        self.negotiated_cost += record.record.billed_cost;
        self.effective_cost += record.record.effective_cost;
        self.negotiated_savings += record.negotiated_savings;
        self.commitment_savings += record.commitment_savings;
        self.total_savings += record.total_savings;
    }

    fn finish(mut self) -> Self {
        self.savings_percentage =
            round_to(savings_percentage(self.total_savings, self.retail_cost), 2);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceSavings {
    pub service_category: String,
    #[serde(flatten)]
    pub costs: CostBreakdown,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubscriptionSavings {
    pub subscription_id: String,
    pub subscription_name: String,
    #[serde(flatten)]
    pub costs: CostBreakdown,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlySavings {
    /// `YYYY-MM`
    pub month: String,
    #[serde(flatten)]
    pub costs: CostBreakdown,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceSavings {
    pub resource_id: String,
    pub resource_name: String,
    pub service_category: String,
    pub savings_category: SavingsCategory,
    #[serde(flatten)]
    pub costs: CostBreakdown,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubscriptionCost {
    pub subscription_id: String,
    pub subscription_name: String,
    pub effective_cost: f64,
}

/// The report root. All values are final, renderers never re-derive them.
#[derive(Debug, Clone, Serialize)]
pub struct SavingsReport {
    pub customer_name: String,
    pub report_period_start: DateTime<Utc>,
    pub report_period_end: DateTime<Utc>,
    pub currency: String,

    pub total_retail_cost: f64,
    pub total_negotiated_cost: f64,
    pub total_effective_cost: f64,
    pub total_savings: f64,
    pub total_savings_percentage: f64,

    pub negotiated_discount_savings: SavingsSummary,
    pub reserved_instance_savings: SavingsSummary,
    pub savings_plan_savings: SavingsSummary,
    pub ahb_savings: SavingsSummary,
    pub devtest_savings: SavingsSummary,

    pub savings_by_service: Vec<ServiceSavings>,
    pub savings_by_subscription: Vec<SubscriptionSavings>,
    pub monthly_trend: Vec<MonthlySavings>,
    pub top_savings_resources: Vec<ResourceSavings>,
}

impl SavingsReport {
    /// The five category summaries in report order.
    pub fn category_summaries(&self) -> [&SavingsSummary; 5] {
        [
            &self.negotiated_discount_savings,
            &self.reserved_instance_savings,
            &self.savings_plan_savings,
            &self.ahb_savings,
            &self.devtest_savings,
        ]
    }

    pub fn summary(&self, category: SavingsCategory) -> &SavingsSummary {
        match category {
            SavingsCategory::NegotiatedRate => &self.negotiated_discount_savings,
            SavingsCategory::ReservedInstance => &self.reserved_instance_savings,
            SavingsCategory::SavingsPlan => &self.savings_plan_savings,
            SavingsCategory::AzureHybridBenefit => &self.ahb_savings,
            SavingsCategory::DevTestPricing => &self.devtest_savings,
        }
    }

    /// A category's share of total savings, in percent.
    pub fn category_share(&self, category: SavingsCategory) -> f64 {
        if self.total_savings > 0.0 {
            savings_percentage(self.summary(category).total_savings, self.total_savings)
        } else {
            0.0
        }
    }
}

// ── Calculator ──

pub struct SavingsCalculator {
    records: Vec<ClassifiedRecord>,
    top_n: usize,
}

impl SavingsCalculator {
    /// Classify the record collection. Fails only when there is no collection.
    pub fn new(records: Option<Vec<BillingRecord>>) -> Result<Self> {
        let records = records.ok_or(SavingsError::MissingRecords)?;
        let records = classify_all(records);
        debug!(records = records.len(), "classified billing records");
        Ok(Self {
            records,
            top_n: DEFAULT_TOP_N,
        })
    }

    /// Row limit for the top-resources rollup in generated reports.
    pub fn with_top_n(mut self, top_n: usize) -> Self {
        self.top_n = top_n;
        self
    }

    pub fn records(&self) -> &[ClassifiedRecord] {
        &self.records
    }

    pub fn summarize(&self, category: SavingsCategory) -> SavingsSummary {
        let mut retail_cost = 0.0;
        let mut negotiated_cost = 0.0;
        let mut effective_cost = 0.0;

        for r in self.records.iter().filter(|r| r.category == category) {
            retail_cost += r.record.list_cost;
            negotiated_cost += r.record.billed_cost;
            effective_cost += r.record.effective_cost;
        }

        if category == SavingsCategory::AzureHybridBenefit
            && retail_cost == 0.0
            && effective_cost > 0.0
        {
            retail_cost = effective_cost * AHB_RETAIL_MULTIPLIER;
            debug!(
                effective_cost,
                estimated_retail = retail_cost,
                "no list cost on hybrid benefit charges, using estimate"
            );
        }

        let commitment_savings = if category.has_commitment_layer() {
            negotiated_cost - effective_cost
        } else {
            0.0
        };
        let total_savings = retail_cost - effective_cost;

        SavingsSummary {
            category,
            retail_cost,
            negotiated_cost,
            effective_cost,
            negotiated_savings: retail_cost - negotiated_cost,
            commitment_savings,
            total_savings,
            savings_percentage: savings_percentage(total_savings, retail_cost),
        }
    }

    pub fn savings_by_service(&self) -> Vec<ServiceSavings> {
        let mut rows: Vec<ServiceSavings> =
            group_by(&self.records, |r| Some(r.record.service_category.clone()))
                .into_iter()
                .map(|(service_category, costs)| ServiceSavings {
                    service_category,
                    costs,
                })
                .collect();
        sort_by_savings(&mut rows, |row| &row.costs);
        rows
    }

    pub fn savings_by_subscription(&self) -> Vec<SubscriptionSavings> {
        let mut rows: Vec<SubscriptionSavings> = group_by(&self.records, |r| {
            Some((
                r.record.subscription_id.clone(),
                r.record.subscription_name.clone(),
            ))
        })
        .into_iter()
        .map(|((subscription_id, subscription_name), costs)| SubscriptionSavings {
            subscription_id,
            subscription_name,
            costs,
        })
        .collect();
        sort_by_savings(&mut rows, |row| &row.costs);
        rows
    }

    /// Savings per calendar month of the charge period start, oldest first.
    /// Records without a charge period are left out of the trend.
    pub fn monthly_trend(&self) -> Vec<MonthlySavings> {
        let undated = self
            .records
            .iter()
            .filter(|r| r.record.charge_period_start.is_none())
            .count();
        if undated > 0 {
            debug!(undated, "records without ChargePeriodStart skipped in monthly trend");
        }

        group_by(&self.records, |r| r.record.charge_month())
            .into_iter()
            .map(|(month, costs)| MonthlySavings { month, costs })
            .collect()
    }

    pub fn top_savings_resources(&self, top_n: usize) -> Vec<ResourceSavings> {
        let mut rows: Vec<ResourceSavings> = group_by(&self.records, |r| {
            Some((
                r.record.resource_id.clone(),
                r.record.resource_name.clone(),
                r.record.service_category.clone(),
                r.category,
            ))
        })
        .into_iter()
        .map(
            |((resource_id, resource_name, service_category, savings_category), costs)| {
                ResourceSavings {
                    resource_id,
                    resource_name,
                    service_category,
                    savings_category,
                    costs,
                }
            },
        )
        .collect();
        sort_by_savings(&mut rows, |row| &row.costs);
        rows.truncate(top_n);
        rows
    }

    /// Subscriptions ranked by effective cost, highest first.
    pub fn subscription_costs(&self) -> Vec<SubscriptionCost> {
        let mut rows: Vec<SubscriptionCost> = group_by(&self.records, |r| {
            Some((
                r.record.subscription_id.clone(),
                r.record.subscription_name.clone(),
            ))
        })
        .into_iter()
        .map(|((subscription_id, subscription_name), costs)| SubscriptionCost {
            subscription_id,
            subscription_name,
            effective_cost: costs.effective_cost,
        })
        .collect();
        rows.sort_by(|a, b| b.effective_cost.total_cmp(&a.effective_cost));
        rows
    }

    pub fn generate_report(
        &self,
        customer_name: &str,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
        currency: &str,
    ) -> SavingsReport {
        if self.records.is_empty() {
            warn!(customer = customer_name, "no billing records for report period");
        }

        let negotiated = self.summarize(SavingsCategory::NegotiatedRate);
        let ri = self.summarize(SavingsCategory::ReservedInstance);
        let sp = self.summarize(SavingsCategory::SavingsPlan);
        let ahb = self.summarize(SavingsCategory::AzureHybridBenefit);
        let devtest = self.summarize(SavingsCategory::DevTestPricing);

        // Totals are sums of the category summaries so the breakdown always
        // reconciles, including the AHB estimate.
        let mut total_retail = 0.0;
        let mut total_negotiated = 0.0;
        let mut total_effective = 0.0;
        let mut total_savings = 0.0;
        for summary in [&negotiated, &ri, &sp, &ahb, &devtest] {
            total_retail += summary.retail_cost;
            total_negotiated += summary.negotiated_cost;
            total_effective += summary.effective_cost;
            total_savings += summary.total_savings;
        }

        SavingsReport {
            customer_name: customer_name.to_string(),
            report_period_start: period_start,
            report_period_end: period_end,
            currency: currency.to_string(),
            total_retail_cost: total_retail,
            total_negotiated_cost: total_negotiated,
            total_effective_cost: total_effective,
            total_savings,
            total_savings_percentage: savings_percentage(total_savings, total_retail),
            negotiated_discount_savings: negotiated,
            reserved_instance_savings: ri,
            savings_plan_savings: sp,
            ahb_savings: ahb,
            devtest_savings: devtest,
            savings_by_service: self.savings_by_service(),
            savings_by_subscription: self.savings_by_subscription(),
            monthly_trend: self.monthly_trend(),
            top_savings_resources: self.top_savings_resources(self.top_n),
        }
    }
}

// ── Helpers ──

/// One pass over the records into ordered buckets. `None` keys are skipped.
fn group_by<K, F>(records: &[ClassifiedRecord], key: F) -> Vec<(K, CostBreakdown)>
where
    K: Ord,
    F: Fn(&ClassifiedRecord) -> Option<K>,
{
    let mut groups: BTreeMap<K, CostBreakdown> = BTreeMap::new();
    for record in records {
        if let Some(k) = key(record) {
            groups.entry(k).or_default().add(record);
        }
    }
    groups
        .into_iter()
        .map(|(k, costs)| (k, costs.finish()))
        .collect()
}

/// Descending by total savings. Stable, so ties keep key order.
fn sort_by_savings<T, F>(rows: &mut [T], costs: F)
where
    F: Fn(&T) -> &CostBreakdown,
{
    rows.sort_by(|a, b| costs(b).total_savings.total_cmp(&costs(a).total_savings));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::parse_timestamp;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    fn cost(list: f64, billed: f64, effective: f64) -> BillingRecord {
        BillingRecord {
            list_cost: list,
            billed_cost: billed,
            effective_cost: effective,
            ..Default::default()
        }
    }

    fn reservation(list: f64, billed: f64, effective: f64) -> BillingRecord {
        BillingRecord {
            pricing_category: "Committed".to_string(),
            commitment_discount_category: "Usage".to_string(),
            ..cost(list, billed, effective)
        }
    }

    fn calculator(records: Vec<BillingRecord>) -> SavingsCalculator {
        SavingsCalculator::new(Some(records)).unwrap()
    }

    fn period() -> (DateTime<Utc>, DateTime<Utc>) {
        (
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 31, 0, 0, 0).unwrap(),
        )
    }

    fn build_report(records: Vec<BillingRecord>) -> SavingsReport {
        let (start, end) = period();
        calculator(records).generate_report("Contoso", start, end, "USD")
    }

    #[test]
    fn test_missing_collection_is_an_error() {
        let err = SavingsCalculator::new(None).err().unwrap();
        assert!(matches!(err, SavingsError::MissingRecords));
    }

    #[test]
    fn test_two_record_scenario() {
        let standard = BillingRecord {
            subscription_name: "prod".to_string(),
            ..cost(100.0, 90.0, 90.0)
        };
        let report = build_report(vec![standard, reservation(200.0, 150.0, 100.0)]);

        let negotiated = &report.negotiated_discount_savings;
        assert_eq!(negotiated.category, SavingsCategory::NegotiatedRate);
        assert_close(negotiated.total_savings, 10.0);
        assert_close(negotiated.commitment_savings, 0.0);

        let ri = &report.reserved_instance_savings;
        assert_close(ri.negotiated_savings, 50.0);
        assert_close(ri.commitment_savings, 50.0);
        assert_close(ri.total_savings, 100.0);
        assert_close(ri.savings_percentage, 50.0);

        assert_close(report.total_retail_cost, 300.0);
        assert_close(report.total_negotiated_cost, 240.0);
        assert_close(report.total_effective_cost, 190.0);
        assert_close(report.total_savings, 110.0);
        assert_close(round_to(report.total_savings_percentage, 1), 36.7);
    }

    #[test]
    fn test_empty_category_is_all_zero() {
        let summary = calculator(vec![cost(100.0, 90.0, 90.0)]).summarize(SavingsCategory::SavingsPlan);
        assert_eq!(
            summary,
            SavingsSummary {
                category: SavingsCategory::SavingsPlan,
                retail_cost: 0.0,
                negotiated_cost: 0.0,
                effective_cost: 0.0,
                negotiated_savings: 0.0,
                commitment_savings: 0.0,
                total_savings: 0.0,
                savings_percentage: 0.0,
            }
        );
    }

    #[test]
    fn test_empty_collection_gives_zero_report() {
        let report = build_report(Vec::new());
        assert_eq!(report.total_retail_cost, 0.0);
        assert_eq!(report.total_savings, 0.0);
        assert_eq!(report.total_savings_percentage, 0.0);
        for summary in report.category_summaries() {
            assert_eq!(summary.savings_percentage, 0.0);
            assert_eq!(summary.total_savings, 0.0);
        }
        assert!(report.savings_by_service.is_empty());
        assert!(report.savings_by_subscription.is_empty());
        assert!(report.monthly_trend.is_empty());
        assert!(report.top_savings_resources.is_empty());
    }

    #[test]
    fn test_zero_retail_percentage_is_zero() {
        // Negative savings with no retail cost must not divide by zero
        let summary = calculator(vec![cost(0.0, 10.0, 10.0)]).summarize(SavingsCategory::NegotiatedRate);
        assert_eq!(summary.savings_percentage, 0.0);
        assert_close(summary.total_savings, -10.0);
    }

    #[test]
    fn test_ahb_retail_estimate() {
        let record = BillingRecord {
            sku_details: "AHB".to_string(),
            ..cost(0.0, 1000.0, 1000.0)
        };
        let summary = calculator(vec![record]).summarize(SavingsCategory::AzureHybridBenefit);
        assert_close(summary.retail_cost, 1670.0);
        assert_close(summary.total_savings, 670.0);
        assert_close(summary.negotiated_savings, 670.0);
        assert_eq!(summary.commitment_savings, 0.0);
        assert_close(summary.savings_percentage, 670.0 / 1670.0 * 100.0);
    }

    #[test]
    fn test_ahb_estimate_never_overrides_list_cost() {
        let record = BillingRecord {
            sku_details: "HybridBenefit".to_string(),
            ..cost(1200.0, 1000.0, 1000.0)
        };
        let summary = calculator(vec![record]).summarize(SavingsCategory::AzureHybridBenefit);
        assert_close(summary.retail_cost, 1200.0);
        assert_close(summary.total_savings, 200.0);
    }

    #[test]
    fn test_ahb_estimate_needs_positive_effective_cost() {
        let record = BillingRecord {
            sku_details: "ahb".to_string(),
            ..cost(0.0, 0.0, 0.0)
        };
        let summary = calculator(vec![record]).summarize(SavingsCategory::AzureHybridBenefit);
        assert_eq!(summary.retail_cost, 0.0);
        assert_eq!(summary.savings_percentage, 0.0);
    }

    #[test]
    fn test_estimate_only_applies_to_hybrid_benefit() {
        let summary = calculator(vec![cost(0.0, 50.0, 50.0)]).summarize(SavingsCategory::NegotiatedRate);
        assert_eq!(summary.retail_cost, 0.0);
    }

    #[test]
    fn test_devtest_skips_commitment_layer() {
        let record = BillingRecord {
            subscription_name: "Contoso Dev/Test".to_string(),
            ..cost(100.0, 60.0, 50.0)
        };
        let summary = calculator(vec![record]).summarize(SavingsCategory::DevTestPricing);
        assert_close(summary.negotiated_savings, 40.0);
        assert_eq!(summary.commitment_savings, 0.0);
        // retail - effective, not negotiated + commitment
        assert_close(summary.total_savings, 50.0);
    }

    #[test]
    fn test_savings_by_service_sorted_descending() {
        let records = vec![
            BillingRecord {
                service_category: "Storage".to_string(),
                ..cost(100.0, 95.0, 95.0)
            },
            BillingRecord {
                service_category: "Compute".to_string(),
                ..cost(100.0, 80.0, 80.0)
            },
            BillingRecord {
                service_category: "Compute".to_string(),
                ..reservation(200.0, 180.0, 120.0)
            },
            BillingRecord {
                service_category: "Databases".to_string(),
                ..cost(50.0, 40.0, 40.0)
            },
        ];
        let rows = calculator(records).savings_by_service();
        let names: Vec<&str> = rows.iter().map(|r| r.service_category.as_str()).collect();
        assert_eq!(names, vec!["Compute", "Databases", "Storage"]);

        let compute = &rows[0].costs;
        assert_close(compute.retail_cost, 300.0);
        assert_close(compute.negotiated_savings, 40.0);
        assert_close(compute.commitment_savings, 60.0);
        assert_close(compute.total_savings, 100.0);
        assert_close(compute.savings_percentage, 33.33);
    }

    #[test]
    fn test_subscription_key_is_id_and_name() {
        let records = vec![
            BillingRecord {
                subscription_id: "sub-a".to_string(),
                subscription_name: "shared".to_string(),
                ..cost(100.0, 90.0, 90.0)
            },
            BillingRecord {
                subscription_id: "sub-b".to_string(),
                subscription_name: "shared".to_string(),
                ..cost(100.0, 70.0, 70.0)
            },
            BillingRecord {
                subscription_id: "sub-a".to_string(),
                subscription_name: "shared".to_string(),
                ..cost(10.0, 5.0, 5.0)
            },
        ];
        let rows = calculator(records).savings_by_subscription();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].subscription_id, "sub-b");
        assert_close(rows[0].costs.total_savings, 30.0);
        assert_eq!(rows[1].subscription_id, "sub-a");
        assert_close(rows[1].costs.total_savings, 15.0);
    }

    #[test]
    fn test_grouped_percentage_rounded_to_two_places() {
        let rows = calculator(vec![cost(3.0, 2.0, 2.0)]).savings_by_service();
        assert_eq!(rows[0].costs.savings_percentage, 33.33);
    }

    #[test]
    fn test_grouped_zero_retail_percentage() {
        let rows = calculator(vec![cost(0.0, 5.0, 5.0)]).savings_by_service();
        assert_eq!(rows[0].costs.savings_percentage, 0.0);
    }

    #[test]
    fn test_monthly_trend_truncates_to_month() {
        let dated = |ts: &str, list: f64, effective: f64| BillingRecord {
            charge_period_start: parse_timestamp(ts),
            ..cost(list, effective, effective)
        };
        let records = vec![
            dated("2024-02-14T08:00:00Z", 100.0, 80.0),
            dated("2024-01-31T23:00:00Z", 50.0, 45.0),
            dated("2024-02-01", 100.0, 90.0),
            cost(1000.0, 0.0, 0.0),
        ];
        let trend = calculator(records).monthly_trend();
        let months: Vec<&str> = trend.iter().map(|m| m.month.as_str()).collect();
        assert_eq!(months, vec!["2024-01", "2024-02"]);
        assert_close(trend[0].costs.total_savings, 5.0);
        assert_close(trend[1].costs.total_savings, 30.0);
        assert_close(trend[1].costs.retail_cost, 200.0);
        assert_close(trend[1].costs.savings_percentage, 15.0);
    }

    #[test]
    fn test_top_resources_truncated() {
        let records: Vec<BillingRecord> = (0..25)
            .map(|i| BillingRecord {
                resource_id: format!("/subscriptions/s/vm-{i}"),
                resource_name: format!("vm-{i}"),
                ..cost(100.0 + i as f64, 100.0, 100.0)
            })
            .collect();
        let calc = calculator(records);

        let rows = calc.top_savings_resources(DEFAULT_TOP_N);
        assert_eq!(rows.len(), 20);
        assert_eq!(rows[0].resource_name, "vm-24");
        assert_close(rows[0].costs.total_savings, 24.0);
        assert_eq!(rows[19].resource_name, "vm-5");

        assert_eq!(calc.top_savings_resources(3).len(), 3);
        assert_eq!(calc.top_savings_resources(100).len(), 25);
    }

    #[test]
    fn test_resource_key_includes_savings_category() {
        let on_vm1 = |record: BillingRecord| BillingRecord {
            resource_id: "/vm/1".to_string(),
            resource_name: "vm1".to_string(),
            service_category: "Compute".to_string(),
            ..record
        };
        let records = vec![
            on_vm1(reservation(100.0, 90.0, 60.0)),
            on_vm1(cost(100.0, 90.0, 90.0)),
        ];
        let rows = calculator(records).top_savings_resources(DEFAULT_TOP_N);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].savings_category, SavingsCategory::ReservedInstance);
        assert_eq!(rows[1].savings_category, SavingsCategory::NegotiatedRate);
    }

    #[test]
    fn test_report_uses_configured_top_n() {
        let records: Vec<BillingRecord> = (0..10)
            .map(|i| BillingRecord {
                resource_id: format!("r{i}"),
                ..cost(10.0, 5.0, 5.0)
            })
            .collect();
        let (start, end) = period();
        let report = calculator(records)
            .with_top_n(4)
            .generate_report("Contoso", start, end, "EUR");
        assert_eq!(report.top_savings_resources.len(), 4);
        assert_eq!(report.currency, "EUR");
        assert_eq!(report.customer_name, "Contoso");
        assert_eq!(report.report_period_start, start);
    }

    #[test]
    fn test_subscription_costs_ranked_by_effective_cost() {
        let records = vec![
            BillingRecord {
                subscription_id: "a".to_string(),
                subscription_name: "alpha".to_string(),
                ..cost(10.0, 10.0, 10.0)
            },
            BillingRecord {
                subscription_id: "b".to_string(),
                subscription_name: "beta".to_string(),
                ..cost(50.0, 40.0, 40.0)
            },
        ];
        let rows = calculator(records).subscription_costs();
        assert_eq!(rows[0].subscription_name, "beta");
        assert_close(rows[0].effective_cost, 40.0);
        assert_eq!(rows[1].subscription_name, "alpha");
    }

    #[test]
    fn test_category_share() {
        let report = build_report(vec![cost(100.0, 75.0, 75.0), reservation(100.0, 100.0, 25.0)]);
        assert_close(report.category_share(SavingsCategory::NegotiatedRate), 25.0);
        assert_close(report.category_share(SavingsCategory::ReservedInstance), 75.0);
        assert_eq!(report.category_share(SavingsCategory::SavingsPlan), 0.0);

        let empty = build_report(Vec::new());
        assert_eq!(empty.category_share(SavingsCategory::NegotiatedRate), 0.0);
    }

    #[test]
    fn test_report_serializes_flattened_rows() {
        let report = build_report(vec![BillingRecord {
            service_category: "Compute".to_string(),
            ..cost(10.0, 8.0, 8.0)
        }]);
        let json = serde_json::to_value(&report).unwrap();
        let row = &json["savings_by_service"][0];
        assert_eq!(row["service_category"], "Compute");
        assert!(row["total_savings"].is_number());
        assert_eq!(json["reserved_instance_savings"]["category"], "ReservedInstance");
    }

    fn arb_record() -> impl Strategy<Value = BillingRecord> {
        (
            0.0f64..10_000.0,
            0.0f64..1.0,
            0.0f64..1.0,
            prop::sample::select(vec!["Standard", "Committed"]),
            prop::sample::select(vec!["", "Usage", "Spend"]),
            prop::sample::select(vec!["", "AHB"]),
            prop::sample::select(vec!["prod", "devtest"]),
            prop::sample::select(vec!["Compute", "Storage", "Networking"]),
            0u8..30,
        )
            .prop_map(
                |(list, billed_ratio, effective_ratio, pricing, commitment, sku, sub, service, resource)| {
                    let billed = list * billed_ratio;
                    BillingRecord {
                        list_cost: list,
                        billed_cost: billed,
                        effective_cost: billed * effective_ratio,
                        pricing_category: pricing.to_string(),
                        commitment_discount_category: commitment.to_string(),
                        sku_details: sku.to_string(),
                        subscription_name: sub.to_string(),
                        service_category: service.to_string(),
                        resource_id: format!("r{resource}"),
                        ..Default::default()
                    }
                },
            )
    }

    proptest! {
        #[test]
        fn report_totals_reconcile_with_categories(records in prop::collection::vec(arb_record(), 0..60)) {
            let report = build_report(records);
            let mut retail = 0.0;
            let mut negotiated = 0.0;
            let mut effective = 0.0;
            let mut savings = 0.0;
            for summary in report.category_summaries() {
                retail += summary.retail_cost;
                negotiated += summary.negotiated_cost;
                effective += summary.effective_cost;
                savings += summary.total_savings;
                prop_assert!(summary.savings_percentage.is_finite());
            }
            prop_assert_eq!(retail, report.total_retail_cost);
            prop_assert_eq!(negotiated, report.total_negotiated_cost);
            prop_assert_eq!(effective, report.total_effective_cost);
            prop_assert_eq!(savings, report.total_savings);
            prop_assert!(report.total_savings_percentage.is_finite());
        }

        #[test]
        fn rollups_are_non_increasing(records in prop::collection::vec(arb_record(), 0..60)) {
            let calc = calculator(records);
            let services = calc.savings_by_service();
            for pair in services.windows(2) {
                prop_assert!(pair[0].costs.total_savings >= pair[1].costs.total_savings);
            }
            let subscriptions = calc.savings_by_subscription();
            for pair in subscriptions.windows(2) {
                prop_assert!(pair[0].costs.total_savings >= pair[1].costs.total_savings);
            }
        }

        #[test]
        fn top_resources_are_the_highest(records in prop::collection::vec(arb_record(), 0..60), n in 0usize..25) {
            let calc = calculator(records);
            let all = calc.top_savings_resources(usize::MAX);
            let top = calc.top_savings_resources(n);
            prop_assert_eq!(top.len(), n.min(all.len()));
            prop_assert_eq!(&top[..], &all[..top.len()]);
        }
    }
}
