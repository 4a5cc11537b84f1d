//! FOCUS billing records: schema, lenient field decoding and export loading.
//!
//! Cost exports are messy. Columns go missing, numbers arrive as strings,
//! `x_SkuDetails` is a JSON object in warehouse exports and a plain string in
//! CSV files. Every field here decodes leniently and falls back to a default
//! instead of failing the whole load.

use std::collections::HashMap;
use std::fs::{self, File};
use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{Result, SavingsError};

pub const DEFAULT_PRICING_CATEGORY: &str = "Standard";
pub const UNKNOWN: &str = "Unknown";

/// One charge-period line item of a FOCUS cost export.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BillingRecord {
    /// Retail cost at public list prices.
    #[serde(default, deserialize_with = "cost_field")]
    pub list_cost: f64,
    /// Negotiated (billed) cost after EA/MCA discounts.
    #[serde(default, deserialize_with = "cost_field")]
    pub billed_cost: f64,
    /// Amortized cost after commitment benefits.
    #[serde(default, deserialize_with = "cost_field")]
    pub effective_cost: f64,
    #[serde(
        default = "default_pricing_category",
        deserialize_with = "pricing_category_field"
    )]
    pub pricing_category: String,
    /// `Usage` (reservation) or `Spend` (savings plan) for committed charges.
    #[serde(default, deserialize_with = "text_field")]
    pub commitment_discount_category: String,
    #[serde(rename = "x_SkuDetails", default, deserialize_with = "text_field")]
    pub sku_details: String,
    #[serde(rename = "SubAccountId", default, deserialize_with = "text_field")]
    pub subscription_id: String,
    #[serde(
        rename = "SubAccountName",
        default = "default_unknown",
        deserialize_with = "name_field"
    )]
    pub subscription_name: String,
    #[serde(default, deserialize_with = "text_field")]
    pub resource_id: String,
    #[serde(default = "default_unknown", deserialize_with = "name_field")]
    pub resource_name: String,
    #[serde(default, deserialize_with = "text_field")]
    pub resource_type: String,
    #[serde(default = "default_unknown", deserialize_with = "name_field")]
    pub service_category: String,
    #[serde(default, deserialize_with = "text_field")]
    pub service_name: String,
    #[serde(default, deserialize_with = "text_field")]
    pub region: String,
    #[serde(default, deserialize_with = "timestamp_field")]
    pub charge_period_start: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "timestamp_field")]
    pub charge_period_end: Option<DateTime<Utc>>,
}

impl Default for BillingRecord {
    fn default() -> Self {
        Self {
            list_cost: 0.0,
            billed_cost: 0.0,
            effective_cost: 0.0,
            pricing_category: default_pricing_category(),
            commitment_discount_category: String::new(),
            sku_details: String::new(),
            subscription_id: String::new(),
            subscription_name: default_unknown(),
            resource_id: String::new(),
            resource_name: default_unknown(),
            resource_type: String::new(),
            service_category: default_unknown(),
            service_name: String::new(),
            region: String::new(),
            charge_period_start: None,
            charge_period_end: None,
        }
    }
}

impl BillingRecord {
    /// Calendar month of the charge period start, as `YYYY-MM`.
    pub fn charge_month(&self) -> Option<String> {
        self.charge_period_start
            .map(|start| start.format("%Y-%m").to_string())
    }
}

fn default_pricing_category() -> String {
    DEFAULT_PRICING_CATEGORY.to_string()
}

fn default_unknown() -> String {
    UNKNOWN.to_string()
}

// ── Lenient field decoding ──

fn cost_field<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    let cost = match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    };
    Ok(if cost.is_finite() { cost } else { 0.0 })
}

fn text_or<'de, D>(deserializer: D, fallback: &str) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    let text = match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s,
        // Dynamic columns (x_SkuDetails) come through as objects
        Some(other) => other.to_string(),
    };
    if text.trim().is_empty() {
        Ok(fallback.to_string())
    } else {
        Ok(text)
    }
}

fn text_field<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    text_or(deserializer, "")
}

fn name_field<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    text_or(deserializer, UNKNOWN)
}

fn pricing_category_field<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    text_or(deserializer, DEFAULT_PRICING_CATEGORY)
}

fn timestamp_field<'de, D>(deserializer: D) -> std::result::Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => parse_timestamp(&s),
        _ => None,
    })
}

/// Parse the timestamp shapes seen in cost exports. Naive values are UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

// ── Loading ──

/// JSON exports are either a bare array or an API-style envelope.
#[derive(Deserialize)]
#[serde(untagged)]
enum JsonExport {
    Records(Vec<BillingRecord>),
    Envelope {
        #[serde(alias = "records")]
        value: Vec<BillingRecord>,
    },
}

/// Load one cost export, picking the reader from the file extension.
pub fn load_records(path: &Path) -> Result<Vec<BillingRecord>> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    let records = match ext.as_deref() {
        Some("csv") => read_csv(path)?,
        Some("json") => read_json(path)?,
        Some("jsonl") | Some("ndjson") => read_json_lines(path)?,
        _ => return Err(SavingsError::UnsupportedInput(path.to_path_buf())),
    };

    debug!(path = %path.display(), records = records.len(), "loaded cost export");
    Ok(records)
}

/// Load and concatenate several exports, in the order given.
pub fn load_all<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<BillingRecord>> {
    let mut records = Vec::new();
    for path in paths {
        records.extend(load_records(path.as_ref())?);
    }
    Ok(records)
}

fn io_error(path: &Path, source: std::io::Error) -> SavingsError {
    SavingsError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn read_csv(path: &Path) -> Result<Vec<BillingRecord>> {
    let file = File::open(path).map_err(|e| io_error(path, e))?;
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(file);

    // Rows go through a string map so cells are never type-guessed:
    // "00123" must not collapse into 123.
    let mut records = Vec::new();
    for row in reader.deserialize::<HashMap<String, String>>() {
        let fields: Map<String, Value> = row?
            .into_iter()
            .map(|(column, cell)| (column, Value::String(cell)))
            .collect();
        records.push(serde_json::from_value(Value::Object(fields))?);
    }
    Ok(records)
}

fn read_json(path: &Path) -> Result<Vec<BillingRecord>> {
    let data = fs::read_to_string(path).map_err(|e| io_error(path, e))?;
    let export: JsonExport = serde_json::from_str(&data)?;
    Ok(match export {
        JsonExport::Records(records) => records,
        JsonExport::Envelope { value } => value,
    })
}

fn read_json_lines(path: &Path) -> Result<Vec<BillingRecord>> {
    let data = fs::read_to_string(path).map_err(|e| io_error(path, e))?;
    let mut records = Vec::new();
    for line in data.lines().filter(|l| !l.trim().is_empty()) {
        records.push(serde_json::from_str(line)?);
    }
    Ok(records)
}

/// Keep records whose charge period starts inside `[start, end]`.
///
/// Records without a usable `ChargePeriodStart` are kept.
pub fn filter_period(
    records: Vec<BillingRecord>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<BillingRecord>> {
    if start > end {
        return Err(SavingsError::InvalidPeriod { start, end });
    }

    let before = records.len();
    let kept: Vec<BillingRecord> = records
        .into_iter()
        .filter(|r| match r.charge_period_start {
            Some(ts) => ts >= start && ts <= end,
            None => true,
        })
        .collect();

    debug!(
        kept = kept.len(),
        dropped = before - kept.len(),
        "filtered records to report period"
    );
    Ok(kept)
}
