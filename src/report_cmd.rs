//! Savings report command: load cost exports, compute the savings breakdown
//! and print it as a console summary, JSON or CSV.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use clap::ValueEnum;
use colored::Colorize;
use tracing::{debug, info};

use crate::classify::SavingsCategory;
use crate::config::Config;
use crate::record;
use crate::savings::{CostBreakdown, SavingsCalculator, SavingsReport, SubscriptionCost};
use crate::utils::{format_currency, format_pct};

const TOP_SERVICES_SHOWN: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
    Csv,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Text => "txt",
            OutputFormat::Json => "json",
            OutputFormat::Csv => "csv",
        }
    }
}

/// Options for `report`. `None` means "take it from the config file".
#[derive(Debug, Clone)]
pub struct ReportArgs {
    pub inputs: Vec<PathBuf>,
    pub customer: Option<String>,
    pub currency: Option<String>,
    pub months: Option<u32>,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub top: Option<usize>,
    pub format: OutputFormat,
    pub output: Option<PathBuf>,
    pub save: bool,
}

// ── Public API ──

pub fn run(args: ReportArgs, config: &Config) -> Result<()> {
    let customer = args
        .customer
        .clone()
        .unwrap_or_else(|| config.report.customer_name.clone());
    let currency = args
        .currency
        .clone()
        .unwrap_or_else(|| config.report.currency.clone());
    let months = args.months.unwrap_or(config.report.months);
    let top_n = args.top.unwrap_or(config.report.top_n);

    let (start, end) = resolve_period(args.start, args.end, months, Utc::now());

    let records = record::load_all(&args.inputs).context("Failed to load cost exports")?;
    info!(
        records = records.len(),
        exports = args.inputs.len(),
        "loaded cost records"
    );
    let records = record::filter_period(records, start, end).context("Invalid report period")?;
    info!(
        records = records.len(),
        customer = %customer,
        start = %start.format("%Y-%m-%d"),
        end = %end.format("%Y-%m-%d"),
        "analyzing report period"
    );

    if records.is_empty() {
        eprintln!(
            "{}",
            "Warning: no cost data found for the specified period".yellow()
        );
    }

    let calculator = SavingsCalculator::new(Some(records))
        .context("Failed to classify billing records")?
        .with_top_n(top_n);
    for category in SavingsCategory::ALL {
        let count = calculator
            .records()
            .iter()
            .filter(|r| r.category == category)
            .count();
        debug!(category = category.label(), records = count, "classified");
    }
    let report = calculator.generate_report(&customer, start, end, &currency);

    let rendered = match args.format {
        OutputFormat::Text => render_text(&report)?,
        OutputFormat::Json => render_json(&report)?,
        OutputFormat::Csv => render_csv(&report)?,
    };

    let destination = match (&args.output, args.save) {
        (Some(path), _) => Some(path.clone()),
        (None, true) => Some(
            Path::new(&config.report.output_dir)
                .join(report_file_name(&customer, args.format, Utc::now())),
        ),
        (None, false) => None,
    };

    emit(&rendered, destination.as_deref())
}

/// Options for `subscriptions`.
#[derive(Debug, Clone)]
pub struct SubscriptionArgs {
    pub inputs: Vec<PathBuf>,
    pub months: u32,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub format: OutputFormat,
}

/// List subscriptions with cost data in the period, most expensive first.
pub fn run_subscriptions(args: SubscriptionArgs, currency: &str) -> Result<()> {
    let (start, end) = resolve_period(args.start, args.end, args.months, Utc::now());
    let records = record::load_all(&args.inputs).context("Failed to load cost exports")?;
    let rows = subscription_rows(records, start, end)?;
    if rows.is_empty() {
        eprintln!("{}", "No cost data found for the specified period".yellow());
        return Ok(());
    }

    let rendered = match args.format {
        OutputFormat::Json => serde_json::to_string_pretty(&rows)
            .context("Failed to serialize subscriptions to JSON")?,
        OutputFormat::Csv => render_subscriptions_csv(&rows)?,
        OutputFormat::Text => render_subscriptions_text(&rows, currency)?,
    };
    emit(&rendered, None)
}

fn subscription_rows(
    records: Vec<record::BillingRecord>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<SubscriptionCost>> {
    let records = record::filter_period(records, start, end).context("Invalid period")?;
    debug!(records = records.len(), "ranking subscriptions");
    let calculator =
        SavingsCalculator::new(Some(records)).context("Failed to classify billing records")?;
    Ok(calculator.subscription_costs())
}

// ── Period ──

/// Explicit dates win; otherwise the window is `months × 30` days ending now.
/// An explicit end date covers that whole day.
fn resolve_period(
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    months: u32,
    now: DateTime<Utc>,
) -> (DateTime<Utc>, DateTime<Utc>) {
    let end = end
        .and_then(|d| d.and_hms_opt(23, 59, 59))
        .map(|naive| naive.and_utc())
        .unwrap_or(now);
    let start = start
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .unwrap_or_else(|| end - Duration::days(i64::from(months) * 30));
    (start, end)
}

fn report_file_name(customer: &str, format: OutputFormat, now: DateTime<Utc>) -> String {
    format!(
        "savings_report_{}_{}.{}",
        customer.replace(' ', "_"),
        now.format("%Y%m%d"),
        format.extension()
    )
}

fn emit(rendered: &str, destination: Option<&Path>) -> Result<()> {
    match destination {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            fs::write(path, rendered)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            eprintln!("{} Report written to {}", "✓".green(), path.display());
        }
        None => print!("{}", rendered),
    }
    Ok(())
}

// ── Display ──

fn render_text(report: &SavingsReport) -> Result<String> {
    let currency = report.currency.as_str();
    let mut out = String::new();

    writeln!(out, "{}", "💰 Azure Savings Realization Report".bold())?;
    writeln!(out, "════════════════════════════════════════════════════")?;
    writeln!(out)?;
    writeln!(out, "  Customer:          {}", report.customer_name)?;
    writeln!(
        out,
        "  Period:            {} → {}",
        report.report_period_start.format("%Y-%m-%d"),
        report.report_period_end.format("%Y-%m-%d")
    )?;
    writeln!(out)?;
    writeln!(
        out,
        "  Retail cost:       {}",
        format_currency(report.total_retail_cost, currency)
    )?;
    writeln!(
        out,
        "  Negotiated cost:   {}",
        format_currency(report.total_negotiated_cost, currency)
    )?;
    writeln!(
        out,
        "  Effective cost:    {}",
        format_currency(report.total_effective_cost, currency)
    )?;
    writeln!(out)?;

    writeln!(
        out,
        "{:<24} {:>16} {:>12}",
        "Category".bold(),
        "Savings".bold(),
        "% of Total".bold()
    )?;
    writeln!(out, "{:-<24} {:-<16} {:-<12}", "", "", "")?;
    for summary in report.category_summaries() {
        if summary.total_savings <= 0.0 {
            continue;
        }
        writeln!(
            out,
            "{:<24} {} {:>12}",
            summary.category.label().cyan(),
            format!("{:>16}", format_currency(summary.total_savings, currency)).green(),
            format_pct(report.category_share(summary.category))
        )?;
    }
    writeln!(out, "{:-<24} {:-<16} {:-<12}", "", "", "")?;
    writeln!(
        out,
        "{:<24} {} {:>12}",
        "TOTAL SAVINGS".bold(),
        format!("{:>16}", format_currency(report.total_savings, currency))
            .green()
            .bold(),
        format_pct(report.total_savings_percentage)
    )?;
    writeln!(out)?;

    if !report.savings_by_service.is_empty() {
        writeln!(out, "{}", "Top services".bold())?;
        writeln!(
            out,
            "{:<24} {:>16} {:>16} {:>10}",
            "Service", "Effective", "Savings", "Savings %"
        )?;
        writeln!(out, "{:-<24} {:-<16} {:-<16} {:-<10}", "", "", "", "")?;
        for row in report.savings_by_service.iter().take(TOP_SERVICES_SHOWN) {
            writeln!(
                out,
                "{:<24} {:>16} {:>16} {:>10}",
                truncate(&row.service_category, 24),
                format_currency(row.costs.effective_cost, currency),
                format_currency(row.costs.total_savings, currency),
                format_pct(row.costs.savings_percentage)
            )?;
        }
        writeln!(out)?;
    }

    if !report.monthly_trend.is_empty() {
        writeln!(out, "{}", "Monthly trend".bold())?;
        for month in &report.monthly_trend {
            writeln!(
                out,
                "  {}  {:>16}  ({})",
                month.month,
                format_currency(month.costs.total_savings, currency),
                format_pct(month.costs.savings_percentage)
            )?;
        }
        writeln!(out)?;
    }

    Ok(out)
}

fn render_subscriptions_text(rows: &[SubscriptionCost], currency: &str) -> Result<String> {
    let mut out = String::new();
    writeln!(
        out,
        "{:<32} {:<38} {:>16}",
        "Subscription Name".bold(),
        "Subscription ID".bold(),
        "Total Cost".bold()
    )?;
    writeln!(out, "{:-<32} {:-<38} {:-<16}", "", "", "")?;
    for row in rows {
        writeln!(
            out,
            "{:<32} {:<38} {:>16}",
            truncate(&row.subscription_name, 32),
            row.subscription_id,
            format_currency(row.effective_cost, currency)
        )?;
    }
    Ok(out)
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", kept)
    }
}

// ── Export ──

fn render_json(report: &SavingsReport) -> Result<String> {
    let mut json =
        serde_json::to_string_pretty(report).context("Failed to serialize savings report to JSON")?;
    json.push('\n');
    Ok(json)
}

const CSV_HEADER: [&str; 13] = [
    "section",
    "name",
    "id",
    "service_category",
    "savings_category",
    "retail_cost",
    "negotiated_cost",
    "effective_cost",
    "negotiated_savings",
    "commitment_savings",
    "total_savings",
    "savings_percentage",
    "currency",
];

fn render_csv(report: &SavingsReport) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(CSV_HEADER)?;

    let currency = report.currency.as_str();
    let totals = CostBreakdown {
        retail_cost: report.total_retail_cost,
        negotiated_cost: report.total_negotiated_cost,
        effective_cost: report.total_effective_cost,
        negotiated_savings: report.total_retail_cost - report.total_negotiated_cost,
        commitment_savings: report
            .category_summaries()
            .iter()
            .map(|s| s.commitment_savings)
            .sum(),
        total_savings: report.total_savings,
        savings_percentage: report.total_savings_percentage,
    };
    write_csv_row(
        &mut writer,
        ["total", report.customer_name.as_str(), "", "", ""],
        &totals,
        currency,
    )?;

    for summary in report.category_summaries() {
        let costs = CostBreakdown {
            retail_cost: summary.retail_cost,
            negotiated_cost: summary.negotiated_cost,
            effective_cost: summary.effective_cost,
            negotiated_savings: summary.negotiated_savings,
            commitment_savings: summary.commitment_savings,
            total_savings: summary.total_savings,
            savings_percentage: summary.savings_percentage,
        };
        write_csv_row(
            &mut writer,
            ["category", summary.category.label(), "", "", summary.category.label()],
            &costs,
            currency,
        )?;
    }

    for row in &report.savings_by_service {
        write_csv_row(
            &mut writer,
            ["service", row.service_category.as_str(), "", row.service_category.as_str(), ""],
            &row.costs,
            currency,
        )?;
    }

    for row in &report.savings_by_subscription {
        write_csv_row(
            &mut writer,
            [
                "subscription",
                row.subscription_name.as_str(),
                row.subscription_id.as_str(),
                "",
                "",
            ],
            &row.costs,
            currency,
        )?;
    }

    for row in &report.monthly_trend {
        write_csv_row(
            &mut writer,
            ["month", row.month.as_str(), "", "", ""],
            &row.costs,
            currency,
        )?;
    }

    for row in &report.top_savings_resources {
        write_csv_row(
            &mut writer,
            [
                "resource",
                row.resource_name.as_str(),
                row.resource_id.as_str(),
                row.service_category.as_str(),
                row.savings_category.label(),
            ],
            &row.costs,
            currency,
        )?;
    }

    finish_csv(writer)
}

fn write_csv_row(
    writer: &mut csv::Writer<Vec<u8>>,
    keys: [&str; 5],
    costs: &CostBreakdown,
    currency: &str,
) -> Result<()> {
    let mut row: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
    row.extend(
        [
            costs.retail_cost,
            costs.negotiated_cost,
            costs.effective_cost,
            costs.negotiated_savings,
            costs.commitment_savings,
            costs.total_savings,
            costs.savings_percentage,
        ]
        .iter()
        .map(|v| format!("{:.4}", v)),
    );
    row.push(currency.to_string());
    writer
        .write_record(&row)
        .context("Failed to write CSV row")?;
    Ok(())
}

fn render_subscriptions_csv(rows: &[SubscriptionCost]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(["subscription_name", "subscription_id", "effective_cost"])?;
    for row in rows {
        writer.write_record([
            row.subscription_name.clone(),
            row.subscription_id.clone(),
            format!("{:.4}", row.effective_cost),
        ])?;
    }
    finish_csv(writer)
}

fn finish_csv(writer: csv::Writer<Vec<u8>>) -> Result<String> {
    let bytes = writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("Failed to flush CSV output: {}", e))?;
    String::from_utf8(bytes).context("CSV output was not valid UTF-8")
}
