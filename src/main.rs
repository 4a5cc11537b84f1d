mod classify;
mod config;
mod error;
mod record;
mod report_cmd;
mod savings;
mod utils;

use std::path::PathBuf;

use anyhow::Result;
use chrono::NaiveDate;
use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::report_cmd::{OutputFormat, ReportArgs, SubscriptionArgs};

#[derive(Parser)]
#[command(
    name = "azure-savings",
    version,
    about = "Azure savings realization reports from FOCUS cost exports"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Config file (default: ~/.config/azure-savings/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Break down savings by category, service, subscription, month and resource
    Report {
        /// Cost exports (.csv, .json, .jsonl)
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Customer name shown on the report
        #[arg(short, long)]
        customer: Option<String>,

        /// Billing currency code
        #[arg(long)]
        currency: Option<String>,

        /// Months to analyze, ending today (ignored with --start)
        #[arg(short, long)]
        months: Option<u32>,

        /// First day of the period (YYYY-MM-DD)
        #[arg(long)]
        start: Option<NaiveDate>,

        /// Last day of the period (YYYY-MM-DD)
        #[arg(long)]
        end: Option<NaiveDate>,

        /// Number of top resources to include
        #[arg(long)]
        top: Option<usize>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,

        /// Write to this file instead of stdout
        #[arg(short, long, conflicts_with = "save")]
        output: Option<PathBuf>,

        /// Write to the configured output directory
        #[arg(long)]
        save: bool,
    },

    /// List subscriptions with cost data, ranked by effective cost
    Subscriptions {
        /// Cost exports (.csv, .json, .jsonl)
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Months of cost data to rank, ending today (ignored with --start)
        #[arg(short, long, default_value_t = 1)]
        months: u32,

        /// First day of the period (YYYY-MM-DD)
        #[arg(long)]
        start: Option<NaiveDate>,

        /// Last day of the period (YYYY-MM-DD)
        #[arg(long)]
        end: Option<NaiveDate>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    // RUST_LOG wins over -v
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("azure_savings={}", level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Report {
            inputs,
            customer,
            currency,
            months,
            start,
            end,
            top,
            format,
            output,
            save,
        } => {
            // No ANSI escapes in report files
            if output.is_some() || save {
                colored::control::set_override(false);
            }
            report_cmd::run(
                ReportArgs {
                    inputs,
                    customer,
                    currency,
                    months,
                    start,
                    end,
                    top,
                    format,
                    output,
                    save,
                },
                &config,
            )?;
        }

        Commands::Subscriptions {
            inputs,
            months,
            start,
            end,
            format,
        } => {
            report_cmd::run_subscriptions(
                SubscriptionArgs {
                    inputs,
                    months,
                    start,
                    end,
                    format,
                },
                &config.report.currency,
            )?;
        }
    }

    Ok(())
}
