use std::collections::BTreeSet;

use anyhow::{anyhow, Context, Result};
use chrono::{Datelike, Local, NaiveDate, NaiveDateTime};
use clap::{ArgAction, Args, Parser, Subcommand};
use fleet_repair::{
    config::{self, AppConfig},
    services::{calendar, numbering::SequenceAllocator},
};
use serde::Serialize;
use tracing::debug;

#[derive(Parser)]
#[command(
    name = "fleet-repair",
    about = "Work-order scheduling and numbering tools for the repair shop",
    version
)]
struct Cli {
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Render command output as pretty JSON"
    )]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute when a job finishes inside shop working hours
    FinishTime(FinishTimeArgs),
    /// Format the next document number after the given existing numbers
    NextNumber(NextNumberArgs),
}

#[derive(Args)]
struct FinishTimeArgs {
    #[arg(long, value_parser = parse_instant, help = "Start instant, e.g. 2025-01-03T16:00")]
    start: NaiveDateTime,
    #[arg(long, help = "Labor hours to schedule")]
    hours: f64,
    #[arg(
        long = "holiday",
        value_parser = parse_date,
        help = "Extra non-working date (YYYY-MM-DD); repeatable"
    )]
    holidays: Vec<NaiveDate>,
}

#[derive(Args)]
struct NextNumberArgs {
    #[arg(long, help = "Number prefix; defaults to the configured work-order prefix")]
    prefix: Option<String>,
    #[arg(long, help = "Year; defaults to the current year")]
    year: Option<i32>,
    #[arg(long = "existing", help = "Number already issued, e.g. WO-2025-00007; repeatable")]
    existing: Vec<String>,
}

#[derive(Serialize)]
struct FinishTimeOutput {
    start: NaiveDateTime,
    hours: f64,
    finish: NaiveDateTime,
    holidays: BTreeSet<NaiveDate>,
}

#[derive(Serialize)]
struct NextNumberOutput {
    number: String,
    sequence: u32,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let app_config = config::load_config().context("failed to load configuration")?;
    config::init_tracing(&app_config.log_level, app_config.log_json);

    match cli.command {
        Commands::FinishTime(args) => handle_finish_time(&app_config, args, cli.json)?,
        Commands::NextNumber(args) => handle_next_number(&app_config, args, cli.json)?,
    }

    Ok(())
}

fn handle_finish_time(app_config: &AppConfig, args: FinishTimeArgs, json: bool) -> Result<()> {
    if !args.hours.is_finite() || args.hours < 0.0 {
        return Err(anyhow!("--hours must be a non-negative number, got {}", args.hours));
    }
    let mut holidays = app_config.holiday_dates();
    holidays.extend(args.holidays);
    debug!(count = holidays.len(), "Using holiday calendar");

    let finish = calendar::compute_finish(args.start, args.hours, &holidays);
    if json {
        print_json(&FinishTimeOutput {
            start: args.start,
            hours: args.hours,
            finish,
            holidays,
        })?;
    } else {
        println!("{}", finish.format("%Y-%m-%d %H:%M"));
    }
    Ok(())
}

fn handle_next_number(app_config: &AppConfig, args: NextNumberArgs, json: bool) -> Result<()> {
    let prefix = args
        .prefix
        .unwrap_or_else(|| app_config.work_order_prefix.clone());
    let year = args.year.unwrap_or_else(|| Local::now().year());

    let allocator = SequenceAllocator::seeded(args.existing.iter().map(String::as_str))
        .context("failed to read existing numbers")?;
    let number = allocator.next(&prefix, year);

    if json {
        print_json(&NextNumberOutput {
            number: number.to_string(),
            sequence: number.sequence,
        })?;
    } else {
        println!("{}", number);
    }
    Ok(())
}

fn parse_instant(raw: &str) -> Result<NaiveDateTime, String> {
    ["%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .ok_or_else(|| format!("'{}' is not a date and time like 2025-01-03T16:00", raw))
}

fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| format!("'{}' is not a YYYY-MM-DD date", raw))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
