//! Demo entry point for `roster_core`.
//!
//! # Responsibility
//! - Seed a store with the sample class and print query results as JSON.
//! - Keep output deterministic for quick local sanity checks.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use roster_core::{ContextOptions, Member, RosterService, StoreName};
use std::io::Write;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "roster_cli")]
#[command(about = "Class roster store demo")]
#[command(version)]
struct Cli {
    /// Store name; a fresh unique store is used when omitted
    #[arg(long)]
    store: Option<String>,

    /// Log level (trace|debug|info|warn|error)
    #[arg(long)]
    log_level: Option<String>,

    /// Absolute directory for log files; logging stays off when omitted
    #[arg(long)]
    log_dir: Option<String>,

    /// Include entity values in commit diagnostics
    #[arg(long)]
    sensitive_data_logging: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Enroll the sample class, then print rosters, eldest member and counts
    Demo {
        /// Roster name for the sample class
        #[arg(long, default_value = "6ABIF_6AKIF")]
        name: String,
    },
    /// Print the core crate version
    Version,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("error: {message}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), String> {
    if let Some(log_dir) = cli.log_dir.as_deref() {
        let level = cli
            .log_level
            .as_deref()
            .unwrap_or_else(|| roster_core::default_log_level());
        roster_core::init_logging(level, log_dir)?;
    }

    match cli.command {
        Command::Version => {
            println!("roster_core version={}", roster_core::core_version());
            Ok(())
        }
        Command::Demo { name } => {
            let store = match cli.store {
                Some(store) => StoreName::new(store).map_err(|err| err.to_string())?,
                None => StoreName::unique(),
            };
            let mut options = ContextOptions::new(store);
            if cli.sensitive_data_logging {
                options = options.enable_sensitive_data_logging();
            }
            let mut stdout = std::io::stdout().lock();
            run_demo(&RosterService::new(options), &name, &mut stdout)
                .map_err(|err| err.to_string())
        }
    }
}

fn run_demo(
    service: &RosterService,
    name: &str,
    out: &mut impl Write,
) -> Result<(), Box<dyn std::error::Error>> {
    service.enroll(name, sample_members()?)?;

    let rosters = service.list_rosters()?;
    writeln!(out, "{}", serde_json::to_string_pretty(&rosters)?)?;

    if let Some(eldest) = service.eldest_member()? {
        writeln!(out, "eldest={} born={}", eldest.full_name(), eldest.birth_date)?;
    }
    writeln!(
        out,
        "rosters={} members={}",
        service.roster_count()?,
        service.member_count()?
    )?;
    Ok(())
}

fn sample_members() -> Result<Vec<Member>, String> {
    [
        ("Max", "Mustermann", "1990-01-01"),
        ("Eva", "Musterfrau", "1991-01-01"),
        ("Fritz", "Musterkind", "1980-01-01"),
        ("Franz", "Huber", "1999-07-10"),
    ]
    .into_iter()
    .map(|(first, last, born)| {
        let birth_date = NaiveDate::parse_from_str(born, "%Y-%m-%d")
            .map_err(|err| format!("invalid sample date `{born}`: {err}"))?;
        Ok(Member::new(first, last, birth_date))
    })
    .collect()
}
