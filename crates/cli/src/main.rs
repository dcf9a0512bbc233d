use chrono::{DateTime, Duration, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use ward_core::medication::Frequency;
use ward_core::{Actor, Engine, EngineConfig, InMemoryPatientDirectory, SeedFile};

mod demo;

#[derive(Parser)]
#[command(name = "ward")]
#[command(about = "Inpatient care orchestration engine CLI")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Preview the due instants of a frequency rule
    Frequency {
        /// Rule text, e.g. "twice daily", "q6h", "every 8 hours", "prn"
        rule: String,
        /// First dose (RFC 3339); defaults to now
        #[arg(long)]
        start: Option<DateTime<Utc>>,
        /// Course length in days
        #[arg(long)]
        days: Option<u32>,
        /// How far ahead to look when the course is open-ended
        #[arg(long, default_value_t = 48)]
        hours: i64,
    },
    /// Validate a registry seed file and print the resulting occupancy
    SeedCheck {
        /// Path to the YAML seed file
        path: PathBuf,
    },
    /// Run an admission, medication and discharge walkthrough on a simulated clock
    Demo,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Frequency {
            rule,
            start,
            days,
            hours,
        }) => {
            let start = start.unwrap_or_else(Utc::now);
            let instants = preview(&rule, start, days, hours)?;
            if instants.is_empty() {
                println!("No scheduled instants ({rule} is given on demand).");
            } else {
                for instant in instants {
                    println!("{}", instant.to_rfc3339());
                }
            }
        }
        Some(Commands::SeedCheck { path }) => {
            let seed = SeedFile::load(&path)?;
            let patients = Arc::new(InMemoryPatientDirectory::new());
            let engine = Engine::builder(Arc::new(EngineConfig::default()))
                .patients(patients.clone())
                .build();
            let actor = Actor::system();
            let summary = seed.apply(&engine, &actor, &patients)?;
            println!(
                "Seed OK: {} room categories, {} wards, {} beds, {} patients",
                summary.room_categories, summary.wards, summary.beds, summary.patients
            );
            for ward in engine.registry().ward_occupancy(&actor)? {
                println!(
                    "{:<10} total {:>3}  vacant {:>3}  maintenance {:>3}  reserved {:>3}",
                    ward.code, ward.total, ward.vacant, ward.maintenance, ward.reserved
                );
            }
        }
        Some(Commands::Demo) => demo::run()?,
        None => {
            println!("Use 'ward --help' for commands");
        }
    }

    Ok(())
}

/// Due instants of `rule` from `start`, bounded by the course length or the look-ahead.
fn preview(
    rule: &str,
    start: DateTime<Utc>,
    days: Option<u32>,
    hours: i64,
) -> Result<Vec<DateTime<Utc>>, Box<dyn std::error::Error>> {
    let frequency = Frequency::parse(rule)?;
    let end = days.map(|d| start + Duration::days(i64::from(d)));
    let horizon = end.unwrap_or(start + Duration::hours(hours));
    Ok(frequency.due_instants(start, end, horizon))
}
