use api_shared::ServiceDiscovery;
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use cds_core::config::{read_config_file, timeout_from_env_value};
use cds_core::planner::plan_windows;
use cds_core::{CdsConfig, EligibilityService, EvaluationRequest, HttpFetcher, PatternSources};

#[derive(Parser)]
#[command(name = "cds")]
#[command(about = "SMART asthma eligibility CLI")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate one patient against a FHIR server and print the criteria
    Evaluate {
        /// FHIR R4 base URL
        #[arg(long)]
        base_url: String,
        /// Patient FHIR id
        #[arg(long)]
        patient: String,
        /// Encounter FHIR id (optional)
        #[arg(long)]
        encounter: Option<String>,
        /// Bearer token for the FHIR server
        #[arg(long)]
        token: String,
        /// Configuration file (default: $CONFIG_FILE or config.json)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Evaluate as of this date (YYYY-MM-DD, default: today)
        #[arg(long)]
        today: Option<NaiveDate>,
    },
    /// Print the date windows a lookback is split into
    Plan {
        /// Lookback in days
        #[arg(long)]
        lookback: i64,
        /// Number of windows
        #[arg(long)]
        splits: usize,
        /// Last day of the lookback (YYYY-MM-DD, default: today)
        #[arg(long)]
        today: Option<NaiveDate>,
    },
    /// Print the CDS Hooks discovery document
    Services,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Evaluate {
            base_url,
            patient,
            encounter,
            token,
            config,
            today,
        }) => {
            let config_path = config.unwrap_or_else(|| {
                std::env::var("CONFIG_FILE")
                    .unwrap_or_else(|_| "config.json".into())
                    .into()
            });
            let file = read_config_file(&config_path)?;
            let patterns = PatternSources::from_lookup(|key| std::env::var(key).ok())?;
            let timeout = timeout_from_env_value(std::env::var("TIMEOUT").ok())?;
            let cfg = Arc::new(CdsConfig::new(file, &patterns, timeout)?);
            let fetcher = Arc::new(HttpFetcher::new(cfg.timeout())?);
            let service = EligibilityService::new(cfg, fetcher);

            let request = EvaluationRequest {
                base_url,
                patient_id: patient,
                encounter_id: encounter,
                user_id: None,
                access_token: token,
            };
            let today = today.unwrap_or_else(|| Local::now().date_naive());

            let runtime = tokio::runtime::Runtime::new()?;
            let evaluation = runtime.block_on(service.evaluate(&request, today))?;
            println!("{}", serde_json::to_string_pretty(&evaluation.criteria)?);
            if evaluation.recommends_treatment() {
                println!("Treatment recommended for patient {}", request.patient_id);
            }
        }
        Some(Commands::Plan {
            lookback,
            splits,
            today,
        }) => {
            let today = today.unwrap_or_else(|| Local::now().date_naive());
            for window in plan_windows(lookback, splits, today)? {
                println!("{} .. {} ({} days)", window.start, window.end, window.days());
            }
        }
        Some(Commands::Services) => {
            println!(
                "{}",
                serde_json::to_string_pretty(&ServiceDiscovery::eligibility())?
            );
        }
        None => {
            println!("Use 'cds --help' for commands");
        }
    }

    Ok(())
}
