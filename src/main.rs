use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::{error, info};

use fleet_telemetry::config::EngineConfig;
use fleet_telemetry::error::Result;
use fleet_telemetry::ingest;
use fleet_telemetry::logging::init_logging;
use fleet_telemetry::pipeline::processing::schema::SchemaDetector;
use fleet_telemetry::pipeline::TelemetryEngine;

#[derive(Parser)]
#[command(name = "fleet_telemetry")]
#[command(about = "Vehicle telemetry reconciliation and quality engine")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to a TOML config file; defaults apply when absent
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline over a telemetry export
    Process {
        /// Input file (CSV; `;` or `,` delimited)
        input: PathBuf,
        /// Write the full engine output as JSON to this path
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Detect and print the column schema without processing
    Schema {
        /// Input file (CSV; `;` or `,` delimited)
        input: PathBuf,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::load(path),
        None => Ok(EngineConfig::default()),
    }
}

fn run_process(config: EngineConfig, input: &PathBuf, output: Option<&PathBuf>) -> Result<()> {
    let batch = ingest::read_batch_from_path(input)?;
    let engine = TelemetryEngine::new(config);
    let result = engine.process_batch(&batch)?;

    println!("\n📊 Batch results for {}:", batch.source);
    println!("   Rows read: {}", result.verification.rows_read);
    println!("   Rows kept: {}", result.verification.rows_kept);
    println!("   Rows removed: {}", result.verification.rows_removed);
    println!("   Vehicles: {}", result.verification.distinct_vehicles);
    println!(
        "   Total distance: {:.1} km ({:?})",
        result.reconciled_metrics.total_km, result.reconciled_metrics.distance_source
    );
    println!(
        "   Max speed: {:.1} km/h ({:?})",
        result.reconciled_metrics.max_speed, result.reconciled_metrics.speed_source
    );
    println!("   Trips: {}", result.trips.len());
    println!("   Checksum: {}", result.verification.checksum);
    if result.reconciled_metrics.sensor_issue {
        println!("   ⚠️  Speed sensor issue detected");
    }
    for anomaly in &result.quality_report.anomalies {
        println!("   • {}", anomaly);
    }

    if let Some(path) = output {
        let json = serde_json::to_string_pretty(&result)?;
        std::fs::write(path, json)?;
        info!(path = %path.display(), "engine output written");
        println!("   Output file: {}", path.display());
    }
    Ok(())
}

fn run_schema(input: &PathBuf) -> Result<()> {
    let batch = ingest::read_batch_from_path(input)?;
    let schema = SchemaDetector::detect(&batch);

    println!("\n🔍 Schema for {}:", schema.source);
    for column in &schema.columns {
        match &column.example_value {
            Some(example) => println!(
                "   {} -> {:?} (e.g. \"{}\")",
                column.name, column.semantic_type, example
            ),
            None => println!("   {} -> {:?}", column.name, column.semantic_type),
        }
    }
    Ok(())
}

fn main() {
    init_logging();
    let cli = Cli::parse();

    let outcome = load_config(cli.config.as_ref()).and_then(|config| match &cli.command {
        Commands::Process { input, output } => run_process(config, input, output.as_ref()),
        Commands::Schema { input } => run_schema(input),
    });

    if let Err(err) = outcome {
        error!(error = %err, "run failed");
        eprintln!("❌ {}", err);
        std::process::exit(1);
    }
}
