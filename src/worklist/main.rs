// Worklist query binary main
use anyhow::{Context, Result};
use clap::Parser;
use console::{style, Emoji};
use dicom_core::VR;
use dicom_dictionary_std::tags;
use std::path::PathBuf;
use tracing::{error, info};

use modality_emulator::association::{AssociationClient, Capability, Connector};
use modality_emulator::common::logging;
use modality_emulator::config::EmulatorConfig;
use modality_emulator::worklist::{
    find, list_records, FindOutcome, ResultPersister, WorklistQuery, WorklistRecord,
};

static CLIPBOARD: Emoji<'_, '_> = Emoji("📋 ", "");
static DISK: Emoji<'_, '_> = Emoji("💾 ", "");

#[derive(Parser)]
#[command(name = "modality-worklist")]
#[command(about = "Queries a modality worklist provider and records the result")]
#[command(version = "1.0")]
struct Args {
    #[command(flatten)]
    config: EmulatorConfig,

    /// Directory for saved worklist records
    #[arg(short, long, default_value = ".")]
    output: PathBuf,

    /// Only return procedures scheduled for this modality
    #[arg(short, long)]
    modality: Option<String>,

    /// Only return procedures scheduled on this date (YYYYMMDD)
    #[arg(short, long)]
    date: Option<String>,

    /// List saved records instead of querying
    #[arg(short, long)]
    list: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.list {
        return print_records(&args.output);
    }

    let session = logging::init("modality_worklist", args.verbose)?;
    let node = args.config.remote_node();

    println!("{} Modality Worklist v1.0", CLIPBOARD);
    println!("Session ID: {}", style(&session.session_id).cyan());
    println!("Log file: {}", style(session.log_file.display()).yellow());
    println!("Worklist provider: {}", style(&node).green());
    println!("Calling AE: {}", style(&args.config.local_ae_title).green());
    println!();

    let mut query = WorklistQuery::full();
    if let Some(modality) = &args.modality {
        query = query.with_value(tags::MODALITY, VR::CS, modality.to_uppercase());
    }
    if let Some(date) = &args.date {
        query = query.with_value(tags::SCHEDULED_PROCEDURE_STEP_START_DATE, VR::DA, date.clone());
    }

    let client = AssociationClient::new(args.config.local_ae_title.clone(), node.clone());
    let outcome = tokio::task::spawn_blocking(move || -> Option<FindOutcome> {
        let result = client.open(&[Capability::worklist_find()]);
        let mut handle = result.handle?;
        let outcome = find(&mut handle, &query);
        client.close(handle);
        Some(outcome)
    })
    .await?;

    let persister = ResultPersister::new(&args.output);
    let items = match &outcome {
        Some(outcome) => outcome.items.as_slice(),
        None => {
            error!("Failed to connect to worklist provider {}", node);
            println!("❌ Failed to connect to {}", style(&node).red());
            &[]
        }
    };
    let saved = persister.save(items, &node);

    if let Some(outcome) = &outcome {
        info!("Received {} worklist item(s)", outcome.items.len());
        println!("✅ Found {} worklist item(s)", style(outcome.items.len()).green());
        if outcome.used_fallback {
            println!("   (detailed query returned nothing, used the minimal query)");
        }
        for anomaly in &outcome.anomalies {
            println!("⚠️  {}", style(anomaly).yellow());
        }
        for (index, item) in outcome.items.iter().enumerate() {
            println!(
                "  {:>3}. {} {} {} {} {}",
                index + 1,
                style(item.patient_name().unwrap_or_else(|| "N/A".into())).cyan(),
                item.patient_id().unwrap_or_else(|| "N/A".into()),
                item.accession_number().unwrap_or_else(|| "-".into()),
                item.modality().unwrap_or_else(|| "-".into()),
                style(item.study_description().unwrap_or_default()).dim()
            );
        }
    }

    println!();
    match saved {
        Some(path) => println!("{} Worklist record: {}", DISK, style(path.display()).yellow()),
        None => println!("❌ Worklist record could not be written"),
    }
    println!("📄 Detailed log: {}", style(session.log_file.display()).yellow());

    Ok(())
}

fn print_records(dir: &std::path::Path) -> Result<()> {
    let records = list_records(dir);
    if records.is_empty() {
        println!("No worklist records in {}", dir.display());
        return Ok(());
    }

    println!("{} {} worklist record(s) in {}", CLIPBOARD, records.len(), dir.display());
    for path in records {
        let record = WorklistRecord::load(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        println!(
            "  {}  {} item(s) from {}@{}:{}",
            style(record.timestamp.format("%Y-%m-%d %H:%M:%S")).cyan(),
            record.worklist_count,
            record.ris_connection.ae_title,
            record.ris_connection.address,
            record.ris_connection.port
        );
    }
    Ok(())
}
