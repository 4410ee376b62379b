// Sender binary main
use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use console::{style, Emoji};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use tracing::{info, warn};

use modality_emulator::association::{check_connection, AssociationClient, Capability};
use modality_emulator::common::logging;
use modality_emulator::common::types::{SeriesReport, SessionSummary};
use modality_emulator::config::{
    DEFAULT_LOCAL_AE_TITLE, DEFAULT_STORE_AE_TITLE, DEFAULT_STORE_HOST, DEFAULT_STORE_PORT,
};
use modality_emulator::sender::{CancellationToken, SeriesOrchestrator};
use modality_emulator::{Modality, ObjectGenerator, RemoteNode, SopClassTable};

static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "");
static STOPWATCH: Emoji<'_, '_> = Emoji("⏱️ ", "");
static LINK: Emoji<'_, '_> = Emoji("🔗 ", "");

#[derive(Parser, Clone)]
#[command(name = "modality-sender")]
#[command(about = "Emulates an imaging modality pushing synthetic images over C-STORE")]
#[command(version = "1.0")]
struct Args {
    /// Destination host
    #[arg(default_value = DEFAULT_STORE_HOST)]
    host: String,

    /// Destination port
    #[arg(default_value_t = DEFAULT_STORE_PORT)]
    port: u16,

    /// Called AE title (destination)
    #[arg(default_value = DEFAULT_STORE_AE_TITLE)]
    ae_title: String,

    /// Calling AE title
    #[arg(short = 'c', long, env = "LOCAL_AE_TITLE", default_value = DEFAULT_LOCAL_AE_TITLE)]
    calling_ae: String,

    /// Number of CT images
    #[arg(long, default_value = "5")]
    ct: usize,

    /// Number of MR images
    #[arg(long, default_value = "3")]
    mr: usize,

    /// Number of PT images
    #[arg(long, default_value = "0")]
    pt: usize,

    /// Number of secondary capture images
    #[arg(long, default_value = "0")]
    sc: usize,

    /// Send N images of random modality instead of the per-modality counts
    #[arg(long)]
    mixed: Option<usize>,

    /// Store PT images as PET instead of secondary capture
    #[arg(long)]
    pet_storage: bool,

    /// Directory for transient object files
    #[arg(long)]
    work_dir: Option<PathBuf>,

    /// Only check that an association can be opened, then exit
    #[arg(long)]
    check: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn plan(&self) -> Vec<(Modality, usize)> {
        [
            (Modality::Ct, self.ct),
            (Modality::Mr, self.mr),
            (Modality::Pt, self.pt),
            (Modality::Sc, self.sc),
        ]
        .into_iter()
        .filter(|(_, count)| *count > 0)
        .collect()
    }

    fn total(&self) -> usize {
        self.mixed
            .unwrap_or_else(|| self.plan().iter().map(|(_, n)| n).sum())
    }

    fn table(&self) -> SopClassTable {
        if self.pet_storage {
            SopClassTable::with_pet_storage()
        } else {
            SopClassTable::new()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let session = logging::init("modality_sender", args.verbose)?;
    let node = RemoteNode::new(args.host.clone(), args.port, args.ae_title.clone());

    println!("{} Modality Sender v1.0", ROCKET);
    println!("Session ID: {}", style(&session.session_id).cyan());
    println!("Log file: {}", style(session.log_file.display()).yellow());
    println!("Destination: {}", style(&node).green());
    println!("Calling AE: {}", style(&args.calling_ae).green());
    println!();

    if args.check {
        let table = args.table();
        let capabilities: Vec<Capability> = Modality::ALL
            .iter()
            .map(|m| Capability::storage(*m, &table))
            .collect();
        let calling_ae = args.calling_ae.clone();
        let target = node.clone();
        let ok = tokio::task::spawn_blocking(move || {
            check_connection(&calling_ae, &target, &capabilities)
        })
        .await?;
        if ok {
            println!("{} Connected to {}", LINK, style(&node).green());
        } else {
            println!("❌ Could not associate with {}", style(&node).red());
        }
        return Ok(());
    }

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, stopping after the current image");
                cancel.cancel();
            }
        });
    }

    let total = args.total();
    let progress = ProgressBar::new(total as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("  [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );

    println!("{} Sending {} synthetic image(s)...", ROCKET, total);
    info!("Sending {} image(s) to {}", total, node);
    let start_time = Utc::now();

    let reports = {
        let args = args.clone();
        let node = node.clone();
        let progress = progress.clone();
        let cancel = cancel.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<SeriesReport>> {
            let client = AssociationClient::new(args.calling_ae.clone(), node);
            let mut orchestrator = SeriesOrchestrator::new(client, ObjectGenerator::new(args.table()));
            if let Some(dir) = &args.work_dir {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("Failed to create work directory {}", dir.display()))?;
                orchestrator = orchestrator.work_dir(dir);
            }

            let mut reports = Vec::new();
            if let Some(count) = args.mixed {
                reports.push(orchestrator.send_mixed(count, Some(&progress), &cancel));
            } else {
                for (modality, count) in args.plan() {
                    if cancel.is_cancelled() {
                        break;
                    }
                    reports.push(orchestrator.send_series(count, modality, Some(&progress), &cancel));
                }
            }
            Ok(reports)
        })
        .await??
    };

    progress.finish_with_message("done");
    let end_time = Utc::now();
    let duration = end_time.signed_duration_since(start_time);

    let summary = SessionSummary {
        session_id: session.session_id.clone(),
        start_time,
        end_time,
        destination: node.to_string(),
        calling_ae: args.calling_ae.clone(),
        called_ae: args.ae_title.clone(),
        requested: total,
        succeeded: reports.iter().map(|r| r.succeeded).sum(),
        failed: reports.iter().map(|r| r.failed).sum(),
        cancelled: cancel.is_cancelled(),
        total_bytes: reports.iter().map(|r| r.total_bytes).sum(),
        total_time_ms: duration.num_milliseconds().max(0) as u64,
        series: reports,
    };

    let summary_file = session
        .log_file
        .with_file_name(format!("modality_sender_summary_{}.json", session.session_id));
    std::fs::write(&summary_file, serde_json::to_string_pretty(&summary)?)
        .with_context(|| format!("Failed to write summary {}", summary_file.display()))?;

    println!();
    println!("{} Transfer Summary", STOPWATCH);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for report in &summary.series {
        let modality = match (args.mixed, report.items.first()) {
            (Some(_), _) => "MIXED".to_string(),
            (None, Some(item)) => item.modality.to_string(),
            (None, None) => "-".to_string(),
        };
        println!(
            "  {:<6} {} of {} stored",
            modality,
            style(report.succeeded).green(),
            report.requested
        );
    }
    println!("Requested:       {}", style(summary.requested).cyan());
    println!("Successful:      {}", style(summary.succeeded).green());
    println!("Failed:          {}", style(summary.failed).red());
    if summary.cancelled {
        println!("Cancelled:       {}", style("yes").yellow());
    }
    println!("Total size:      {:.2} MB", summary.total_bytes as f64 / (1024.0 * 1024.0));
    println!("Total time:      {:.2} seconds", summary.total_time_ms as f64 / 1000.0);
    println!();
    println!("📄 Detailed log: {}", style(session.log_file.display()).yellow());
    println!("📊 Summary JSON: {}", style(summary_file.display()).yellow());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_destination_defaults() {
        let args = Args::try_parse_from(["modality-sender"]).unwrap();
        assert_eq!(args.host, DEFAULT_STORE_HOST);
        assert_eq!(args.port, DEFAULT_STORE_PORT);
        assert_eq!(args.ae_title, DEFAULT_STORE_AE_TITLE);
        assert_eq!(args.total(), 8);
    }

    #[test]
    fn test_positional_destination() {
        let args = Args::try_parse_from(["modality-sender", "pacs", "104", "ARCHIVE"]).unwrap();
        assert_eq!(args.host, "pacs");
        assert_eq!(args.port, 104);
        assert_eq!(args.ae_title, "ARCHIVE");

        let args = Args::try_parse_from(["modality-sender", "--mixed", "4"]).unwrap();
        assert_eq!(args.port, DEFAULT_STORE_PORT);
        assert_eq!(args.total(), 4);
    }
}
