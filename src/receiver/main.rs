// Receiver binary main
use anyhow::Result;
use clap::Parser;
use console::{style, Emoji};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use modality_emulator::common::logging;
use modality_emulator::config::DEFAULT_LOCAL_PORT;
use modality_emulator::receiver::StoreReceiver;

static SATELLITE: Emoji<'_, '_> = Emoji("📡 ", "");
static INBOX: Emoji<'_, '_> = Emoji("📥 ", "");

#[derive(Parser, Clone)]
#[command(name = "modality-receiver")]
#[command(about = "A minimal C-STORE acceptor that acknowledges every image")]
#[command(version = "1.0")]
struct Args {
    /// Keep received images in this directory
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// AE Title for this receiver
    #[arg(short = 'a', long, default_value = "MYSTORE")]
    ae_title: String,

    /// Port to listen on
    #[arg(short, long, env = "LOCAL_PORT", default_value_t = DEFAULT_LOCAL_PORT)]
    port: u16,

    /// Maximum number of concurrent associations
    #[arg(short = 'm', long, default_value = "10")]
    max_connections: usize,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let session = logging::init("modality_receiver", args.verbose)?;

    println!("{} Modality Receiver v1.0", SATELLITE);
    println!("Session ID: {}", style(&session.session_id).cyan());
    println!("Log file: {}", style(session.log_file.display()).yellow());
    println!("AE Title: {}", style(&args.ae_title).green());
    println!("Port: {}", style(&args.port).green());
    match &args.output {
        Some(dir) => println!("Output: {}", style(dir.display()).green()),
        None => println!("Output: {}", style("not kept").dim()),
    }
    println!("Max connections: {}", style(&args.max_connections).green());
    println!();

    let mut receiver = StoreReceiver::new(args.ae_title.clone(), args.max_connections);
    if let Some(dir) = &args.output {
        std::fs::create_dir_all(dir)?;
        receiver = receiver.output_dir(dir);
    }

    println!("{} Starting receiver...", INBOX);
    info!("Starting store receiver on port {}", args.port);

    Arc::new(receiver).start(args.port).await?;

    Ok(())
}
