//! Sequential generate-and-store runs.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use indicatif::ProgressBar;
use tracing::{error, info, warn};

use crate::association::{Capability, Connector};
use crate::common::sop_classes::Modality;
use crate::common::types::{ExchangeOutcome, ItemOutcome, SeriesReport};
use crate::generator::{ImagingObject, ObjectGenerator};
use crate::sender::store;

/// Cooperative cancellation flag, observed between series items.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

pub struct SeriesOrchestrator<C: Connector> {
    connector: C,
    generator: ObjectGenerator,
    work_dir: PathBuf,
}

impl<C: Connector> SeriesOrchestrator<C> {
    pub fn new(connector: C, generator: ObjectGenerator) -> Self {
        Self {
            connector,
            generator,
            work_dir: std::env::temp_dir(),
        }
    }

    /// Directory that receives transient object files.
    pub fn work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = dir.into();
        self
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Generate and store `count` objects of one modality.
    pub fn send_series(
        &mut self,
        count: usize,
        modality: Modality,
        progress: Option<&ProgressBar>,
        cancel: &CancellationToken,
    ) -> SeriesReport {
        info!(
            "📤 Sending {} {} object(s) to {}",
            count,
            modality,
            self.connector.peer()
        );
        self.run(count, progress, cancel, |_| modality)
    }

    /// Generate and store `count` objects, each of a random modality.
    pub fn send_mixed(
        &mut self,
        count: usize,
        progress: Option<&ProgressBar>,
        cancel: &CancellationToken,
    ) -> SeriesReport {
        info!(
            "📤 Sending {} mixed-modality object(s) to {}",
            count,
            self.connector.peer()
        );
        self.run(count, progress, cancel, |generator| generator.random_modality())
    }

    fn run<F>(
        &mut self,
        count: usize,
        progress: Option<&ProgressBar>,
        cancel: &CancellationToken,
        mut choose: F,
    ) -> SeriesReport
    where
        F: FnMut(&mut ObjectGenerator) -> Modality,
    {
        let started = Instant::now();
        let mut report = SeriesReport::new(count);

        for index in 0..count {
            if cancel.is_cancelled() {
                warn!("Series cancelled after {} of {} item(s)", index, count);
                report.cancelled = true;
                break;
            }

            let modality = choose(&mut self.generator);
            let object = self.generator.generate(modality);
            if let Some(pb) = progress {
                pb.set_message(format!("{} {}", modality, short_uid(&object.sop_instance_uid)));
            }

            let item_started = Instant::now();
            let outcome = self.send_one(&object);
            let item = ItemOutcome {
                index,
                modality,
                sop_instance_uid: Some(object.sop_instance_uid.clone()),
                success: outcome.success,
                status: outcome.status,
                error: outcome.error.clone(),
                transfer_time_ms: item_started.elapsed().as_millis() as u64,
            };

            if item.success {
                info!("✅ [{}/{}] {} stored", index + 1, count, object.sop_instance_uid);
            } else {
                error!(
                    "❌ [{}/{}] {} failed: {}",
                    index + 1,
                    count,
                    object.sop_instance_uid,
                    item.error.as_deref().unwrap_or(&item.status.to_string())
                );
            }

            report.record(item, outcome.bytes_sent);
            if let Some(pb) = progress {
                pb.inc(1);
            }
        }

        report.total_time = started.elapsed();
        info!(
            "Series finished: {} of {} stored",
            report.succeeded, report.requested
        );
        report
    }

    /// One item: materialize, open, store, close, remove. Every failure
    /// stays inside this item.
    fn send_one(&mut self, object: &ImagingObject) -> ExchangeOutcome {
        let artifact = match object.materialize(&self.work_dir) {
            Ok(artifact) => artifact,
            Err(e) => {
                error!("Failed to write transient object file: {}", e);
                return ExchangeOutcome::failed(e.to_string());
            }
        };

        let capability = Capability {
            abstract_syntax: object.sop_class_uid,
        };
        let result = self.connector.open(&[capability]);
        let outcome = match result.handle {
            Some(mut channel) => {
                let outcome = store::store_file(&mut channel, artifact.path());
                self.connector.close(channel);
                outcome
            }
            None => ExchangeOutcome::failed(
                result
                    .error
                    .unwrap_or_else(|| "association not established".to_string()),
            ),
        };

        artifact.remove();
        outcome
    }
}

fn short_uid(uid: &str) -> &str {
    let start = uid.len().saturating_sub(8);
    uid.get(start..).unwrap_or(uid)
}
