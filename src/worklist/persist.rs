//! Timestamped JSON records of worklist query results.

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{error, info, warn};
use walkdir::WalkDir;

use super::item::WorklistItem;
use crate::common::types::RemoteNode;
use crate::error::Result;

const RECORD_PREFIX: &str = "worklist_";
const RECORD_EXTENSION: &str = "json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RisConnection {
    pub address: String,
    pub port: u16,
    pub ae_title: String,
}

impl From<&RemoteNode> for RisConnection {
    fn from(node: &RemoteNode) -> Self {
        Self {
            address: node.host.clone(),
            port: node.port,
            ae_title: node.ae_title.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorklistRecord {
    pub timestamp: DateTime<Local>,
    pub ris_connection: RisConnection,
    pub worklist_count: usize,
    /// Flattened items; an item that could not be flattened is kept as a string.
    pub worklist_items: Vec<JsonValue>,
}

impl WorklistRecord {
    pub fn build(items: &[WorklistItem], source: &RemoteNode, timestamp: DateTime<Local>) -> Self {
        let worklist_items = items
            .iter()
            .enumerate()
            .map(|(index, item)| match item.flatten() {
                Ok(map) => JsonValue::Object(map),
                Err(e) => {
                    warn!("Worklist item {} could not be flattened ({}), storing it as text", index, e);
                    JsonValue::String(format!("{:?}", item.dataset()))
                }
            })
            .collect();

        Self {
            timestamp,
            ris_connection: source.into(),
            worklist_count: items.len(),
            worklist_items,
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Ok(serde_json::from_reader(std::io::BufReader::new(file))?)
    }
}

#[derive(Debug, Clone)]
pub struct ResultPersister {
    output_dir: PathBuf,
}

impl ResultPersister {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Write a record of `items` and return its path. Write failures are
    /// logged and yield `None`.
    pub fn save(&self, items: &[WorklistItem], source: &RemoteNode) -> Option<PathBuf> {
        let timestamp = Local::now();
        let record = WorklistRecord::build(items, source, timestamp);

        match self.write_record(&record) {
            Ok(path) => {
                info!("💾 Worklist saved to {}", path.display());
                Some(path)
            }
            Err(e) => {
                error!("Failed to save worklist to file: {}", e);
                None
            }
        }
    }

    fn write_record(&self, record: &WorklistRecord) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.output_dir)?;
        let json = serde_json::to_vec_pretty(record)?;
        let stem = format!(
            "{}{}",
            RECORD_PREFIX,
            record.timestamp.format("%Y%m%d_%H%M%S_%6f")
        );

        // never overwrite an existing record
        let mut attempt = 0;
        loop {
            let name = if attempt == 0 {
                format!("{}.{}", stem, RECORD_EXTENSION)
            } else {
                format!("{}_{}.{}", stem, attempt, RECORD_EXTENSION)
            };
            let path = self.output_dir.join(name);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    file.write_all(&json)?;
                    file.write_all(b"\n")?;
                    return Ok(path);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists && attempt < 100 => attempt += 1,
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Saved records in `dir`, oldest first.
pub fn list_records(dir: &Path) -> Vec<PathBuf> {
    let mut records: Vec<PathBuf> = WalkDir::new(dir)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            let name = entry.file_name().to_string_lossy();
            name.starts_with(RECORD_PREFIX)
                && entry.path().extension().and_then(|e| e.to_str()) == Some(RECORD_EXTENSION)
        })
        .map(|entry| entry.into_path())
        .collect();
    records.sort();
    records
}
