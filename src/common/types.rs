use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use super::sop_classes::Modality;
use super::status::DimseStatus;

/// A remote application entity: where to connect and whom to call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteNode {
    pub host: String,
    pub port: u16,
    pub ae_title: String,
}

impl RemoteNode {
    pub fn new(host: impl Into<String>, port: u16, ae_title: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            ae_title: ae_title.into(),
        }
    }

    pub fn socket_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for RemoteNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.ae_title, self.host, self.port)
    }
}

/// Result of a single store exchange.
#[derive(Debug, Clone, Serialize)]
pub struct ExchangeOutcome {
    pub success: bool,
    pub status: DimseStatus,
    pub bytes_sent: u64,
    pub error: Option<String>,
}

impl ExchangeOutcome {
    pub fn from_status(status: DimseStatus, bytes_sent: u64) -> Self {
        Self {
            success: status.is_success(),
            status,
            bytes_sent,
            error: None,
        }
    }

    /// An exchange that never produced a status.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            status: DimseStatus::Missing,
            bytes_sent: 0,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemOutcome {
    pub index: usize,
    pub modality: Modality,
    pub sop_instance_uid: Option<String>,
    pub success: bool,
    pub status: DimseStatus,
    pub error: Option<String>,
    pub transfer_time_ms: u64,
}

/// Tally of one generate-and-store run.
#[derive(Debug, Clone, Serialize)]
pub struct SeriesReport {
    pub requested: usize,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: bool,
    pub total_bytes: u64,
    #[serde(with = "duration_ms")]
    pub total_time: Duration,
    pub items: Vec<ItemOutcome>,
}

impl SeriesReport {
    pub fn new(requested: usize) -> Self {
        Self {
            requested,
            attempted: 0,
            succeeded: 0,
            failed: 0,
            cancelled: false,
            total_bytes: 0,
            total_time: Duration::from_secs(0),
            items: Vec::new(),
        }
    }

    pub fn record(&mut self, item: ItemOutcome, bytes: u64) {
        self.attempted += 1;
        if item.success {
            self.succeeded += 1;
            self.total_bytes += bytes;
        } else {
            self.failed += 1;
        }
        self.items.push(item);
    }

    pub fn get_throughput_mbps(&self) -> f64 {
        let elapsed = self.total_time.as_secs_f64();
        let bytes = self.total_bytes as f64;
        if elapsed > 0.0 {
            (bytes / (1024.0 * 1024.0)) / elapsed
        } else {
            0.0
        }
    }

    pub fn get_average_transfer_time_ms(&self) -> f64 {
        if self.items.is_empty() {
            0.0
        } else {
            let total_ms: u64 = self.items.iter().map(|i| i.transfer_time_ms).sum();
            total_ms as f64 / self.items.len() as f64
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub destination: String,
    pub calling_ae: String,
    pub called_ae: String,
    pub requested: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: bool,
    pub total_bytes: u64,
    pub total_time_ms: u64,
    pub series: Vec<SeriesReport>,
}

mod duration_ms {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(index: usize, success: bool) -> ItemOutcome {
        ItemOutcome {
            index,
            modality: Modality::Ct,
            sop_instance_uid: None,
            success,
            status: if success {
                DimseStatus::Success(0)
            } else {
                DimseStatus::Failure(0xA700)
            },
            error: None,
            transfer_time_ms: 10 * (index as u64 + 1),
        }
    }

    #[test]
    fn test_report_tally() {
        let mut report = SeriesReport::new(3);
        report.record(item(0, true), 100);
        report.record(item(1, false), 100);
        report.record(item(2, true), 50);

        assert_eq!(report.attempted, 3);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.total_bytes, 150);
        assert_eq!(report.get_average_transfer_time_ms(), 20.0);
        assert_eq!(report.get_throughput_mbps(), 0.0);
    }

    #[test]
    fn test_remote_node_display() {
        let node = RemoteNode::new("localhost", 11112, "MYSTORE");
        assert_eq!(node.to_string(), "MYSTORE@localhost:11112");
        assert_eq!(node.socket_address(), "localhost:11112");
    }

    #[test]
    fn test_failed_outcome_has_no_status() {
        let outcome = ExchangeOutcome::failed("connection reset");
        assert!(!outcome.success);
        assert_eq!(outcome.status, DimseStatus::Missing);
    }
}
