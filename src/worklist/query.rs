//! Modality worklist C-FIND exchange.

use std::fmt;

use dicom_core::value::PrimitiveValue;
use dicom_core::{DataElement, Tag, VR};
use dicom_dictionary_std::tags;
use dicom_object::InMemDicomObject;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::item::WorklistItem;
use crate::association::DimseChannel;
use crate::common::sop_classes;
use crate::common::status::DimseStatus;
use crate::dimse;

/// Query filter: the keys sent in the C-FIND identifier. Values are
/// empty for universal matching unless set.
#[derive(Debug, Clone, PartialEq)]
pub struct WorklistQuery {
    keys: Vec<(Tag, VR, String)>,
}

impl WorklistQuery {
    /// Only the mandatory query level key.
    pub fn minimal() -> Self {
        Self {
            keys: vec![(tags::QUERY_RETRIEVE_LEVEL, VR::CS, "SCHEDULED".to_string())],
        }
    }

    /// All the keys a modality needs to start a procedure.
    pub fn full() -> Self {
        let mut query = Self::minimal();
        for (tag, vr) in [
            (tags::PATIENT_NAME, VR::PN),
            (tags::PATIENT_ID, VR::LO),
            (tags::SCHEDULED_PROCEDURE_STEP_START_DATE, VR::DA),
            (tags::SCHEDULED_PROCEDURE_STEP_START_TIME, VR::TM),
            (tags::ACCESSION_NUMBER, VR::SH),
            (tags::MODALITY, VR::CS),
            (tags::STUDY_INSTANCE_UID, VR::UI),
        ] {
            query.keys.push((tag, vr, String::new()));
        }
        query
    }

    /// Set a matching value for a key, adding the key if needed.
    pub fn with_value(mut self, tag: Tag, vr: VR, value: impl Into<String>) -> Self {
        let value = value.into();
        match self.keys.iter_mut().find(|(t, _, _)| *t == tag) {
            Some(key) => key.2 = value,
            None => self.keys.push((tag, vr, value)),
        }
        self
    }

    pub fn is_minimal(&self) -> bool {
        self.keys.len() == 1
    }

    pub fn to_identifier(&self) -> InMemDicomObject {
        InMemDicomObject::from_element_iter(self.keys.iter().map(|(tag, vr, value)| {
            let value = if value.is_empty() {
                PrimitiveValue::Empty
            } else {
                PrimitiveValue::from(value.as_str())
            };
            DataElement::new(*tag, *vr, value)
        }))
    }
}

impl Default for WorklistQuery {
    fn default() -> Self {
        Self::full()
    }
}

/// Something unusual seen while running a find. Recorded, never raised.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum FindAnomaly {
    /// A response with a status other than pending or success.
    ErrorStatus(DimseStatus),
    /// A response without a status element.
    MissingStatus,
    /// The response stream ended before a final response.
    Incomplete,
    /// No accepted presentation context for the worklist model.
    NoContext,
    Transport(String),
}

impl fmt::Display for FindAnomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FindAnomaly::ErrorStatus(status) => write!(f, "C-FIND returned error status {}", status),
            FindAnomaly::MissingStatus => f.write_str("C-FIND response without status"),
            FindAnomaly::Incomplete => f.write_str("C-FIND response stream ended early"),
            FindAnomaly::NoContext => f.write_str("worklist find not negotiated"),
            FindAnomaly::Transport(e) => write!(f, "transport error: {}", e),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FindOutcome {
    pub items: Vec<WorklistItem>,
    pub anomalies: Vec<FindAnomaly>,
    pub used_fallback: bool,
}

impl FindOutcome {
    pub fn is_clean(&self) -> bool {
        self.anomalies.is_empty()
    }
}

/// Run a worklist query. An empty but clean result is retried once with
/// the minimal filter on the same association. The association stays open.
pub fn find<C: DimseChannel>(channel: &mut C, query: &WorklistQuery) -> FindOutcome {
    let mut outcome = FindOutcome::default();
    run_query(channel, query, &mut outcome);

    if outcome.items.is_empty() && outcome.is_clean() && !query.is_minimal() {
        info!("No worklist items found with detailed query, trying minimal query...");
        outcome.used_fallback = true;
        run_query(channel, &WorklistQuery::minimal(), &mut outcome);
    }

    info!(
        "📋 Worklist query finished: {} item(s), {} anomal{}",
        outcome.items.len(),
        outcome.anomalies.len(),
        if outcome.anomalies.len() == 1 { "y" } else { "ies" }
    );
    outcome
}

fn run_query<C: DimseChannel>(channel: &mut C, query: &WorklistQuery, outcome: &mut FindOutcome) {
    let class_uid = sop_classes::MODALITY_WORKLIST_FIND.uid;
    let context = match channel.context_for(class_uid) {
        Some(context) => context,
        None => {
            error!("No accepted presentation context for Modality Worklist FIND");
            outcome.anomalies.push(FindAnomaly::NoContext);
            return;
        }
    };

    let message_id = channel.next_message_id();
    let command = dimse::find_request(class_uid, message_id);
    let identifier = query.to_identifier();
    if let Err(e) = channel.send_request(&context, &command, Some(&identifier)) {
        error!("Failed to send C-FIND request: {}", e);
        outcome.anomalies.push(FindAnomaly::Transport(e.to_string()));
        return;
    }
    debug!("C-FIND request sent (message ID {})", message_id);

    let mut finished = false;
    loop {
        let response = match channel.receive_response(&context) {
            Ok(Some(response)) => response,
            Ok(None) => break,
            Err(e) => {
                error!("Failed to receive C-FIND response: {}", e);
                outcome.anomalies.push(FindAnomaly::Transport(e.to_string()));
                return;
            }
        };

        match response.status() {
            DimseStatus::Pending(_) => {
                if let Some(dataset) = response.dataset {
                    let item = WorklistItem::new(dataset);
                    info!(
                        "MWL item received - Patient Name: {}, Patient ID: {}, Accession: {}",
                        item.patient_name().as_deref().unwrap_or("N/A"),
                        item.patient_id().as_deref().unwrap_or("N/A"),
                        item.accession_number().as_deref().unwrap_or("N/A")
                    );
                    outcome.items.push(item);
                }
            }
            DimseStatus::Success(_) => {
                if let Some(dataset) = response.dataset {
                    info!("Final MWL response received");
                    outcome.items.push(WorklistItem::new(dataset));
                } else {
                    debug!("MWL query completed successfully with no more data");
                }
                finished = true;
                break;
            }
            DimseStatus::Missing => {
                warn!("C-FIND returned a response without status");
                outcome.anomalies.push(FindAnomaly::MissingStatus);
                finished = true;
            }
            status => {
                error!("C-FIND returned error status: {}", status);
                outcome.anomalies.push(FindAnomaly::ErrorStatus(status));
                finished = true;
            }
        }
    }

    if !finished {
        warn!("C-FIND response stream ended without a final response");
        outcome.anomalies.push(FindAnomaly::Incomplete);
    }
}
