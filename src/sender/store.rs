//! C-STORE exchange: push one object over an established association.

use std::path::Path;

use dicom_object::{open_file, InMemDicomObject};
use tracing::{debug, error, info, warn};

use crate::association::DimseChannel;
use crate::common::sop_classes;
use crate::common::status::DimseStatus;
use crate::common::types::ExchangeOutcome;
use crate::dimse;
use crate::error::{EmulatorError, Result};
use crate::generator::ImagingObject;

/// Store a generated object. Never retries.
pub fn store<C: DimseChannel>(channel: &mut C, object: &ImagingObject) -> ExchangeOutcome {
    let dataset = object.to_dataset();
    exchange(
        channel,
        object.sop_class_uid,
        &object.sop_instance_uid,
        &dataset,
    )
}

/// Store an object from a Part 10 file, taking the class and instance
/// from its file meta group.
pub fn store_file<C: DimseChannel>(channel: &mut C, path: &Path) -> ExchangeOutcome {
    let file_obj = match open_file(path) {
        Ok(obj) => obj,
        Err(e) => {
            error!("Failed to open DICOM file {}: {}", path.display(), e);
            return ExchangeOutcome::failed(format!("cannot read {}: {}", path.display(), e));
        }
    };

    let sop_class_uid = trim(&file_obj.meta().media_storage_sop_class_uid).to_string();
    let sop_instance_uid = trim(&file_obj.meta().media_storage_sop_instance_uid).to_string();
    let dataset = file_obj.into_inner();

    exchange(channel, &sop_class_uid, &sop_instance_uid, &dataset)
}

fn exchange<C: DimseChannel>(
    channel: &mut C,
    sop_class_uid: &str,
    sop_instance_uid: &str,
    dataset: &InMemDicomObject,
) -> ExchangeOutcome {
    match try_exchange(channel, sop_class_uid, sop_instance_uid, dataset) {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("C-STORE of {} failed: {}", sop_instance_uid, e);
            ExchangeOutcome::failed(e.to_string())
        }
    }
}

fn try_exchange<C: DimseChannel>(
    channel: &mut C,
    sop_class_uid: &str,
    sop_instance_uid: &str,
    dataset: &InMemDicomObject,
) -> Result<ExchangeOutcome> {
    let class_name = sop_classes::lookup(sop_class_uid)
        .map(|info| info.name)
        .unwrap_or("Unknown SOP Class");

    let context = channel
        .context_for(sop_class_uid)
        .ok_or_else(|| {
            EmulatorError::NoPresentationContext(format!("{} ({})", class_name, sop_class_uid))
        })?;

    let message_id = channel.next_message_id();
    debug!(
        "Sending C-STORE for {} instance {} (message ID {}, context {})",
        class_name, sop_instance_uid, message_id, context.id
    );

    let command = dimse::store_request(sop_class_uid, sop_instance_uid, message_id);
    let bytes_sent = channel.send_request(&context, &command, Some(dataset))?;

    let response = match channel.receive_response(&context)? {
        Some(response) => response,
        None => {
            warn!("No C-STORE response received for {}", sop_instance_uid);
            return Ok(ExchangeOutcome {
                bytes_sent,
                ..ExchangeOutcome::failed("no response from peer")
            });
        }
    };

    let status = response.status();
    match status {
        DimseStatus::Success(_) => {
            info!("✅ C-STORE {} stored ({} bytes)", sop_instance_uid, bytes_sent);
        }
        DimseStatus::Warning(code) => {
            warn!("⚠️ C-STORE {} completed with warning {:04X}H", sop_instance_uid, code);
        }
        DimseStatus::Missing => {
            warn!("C-STORE response for {} carried no status", sop_instance_uid);
        }
        other => {
            error!("❌ C-STORE {} rejected: {}", sop_instance_uid, other);
        }
    }

    Ok(ExchangeOutcome::from_status(status, bytes_sent))
}

fn trim(uid: &str) -> &str {
    uid.trim_end_matches(|c: char| c.is_whitespace() || c == '\0')
}
