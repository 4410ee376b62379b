use std::net::{SocketAddr, TcpStream};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::Local;
use dicom_dictionary_std::tags;
use dicom_object::{FileMetaTableBuilder, InMemDicomObject};
use dicom_ul::association::server::ServerAssociationOptions;
use dicom_ul::association::ServerAssociation;
use dicom_ul::pdu::{PDataValue, PDataValueType, Pdu};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::common::sop_classes;
use crate::common::transfer_syntaxes;
use crate::dimse;
use crate::error::{EmulatorError, Result};

const UNRECOGNIZED_OPERATION: u16 = 0x0211;

/// One DIMSE message being reassembled on a presentation context.
#[derive(Debug, Default)]
struct PendingMessage {
    command_bytes: Vec<u8>,
    command: Option<InMemDicomObject>,
    dataset_bytes: Vec<u8>,
    dataset_complete: bool,
}

impl PendingMessage {
    fn is_complete(&self) -> bool {
        match &self.command {
            Some(cmd) => !dimse::has_data_set(cmd) || self.dataset_complete,
            None => false,
        }
    }
}

/// Storage acceptor that acknowledges every C-STORE with success and
/// answers C-ECHO. Received objects are optionally written to disk.
#[derive(Debug)]
pub struct StoreReceiver {
    ae_title: String,
    output_dir: Option<PathBuf>,
    connection_semaphore: Arc<Semaphore>,
    received: AtomicUsize,
}

impl StoreReceiver {
    pub fn new(ae_title: impl Into<String>, max_connections: usize) -> Self {
        Self {
            ae_title: ae_title.into(),
            output_dir: None,
            connection_semaphore: Arc::new(Semaphore::new(max_connections.max(1))),
            received: AtomicUsize::new(0),
        }
    }

    /// Keep received objects as Part 10 files in `dir`.
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    pub fn received_count(&self) -> usize {
        self.received.load(Ordering::SeqCst)
    }

    pub async fn start(self: Arc<Self>, port: u16) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
        info!("📥  Store receiver listening on port {}", port);
        self.serve(listener).await
    }

    /// Accept connections forever, one blocking task per association.
    pub async fn serve(self: Arc<Self>, listener: tokio::net::TcpListener) -> Result<()> {
        info!("✅  Store receiver ready to accept connections");
        loop {
            let (stream, addr) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!("❌  Failed to accept connection: {}", e);
                    continue;
                }
            };
            info!("🔗  New connection from {}", addr);

            let permit = match Arc::clone(&self.connection_semaphore).acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    error!("Connection limiter closed: {}", e);
                    return Ok(());
                }
            };
            let std_stream = match stream.into_std().and_then(|s| {
                s.set_nonblocking(false)?;
                Ok(s)
            }) {
                Ok(s) => s,
                Err(e) => {
                    error!("❌  Failed to prepare socket for {}: {}", addr, e);
                    continue;
                }
            };

            let receiver = Arc::clone(&self);
            tokio::task::spawn_blocking(move || {
                let _permit = permit;
                if let Err(e) = receiver.handle_connection(std_stream, addr) {
                    error!("❌  Error handling connection from {}: {}", addr, e);
                }
            });
        }
    }

    /// Run one association to completion on a blocking socket.
    pub fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) -> Result<()> {
        let mut options = ServerAssociationOptions::new()
            .accept_called_ae_title()
            .ae_title(self.ae_title.as_str());
        for uid in sop_classes::storage_uids() {
            options = options.with_abstract_syntax(uid);
        }
        options = options.with_abstract_syntax(sop_classes::VERIFICATION.uid);

        let mut association = options
            .establish(stream)
            .map_err(|e| EmulatorError::Association(e.to_string()))?;
        info!("✅  Association established with {}", addr);
        for pc in association.presentation_contexts() {
            debug!(
                "📋  Accepted presentation context {} with transfer syntax {}",
                pc.id, pc.transfer_syntax
            );
        }

        let mut pending: std::collections::HashMap<u8, PendingMessage> = Default::default();
        loop {
            let pdu = match association.receive() {
                Ok(pdu) => pdu,
                Err(e) => {
                    warn!("🔌  Connection with {} ended: {}", addr, e);
                    break;
                }
            };

            match pdu {
                Pdu::PData { data } => {
                    for pdv in data {
                        let pc_id = pdv.presentation_context_id;
                        let message = pending.entry(pc_id).or_default();
                        match pdv.value_type {
                            PDataValueType::Command => {
                                message.command_bytes.extend_from_slice(&pdv.data);
                                if pdv.is_last {
                                    message.command = Some(InMemDicomObject::read_dataset_with_ts(
                                        &message.command_bytes[..],
                                        &transfer_syntaxes::command_transfer_syntax(),
                                    )?);
                                }
                            }
                            PDataValueType::Data => {
                                message.dataset_bytes.extend_from_slice(&pdv.data);
                                message.dataset_complete = pdv.is_last;
                            }
                        }

                        if message.is_complete() {
                            if let Some(message) = pending.remove(&pc_id) {
                                self.respond(&mut association, pc_id, message)?;
                            }
                        }
                    }
                }
                Pdu::ReleaseRQ => {
                    info!("📤  Received release request from {}", addr);
                    association
                        .send(&Pdu::ReleaseRP)
                        .map_err(EmulatorError::transfer)?;
                    break;
                }
                Pdu::AbortRQ { source } => {
                    warn!("Association aborted by {} ({:?})", addr, source);
                    break;
                }
                other => {
                    debug!("Ignoring PDU from {}: {:?}", addr, other);
                }
            }
        }

        info!("📡  Association closed with {}", addr);
        Ok(())
    }

    fn respond(
        &self,
        association: &mut ServerAssociation<TcpStream>,
        pc_id: u8,
        message: PendingMessage,
    ) -> Result<()> {
        let command = message
            .command
            .ok_or_else(|| EmulatorError::Transfer("message without command".into()))?;
        let message_id = dimse::message_id(&command).unwrap_or(0);
        let sop_class_uid =
            dimse::read_string(&command, tags::AFFECTED_SOP_CLASS_UID).unwrap_or_default();
        let sop_instance_uid = dimse::read_string(&command, tags::AFFECTED_SOP_INSTANCE_UID);

        let response = match dimse::command_field(&command) {
            Some(dimse::C_STORE_RQ) => {
                let count = self.received.fetch_add(1, Ordering::SeqCst) + 1;
                info!(
                    "📦  C-STORE #{} {} ({} bytes)",
                    count,
                    sop_instance_uid.as_deref().unwrap_or("?"),
                    message.dataset_bytes.len()
                );
                if let Some(dir) = &self.output_dir {
                    let transfer_syntax = association
                        .presentation_contexts()
                        .iter()
                        .find(|pc| pc.id == pc_id)
                        .map(|pc| pc.transfer_syntax.clone())
                        .unwrap_or_default();
                    if let Err(e) = self.keep(
                        dir,
                        &transfer_syntax,
                        &sop_class_uid,
                        sop_instance_uid.as_deref().unwrap_or("unknown"),
                        &message.dataset_bytes,
                    ) {
                        error!("❌  Failed to save received object: {}", e);
                    }
                }
                dimse::response(
                    dimse::C_STORE_RSP,
                    &sop_class_uid,
                    sop_instance_uid.as_deref(),
                    message_id,
                    0x0000,
                )
            }
            Some(dimse::C_ECHO_RQ) => {
                info!("🔔  C-ECHO");
                dimse::response(dimse::C_ECHO_RSP, &sop_class_uid, None, message_id, 0x0000)
            }
            other => {
                warn!("Unsupported command field {:?}", other);
                dimse::response(
                    other.unwrap_or(0) | 0x8000,
                    &sop_class_uid,
                    None,
                    message_id,
                    UNRECOGNIZED_OPERATION,
                )
            }
        };

        let mut data = Vec::with_capacity(128);
        response
            .write_dataset_with_ts(&mut data, &transfer_syntaxes::command_transfer_syntax())
            .map_err(EmulatorError::encoding)?;
        association
            .send(&Pdu::PData {
                data: vec![PDataValue {
                    presentation_context_id: pc_id,
                    value_type: PDataValueType::Command,
                    is_last: true,
                    data,
                }],
            })
            .map_err(EmulatorError::transfer)?;
        debug!("📤  Sent response for message {} on context {}", message_id, pc_id);
        Ok(())
    }

    fn keep(
        &self,
        dir: &std::path::Path,
        transfer_syntax: &str,
        sop_class_uid: &str,
        sop_instance_uid: &str,
        dataset_bytes: &[u8],
    ) -> Result<PathBuf> {
        let ts = transfer_syntaxes::resolve(transfer_syntax)
            .ok_or_else(|| EmulatorError::UnsupportedTransferSyntax(transfer_syntax.to_string()))?;
        let dataset = InMemDicomObject::read_dataset_with_ts(dataset_bytes, ts)?;
        let file_obj = dataset
            .with_meta(
                FileMetaTableBuilder::new()
                    .transfer_syntax(ts.uid())
                    .media_storage_sop_class_uid(sop_class_uid)
                    .media_storage_sop_instance_uid(sop_instance_uid),
            )
            .map_err(EmulatorError::encoding)?;

        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!(
            "received_{}_{}.dcm",
            Local::now().format("%Y%m%d_%H%M%S_%6f"),
            sop_instance_uid
        ));
        file_obj.write_to_file(&path).map_err(EmulatorError::encoding)?;
        info!("✅  Saved received object to {}", path.display());
        Ok(path)
    }
}
