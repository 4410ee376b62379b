//! Association establishment, release and DIMSE message transport.
//!
//! [`AssociationClient`] opens one association per call to [`Connector::open`].
//! The returned [`AssociationHandle`] is the only way to talk to the peer;
//! it is released on [`Connector::close`], and the underlying association
//! releases itself when dropped, so no exit path leaves it open.

use std::collections::HashSet;
use std::io::Write;
use std::net::TcpStream;

use dicom_object::InMemDicomObject;
use dicom_ul::association::client::ClientAssociationOptions;
use dicom_ul::pdu::{PDataValue, PDataValueType, Pdu, PresentationContextResultReason};
use tracing::{debug, error, info, warn};

use crate::common::sop_classes::{self, Modality, SopClassInfo, SopClassTable};
use crate::common::transfer_syntaxes;
use crate::common::types::RemoteNode;
use crate::dimse;
use crate::error::{EmulatorError, Result};

/// Maximum length of an AE title.
pub const AE_TITLE_MAX_LEN: usize = 16;

pub const DEFAULT_MAX_PDU_LENGTH: u32 = 65536;

/// Truncate an AE title to 16 characters. Never rejects.
pub fn clamp_ae_title(title: &str) -> String {
    title.chars().take(AE_TITLE_MAX_LEN).collect()
}

/// An operation/object class pair the local AE intends to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Capability {
    pub abstract_syntax: &'static str,
}

impl Capability {
    pub fn new(sop_class: &SopClassInfo) -> Self {
        Self {
            abstract_syntax: sop_class.uid,
        }
    }

    pub fn storage(modality: Modality, table: &SopClassTable) -> Self {
        Self::new(table.storage_class(modality))
    }

    pub fn worklist_find() -> Self {
        Self::new(&sop_classes::MODALITY_WORKLIST_FIND)
    }

    pub fn verification() -> Self {
        Self::new(&sop_classes::VERIFICATION)
    }
}

/// An accepted presentation context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiatedContext {
    pub id: u8,
    pub abstract_syntax: String,
    pub transfer_syntax: String,
}

/// One DIMSE response: command set plus the data set, if one followed.
#[derive(Debug, Clone)]
pub struct DimseResponse {
    pub command: InMemDicomObject,
    pub dataset: Option<InMemDicomObject>,
}

impl DimseResponse {
    pub fn status(&self) -> crate::common::status::DimseStatus {
        dimse::status(&self.command)
    }
}

/// Message-level access to an established association.
///
/// A request is followed by one or more responses; `receive_response`
/// yields `None` once the peer has sent the final (non-pending) response
/// for the outstanding request.
pub trait DimseChannel {
    fn context_for(&self, abstract_syntax: &str) -> Option<NegotiatedContext>;

    fn next_message_id(&mut self) -> u16;

    /// Send a command and optional data set, returning the bytes written.
    fn send_request(
        &mut self,
        context: &NegotiatedContext,
        command: &InMemDicomObject,
        dataset: Option<&InMemDicomObject>,
    ) -> Result<u64>;

    fn receive_response(&mut self, context: &NegotiatedContext) -> Result<Option<DimseResponse>>;
}

/// Outcome of an association attempt. Never an error: a failed
/// handshake is reported through `established() == false`.
#[derive(Debug)]
pub struct AssociationResult<C> {
    pub peer: RemoteNode,
    pub handle: Option<C>,
    pub error: Option<String>,
}

impl<C> AssociationResult<C> {
    pub fn established(&self) -> bool {
        self.handle.is_some()
    }
}

/// Something that can open associations to a fixed destination.
pub trait Connector {
    type Channel: DimseChannel;

    fn open(&self, capabilities: &[Capability]) -> AssociationResult<Self::Channel>;

    fn close(&self, channel: Self::Channel);

    fn peer(&self) -> &RemoteNode;
}

#[derive(Debug, Clone)]
pub struct AssociationClient {
    local_ae: String,
    node: RemoteNode,
    max_pdu_length: u32,
}

impl AssociationClient {
    pub fn new(local_ae: impl Into<String>, node: RemoteNode) -> Self {
        Self {
            local_ae: local_ae.into(),
            node,
            max_pdu_length: DEFAULT_MAX_PDU_LENGTH,
        }
    }

    pub fn max_pdu_length(mut self, value: u32) -> Self {
        self.max_pdu_length = value;
        self
    }

    /// The calling AE title as it goes on the wire.
    pub fn calling_ae_title(&self) -> String {
        clamp_ae_title(&self.local_ae)
    }

    fn establish(&self, capabilities: &[Capability]) -> Result<AssociationHandle> {
        let calling_ae = self.calling_ae_title();
        let transfer_syntaxes = transfer_syntaxes::proposed_transfer_syntaxes();

        let mut options = ClientAssociationOptions::new()
            .calling_ae_title(calling_ae.as_str())
            .called_ae_title(self.node.ae_title.as_str())
            .max_pdu_length(self.max_pdu_length);

        // presentation context IDs are assigned as odd numbers in request order
        let mut requested = Vec::new();
        let mut seen = HashSet::new();
        for capability in capabilities {
            if !seen.insert(capability.abstract_syntax) {
                continue;
            }
            let id = (requested.len() * 2 + 1) as u8;
            match sop_classes::lookup(capability.abstract_syntax) {
                Some(info) => debug!("Requesting {} (ID={})", info.name, id),
                None => debug!("Requesting {} (ID={})", capability.abstract_syntax, id),
            }
            options = options
                .with_presentation_context(capability.abstract_syntax, transfer_syntaxes.clone());
            requested.push((id, capability.abstract_syntax));
        }

        debug!(
            "Attempting to establish association with {}",
            self.node.socket_address()
        );
        let association = options
            .establish_with(&self.node.socket_address())
            .map_err(|e| EmulatorError::Association(e.to_string()))?;

        let mut contexts = Vec::new();
        for pc in association.presentation_contexts() {
            let abstract_syntax = requested
                .iter()
                .find(|(id, _)| *id == pc.id)
                .map(|(_, uid)| uid.to_string());
            match (&pc.reason, abstract_syntax) {
                (PresentationContextResultReason::Acceptance, Some(abstract_syntax)) => {
                    debug!(
                        "✓ Accepted: {} (ID={}, transfer syntax {})",
                        abstract_syntax, pc.id, pc.transfer_syntax
                    );
                    contexts.push(NegotiatedContext {
                        id: pc.id,
                        abstract_syntax,
                        transfer_syntax: pc.transfer_syntax.clone(),
                    });
                }
                (reason, _) => {
                    debug!("✗ Rejected: presentation context ID={} ({:?})", pc.id, reason);
                }
            }
        }

        info!(
            "Presentation contexts: {} accepted out of {} requested",
            contexts.len(),
            requested.len()
        );

        Ok(AssociationHandle {
            association,
            contexts,
            message_id: 0,
            awaiting_response: false,
        })
    }
}

impl Connector for AssociationClient {
    type Channel = AssociationHandle;

    fn open(&self, capabilities: &[Capability]) -> AssociationResult<AssociationHandle> {
        info!(
            "Opening association {} -> {}",
            self.calling_ae_title(),
            self.node
        );
        match self.establish(capabilities) {
            Ok(handle) => {
                info!("DICOM association established with {}", self.node);
                AssociationResult {
                    peer: self.node.clone(),
                    handle: Some(handle),
                    error: None,
                }
            }
            Err(e) => {
                error!("Failed to establish DICOM association with {}: {}", self.node, e);
                AssociationResult {
                    peer: self.node.clone(),
                    handle: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    fn close(&self, channel: AssociationHandle) {
        if let Err(e) = channel.association.release() {
            warn!("Failed to properly release association with {}: {}", self.node, e);
        } else {
            info!("DICOM association with {} released", self.node);
        }
    }

    fn peer(&self) -> &RemoteNode {
        &self.node
    }
}

/// Open an association and release it straight away.
pub fn check_connection(local_ae: &str, node: &RemoteNode, capabilities: &[Capability]) -> bool {
    let client = AssociationClient::new(local_ae, node.clone());
    let result = client.open(capabilities);
    match result.handle {
        Some(handle) => {
            client.close(handle);
            true
        }
        None => false,
    }
}

/// An established association, exclusively owned by whoever opened it.
pub struct AssociationHandle {
    association: dicom_ul::ClientAssociation<TcpStream>,
    contexts: Vec<NegotiatedContext>,
    message_id: u16,
    awaiting_response: bool,
}

impl std::fmt::Debug for AssociationHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssociationHandle")
            .field("contexts", &self.contexts)
            .field("message_id", &self.message_id)
            .field("awaiting_response", &self.awaiting_response)
            .finish()
    }
}

impl AssociationHandle {
    pub fn presentation_contexts(&self) -> &[NegotiatedContext] {
        &self.contexts
    }

    /// Send an abort instead of a graceful release.
    pub fn abort(self) {
        if let Err(e) = self.association.abort() {
            warn!("Failed to abort association: {}", e);
        }
    }

    fn write_message(
        &mut self,
        context_id: u8,
        command_data: Vec<u8>,
        dataset_data: Option<Vec<u8>>,
    ) -> Result<u64> {
        let nbytes = (command_data.len() + dataset_data.as_ref().map_or(0, Vec::len)) as u64;
        let max_pdu = self.association.acceptor_max_pdu_length().saturating_sub(100) as usize;

        let command_pdv = PDataValue {
            presentation_context_id: context_id,
            value_type: PDataValueType::Command,
            is_last: true,
            data: command_data,
        };

        match dataset_data {
            Some(data) if nbytes as usize >= max_pdu => {
                self.association
                    .send(&Pdu::PData {
                        data: vec![command_pdv],
                    })
                    .map_err(EmulatorError::transfer)?;
                let mut pdata = self.association.send_pdata(context_id);
                pdata.write_all(&data)?;
                pdata.finish()?;
            }
            Some(data) => {
                let data_pdv = PDataValue {
                    presentation_context_id: context_id,
                    value_type: PDataValueType::Data,
                    is_last: true,
                    data,
                };
                self.association
                    .send(&Pdu::PData {
                        data: vec![command_pdv, data_pdv],
                    })
                    .map_err(EmulatorError::transfer)?;
            }
            None => {
                self.association
                    .send(&Pdu::PData {
                        data: vec![command_pdv],
                    })
                    .map_err(EmulatorError::transfer)?;
            }
        }
        Ok(nbytes)
    }

    /// Collect PDUs until one full command (and its data set, if announced)
    /// has arrived.
    fn read_message(&mut self, context: &NegotiatedContext) -> Result<DimseResponse> {
        let mut command_bytes = Vec::new();
        let mut dataset_bytes = Vec::new();
        let mut command: Option<InMemDicomObject> = None;
        let mut dataset_complete = false;

        loop {
            match self.association.receive().map_err(EmulatorError::transfer)? {
                Pdu::PData { data } => {
                    for pdv in data {
                        match pdv.value_type {
                            PDataValueType::Command => {
                                command_bytes.extend_from_slice(&pdv.data);
                                if pdv.is_last {
                                    command = Some(InMemDicomObject::read_dataset_with_ts(
                                        &command_bytes[..],
                                        &transfer_syntaxes::command_transfer_syntax(),
                                    )?);
                                }
                            }
                            PDataValueType::Data => {
                                dataset_bytes.extend_from_slice(&pdv.data);
                                dataset_complete = pdv.is_last;
                            }
                        }
                    }
                }
                Pdu::AbortRQ { source } => {
                    return Err(EmulatorError::Association(format!(
                        "association aborted by peer ({:?})",
                        source
                    )));
                }
                other => {
                    return Err(EmulatorError::UnexpectedPdu(format!("{:?}", other)));
                }
            }

            if let Some(cmd) = &command {
                if !dimse::has_data_set(cmd) {
                    break;
                }
                if dataset_complete {
                    break;
                }
            }
        }

        let command = command.ok_or_else(|| EmulatorError::Transfer("empty response".into()))?;
        let dataset = if dimse::has_data_set(&command) {
            let ts = transfer_syntaxes::resolve(&context.transfer_syntax).ok_or_else(|| {
                EmulatorError::UnsupportedTransferSyntax(context.transfer_syntax.clone())
            })?;
            Some(InMemDicomObject::read_dataset_with_ts(&dataset_bytes[..], ts)?)
        } else {
            None
        };

        Ok(DimseResponse { command, dataset })
    }
}

impl DimseChannel for AssociationHandle {
    fn context_for(&self, abstract_syntax: &str) -> Option<NegotiatedContext> {
        self.contexts
            .iter()
            .find(|pc| pc.abstract_syntax == abstract_syntax)
            .cloned()
    }

    fn next_message_id(&mut self) -> u16 {
        self.message_id = self.message_id.wrapping_add(1).max(1);
        self.message_id
    }

    fn send_request(
        &mut self,
        context: &NegotiatedContext,
        command: &InMemDicomObject,
        dataset: Option<&InMemDicomObject>,
    ) -> Result<u64> {
        let mut command_data = Vec::with_capacity(128);
        command
            .write_dataset_with_ts(&mut command_data, &transfer_syntaxes::command_transfer_syntax())
            .map_err(EmulatorError::encoding)?;

        let dataset_data = match dataset {
            Some(obj) => {
                let ts = transfer_syntaxes::resolve(&context.transfer_syntax).ok_or_else(|| {
                    EmulatorError::UnsupportedTransferSyntax(context.transfer_syntax.clone())
                })?;
                let mut data = Vec::with_capacity(2048);
                obj.write_dataset_with_ts(&mut data, ts)
                    .map_err(EmulatorError::encoding)?;
                Some(data)
            }
            None => None,
        };

        debug!(
            "Sending request on presentation context {} ({})",
            context.id,
            transfer_syntaxes::get_name(&context.transfer_syntax).unwrap_or("other")
        );
        let nbytes = self.write_message(context.id, command_data, dataset_data)?;
        self.awaiting_response = true;
        Ok(nbytes)
    }

    fn receive_response(&mut self, context: &NegotiatedContext) -> Result<Option<DimseResponse>> {
        if !self.awaiting_response {
            return Ok(None);
        }
        match self.read_message(context) {
            Ok(response) => {
                if !response.status().is_pending() {
                    self.awaiting_response = false;
                }
                Ok(Some(response))
            }
            Err(e) => {
                self.awaiting_response = false;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn test_clamp_ae_title() {
        assert_eq!(clamp_ae_title("RANDOM_MODALITY_EXTRA"), "RANDOM_MODALITY_");
        assert_eq!(clamp_ae_title("RANDOM_MODALITY_EXTRA").len(), 16);
        assert_eq!(clamp_ae_title("DVTK_MW_SCU"), "DVTK_MW_SCU");
        assert_eq!(clamp_ae_title("EXACTLY_16_CHARS"), "EXACTLY_16_CHARS");
    }

    #[test]
    fn test_calling_ae_title_clamped_at_open_time() {
        let client = AssociationClient::new(
            "A_VERY_LONG_LOCAL_AE_TITLE",
            RemoteNode::new("127.0.0.1", 104, "PACS"),
        );
        assert_eq!(client.calling_ae_title(), "A_VERY_LONG_LOCA");
    }

    #[test]
    fn test_open_unreachable_is_not_established() {
        // grab a free port, then close it again
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let client = AssociationClient::new("EMULATOR", RemoteNode::new("127.0.0.1", port, "NOBODY"));
        let result = client.open(&[Capability::worklist_find()]);

        assert!(!result.established());
        assert!(result.error.is_some());
        assert_eq!(result.peer.port, port);
    }

    #[test]
    fn test_capabilities() {
        let table = SopClassTable::default();
        assert_eq!(
            Capability::storage(Modality::Pt, &table),
            Capability::storage(Modality::Sc, &table)
        );
        assert_eq!(
            Capability::worklist_find().abstract_syntax,
            "1.2.840.10008.5.1.4.31"
        );
    }
}
