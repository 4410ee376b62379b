/// Transfer syntaxes offered during association negotiation
///
/// Synthetic objects are always native (uncompressed) pixel data,
/// so only the uncompressed little endian syntaxes are proposed.

use dicom_dictionary_std::uids;
use dicom_encoding::transfer_syntax::{TransferSyntax, TransferSyntaxIndex};
use dicom_transfer_syntax_registry::TransferSyntaxRegistry;

#[derive(Debug, Clone)]
pub struct TransferSyntaxInfo {
    pub uid: &'static str,
    pub name: &'static str,
    pub is_explicit_vr: bool,
}

impl TransferSyntaxInfo {
    pub const fn new(uid: &'static str, name: &'static str, is_explicit_vr: bool) -> Self {
        Self {
            uid,
            name,
            is_explicit_vr,
        }
    }
}

/// In order of preference.
const PROPOSED_TRANSFER_SYNTAXES: &[TransferSyntaxInfo] = &[
    TransferSyntaxInfo::new(uids::EXPLICIT_VR_LITTLE_ENDIAN, "Explicit VR Little Endian", true),
    TransferSyntaxInfo::new(uids::IMPLICIT_VR_LITTLE_ENDIAN, "Implicit VR Little Endian", false),
];

pub fn proposed_transfer_syntaxes() -> Vec<&'static str> {
    PROPOSED_TRANSFER_SYNTAXES.iter().map(|ts| ts.uid).collect()
}

pub fn get_name(uid: &str) -> Option<&'static str> {
    let uid = trim_uid(uid);
    PROPOSED_TRANSFER_SYNTAXES
        .iter()
        .find(|ts| ts.uid == uid)
        .map(|ts| ts.name)
}

/// Resolve a negotiated transfer syntax UID into a codec that can
/// write native data sets. Encapsulated syntaxes are refused.
pub fn resolve(uid: &str) -> Option<&'static TransferSyntax> {
    TransferSyntaxRegistry
        .get(trim_uid(uid))
        .filter(|ts| ts.is_codec_free())
}

/// The transfer syntax used for all DIMSE command sets.
pub fn command_transfer_syntax() -> TransferSyntax {
    dicom_transfer_syntax_registry::entries::IMPLICIT_VR_LITTLE_ENDIAN.erased()
}

fn trim_uid(uid: &str) -> &str {
    uid.trim_end_matches(|c: char| c.is_whitespace() || c == '\0')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proposed_order() {
        let proposed = proposed_transfer_syntaxes();
        assert_eq!(proposed, vec!["1.2.840.10008.1.2.1", "1.2.840.10008.1.2"]);
    }

    #[test]
    fn test_name_lookup() {
        assert_eq!(get_name("1.2.840.10008.1.2\0"), Some("Implicit VR Little Endian"));
        assert_eq!(get_name("1.2.840.10008.1.2.4.50"), None);
    }

    #[test]
    fn test_resolve_native_only() {
        let ts = resolve("1.2.840.10008.1.2.1\0").unwrap();
        assert_eq!(ts.uid(), "1.2.840.10008.1.2.1");
        assert!(resolve("1.2.840.10008.1.2").is_some_and(|ts| ts.is_codec_free()));
        assert!(resolve("1.2.840.10008.1.2.4.50").is_none());
        assert!(resolve("invalid.uid").is_none());
    }
}
