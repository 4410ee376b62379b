/// SOP classes used by the emulator
///
/// The modality to storage class mapping lives here and only here:
/// the object generator and capability negotiation both read it from
/// [`SopClassTable`].

use std::fmt;
use std::str::FromStr;

use dicom_dictionary_std::uids;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone)]
pub struct SopClassInfo {
    pub uid: &'static str,
    pub name: &'static str,
    pub category: SopClassCategory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SopClassCategory {
    ComputedTomography,
    MagneticResonance,
    PositronEmission,
    SecondaryCapture,
    Worklist,
    Verification,
}

impl SopClassInfo {
    pub const fn new(uid: &'static str, name: &'static str, category: SopClassCategory) -> Self {
        Self { uid, name, category }
    }
}

pub const CT_IMAGE_STORAGE: SopClassInfo = SopClassInfo::new(
    uids::CT_IMAGE_STORAGE,
    "CT Image Storage",
    SopClassCategory::ComputedTomography,
);

pub const MR_IMAGE_STORAGE: SopClassInfo = SopClassInfo::new(
    uids::MR_IMAGE_STORAGE,
    "MR Image Storage",
    SopClassCategory::MagneticResonance,
);

pub const PET_IMAGE_STORAGE: SopClassInfo = SopClassInfo::new(
    uids::POSITRON_EMISSION_TOMOGRAPHY_IMAGE_STORAGE,
    "Positron Emission Tomography Image Storage",
    SopClassCategory::PositronEmission,
);

pub const SECONDARY_CAPTURE_IMAGE_STORAGE: SopClassInfo = SopClassInfo::new(
    uids::SECONDARY_CAPTURE_IMAGE_STORAGE,
    "Secondary Capture Image Storage",
    SopClassCategory::SecondaryCapture,
);

pub const MODALITY_WORKLIST_FIND: SopClassInfo = SopClassInfo::new(
    uids::MODALITY_WORKLIST_INFORMATION_MODEL_FIND,
    "Modality Worklist Information Model - FIND",
    SopClassCategory::Worklist,
);

pub const VERIFICATION: SopClassInfo = SopClassInfo::new(
    uids::VERIFICATION,
    "Verification SOP Class",
    SopClassCategory::Verification,
);

const ALL_SOP_CLASSES: &[SopClassInfo] = &[
    CT_IMAGE_STORAGE,
    MR_IMAGE_STORAGE,
    PET_IMAGE_STORAGE,
    SECONDARY_CAPTURE_IMAGE_STORAGE,
    MODALITY_WORKLIST_FIND,
    VERIFICATION,
];

/// Look up a known SOP class by UID, ignoring trailing padding.
pub fn lookup(uid: &str) -> Option<&'static SopClassInfo> {
    let uid = uid.trim_end_matches(|c: char| c.is_whitespace() || c == '\0');
    ALL_SOP_CLASSES.iter().find(|sc| sc.uid == uid)
}

/// UIDs of every storage class the emulator may produce.
pub fn storage_uids() -> Vec<&'static str> {
    ALL_SOP_CLASSES
        .iter()
        .filter(|sc| {
            !matches!(
                sc.category,
                SopClassCategory::Worklist | SopClassCategory::Verification
            )
        })
        .map(|sc| sc.uid)
        .collect()
}

/// The modality classes the emulator can synthesize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Modality {
    #[serde(rename = "CT")]
    Ct,
    #[serde(rename = "MR")]
    Mr,
    #[serde(rename = "PT")]
    Pt,
    #[serde(rename = "SC")]
    Sc,
}

impl Modality {
    pub const ALL: [Modality; 4] = [Modality::Ct, Modality::Mr, Modality::Pt, Modality::Sc];

    /// The DICOM modality code (0008,0060).
    pub fn code(self) -> &'static str {
        match self {
            Modality::Ct => "CT",
            Modality::Mr => "MR",
            Modality::Pt => "PT",
            Modality::Sc => "SC",
        }
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown modality `{0}` (expected one of CT, MR, PT, SC)")]
pub struct UnknownModality(String);

impl FromStr for Modality {
    type Err = UnknownModality;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CT" => Ok(Modality::Ct),
            "MR" => Ok(Modality::Mr),
            "PT" => Ok(Modality::Pt),
            "SC" => Ok(Modality::Sc),
            _ => Err(UnknownModality(s.to_string())),
        }
    }
}

/// Modality to storage class lookup.
///
/// PT objects are stored as Secondary Capture unless the table is built
/// with [`SopClassTable::with_pet_storage`], since many storage providers
/// in test labs do not register the PET storage class.
#[derive(Debug, Clone, Copy, Default)]
pub struct SopClassTable {
    pet_storage: bool,
}

impl SopClassTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pet_storage() -> Self {
        Self { pet_storage: true }
    }

    pub fn storage_class(&self, modality: Modality) -> &'static SopClassInfo {
        match modality {
            Modality::Ct => &CT_IMAGE_STORAGE,
            Modality::Mr => &MR_IMAGE_STORAGE,
            Modality::Pt if self.pet_storage => &PET_IMAGE_STORAGE,
            Modality::Pt | Modality::Sc => &SECONDARY_CAPTURE_IMAGE_STORAGE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_mapping() {
        let table = SopClassTable::new();

        assert_eq!(table.storage_class(Modality::Ct).uid, "1.2.840.10008.5.1.4.1.1.2");
        assert_eq!(table.storage_class(Modality::Mr).uid, "1.2.840.10008.5.1.4.1.1.4");
        assert_eq!(table.storage_class(Modality::Pt).uid, "1.2.840.10008.5.1.4.1.1.7");
        assert_eq!(table.storage_class(Modality::Sc).uid, "1.2.840.10008.5.1.4.1.1.7");
    }

    #[test]
    fn test_pet_storage_mapping() {
        let table = SopClassTable::with_pet_storage();
        assert_eq!(
            table.storage_class(Modality::Pt).uid,
            "1.2.840.10008.5.1.4.1.1.128"
        );
        assert_eq!(table.storage_class(Modality::Sc).uid, "1.2.840.10008.5.1.4.1.1.7");
    }

    #[test]
    fn test_lookup_ignores_padding() {
        let info = lookup("1.2.840.10008.5.1.4.1.1.2\0").unwrap();
        assert_eq!(info.name, "CT Image Storage");
        assert!(lookup("invalid.uid").is_none());
    }

    #[test]
    fn test_storage_uids_exclude_non_storage() {
        let uids = storage_uids();
        assert_eq!(uids.len(), 4);
        assert!(!uids.contains(&MODALITY_WORKLIST_FIND.uid));
        assert!(!uids.contains(&VERIFICATION.uid));
    }

    #[test]
    fn test_modality_parse() {
        assert_eq!("ct".parse::<Modality>().unwrap(), Modality::Ct);
        assert_eq!(" PT ".parse::<Modality>().unwrap(), Modality::Pt);
        assert!("US".parse::<Modality>().is_err());
        assert_eq!(Modality::Sc.to_string(), "SC");
    }
}
