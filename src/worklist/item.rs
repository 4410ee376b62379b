use dicom_core::dictionary::{DataDictionary, TagRange};
use dicom_core::value::Value;
use dicom_core::Tag;
use dicom_dictionary_std::{tags, StandardDataDictionary};
use dicom_object::InMemDicomObject;
use serde_json::{Map, Value as JsonValue};

use crate::dimse::read_string;
use crate::error::{EmulatorError, Result};

/// One scheduled procedure returned by the worklist provider.
///
/// The provider decides which attributes come back, so the item keeps the
/// whole identifier data set and reads fields on demand.
#[derive(Debug, Clone, PartialEq)]
pub struct WorklistItem {
    dataset: InMemDicomObject,
}

impl WorklistItem {
    pub fn new(dataset: InMemDicomObject) -> Self {
        Self { dataset }
    }

    pub fn dataset(&self) -> &InMemDicomObject {
        &self.dataset
    }

    pub fn patient_id(&self) -> Option<String> {
        read_string(&self.dataset, tags::PATIENT_ID)
    }

    pub fn patient_name(&self) -> Option<String> {
        read_string(&self.dataset, tags::PATIENT_NAME)
    }

    pub fn accession_number(&self) -> Option<String> {
        read_string(&self.dataset, tags::ACCESSION_NUMBER)
    }

    pub fn study_instance_uid(&self) -> Option<String> {
        read_string(&self.dataset, tags::STUDY_INSTANCE_UID)
    }

    pub fn study_description(&self) -> Option<String> {
        read_string(&self.dataset, tags::REQUESTED_PROCEDURE_DESCRIPTION)
            .or_else(|| read_string(&self.dataset, tags::STUDY_DESCRIPTION))
    }

    pub fn modality(&self) -> Option<String> {
        self.scheduled_step_value(tags::MODALITY)
    }

    pub fn scheduled_date(&self) -> Option<String> {
        self.scheduled_step_value(tags::SCHEDULED_PROCEDURE_STEP_START_DATE)
    }

    /// Top level first, then the first Scheduled Procedure Step item.
    fn scheduled_step_value(&self, tag: Tag) -> Option<String> {
        read_string(&self.dataset, tag).or_else(|| {
            self.dataset
                .get(tags::SCHEDULED_PROCEDURE_STEP_SEQUENCE)
                .and_then(|e| e.items())
                .and_then(|items| items.first())
                .and_then(|step| read_string(step, tag))
        })
    }

    /// Flatten to printable `keyword: value` pairs. Sequences become
    /// arrays of nested objects. Fails on values that have no text form.
    pub fn flatten(&self) -> Result<Map<String, JsonValue>> {
        flatten_dataset(&self.dataset)
    }
}

impl From<InMemDicomObject> for WorklistItem {
    fn from(dataset: InMemDicomObject) -> Self {
        Self::new(dataset)
    }
}

fn flatten_dataset(obj: &InMemDicomObject) -> Result<Map<String, JsonValue>> {
    let mut map = Map::new();
    for element in obj.iter() {
        let tag = element.header().tag;
        let key = element_key(tag);

        let value = match element.value() {
            Value::Sequence(seq) => JsonValue::Array(
                seq.items()
                    .iter()
                    .map(|item| flatten_dataset(item).map(JsonValue::Object))
                    .collect::<Result<Vec<_>>>()?,
            ),
            _ => {
                let text = element.to_str().map_err(|e| {
                    EmulatorError::DicomEncoding(format!("{} ({}): {}", key, tag, e))
                })?;
                JsonValue::String(text.trim_end_matches(['\0', ' ']).to_string())
            }
        };
        let key = if map.contains_key(&key) {
            format!("{}{}", key, tag)
        } else {
            key
        };
        map.insert(key, value);
    }
    Ok(map)
}

/// Keyword for standard single-tag attributes, the tag itself for private
/// and repeating-group elements, which share one dictionary alias.
fn element_key(tag: Tag) -> String {
    if tag.group() % 2 == 1 {
        return tag.to_string();
    }
    match StandardDataDictionary.by_tag(tag) {
        Some(entry) if matches!(entry.tag, TagRange::Single(_)) => entry.alias.to_string(),
        _ => tag.to_string(),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use dicom_core::value::{DataSetSequence, PixelFragmentSequence, PrimitiveValue};
    use dicom_core::{DataElement, Length, VR};

    pub(crate) fn sample_item(patient_id: &str) -> WorklistItem {
        let step = InMemDicomObject::from_element_iter([
            DataElement::new(tags::MODALITY, VR::CS, PrimitiveValue::from("CT")),
            DataElement::new(
                tags::SCHEDULED_PROCEDURE_STEP_START_DATE,
                VR::DA,
                PrimitiveValue::from("20240105"),
            ),
        ]);
        WorklistItem::new(InMemDicomObject::from_element_iter([
            DataElement::new(tags::PATIENT_NAME, VR::PN, PrimitiveValue::from("DOE^JANE")),
            DataElement::new(tags::PATIENT_ID, VR::LO, PrimitiveValue::from(patient_id)),
            DataElement::new(tags::ACCESSION_NUMBER, VR::SH, PrimitiveValue::from("ACC0001 ")),
            DataElement::new(tags::STUDY_DESCRIPTION, VR::LO, PrimitiveValue::from("HEAD")),
            DataElement::new(
                tags::SCHEDULED_PROCEDURE_STEP_SEQUENCE,
                VR::SQ,
                DataSetSequence::new(vec![step], Length::UNDEFINED),
            ),
        ]))
    }

    #[test]
    fn test_accessors() {
        let item = sample_item("PID42");
        assert_eq!(item.patient_id().as_deref(), Some("PID42"));
        assert_eq!(item.patient_name().as_deref(), Some("DOE^JANE"));
        assert_eq!(item.accession_number().as_deref(), Some("ACC0001"));
        assert_eq!(item.study_description().as_deref(), Some("HEAD"));
        assert_eq!(item.modality().as_deref(), Some("CT"));
        assert_eq!(item.scheduled_date().as_deref(), Some("20240105"));
        assert_eq!(item.study_instance_uid(), None);
    }

    #[test]
    fn test_requested_procedure_description_preferred() {
        let mut item = sample_item("PID1");
        item.dataset.put(DataElement::new(
            tags::REQUESTED_PROCEDURE_DESCRIPTION,
            VR::LO,
            PrimitiveValue::from("CT HEAD W/O"),
        ));
        assert_eq!(item.study_description().as_deref(), Some("CT HEAD W/O"));
    }

    #[test]
    fn test_flatten_uses_keywords_and_nests_sequences() {
        let flat = sample_item("PID42").flatten().unwrap();
        assert_eq!(flat["PatientID"], JsonValue::from("PID42"));
        assert_eq!(flat["AccessionNumber"], JsonValue::from("ACC0001"));
        assert_eq!(
            flat["ScheduledProcedureStepSequence"][0]["Modality"],
            JsonValue::from("CT")
        );
    }

    #[test]
    fn test_flatten_private_tag() {
        let item = WorklistItem::new(InMemDicomObject::from_element_iter([DataElement::new(
            Tag(0x0009, 0x0010),
            VR::LO,
            PrimitiveValue::from("VENDOR"),
        )]));
        let flat = item.flatten().unwrap();
        assert_eq!(flat["(0009,0010)"], JsonValue::from("VENDOR"));
    }

    #[test]
    fn test_flatten_keeps_every_private_creator() {
        let item = WorklistItem::new(InMemDicomObject::from_element_iter([
            DataElement::new(Tag(0x0009, 0x0010), VR::LO, PrimitiveValue::from("VENDOR_A")),
            DataElement::new(Tag(0x0019, 0x0010), VR::LO, PrimitiveValue::from("VENDOR_B")),
            DataElement::new(tags::PATIENT_ID, VR::LO, PrimitiveValue::from("P1")),
        ]));
        let flat = item.flatten().unwrap();
        assert_eq!(flat.len(), 3);
        assert_eq!(flat["(0009,0010)"], JsonValue::from("VENDOR_A"));
        assert_eq!(flat["(0019,0010)"], JsonValue::from("VENDOR_B"));
        assert_eq!(flat["PatientID"], JsonValue::from("P1"));
        assert!(!flat.contains_key("PrivateCreator"));
    }

    #[test]
    fn test_flatten_repeating_group_keyed_by_tag() {
        let item = WorklistItem::new(InMemDicomObject::from_element_iter([
            DataElement::new(Tag(0x6000, 0x0010), VR::US, PrimitiveValue::from(512_u16)),
            DataElement::new(Tag(0x6002, 0x0010), VR::US, PrimitiveValue::from(256_u16)),
        ]));
        let flat = item.flatten().unwrap();
        assert_eq!(flat.len(), 2);
        assert_eq!(flat["(6000,0010)"], JsonValue::from("512"));
        assert_eq!(flat["(6002,0010)"], JsonValue::from("256"));
    }

    #[test]
    fn test_flatten_rejects_encapsulated_pixels() {
        let item = WorklistItem::new(InMemDicomObject::from_element_iter([DataElement::new(
            tags::PIXEL_DATA,
            VR::OB,
            PixelFragmentSequence::new_fragments(vec![vec![0u8; 4]]),
        )]));
        assert!(item.flatten().is_err());
    }
}
