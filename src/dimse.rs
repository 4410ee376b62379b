//! DIMSE command sets used by the emulator (C-STORE, C-FIND, C-ECHO).

use dicom_core::value::PrimitiveValue;
use dicom_core::{DataElement, Tag, VR};
use dicom_dictionary_std::tags;
use dicom_object::InMemDicomObject;
use smallvec::smallvec;

use crate::common::status::DimseStatus;

pub const C_STORE_RQ: u16 = 0x0001;
pub const C_STORE_RSP: u16 = 0x8001;
pub const C_FIND_RQ: u16 = 0x0020;
pub const C_FIND_RSP: u16 = 0x8020;
pub const C_ECHO_RQ: u16 = 0x0030;
pub const C_ECHO_RSP: u16 = 0x8030;

/// Command Data Set Type value meaning "no data set follows".
pub const NO_DATA_SET: u16 = 0x0101;
const DATA_SET_PRESENT: u16 = 0x0000;
const PRIORITY_MEDIUM: u16 = 0x0000;

fn us(tag: Tag, value: u16) -> DataElement<InMemDicomObject> {
    DataElement::new(tag, VR::US, PrimitiveValue::U16(smallvec![value]))
}

fn ui(tag: Tag, value: &str) -> DataElement<InMemDicomObject> {
    DataElement::new(tag, VR::UI, PrimitiveValue::from(value))
}

pub fn store_request(sop_class_uid: &str, sop_instance_uid: &str, message_id: u16) -> InMemDicomObject {
    InMemDicomObject::command_from_element_iter([
        ui(tags::AFFECTED_SOP_CLASS_UID, sop_class_uid),
        us(tags::COMMAND_FIELD, C_STORE_RQ),
        us(tags::MESSAGE_ID, message_id),
        us(tags::PRIORITY, PRIORITY_MEDIUM),
        us(tags::COMMAND_DATA_SET_TYPE, DATA_SET_PRESENT),
        ui(tags::AFFECTED_SOP_INSTANCE_UID, sop_instance_uid),
    ])
}

pub fn find_request(sop_class_uid: &str, message_id: u16) -> InMemDicomObject {
    InMemDicomObject::command_from_element_iter([
        ui(tags::AFFECTED_SOP_CLASS_UID, sop_class_uid),
        us(tags::COMMAND_FIELD, C_FIND_RQ),
        us(tags::MESSAGE_ID, message_id),
        us(tags::PRIORITY, PRIORITY_MEDIUM),
        us(tags::COMMAND_DATA_SET_TYPE, DATA_SET_PRESENT),
    ])
}

/// Response to a request, echoing its class, instance and message ID.
pub fn response(
    command_field: u16,
    sop_class_uid: &str,
    sop_instance_uid: Option<&str>,
    message_id: u16,
    status: u16,
) -> InMemDicomObject {
    let mut elements = vec![
        ui(tags::AFFECTED_SOP_CLASS_UID, sop_class_uid),
        us(tags::COMMAND_FIELD, command_field),
        us(tags::MESSAGE_ID_BEING_RESPONDED_TO, message_id),
        us(tags::COMMAND_DATA_SET_TYPE, NO_DATA_SET),
        us(tags::STATUS, status),
    ];
    if let Some(uid) = sop_instance_uid {
        elements.push(ui(tags::AFFECTED_SOP_INSTANCE_UID, uid));
    }
    InMemDicomObject::command_from_element_iter(elements)
}

pub fn command_field(command: &InMemDicomObject) -> Option<u16> {
    read_u16(command, tags::COMMAND_FIELD)
}

pub fn message_id(command: &InMemDicomObject) -> Option<u16> {
    read_u16(command, tags::MESSAGE_ID)
}

pub fn status(command: &InMemDicomObject) -> DimseStatus {
    DimseStatus::from_optional(read_u16(command, tags::STATUS))
}

/// Whether the command announces a data set after it.
pub fn has_data_set(command: &InMemDicomObject) -> bool {
    read_u16(command, tags::COMMAND_DATA_SET_TYPE)
        .map(|v| v != NO_DATA_SET)
        .unwrap_or(false)
}

pub fn read_string(obj: &InMemDicomObject, tag: Tag) -> Option<String> {
    obj.get(tag)
        .and_then(|e| e.to_str().ok())
        .map(|s| s.trim_end_matches(|c: char| c.is_whitespace() || c == '\0').to_string())
        .filter(|s| !s.is_empty())
}

fn read_u16(obj: &InMemDicomObject, tag: Tag) -> Option<u16> {
    obj.get(tag).and_then(|e| e.to_int::<u16>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_request_fields() {
        let cmd = store_request("1.2.840.10008.5.1.4.1.1.2", "2.25.1", 7);
        assert_eq!(command_field(&cmd), Some(C_STORE_RQ));
        assert_eq!(message_id(&cmd), Some(7));
        assert!(has_data_set(&cmd));
        assert_eq!(
            read_string(&cmd, tags::AFFECTED_SOP_INSTANCE_UID).as_deref(),
            Some("2.25.1")
        );
        // command group length is filled in
        assert!(cmd.get(tags::COMMAND_GROUP_LENGTH).is_some());
    }

    #[test]
    fn test_response_status() {
        let rsp = response(C_STORE_RSP, "1.2.840.10008.5.1.4.1.1.2", Some("2.25.1"), 7, 0xA700);
        assert_eq!(status(&rsp), DimseStatus::Failure(0xA700));
        assert!(!has_data_set(&rsp));

        let cmd = find_request("1.2.840.10008.5.1.4.31", 1);
        assert_eq!(status(&cmd), DimseStatus::Missing);
    }
}
