//! DIMSE response status interpretation.

use std::fmt;

use serde::Serialize;

/// A response status, classified.
///
/// `Missing` stands for a response that carried no status at all
/// (or no response), which is never treated as success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DimseStatus {
    Success(u16),
    Pending(u16),
    Warning(u16),
    Cancel(u16),
    Failure(u16),
    Missing,
}

impl DimseStatus {
    pub fn from_code(code: u16) -> Self {
        match code {
            0x0000 => DimseStatus::Success(code),
            0xFF00 | 0xFF01 => DimseStatus::Pending(code),
            0x0001 | 0x0107 | 0x0116 | 0xB000..=0xBFFF => DimseStatus::Warning(code),
            0xFE00 => DimseStatus::Cancel(code),
            _ => DimseStatus::Failure(code),
        }
    }

    pub fn from_optional(code: Option<u16>) -> Self {
        code.map(Self::from_code).unwrap_or(DimseStatus::Missing)
    }

    pub fn code(&self) -> Option<u16> {
        match *self {
            DimseStatus::Success(c)
            | DimseStatus::Pending(c)
            | DimseStatus::Warning(c)
            | DimseStatus::Cancel(c)
            | DimseStatus::Failure(c) => Some(c),
            DimseStatus::Missing => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, DimseStatus::Success(_))
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, DimseStatus::Pending(_))
    }
}

impl fmt::Display for DimseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DimseStatus::Success(c) => write!(f, "success ({:04X}H)", c),
            DimseStatus::Pending(c) => write!(f, "pending ({:04X}H)", c),
            DimseStatus::Warning(c) => write!(f, "warning ({:04X}H)", c),
            DimseStatus::Cancel(c) => write!(f, "cancelled ({:04X}H)", c),
            DimseStatus::Failure(c) => write!(f, "failure ({:04X}H)", c),
            DimseStatus::Missing => f.write_str("no status"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert_eq!(DimseStatus::from_code(0x0000), DimseStatus::Success(0));
        assert_eq!(DimseStatus::from_code(0xFF00), DimseStatus::Pending(0xFF00));
        assert_eq!(DimseStatus::from_code(0xFF01), DimseStatus::Pending(0xFF01));
        assert_eq!(DimseStatus::from_code(0xB007), DimseStatus::Warning(0xB007));
        assert_eq!(DimseStatus::from_code(0xFE00), DimseStatus::Cancel(0xFE00));
        assert_eq!(DimseStatus::from_code(0xA700), DimseStatus::Failure(0xA700));
        assert_eq!(DimseStatus::from_code(0xC000), DimseStatus::Failure(0xC000));
        assert_eq!(DimseStatus::from_optional(None), DimseStatus::Missing);
    }

    #[test]
    fn test_only_success_is_success() {
        assert!(DimseStatus::Success(0).is_success());
        assert!(!DimseStatus::Warning(0xB000).is_success());
        assert!(!DimseStatus::Missing.is_success());
        assert_eq!(DimseStatus::Missing.code(), None);
        assert_eq!(DimseStatus::Failure(0xA700).to_string(), "failure (A700H)");
    }
}
