use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

/// Reachability of a source as seen by its most recent poll.
///
/// Only `Success` is "ready" (counters trustworthy). Everything else,
/// `NoPdu` included, is "down" and gets retried by the status poll.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum SourceStatus {
    Success,
    Timeout,
    NoPdu,
    OtherError,
    #[default]
    Unknown,
    NoIftable,
}

impl SourceStatus {
    /// Numeric code kept stable for downstream consumers.
    pub fn code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::Timeout => 1,
            Self::NoPdu => 2,
            Self::OtherError => 3,
            Self::Unknown => 4,
            Self::NoIftable => 5,
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            Self::Success => "Success snmp response",
            Self::Timeout => "No snmp response (timeout)",
            Self::NoPdu => "No response PDU",
            Self::OtherError => "Response error",
            Self::Unknown => "Unknown",
            Self::NoIftable => "Has no interfaces",
        }
    }

    pub fn is_up(self) -> bool {
        self == Self::Success
    }

    pub fn is_down(self) -> bool {
        !self.is_up()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn every_non_success_status_is_down() {
        for status in SourceStatus::iter() {
            assert_eq!(status.is_up(), status == SourceStatus::Success);
            assert_eq!(status.is_down(), !status.is_up());
        }
        assert!(SourceStatus::NoPdu.is_down());
    }

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("no_pdu".parse::<SourceStatus>().unwrap(), SourceStatus::NoPdu);
        assert_eq!("NO_IFTABLE".parse::<SourceStatus>().unwrap(), SourceStatus::NoIftable);
        assert_eq!(SourceStatus::OtherError.to_string(), "OTHER_ERROR");
        assert!("sideways".parse::<SourceStatus>().is_err());
    }

    #[test]
    fn serde_uses_wire_names() {
        let json = serde_json::to_string(&SourceStatus::NoPdu).unwrap();
        assert_eq!(json, "\"NO_PDU\"");
    }
}
