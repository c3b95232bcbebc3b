use bytes::Bytes;

use crate::oid::Oid;

/// A decoded SNMP value (SMIv2 application types plus v2 exceptions).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Integer(i64),
    OctetString(Bytes),
    Null,
    ObjectIdentifier(Oid),
    IpAddress([u8; 4]),
    Counter32(u32),
    Gauge32(u32),
    TimeTicks(u32),
    Opaque(Bytes),
    Counter64(u64),
    NoSuchObject,
    NoSuchInstance,
    EndOfMibView,
}

impl Value {
    /// Numeric view for counter-like values. Negative integers yield `None`.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Integer(v) => u64::try_from(*v).ok(),
            Self::Counter32(v) | Self::Gauge32(v) | Self::TimeTicks(v) => Some(u64::from(*v)),
            Self::Counter64(v) => Some(*v),
            _ => None,
        }
    }

    /// Signed view, used for enumerated INTEGER columns such as ifAdminStatus.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(*v),
            Self::Counter32(v) | Self::Gauge32(v) | Self::TimeTicks(v) => Some(i64::from(*v)),
            Self::Counter64(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Textual rendering: strings lossily decoded, OIDs dotted, numbers decimal.
    pub fn to_text(&self) -> String {
        match self {
            Self::OctetString(b) | Self::Opaque(b) => String::from_utf8_lossy(b).into_owned(),
            Self::Integer(v) => v.to_string(),
            Self::Counter32(v) | Self::Gauge32(v) | Self::TimeTicks(v) => v.to_string(),
            Self::Counter64(v) => v.to_string(),
            Self::ObjectIdentifier(oid) => oid.to_string(),
            Self::IpAddress([a, b, c, d]) => format!("{a}.{b}.{c}.{d}"),
            Self::Null => String::new(),
            Self::NoSuchObject => "noSuchObject".into(),
            Self::NoSuchInstance => "noSuchInstance".into(),
            Self::EndOfMibView => "endOfMibView".into(),
        }
    }

    /// SNMPv2 exception values that terminate a column walk.
    pub fn is_exception(&self) -> bool {
        matches!(
            self,
            Self::NoSuchObject | Self::NoSuchInstance | Self::EndOfMibView
        )
    }
}

/// One OID/value pair of a PDU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarBind {
    pub oid: Oid,
    pub value: Value,
}

impl VarBind {
    pub fn new(oid: Oid, value: Value) -> Self {
        Self { oid, value }
    }

    /// A request varbind (value is always NULL on the way out).
    pub fn null(oid: Oid) -> Self {
        Self {
            oid,
            value: Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_views() {
        assert_eq!(Value::Counter32(7).as_u64(), Some(7));
        assert_eq!(Value::Counter64(u64::MAX).as_u64(), Some(u64::MAX));
        assert_eq!(Value::Integer(-1).as_u64(), None);
        assert_eq!(Value::Integer(2).as_i64(), Some(2));
        assert_eq!(Value::OctetString(Bytes::from_static(b"1")).as_u64(), None);
    }

    #[test]
    fn text_rendering() {
        assert_eq!(
            Value::OctetString(Bytes::from_static(b"GigabitEthernet0/1")).to_text(),
            "GigabitEthernet0/1"
        );
        assert_eq!(Value::IpAddress([10, 0, 0, 1]).to_text(), "10.0.0.1");
        assert_eq!(Value::TimeTicks(4200).to_text(), "4200");
    }
}
