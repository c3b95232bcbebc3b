use std::fmt;

use serde::{Deserialize, Serialize};

/// Bit width of the SNMP counter a sample was read from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum CounterWidth {
    #[default]
    Bits32,
    Bits64,
}

impl From<CounterWidth> for u8 {
    fn from(width: CounterWidth) -> Self {
        match width {
            CounterWidth::Bits32 => 32,
            CounterWidth::Bits64 => 64,
        }
    }
}

impl TryFrom<u8> for CounterWidth {
    type Error = String;

    fn try_from(bits: u8) -> Result<Self, Self::Error> {
        match bits {
            32 => Ok(Self::Bits32),
            64 => Ok(Self::Bits64),
            other => Err(format!("counter width must be 32 or 64, got {other}")),
        }
    }
}

/// One raw octet-counter sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counter {
    pub value: u64,
    pub width: CounterWidth,
}

impl Counter {
    pub fn new(value: u64, width: CounterWidth) -> Self {
        Self { value, width }
    }

    pub fn bits32(value: u64) -> Self {
        Self::new(value, CounterWidth::Bits32)
    }

    pub fn bits64(value: u64) -> Self {
        Self::new(value, CounterWidth::Bits64)
    }
}

impl fmt::Display for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

/// Pick the sample to trust when an agent exposes both widths.
///
/// The 64-bit value wins only when it is strictly greater than the
/// 32-bit one; otherwise whichever is present is used.
pub fn select_counter(c32: Option<u64>, c64: Option<u64>) -> Counter {
    match (c32, c64) {
        (Some(v32), Some(v64)) if v64 > v32 => Counter::bits64(v64),
        (Some(v32), _) => Counter::bits32(v32),
        (None, Some(v64)) => Counter::bits64(v64),
        (None, None) => Counter::default(),
    }
}
