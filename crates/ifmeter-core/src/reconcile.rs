// ── Counter reconciler ──
//
// Delta between two raw octet samples. Any decrease that is not a
// genuine 32-bit wrap yields zero: a conservative zero is preferable
// to a fabricated multi-exabyte spike in billing output.

use crate::model::{Counter, CounterWidth};

/// Largest Counter32 value (2^32 - 1).
pub const COUNTER32_MAX: u64 = 4_294_967_295;

/// Noteworthy condition met while reconciling a sample pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterEvent {
    /// Counter dropped to zero without wrapping.
    FakeOverflow,
    /// Expected 32-bit wraparound.
    Wrap32,
    /// 64-bit counter went backwards.
    Wrap64,
    /// Counter went backwards while switching width.
    WidthMismatch,
}

impl CounterEvent {
    /// Only a 32-bit wrap is routine; everything else is an anomaly.
    pub fn is_anomaly(self) -> bool {
        !matches!(self, Self::Wrap32)
    }

    pub fn describe(self) -> &'static str {
        match self {
            Self::FakeOverflow => "fake counter overflow",
            Self::Wrap32 => "overflow 32bit counter",
            Self::Wrap64 => "overflow 64bit counter",
            Self::WidthMismatch => "counter width changed while decreasing",
        }
    }
}

/// Result of reconciling one sample pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reconciled {
    pub delta: u64,
    pub event: Option<CounterEvent>,
}

impl Reconciled {
    fn clean(delta: u64) -> Self {
        Self { delta, event: None }
    }

    fn flagged(delta: u64, event: CounterEvent) -> Self {
        Self {
            delta,
            event: Some(event),
        }
    }
}

/// Octets transferred between `previous` and `current`.
pub fn reconcile(current: Counter, previous: Counter) -> Reconciled {
    if current.value > previous.value {
        return Reconciled::clean(current.value - previous.value);
    }
    if current.value == 0 && previous.value > 0 {
        return Reconciled::flagged(0, CounterEvent::FakeOverflow);
    }
    if current.value < previous.value {
        return match (current.width, previous.width) {
            (CounterWidth::Bits32, CounterWidth::Bits32) => Reconciled::flagged(
                COUNTER32_MAX
                    .saturating_add(current.value)
                    .saturating_sub(previous.value),
                CounterEvent::Wrap32,
            ),
            (CounterWidth::Bits64, CounterWidth::Bits64) => {
                Reconciled::flagged(0, CounterEvent::Wrap64)
            }
            _ => Reconciled::flagged(0, CounterEvent::WidthMismatch),
        };
    }
    Reconciled::clean(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increment_is_plain_difference_for_any_width() {
        let pairs = [
            (Counter::bits32(150), Counter::bits32(100)),
            (Counter::bits64(150), Counter::bits64(100)),
            (Counter::bits64(150), Counter::bits32(100)),
            (Counter::bits32(150), Counter::bits64(100)),
        ];
        for (current, previous) in pairs {
            assert_eq!(reconcile(current, previous), Reconciled::clean(50));
        }
    }

    #[test]
    fn zero_after_nonzero_is_fake_overflow() {
        let r = reconcile(Counter::bits32(0), Counter::bits32(12_345));
        assert_eq!(r.delta, 0);
        assert_eq!(r.event, Some(CounterEvent::FakeOverflow));

        let r = reconcile(Counter::bits64(0), Counter::bits64(1));
        assert_eq!(r.event, Some(CounterEvent::FakeOverflow));
    }

    #[test]
    fn genuine_32_bit_wrap() {
        let r = reconcile(Counter::bits32(5), Counter::bits32(4_294_967_290));
        assert_eq!(r.delta, 10);
        assert_eq!(r.event, Some(CounterEvent::Wrap32));
        assert!(!CounterEvent::Wrap32.is_anomaly());
    }

    #[test]
    fn backwards_64_bit_counter_reports_zero() {
        let r = reconcile(Counter::bits64(500), Counter::bits64(1_000));
        assert_eq!(r, Reconciled::flagged(0, CounterEvent::Wrap64));
    }

    #[test]
    fn width_downgrade_with_decrease_reports_zero() {
        let r = reconcile(Counter::bits32(500), Counter::bits64(9_000_000_000));
        assert_eq!(r, Reconciled::flagged(0, CounterEvent::WidthMismatch));
        let r = reconcile(Counter::bits64(500), Counter::bits32(1_000));
        assert_eq!(r, Reconciled::flagged(0, CounterEvent::WidthMismatch));
    }

    #[test]
    fn unchanged_counter_is_zero_without_event() {
        assert_eq!(
            reconcile(Counter::bits32(7), Counter::bits32(7)),
            Reconciled::clean(0)
        );
        assert_eq!(
            reconcile(Counter::bits32(0), Counter::bits32(0)),
            Reconciled::clean(0)
        );
    }
}
