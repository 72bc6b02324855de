//! Millisecond timestamps shared by events, the timeline and the clock.

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::time::Duration;

/// A point on the replay timeline, in whole milliseconds.
///
/// Recorded sessions carry epoch milliseconds; the clock and the engine
/// work with offsets from the start of the recording. Both fit here.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(u64);

impl Timestamp {
    /// The zero timestamp.
    pub const fn zero() -> Self {
        Self(0)
    }

    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    pub const fn as_millis(self) -> u64 {
        self.0
    }

    /// Convert a reported engine time. Non-finite and negative values map to zero.
    pub fn from_millis_f64(millis: f64) -> Self {
        if millis.is_finite() && millis > 0.0 {
            Self(millis.floor() as u64)
        } else {
            Self(0)
        }
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn saturating_add(self, duration: Duration) -> Self {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        Self(self.0.saturating_add(millis))
    }

    /// Offset by a signed amount, stopping at zero.
    pub fn offset_by(self, delta_millis: i64) -> Self {
        if delta_millis >= 0 {
            Self(self.0.saturating_add(delta_millis.unsigned_abs()))
        } else {
            Self(self.0.saturating_sub(delta_millis.unsigned_abs()))
        }
    }

    pub fn saturating_sub(self, other: Timestamp) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    /// Format as `m:ss` for transport displays.
    pub fn format_clock(self) -> String {
        let total_secs = self.0 / 1_000;
        format!("{}:{:02}", total_secs / 60, total_secs % 60)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(self.0)
    }
}

// Producers write integers, floats, and occasionally negative sentinels.
impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TimestampVisitor;

        impl Visitor<'_> for TimestampVisitor {
            type Value = Timestamp;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a numeric millisecond timestamp")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Timestamp, E> {
                Ok(Timestamp(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Timestamp, E> {
                Ok(Timestamp(u64::try_from(v).unwrap_or(0)))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Timestamp, E> {
                if v.is_nan() {
                    return Err(E::custom("timestamp is NaN"));
                }
                Ok(Timestamp::from_millis_f64(v))
            }
        }

        deserializer.deserialize_any(TimestampVisitor)
    }
}
