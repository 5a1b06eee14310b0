//! Timeuuid handling: the dense total order over CDC log rows.
//!
//! A timeuuid is a version-1 UUID carrying a 60-bit timestamp in 100 ns
//! ticks since the Gregorian epoch (1582-10-15). The database orders log
//! rows by embedded timestamp first and by the remaining eight bytes
//! compared as *signed* bytes second; [`Timeuuid`]'s `Ord` implements the
//! same order so cursor comparisons agree with what the server returns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use uuid::Uuid;

/// 100 ns ticks between 1582-10-15T00:00:00Z and the Unix epoch.
const GREGORIAN_UNIX_OFFSET_TICKS: i64 = 0x01B2_1DD2_1381_4000;

/// Mask for the 60-bit embedded timestamp.
const TICKS_MASK: u64 = (1 << 60) - 1;

/// A version-1 UUID ordered the way the CDC log orders its `cdc$time`
/// column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timeuuid(Uuid);

impl Timeuuid {
    /// Wrap a raw UUID without validating its version.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// The underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// The smallest timeuuid whose embedded time equals `instant`.
    ///
    /// The non-timestamp bytes are filled with `0x80`, the minimum under
    /// signed-byte comparison, so every row with embedded time before
    /// `instant` sorts strictly below the result and every row with the
    /// same embedded time sorts at or above it. Used as the upper bound of
    /// range queries.
    pub fn min_at(instant: DateTime<Utc>) -> Self {
        Self::sentinel_at(instant, 0x80)
    }

    /// The largest timeuuid whose embedded time equals `instant`.
    ///
    /// Counterpart of [`Timeuuid::min_at`] with the tail filled with
    /// `0x7F`, the maximum under signed-byte comparison.
    pub fn max_at(instant: DateTime<Utc>) -> Self {
        Self::sentinel_at(instant, 0x7F)
    }

    fn sentinel_at(instant: DateTime<Utc>, fill: u8) -> Self {
        let unix_ticks =
            instant.timestamp() * 10_000_000 + i64::from(instant.timestamp_subsec_nanos()) / 100;
        let ticks = unix_ticks.saturating_add(GREGORIAN_UNIX_OFFSET_TICKS).max(0) as u64 & TICKS_MASK;

        let mut bytes = [fill; 16];
        bytes[0..4].copy_from_slice(&((ticks & 0xFFFF_FFFF) as u32).to_be_bytes());
        bytes[4..6].copy_from_slice(&(((ticks >> 32) & 0xFFFF) as u16).to_be_bytes());
        bytes[6..8].copy_from_slice(&((((ticks >> 48) & 0x0FFF) as u16) | 0x1000).to_be_bytes());
        Self(Uuid::from_bytes(bytes))
    }

    /// The embedded 60-bit timestamp in 100 ns ticks since the Gregorian
    /// epoch.
    pub fn ticks(&self) -> u64 {
        let b = self.0.as_bytes();
        let time_low = u64::from(u32::from_be_bytes([b[0], b[1], b[2], b[3]]));
        let time_mid = u64::from(u16::from_be_bytes([b[4], b[5]]));
        let time_hi = u64::from(u16::from_be_bytes([b[6], b[7]]) & 0x0FFF);
        (time_hi << 48) | (time_mid << 32) | time_low
    }

    /// The wall-clock instant of the embedded timestamp, truncated to
    /// 100 ns resolution.
    pub fn instant(&self) -> DateTime<Utc> {
        let unix_ticks = self.ticks() as i64 - GREGORIAN_UNIX_OFFSET_TICKS;
        let secs = unix_ticks.div_euclid(10_000_000);
        let nanos = (unix_ticks.rem_euclid(10_000_000) * 100) as u32;
        DateTime::from_timestamp(secs, nanos).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

impl Ord for Timeuuid {
    fn cmp(&self, other: &Self) -> Ordering {
        self.ticks()
            .cmp(&other.ticks())
            .then_with(|| {
                let a = self.0.as_bytes();
                let b = other.0.as_bytes();
                for i in 8..16 {
                    match (a[i] as i8).cmp(&(b[i] as i8)) {
                        Ordering::Equal => continue,
                        unequal => return unequal,
                    }
                }
                Ordering::Equal
            })
            // full-byte tiebreak keeps the order total when version bits differ
            .then_with(|| self.0.as_bytes().cmp(other.0.as_bytes()))
    }
}

impl PartialOrd for Timeuuid {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl From<Uuid> for Timeuuid {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<Timeuuid> for Uuid {
    fn from(t: Timeuuid) -> Self {
        t.0
    }
}

impl fmt::Display for Timeuuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
