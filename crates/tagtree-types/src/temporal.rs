use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Modification timestamp of a tag.
///
/// Combines a wall-clock millisecond component with a logical counter so
/// that two revisions written within the same millisecond still compare
/// strictly. Ordered by `physical_ms`, then `logical`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModificationDate {
    /// Wall-clock milliseconds since UNIX epoch.
    pub physical_ms: u64,
    /// Logical counter for revisions at the same physical time.
    pub logical: u32,
}

impl ModificationDate {
    /// Create a date with explicit values.
    pub const fn new(physical_ms: u64, logical: u32) -> Self {
        Self {
            physical_ms,
            logical,
        }
    }

    /// Create a date from whole UNIX seconds.
    pub const fn from_unix_seconds(seconds: u64) -> Self {
        Self::new(seconds * 1000, 0)
    }

    /// The current wall-clock time.
    pub fn now() -> Self {
        Self::new(wall_clock_ms(), 0)
    }

    /// The zero date. Never assigned to a stored tag.
    pub const fn zero() -> Self {
        Self::new(0, 0)
    }

    /// Whole UNIX seconds.
    pub fn timestamp(&self) -> u64 {
        self.physical_ms / 1000
    }

    /// Returns `true` if this date is strictly after `other`.
    pub fn is_after(&self, other: &Self) -> bool {
        self > other
    }

    /// The wall-clock component as a UTC datetime.
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(i64::try_from(self.physical_ms).ok()?)
    }
}

impl PartialOrd for ModificationDate {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ModificationDate {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.physical_ms
            .cmp(&other.physical_ms)
            .then(self.logical.cmp(&other.logical))
    }
}

impl fmt::Debug for ModificationDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ModificationDate({}ms.{})", self.physical_ms, self.logical)
    }
}

impl fmt::Display for ModificationDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_datetime() {
            Some(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S UTC")),
            None => write!(f, "{}ms", self.physical_ms),
        }
    }
}

struct ClockState {
    physical_ms: u64,
    logical: u32,
}

/// Source of monotonically increasing [`ModificationDate`]s.
///
/// # Rules
///
/// - **Fresh stamp**: `physical = max(wall_clock, last.physical)`. If the
///   physical part advanced the logical counter resets to 0, otherwise it
///   increments. A counter at `u32::MAX` carries into the next millisecond.
/// - **Stamp after a previous revision**: as above, but the result is also
///   strictly greater than the given date, so a tag's successive dates
///   always increase even when its stored date lies in the future.
pub struct ModificationClock {
    state: Mutex<ClockState>,
}

impl ModificationClock {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ClockState {
                physical_ms: 0,
                logical: 0,
            }),
        }
    }

    /// A new date strictly greater than every date previously issued.
    pub fn now(&self) -> ModificationDate {
        self.advance(None)
    }

    /// A new date strictly greater than `previous` and every issued date.
    pub fn stamp_after(&self, previous: &ModificationDate) -> ModificationDate {
        self.advance(Some(previous))
    }

    fn advance(&self, previous: Option<&ModificationDate>) -> ModificationDate {
        let wall = wall_clock_ms();
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        let floor = match previous {
            Some(prev) if (prev.physical_ms, prev.logical) > (state.physical_ms, state.logical) => {
                (prev.physical_ms, prev.logical)
            }
            _ => (state.physical_ms, state.logical),
        };

        // A full logical counter carries into the next millisecond.
        let (physical_ms, logical) = if wall > floor.0 {
            (wall, 0)
        } else {
            match floor.1.checked_add(1) {
                Some(logical) => (floor.0, logical),
                None => (floor.0.saturating_add(1), 0),
            }
        };

        state.physical_ms = physical_ms;
        state.logical = logical;
        ModificationDate::new(physical_ms, logical)
    }
}

impl Default for ModificationClock {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ModificationClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModificationClock").finish_non_exhaustive()
    }
}

/// Current wall-clock time in milliseconds since the UNIX epoch.
fn wall_clock_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
