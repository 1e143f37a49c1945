//! Frame timestamp value type.

use std::fmt::Display;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// PPS counter ticks per second, i.e. the 16.384 MHz transport tick rate.
pub const TICKS_PER_SECOND: u32 = 16_384_000;

/// An immutable timestamp snapshot for one broadcast frame.
///
/// Produced by [`crate::TimestampDecoder::snapshot`] with the correction
/// offset already folded in. `seconds` counts whole seconds since the Unix
/// epoch; `ticks` is the sub-second position in units of
/// 1/[`TICKS_PER_SECOND`] s.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameTimestamp {
    /// Whether a full timestamp has ever been established. Once true this
    /// never reverts, even if the held time has gone stale.
    pub valid: bool,
    pub seconds: u32,
    pub ticks: u32,
    /// Frame count of the frame that produced the held time state.
    pub fct: i32,
    /// Frame phase of that frame.
    pub frame_phase: u8,
    /// One-shot flag: set on the first snapshot after an offset change.
    pub refresh: bool,
}

impl FrameTimestamp {
    /// Add a signed offset in seconds, with carry between the whole-second
    /// and tick fields.
    ///
    /// The offset splits as `floor(offset)` whole seconds plus a fractional
    /// part scaled to ticks; a fractional sum reaching a full second carries
    /// into `seconds`. Negative offsets borrow symmetrically, so adding
    /// `-0.5` to `(10, 0)` yields `(9, TICKS_PER_SECOND / 2)`.
    pub fn add_offset(&mut self, offset: f64) {
        let whole = offset.floor();
        let frac_ticks = ((offset - whole) * f64::from(TICKS_PER_SECOND)).round() as u32;

        let mut seconds = i64::from(self.seconds) + whole as i64;
        let mut ticks = self.ticks + frac_ticks;
        if ticks >= TICKS_PER_SECOND {
            ticks -= TICKS_PER_SECOND;
            seconds += 1;
        }

        self.seconds = seconds as u32;
        self.ticks = ticks;
    }

    /// Sub-second position as a fraction in `[0, 1)`.
    #[must_use]
    pub fn fraction_of_second(&self) -> f64 {
        f64::from(self.ticks) / f64::from(TICKS_PER_SECOND)
    }

    /// The held time as a UTC datetime, or `None` if out of chrono's range.
    #[must_use]
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        let nanos = u64::from(self.ticks) * 1_000_000_000 / u64::from(TICKS_PER_SECOND);
        Utc.timestamp_opt(i64::from(self.seconds), nanos as u32)
            .single()
    }
}

impl Display for FrameTimestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:.6} for frame FCT {}",
            f64::from(self.seconds) + self.fraction_of_second(),
            self.fct
        )
    }
}
