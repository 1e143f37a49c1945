//! ETI MNSC time function decoding.
//!
//! The MNSC (Multiplex Network Signalling Channel) carries the ensemble date
//! and time as BCD digits spread over a four-frame cycle, one 16-bit word per
//! frame, keyed by the 2-bit frame phase. Field layouts follow the time
//! function of ETSI EN 300 799.
//!
//! All fields are extracted from the host-order word with explicit shifts and
//! masks, numbering bits from the least significant end. Each calendar field
//! is a tens/units nibble pair.

/// MNSC type value announcing the time function.
pub const TYPE_TIME: u8 = 0;
/// MNSC identifier value for the first (and only) time announcement.
pub const IDENTIFIER_TIME: u8 = 0;

fn bcd(tens: u16, units: u16) -> u8 {
    (tens * 10 + units) as u8
}

/// Frame-phase 0 word: the time function header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeHeader {
    pub time_type: u8,
    pub identifier: u8,
}

impl TimeHeader {
    #[must_use]
    pub fn decode(word: u16) -> Self {
        TimeHeader {
            time_type: (word & 0xf) as u8,
            identifier: ((word >> 4) & 0xf) as u8,
        }
    }

    /// True if this header announces the time function this decoder consumes.
    #[must_use]
    pub fn is_time_announcement(&self) -> bool {
        self.time_type == TYPE_TIME && self.identifier == IDENTIFIER_TIME
    }
}

/// Frame-phase 1 word: BCD second and minute plus the sync flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSecondMinute {
    pub second: u8,
    pub minute: u8,
    /// Time is accurate to within one frame duration.
    pub accuracy: bool,
    /// Time information changes synchronously with the frame cycle. When
    /// unset the carried calendar time may not line up with this frame.
    pub sync_to_frame: bool,
}

impl TimeSecondMinute {
    #[must_use]
    pub fn decode(word: u16) -> Self {
        TimeSecondMinute {
            second: bcd((word >> 4) & 0x7, word & 0xf),
            minute: bcd((word >> 12) & 0x7, (word >> 8) & 0xf),
            accuracy: (word >> 7) & 0x1 == 1,
            sync_to_frame: (word >> 15) & 0x1 == 1,
        }
    }
}

/// Frame-phase 2 word: BCD hour and day of month.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeHourDay {
    pub hour: u8,
    pub day: u8,
}

impl TimeHourDay {
    #[must_use]
    pub fn decode(word: u16) -> Self {
        TimeHourDay {
            hour: bcd((word >> 4) & 0xf, word & 0xf),
            day: bcd((word >> 12) & 0xf, (word >> 8) & 0xf),
        }
    }
}

/// Frame-phase 3 word: BCD month and two-digit year.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeMonthYear {
    /// Month of year, 1-based as carried on the wire.
    pub month: u8,
    /// Two-digit year, offset from 2000.
    pub year: u8,
}

impl TimeMonthYear {
    #[must_use]
    pub fn decode(word: u16) -> Self {
        TimeMonthYear {
            month: bcd((word >> 4) & 0xf, word & 0xf),
            year: bcd((word >> 12) & 0xf, (word >> 8) & 0xf),
        }
    }
}
