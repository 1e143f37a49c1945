//! Timestamp reconstruction engine.
//!
//! [`TimestampDecoder`] rebuilds an absolute timestamp from either transport:
//! per-frame ETI updates carrying the PPS tick counter and one MNSC time
//! fragment, or EDI updates carrying an already-assembled UTC second count.
//! [`TimestampHandle`] is the shared, lock-guarded form used when the frame
//! path and the remote-control path run on different threads.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{TimeZone, Utc};
use tracing::{debug, info, trace};

use crate::error::{Error, Result};
use crate::mnsc::{TimeHeader, TimeHourDay, TimeMonthYear, TimeSecondMinute};
use crate::rc::{Parameter, RemoteControllable};
use crate::timestamp::{FrameTimestamp, TICKS_PER_SECOND};

/// Number of whole-second candidates from the MNSC to discard after a
/// detected second boundary. The boundary seen on the PPS counter is
/// authoritative and immediate; the MNSC decode lags by up to one frame and
/// must not clobber the freshly incremented second.
const INHIBIT_UPDATES: u8 = 2;

/// Tracks the PPS tick counter, detects second boundaries and gates
/// whole-second candidates through the inhibit window.
#[derive(Debug, Default)]
struct PpsTracker {
    /// Most recent counter value, in `[0, TICKS_PER_SECOND)`.
    ticks: u32,
    inhibit: u8,
}

impl PpsTracker {
    /// Record a new PPS counter value.
    ///
    /// Returns true if a second boundary was crossed, i.e. the counter
    /// wrapped to a strictly smaller value. Equal values are not a crossing.
    fn update(&mut self, ticks: u32) -> bool {
        let crossed = ticks < self.ticks;
        if crossed {
            trace!(ticks, "pps counter wrapped, second boundary crossed");
            self.inhibit = INHIBIT_UPDATES;
        }
        self.ticks = ticks;
        crossed
    }

    /// Gate a whole-second candidate decoded from the MNSC.
    ///
    /// While the inhibit window is open the candidate is discarded and the
    /// window shrinks by one; this is the single path through which MNSC
    /// seconds may overwrite the held value.
    fn admit(&mut self, candidate: u32) -> Option<u32> {
        if self.inhibit > 0 {
            self.inhibit -= 1;
            trace!(
                candidate,
                remaining = self.inhibit,
                "seconds update inhibited"
            );
            None
        } else {
            Some(candidate)
        }
    }
}

/// Broken-down calendar time under construction across the four-frame MNSC
/// cycle. Month is held 0-based and the year counts from 1900; the wire's
/// two-digit year is an offset from 2000.
#[derive(Debug, Clone, Copy)]
struct PartialTime {
    second: u8,
    minute: u8,
    hour: u8,
    day: u8,
    month0: u8,
    years_since_1900: u16,
}

impl PartialTime {
    /// Neutral starting point: the Unix epoch, 1970-01-01T00:00:00.
    fn epoch() -> Self {
        PartialTime {
            second: 0,
            minute: 0,
            hour: 0,
            day: 1,
            month0: 0,
            years_since_1900: 70,
        }
    }

    /// Epoch seconds of the assembled time, converted as UTC, or `None` if
    /// the fields do not name a real calendar date.
    fn to_epoch_seconds(&self) -> Option<u32> {
        Utc.with_ymd_and_hms(
            1900 + i32::from(self.years_since_1900),
            u32::from(self.month0) + 1,
            u32::from(self.day),
            u32::from(self.hour),
            u32::from(self.minute),
            u32::from(self.second),
        )
        .single()
        .and_then(|dt| u32::try_from(dt.timestamp()).ok())
    }
}

/// Accumulates the four MNSC time fragments into a whole-second value.
#[derive(Debug)]
struct MnscAssembler {
    /// Sync gate: decoding of the current cycle is enabled. Set at phase 0
    /// from the header, possibly cleared at phase 1.
    enable_decode: bool,
    partial: PartialTime,
}

impl MnscAssembler {
    fn new() -> Self {
        MnscAssembler {
            enable_decode: false,
            partial: PartialTime::epoch(),
        }
    }

    /// Apply one MNSC word for the given frame phase.
    ///
    /// Returns the assembled whole-second candidate when a phase-3 fragment
    /// completes a cycle with the sync gate still true. A cycle failing the
    /// gate is discarded silently; the broadcast repeats it every second.
    fn apply_fragment(&mut self, frame_phase: u8, word: u16) -> Option<u32> {
        match frame_phase {
            0 => {
                let header = TimeHeader::decode(word);
                self.enable_decode = header.is_time_announcement();
                self.partial = PartialTime::epoch();
            }
            1 => {
                let sm = TimeSecondMinute::decode(word);
                self.partial.second = sm.second;
                self.partial.minute = sm.minute;
                if !sm.sync_to_frame {
                    debug!("MNSC time info is not synchronised to frame");
                    self.enable_decode = false;
                }
            }
            2 => {
                let hd = TimeHourDay::decode(word);
                self.partial.hour = hd.hour;
                self.partial.day = hd.day;
            }
            3 => {
                let my = TimeMonthYear::decode(word);
                self.partial.month0 = my.month.wrapping_sub(1);
                self.partial.years_since_1900 = u16::from(my.year) + 100;

                if self.enable_decode {
                    match self.partial.to_epoch_seconds() {
                        Some(seconds) => return Some(seconds),
                        None => {
                            trace!(partial = ?self.partial, "assembled MNSC time is not a valid date")
                        }
                    }
                }
            }
            _ => {}
        }
        None
    }
}

/// Live-adjustable correction offset with its one-shot changed flag.
#[derive(Debug, Default)]
struct OffsetControl {
    offset: f64,
    changed: bool,
}

impl OffsetControl {
    fn set(&mut self, offset: f64) {
        self.offset = offset;
        self.changed = true;
    }

    fn get(&self) -> f64 {
        self.offset
    }

    /// Consume the changed flag; true at most once per set.
    fn take_changed(&mut self) -> bool {
        std::mem::replace(&mut self.changed, false)
    }
}

/// Reconstructs the broadcast timestamp from ETI or EDI updates.
///
/// The decoder is a plain single-threaded state machine; wrap it in a
/// [`TimestampHandle`] when the control path runs on another thread.
#[derive(Debug)]
pub struct TimestampDecoder {
    seconds: u32,
    pps: PpsTracker,
    assembler: MnscAssembler,
    offset: OffsetControl,
    fct: i32,
    frame_phase: u8,
    full_timestamp_received: bool,
}

impl TimestampDecoder {
    /// Create a decoder with the given initial TIST offset in seconds.
    #[must_use]
    pub fn new(offset_s: f64) -> Self {
        info!(offset = offset_s, "setting up timestamp decoder");
        TimestampDecoder {
            seconds: 0,
            pps: PpsTracker::default(),
            assembler: MnscAssembler::new(),
            offset: OffsetControl {
                offset: offset_s,
                changed: false,
            },
            fct: 0,
            frame_phase: 0,
            full_timestamp_received: false,
        }
    }

    /// Per-frame update from the ETI transport.
    ///
    /// `mnsc` is the 16-bit MNSC word of this frame, `ticks` the PPS counter
    /// in units of 1/[`TICKS_PER_SECOND`] s, `fct` the frame count. The PPS
    /// counter is consumed first so that a second boundary detected in this
    /// frame inhibits the MNSC fragment it arrived with.
    pub fn update_eti(&mut self, frame_phase: u8, mnsc: u16, ticks: u32, fct: i32) {
        if self.pps.update(ticks) {
            self.seconds += 1;
        }

        if let Some(candidate) = self.assembler.apply_fragment(frame_phase, mnsc) {
            self.full_timestamp_received = true;
            if let Some(seconds) = self.pps.admit(candidate) {
                self.seconds = seconds;
            }
        }

        self.fct = fct;
        self.frame_phase = frame_phase;
    }

    /// Per-frame update from the EDI transport.
    ///
    /// EDI carries absolute, already-consistent time; the value is adopted
    /// directly with no assembly or inhibit logic.
    pub fn update_edi(&mut self, seconds_utc: u32, ticks: u32, fct: i32, frame_phase: u8) {
        self.seconds = seconds_utc;
        self.pps.ticks = ticks;
        self.fct = fct;
        self.frame_phase = frame_phase;
        self.full_timestamp_received = true;
    }

    /// Produce the timestamp snapshot for the current frame.
    ///
    /// Folds in the correction offset and consumes the one-shot offset
    /// changed flag into `refresh`.
    pub fn snapshot(&mut self) -> FrameTimestamp {
        let mut ts = FrameTimestamp {
            valid: self.full_timestamp_received,
            seconds: self.seconds,
            ticks: self.pps.ticks,
            fct: self.fct,
            frame_phase: self.frame_phase,
            refresh: self.offset.take_changed(),
        };
        ts.add_offset(self.offset.get());
        ts
    }

    /// Update the TIST offset. The next snapshot will carry `refresh`.
    pub fn set_offset(&mut self, offset_s: f64) {
        info!(offset = offset_s, "TIST offset updated");
        self.offset.set(offset_s);
    }

    #[must_use]
    pub fn offset(&self) -> f64 {
        self.offset.get()
    }

    /// Raw held time, without the offset folded in, for the `timestamp`
    /// remote parameter.
    fn timestamp_description(&self) -> Result<String> {
        if !self.full_timestamp_received {
            return Err(Error::NotAvailable);
        }
        let seconds =
            f64::from(self.seconds) + f64::from(self.pps.ticks) / f64::from(TICKS_PER_SECOND);
        Ok(format!("{seconds:.6} for frame FCT {}", self.fct))
    }
}

const RC_NAME: &str = "tist";

const PARAMETERS: [Parameter; 2] = [
    Parameter {
        name: "offset",
        help: "TIST offset [s]",
        writable: true,
    },
    Parameter {
        name: "timestamp",
        help: "FCT and timestamp [s]",
        writable: false,
    },
];

/// Cloneable, thread-safe handle to a [`TimestampDecoder`].
///
/// The frame path (ETI/EDI updates, snapshots) and the control path (remote
/// parameter access) take the same lock, so a snapshot never observes a torn
/// combination of seconds, ticks and offset.
#[derive(Debug, Clone)]
pub struct TimestampHandle {
    inner: Arc<Mutex<TimestampDecoder>>,
}

impl TimestampHandle {
    #[must_use]
    pub fn new(offset_s: f64) -> Self {
        TimestampHandle {
            inner: Arc::new(Mutex::new(TimestampDecoder::new(offset_s))),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TimestampDecoder> {
        // None of the guarded operations can panic, so the lock cannot be
        // poisoned in practice.
        self.inner.lock().expect("timestamp decoder lock poisoned")
    }

    /// See [`TimestampDecoder::update_eti`].
    pub fn update_eti(&self, frame_phase: u8, mnsc: u16, ticks: u32, fct: i32) {
        self.lock().update_eti(frame_phase, mnsc, ticks, fct);
    }

    /// See [`TimestampDecoder::update_edi`].
    pub fn update_edi(&self, seconds_utc: u32, ticks: u32, fct: i32, frame_phase: u8) {
        self.lock().update_edi(seconds_utc, ticks, fct, frame_phase);
    }

    /// See [`TimestampDecoder::snapshot`].
    #[must_use]
    pub fn snapshot(&self) -> FrameTimestamp {
        self.lock().snapshot()
    }
}

impl RemoteControllable for TimestampHandle {
    fn rc_name(&self) -> &'static str {
        RC_NAME
    }

    fn parameters(&self) -> &'static [Parameter] {
        &PARAMETERS
    }

    fn set_parameter(&self, parameter: &str, value: &str) -> Result<()> {
        match parameter {
            "offset" => {
                let offset = value
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .filter(|o| o.is_finite())
                    .ok_or_else(|| Error::InvalidValue {
                        parameter: parameter.to_string(),
                        value: value.to_string(),
                    })?;
                self.lock().set_offset(offset);
                Ok(())
            }
            "timestamp" => Err(Error::ReadOnlyParameter(parameter.to_string())),
            _ => Err(Error::UnknownParameter {
                controllable: RC_NAME.to_string(),
                parameter: parameter.to_string(),
            }),
        }
    }

    fn get_parameter(&self, parameter: &str) -> Result<String> {
        match parameter {
            "offset" => Ok(self.lock().offset().to_string()),
            "timestamp" => self.lock().timestamp_description(),
            _ => Err(Error::UnknownParameter {
                controllable: RC_NAME.to_string(),
                parameter: parameter.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2023-03-05T10:12:34Z
    const MARCH_5_2023: u32 = 1_678_011_154;

    /// MNSC cycle decoding to 2023-03-05T10:12:34, sync_to_frame set.
    const TIME_CYCLE: [u16; 4] = [0x0000, 0x9234, 0x0510, 0x2303];

    #[test]
    fn pps_wrap_crosses_second() {
        let mut pps = PpsTracker::default();
        assert!(!pps.update(TICKS_PER_SECOND - 1));
        assert!(pps.update(0));
        assert!(!pps.update(1));
    }

    #[test]
    fn pps_equal_values_do_not_cross() {
        let mut pps = PpsTracker::default();
        assert!(!pps.update(5000));
        assert!(!pps.update(5000));
    }

    #[test]
    fn inhibit_window_discards_two_candidates() {
        let mut pps = PpsTracker::default();
        pps.update(100);
        assert!(pps.update(0));

        assert_eq!(pps.admit(42), None);
        assert_eq!(pps.admit(43), None);
        assert_eq!(pps.admit(44), Some(44));
    }

    #[test]
    fn admit_passes_through_without_crossing() {
        let mut pps = PpsTracker::default();
        pps.update(100);
        assert_eq!(pps.admit(42), Some(42));
    }

    #[test]
    fn assembler_commits_gated_cycle() {
        let mut asm = MnscAssembler::new();
        assert_eq!(asm.apply_fragment(0, TIME_CYCLE[0]), None);
        assert_eq!(asm.apply_fragment(1, TIME_CYCLE[1]), None);
        assert_eq!(asm.apply_fragment(2, TIME_CYCLE[2]), None);
        assert_eq!(asm.apply_fragment(3, TIME_CYCLE[3]), Some(MARCH_5_2023));
    }

    #[test]
    fn assembler_discards_unsynced_cycle() {
        let mut asm = MnscAssembler::new();
        asm.apply_fragment(0, TIME_CYCLE[0]);
        // sync_to_frame bit clear
        asm.apply_fragment(1, 0x1234);
        asm.apply_fragment(2, TIME_CYCLE[2]);
        assert_eq!(asm.apply_fragment(3, TIME_CYCLE[3]), None);
    }

    #[test]
    fn assembler_discards_foreign_header() {
        let mut asm = MnscAssembler::new();
        // type 1: not the time announcement
        asm.apply_fragment(0, 0x0001);
        asm.apply_fragment(1, TIME_CYCLE[1]);
        asm.apply_fragment(2, TIME_CYCLE[2]);
        assert_eq!(asm.apply_fragment(3, TIME_CYCLE[3]), None);
    }

    #[test]
    fn assembler_discards_impossible_date() {
        let mut asm = MnscAssembler::new();
        asm.apply_fragment(0, TIME_CYCLE[0]);
        asm.apply_fragment(1, TIME_CYCLE[1]);
        // day 39
        asm.apply_fragment(2, 0x3910);
        assert_eq!(asm.apply_fragment(3, TIME_CYCLE[3]), None);
    }

    fn run_cycle(decoder: &mut TimestampDecoder, words: &[u16; 4], ticks: u32, first_fct: i32) {
        for (phase, word) in words.iter().enumerate() {
            decoder.update_eti(phase as u8, *word, ticks, first_fct + phase as i32);
        }
    }

    #[test]
    fn eti_cycle_establishes_timestamp() {
        let mut decoder = TimestampDecoder::new(0.0);
        assert!(!decoder.snapshot().valid);

        run_cycle(&mut decoder, &TIME_CYCLE, 1000, 8);

        let ts = decoder.snapshot();
        assert!(ts.valid);
        assert_eq!(ts.seconds, MARCH_5_2023);
        assert_eq!(ts.ticks, 1000);
        assert_eq!(ts.fct, 11);
        assert_eq!(ts.frame_phase, 3);
    }

    #[test]
    fn boundary_increments_seconds_once() {
        let mut decoder = TimestampDecoder::new(0.0);
        run_cycle(&mut decoder, &TIME_CYCLE, 1000, 0);

        // idle MNSC, counter approaching then crossing the boundary
        decoder.update_eti(0, 0x0001, TICKS_PER_SECOND - 1, 4);
        decoder.update_eti(1, 0x0000, 10, 5);
        decoder.update_eti(2, 0x0000, 20, 6);

        let ts = decoder.snapshot();
        assert_eq!(ts.seconds, MARCH_5_2023 + 1);
        assert_eq!(ts.ticks, 20);
    }

    #[test]
    fn inhibit_protects_fresh_second_from_lagging_mnsc() {
        let mut decoder = TimestampDecoder::new(0.0);
        run_cycle(&mut decoder, &TIME_CYCLE, 1000, 0);

        // boundary crossing right before the next cycle completes
        decoder.update_eti(0, TIME_CYCLE[0], TICKS_PER_SECOND - 1, 4);
        decoder.update_eti(1, TIME_CYCLE[1], 10, 5);
        decoder.update_eti(2, TIME_CYCLE[2], 20, 6);
        // the committed (stale) MNSC seconds are inhibited
        decoder.update_eti(3, TIME_CYCLE[3], 30, 7);

        assert_eq!(decoder.snapshot().seconds, MARCH_5_2023 + 1);
    }

    #[test]
    fn edi_bypasses_inhibit_window() {
        let mut decoder = TimestampDecoder::new(0.0);
        // open the inhibit window
        decoder.update_eti(0, 0x0001, 100, 0);
        decoder.update_eti(1, 0x0000, 0, 1);

        decoder.update_edi(1000, 0, 2, 2);

        let ts = decoder.snapshot();
        assert!(ts.valid);
        assert_eq!(ts.seconds, 1000);
        assert_eq!(ts.ticks, 0);
        assert_eq!(ts.fct, 2);
    }

    #[test]
    fn refresh_flag_is_one_shot() {
        let mut decoder = TimestampDecoder::new(0.0);
        assert!(!decoder.snapshot().refresh);

        decoder.set_offset(0.25);
        assert!(decoder.snapshot().refresh);
        assert!(!decoder.snapshot().refresh);
    }

    #[test]
    fn snapshot_folds_offset() {
        let mut decoder = TimestampDecoder::new(0.0);
        decoder.update_edi(10, 0, 0, 0);
        decoder.set_offset(1.5);

        let ts = decoder.snapshot();
        assert_eq!(ts.seconds, 11);
        assert_eq!(ts.ticks, 8_192_000);
    }

    #[test]
    fn initial_offset_does_not_set_refresh() {
        let mut decoder = TimestampDecoder::new(0.5);
        let ts = decoder.snapshot();
        assert!(!ts.refresh);
        assert_eq!(ts.ticks, 8_192_000);
    }

    #[test]
    fn valid_never_reverts() {
        let mut decoder = TimestampDecoder::new(0.0);
        decoder.update_edi(1000, 0, 0, 0);
        assert!(decoder.snapshot().valid);

        // an unsynced MNSC cycle afterwards must not clear validity
        decoder.update_eti(0, TIME_CYCLE[0], 10, 1);
        decoder.update_eti(1, 0x1234, 20, 2);
        decoder.update_eti(2, TIME_CYCLE[2], 30, 3);
        decoder.update_eti(3, TIME_CYCLE[3], 40, 4);
        assert!(decoder.snapshot().valid);
    }
}
