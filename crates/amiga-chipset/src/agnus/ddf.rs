//! Data-fetch window computation.
//!
//! DDFSTRT and DDFSTOP only take effect at well-defined points, and
//! out-of-range values produce windows the hardware manual never mentions.
//! The window is therefore derived from the *reached* start/stop positions
//! of the current line, classified as small (< 0x18), medium, or large
//! (never reached), through the decision tables below. The enhanced chipset
//! adds a carry-over state: a window left open at the end of a line keeps
//! fetching from the hardware start on the next one.

use serde::Serialize;

/// Fetch state carried across lines on the enhanced chipset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DdfState {
    Off,
    On,
}

/// Horizontal fetch interval selected by the decision tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchInterval {
    /// No bitplane DMA this line.
    Empty,
    /// [DDFSTRT ; DDFSTOP]
    StrtStop,
    /// [DDFSTRT ; 0xD8]
    StrtD8,
    /// [0x18 ; DDFSTOP]
    H18Stop,
    /// [0x18 ; 0xD8]
    H18D8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Small,
    Medium,
    Large,
}

fn classify(reached: i16) -> Kind {
    if reached < 0 {
        Kind::Large
    } else if reached < 0x18 {
        Kind::Small
    } else {
        Kind::Medium
    }
}

/// Original chipset decision table (9 cases over start/stop kinds).
#[must_use]
pub fn ocs_fetch_interval(strt_reached: i16, stop_reached: i16) -> FetchInterval {
    match (classify(strt_reached), classify(stop_reached)) {
        (Kind::Small, Kind::Medium) => FetchInterval::H18Stop,
        (Kind::Small, Kind::Large) => FetchInterval::H18D8,
        (Kind::Medium, Kind::Medium) => FetchInterval::StrtStop,
        (Kind::Medium, Kind::Large) => FetchInterval::StrtD8,
        _ => FetchInterval::Empty,
    }
}

/// Enhanced chipset decision table (18 cases over start/stop kinds and the
/// carried fetch state). Returns the interval and the state for the next
/// line.
#[must_use]
pub fn ecs_fetch_interval(
    strt_reached: i16,
    stop_reached: i16,
    state: DdfState,
) -> (FetchInterval, DdfState) {
    let on = state == DdfState::On;
    match (classify(strt_reached), classify(stop_reached)) {
        (Kind::Small, Kind::Medium) => (FetchInterval::H18Stop, DdfState::Off),
        (Kind::Small, Kind::Large) => (FetchInterval::H18D8, DdfState::On),
        (Kind::Medium, Kind::Medium) if on => (FetchInterval::H18Stop, DdfState::Off),
        (Kind::Medium, Kind::Medium) => (FetchInterval::StrtStop, DdfState::Off),
        (Kind::Medium, Kind::Large) if on => (FetchInterval::H18D8, DdfState::On),
        (Kind::Medium, Kind::Large) => (FetchInterval::StrtD8, DdfState::On),
        (Kind::Large, Kind::Large) if on => (FetchInterval::H18D8, DdfState::On),
        _ => (FetchInterval::Empty, DdfState::Off),
    }
}

/// Fetch resolution of a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DdfResolution {
    /// Eight-cycle fetch units.
    Lores,
    /// Four-cycle fetch units.
    Hires,
}

/// The effective data-fetch window of one line, split into odd and even
/// plane ranges to model horizontal scrolling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DdfWindow {
    resolution: DdfResolution,
    pub strt_odd: i16,
    pub stop_odd: i16,
    pub strt_even: i16,
    pub stop_even: i16,
}

impl DdfWindow {
    #[must_use]
    pub fn new(resolution: DdfResolution) -> Self {
        Self {
            resolution,
            strt_odd: -1,
            stop_odd: -1,
            strt_even: -1,
            stop_even: -1,
        }
    }

    /// Mark the window empty.
    pub fn clear(&mut self) {
        self.strt_odd = -1;
        self.stop_odd = -1;
        self.strt_even = -1;
        self.stop_even = -1;
    }

    /// Derive the window from the reached DDF positions and the scroll
    /// values in BPLCON1. The scroll delays shift each parity's window to
    /// the left; the start is then aligned up to the next fetch unit
    /// boundary, and the length is a whole number of fetch units clipped at
    /// the hardware stop.
    pub fn compute(&mut self, strt: i16, stop: i16, bplcon1: u16) {
        let scroll_odd = (bplcon1 & 0xF) as i16;
        let scroll_even = ((bplcon1 >> 4) & 0xF) as i16;
        let units = ((stop - strt) + 15) >> 3;

        let (strt_odd, stop_odd) = self.compute_parity(strt, units, scroll_odd);
        let (strt_even, stop_even) = self.compute_parity(strt, units, scroll_even);
        self.strt_odd = strt_odd;
        self.stop_odd = stop_odd;
        self.strt_even = strt_even;
        self.stop_even = stop_even;
    }

    fn compute_parity(&self, strt: i16, units: i16, scroll: i16) -> (i16, i16) {
        let (shifted, align_mask) = match self.resolution {
            DdfResolution::Lores => (strt - (scroll >> 1), 7),
            DdfResolution::Hires => (strt - ((scroll & 7) >> 1), 3),
        };
        let start = shifted + ((align_mask + 1 - (shifted & align_mask)) & align_mask);
        let stop = (start + 8 * units).min(0xE0);
        (start, stop)
    }

    #[must_use]
    pub fn in_area_odd(&self, h: i16) -> bool {
        h >= self.strt_odd && h < self.stop_odd
    }

    #[must_use]
    pub fn in_area_even(&self, h: i16) -> bool {
        h >= self.strt_even && h < self.stop_even
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.strt_odd < 0 && self.strt_even < 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_window_without_scroll() {
        let mut win = DdfWindow::new(DdfResolution::Lores);
        win.compute(0x38, 0xD0, 0);
        // 0x38 is already fetch-unit aligned; (0xD0 - 0x38 + 15) >> 3 = 20
        // fetch units of 8 cycles each.
        assert_eq!(win.strt_odd, 0x38);
        assert_eq!(win.stop_odd, 0x38 + 8 * 20);
        assert_eq!(win.strt_even, 0x38);
        assert!(win.in_area_odd(0x38));
        assert!(!win.in_area_odd(0x37));
    }

    #[test]
    fn scroll_shifts_and_realigns() {
        let mut win = DdfWindow::new(DdfResolution::Lores);
        // Odd scroll of 2 pixels moves the raw start left by one cycle,
        // which then aligns up to the next fetch unit boundary.
        win.compute(0x38, 0xD0, 0x0002);
        assert_eq!(win.strt_odd, 0x38);
        assert_eq!(win.strt_even, 0x38);
    }

    #[test]
    fn stop_clips_at_hardware_limit() {
        let mut win = DdfWindow::new(DdfResolution::Lores);
        win.compute(0x18, 0xD8, 0);
        assert!(win.stop_odd <= 0xE0);
    }

    #[test]
    fn cleared_window_matches_nothing() {
        let mut win = DdfWindow::new(DdfResolution::Hires);
        win.compute(0x38, 0xD0, 0);
        win.clear();
        assert!(win.is_empty());
        assert!(!win.in_area_odd(0x40));
        assert!(!win.in_area_even(0x40));
    }

    #[test]
    fn ocs_table_selects_expected_intervals() {
        use FetchInterval::*;
        assert_eq!(ocs_fetch_interval(0x38, 0xD0), StrtStop);
        assert_eq!(ocs_fetch_interval(0x38, -1), StrtD8);
        assert_eq!(ocs_fetch_interval(0x10, 0xD0), H18Stop);
        assert_eq!(ocs_fetch_interval(0x10, -1), H18D8);
        assert_eq!(ocs_fetch_interval(-1, 0xD0), Empty);
        assert_eq!(ocs_fetch_interval(0x38, 0x10), Empty);
    }

    #[test]
    fn ecs_table_carries_fetch_state() {
        use FetchInterval::*;
        // A window left open keeps fetching from the hardware start.
        assert_eq!(
            ecs_fetch_interval(0x38, -1, DdfState::Off),
            (StrtD8, DdfState::On)
        );
        assert_eq!(
            ecs_fetch_interval(0x38, 0xD0, DdfState::On),
            (H18Stop, DdfState::Off)
        );
        assert_eq!(
            ecs_fetch_interval(-1, -1, DdfState::On),
            (H18D8, DdfState::On)
        );
        assert_eq!(
            ecs_fetch_interval(-1, -1, DdfState::Off),
            (Empty, DdfState::Off)
        );
    }
}
