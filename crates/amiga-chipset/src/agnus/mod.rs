//! Agnus: master clock, beam counters, DMA pointer registers, the DMA
//! timeslot tables, and bus arbitration.
//!
//! Every bus cycle has at most one owner. The fixed consumers (refresh,
//! disk, audio, sprites, bitplanes) are laid out by the per-line event
//! tables; the copper, the blitter, and the CPU compete for the remaining
//! cycles under the rules in [`Agnus::bus_is_free`].

pub mod ddf;
pub mod tables;

use bitflags::bitflags;
use serde::Serialize;

use crate::beam::{Beam, Frame, HPOS_CNT, HPOS_MAX};
use crate::config::{AgnusRevision, ChipsetConfig};
use crate::custom_regs::{self as regs};
use crate::host::ChipsetHost;
use crate::scheduler::{as_dma_cycles, dma_cycles, Cycle};

use ddf::{DdfResolution, DdfState, DdfWindow};
use tables::{BplEventId, DasEvent, BPL_NONE};

pub(crate) const HPOS: usize = HPOS_CNT as usize;

/// First scanline with sprite DMA.
pub const SPRITE_DMA_FIRST_LINE: u16 = 25;

/// Bus owner of one DMA cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[repr(u8)]
pub enum BusOwner {
    #[default]
    None = 0,
    Cpu,
    Refresh,
    Disk,
    Audio,
    Bitplane,
    Sprite,
    Copper,
    Blitter,
}

/// Number of distinct bus owners, for the statistics arrays.
pub const BUS_OWNER_COUNT: usize = 9;

impl BusOwner {
    #[must_use]
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub fn from_u8(value: u8) -> Option<BusOwner> {
        use BusOwner::*;
        const ALL: [BusOwner; BUS_OWNER_COUNT] =
            [None, Cpu, Refresh, Disk, Audio, Bitplane, Sprite, Copper, Blitter];
        ALL.get(usize::from(value)).copied()
    }
}

bitflags! {
    /// Work items executed by the next horizontal sync handler.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct HsyncActions: u8 {
        const PREDICT_DDF = 0b001;
        const UPDATE_BPL_TABLE = 0b010;
        const UPDATE_DAS_TABLE = 0b100;
    }
}

/// Sprite DMA sequencer state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum SpriteDmaState {
    #[default]
    Idle,
    Active,
}

/// Per-owner bus usage counters. `raw` counts cycles in the current frame;
/// `accumulated` is an exponentially smoothed per-frame average.
#[derive(Debug, Clone, Serialize)]
pub struct BusStats {
    pub raw: [u64; BUS_OWNER_COUNT],
    pub accumulated: [f64; BUS_OWNER_COUNT],
}

impl Default for BusStats {
    fn default() -> Self {
        Self {
            raw: [0; BUS_OWNER_COUNT],
            accumulated: [0.0; BUS_OWNER_COUNT],
        }
    }
}

#[derive(Clone)]
pub struct Agnus {
    revision: AgnusRevision,

    /// Master clock; the chipset has been executed up to this cycle.
    pub clock: Cycle,
    pub pos: Beam,
    pub frame: Frame,

    pub dmacon: u16,
    /// Gated disk/audio/sprite enable bits for the current line.
    pub dma_das: u16,
    pub bus_owner: [BusOwner; HPOS],
    pub bus_value: [u16; HPOS],
    /// Blitter slow-down: set once the CPU lost two consecutive cycles.
    pub bls: bool,

    // DMA pointer registers
    pub dskpt: u32,
    pub audpt: [u32; 4],
    pub audlc: [u32; 4],
    pub bplpt: [u32; 6],
    pub sprpt: [u32; 8],

    // Display window
    pub diwstrt: u16,
    pub diwstop: u16,
    pub diw_vstrt: i16,
    pub diw_vstop: i16,
    pub diw_hstrt: i16,
    pub diw_hstop: i16,
    pub diw_vflop: bool,

    // Data fetch window
    pub ddfstrt: u16,
    pub ddfstop: u16,
    pub ddfstrt_reached: i16,
    pub ddfstop_reached: i16,
    pub ddf_state: DdfState,
    pub ddf_vflop: bool,
    pub(crate) ocs_early_access_line: i16,
    pub ddf_lores: DdfWindow,
    pub ddf_hires: DdfWindow,

    // Bitplane control
    pub bplcon0: u16,
    pub bplcon1: u16,
    pub(crate) scroll_lores_odd: u16,
    pub(crate) scroll_lores_even: u16,
    pub(crate) scroll_hires_odd: u16,
    pub(crate) scroll_hires_even: u16,
    pub bpl1mod: i16,
    pub bpl2mod: i16,
    pub bpl_dma_line: bool,

    pub hsync_actions: HsyncActions,

    // Sprite sequencer
    pub spr_vstrt: [u16; 8],
    pub spr_vstop: [u16; 8],
    pub spr_dma_state: [SpriteDmaState; 8],

    // Static DMA allocation tables, built once at startup
    pub(crate) bpl_dma: [[[BplEventId; HPOS]; 7]; 2],
    pub(crate) das_dma: [[DasEvent; HPOS]; 64],

    // Per-line working tables and their jump tables
    pub bpl_event: [BplEventId; HPOS],
    pub das_event: [DasEvent; HPOS],
    pub next_bpl_event: [u8; HPOS],
    pub next_das_event: [u8; HPOS],

    pub stats: BusStats,
}

impl Agnus {
    #[must_use]
    pub fn new(config: &ChipsetConfig) -> Self {
        let mut agnus = Self {
            revision: config.revision,
            clock: 0,
            pos: Beam::default(),
            frame: Frame::new(config.standard),
            dmacon: 0,
            dma_das: 0,
            bus_owner: [BusOwner::None; HPOS],
            bus_value: [0; HPOS],
            bls: false,
            dskpt: 0,
            audpt: [0; 4],
            audlc: [0; 4],
            bplpt: [0; 6],
            sprpt: [0; 8],
            diwstrt: 0,
            diwstop: 0,
            diw_vstrt: 0,
            diw_vstop: 0,
            diw_hstrt: 0,
            diw_hstop: 0,
            diw_vflop: false,
            ddfstrt: 0,
            ddfstop: 0,
            ddfstrt_reached: -1,
            ddfstop_reached: -1,
            ddf_state: DdfState::Off,
            ddf_vflop: false,
            ocs_early_access_line: -1,
            ddf_lores: DdfWindow::new(DdfResolution::Lores),
            ddf_hires: DdfWindow::new(DdfResolution::Hires),
            bplcon0: 0,
            bplcon1: 0,
            scroll_lores_odd: 0,
            scroll_lores_even: 0,
            scroll_hires_odd: 0,
            scroll_hires_even: 0,
            bpl1mod: 0,
            bpl2mod: 0,
            bpl_dma_line: false,
            hsync_actions: HsyncActions::empty(),
            spr_vstrt: [0; 8],
            spr_vstop: [0; 8],
            spr_dma_state: [SpriteDmaState::Idle; 8],
            bpl_dma: [[[BPL_NONE; HPOS]; 7]; 2],
            das_dma: [[DasEvent::None; HPOS]; 64],
            bpl_event: [BPL_NONE; HPOS],
            das_event: [DasEvent::None; HPOS],
            next_bpl_event: [0; HPOS],
            next_das_event: [0; HPOS],
            stats: BusStats::default(),
        };
        agnus.init_lookup_tables();
        agnus
    }

    #[must_use]
    pub fn revision(&self) -> AgnusRevision {
        self.revision
    }

    #[must_use]
    pub fn chip_ram_mask(&self) -> u32 {
        self.revision.chip_ram_mask()
    }

    /// Number of active bitplanes encoded in a BPLCON0 value. Out-of-range
    /// BPU values fall back the way the original chipset decodes them.
    #[must_use]
    pub fn bpu_of(bplcon0: u16) -> u16 {
        let bpu = (bplcon0 >> 12) & 0b111;
        if bplcon0 & 0x8000 != 0 {
            if bpu < 5 {
                bpu
            } else {
                0
            }
        } else if bpu < 7 {
            bpu
        } else {
            4
        }
    }

    #[must_use]
    pub fn bpu(&self) -> u16 {
        Self::bpu_of(self.bplcon0)
    }

    #[must_use]
    pub fn hires(bplcon0: u16) -> bool {
        bplcon0 & 0x8000 != 0
    }

    /// Interlace bit of BPLCON0.
    #[must_use]
    pub fn lace(&self) -> bool {
        self.bplcon0 & 0x0004 != 0
    }

    fn dma_enabled(&self, bit: u16) -> bool {
        self.dmacon & regs::DMAF_DMAEN != 0 && self.dmacon & bit != 0
    }

    #[must_use]
    pub fn bpldma(&self) -> bool {
        self.dma_enabled(regs::DMAF_BPLEN)
    }

    #[must_use]
    pub fn copdma(&self) -> bool {
        self.dma_enabled(regs::DMAF_COPEN)
    }

    #[must_use]
    pub fn bltdma(&self) -> bool {
        self.dma_enabled(regs::DMAF_BLTEN)
    }

    #[must_use]
    pub fn dskdma(&self) -> bool {
        self.dma_enabled(regs::DMAF_DSKEN)
    }

    #[must_use]
    pub fn sprdma(&self) -> bool {
        self.dma_enabled(regs::DMAF_SPREN)
    }

    #[must_use]
    pub fn bltpri(&self) -> bool {
        self.dmacon & regs::DMAF_BLITHOG != 0
    }

    /// True if the line at the current vertical position fetches bitplanes.
    #[must_use]
    pub fn in_bpl_dma_line(&self) -> bool {
        self.ddf_vflop && self.bpu() > 0 && self.bpldma()
    }

    /// Disk/audio/sprite enable bits gated by the master enable and the
    /// vertical sprite DMA window.
    #[must_use]
    pub fn compute_dma_das(&self) -> u16 {
        if self.dmacon & regs::DMAF_DMAEN == 0 {
            return 0;
        }
        let mut das = self.dmacon & 0b111111;
        if self.pos.v < SPRITE_DMA_FIRST_LINE || self.pos.v >= self.frame.last_line() {
            das &= 0b011111;
        }
        das
    }

    //
    // Clock / beam arithmetic
    //

    #[must_use]
    pub fn cycles_in_frame(&self) -> Cycle {
        dma_cycles(i64::from(self.frame.num_lines()) * i64::from(HPOS_CNT))
    }

    #[must_use]
    pub fn start_of_frame(&self) -> Cycle {
        self.clock
            - dma_cycles(i64::from(self.pos.v) * i64::from(HPOS_CNT) + i64::from(self.pos.h))
    }

    #[must_use]
    pub fn start_of_next_frame(&self) -> Cycle {
        self.start_of_frame() + self.cycles_in_frame()
    }

    #[must_use]
    pub fn belongs_to_current_frame(&self, cycle: Cycle) -> bool {
        cycle >= self.start_of_frame() && cycle < self.start_of_next_frame()
    }

    #[must_use]
    pub fn beam_to_cycle(&self, beam: Beam) -> Cycle {
        self.start_of_frame()
            + dma_cycles(i64::from(beam.v) * i64::from(HPOS_CNT) + i64::from(beam.h))
    }

    #[must_use]
    pub fn cycle_to_beam(&self, cycle: Cycle) -> Beam {
        let diff = as_dma_cycles(cycle - self.start_of_frame());
        debug_assert!(diff >= 0);
        Beam {
            v: (diff / i64::from(HPOS_CNT)) as u16,
            h: (diff % i64::from(HPOS_CNT)) as u16,
        }
    }

    //
    // Register reads
    //

    /// DMACONR. Bits 14/13 mirror the blitter's busy/zero lines.
    #[must_use]
    pub fn peek_dmaconr(&self, blitter_busy: bool) -> u16 {
        let mut result = self.dmacon & 0x07FF;
        if blitter_busy {
            result |= regs::DMAF_BLTDONE;
        }
        result
    }

    /// VPOSR: LOF flag, chip identification, and bit 8 of the vertical
    /// counter.
    #[must_use]
    pub fn peek_vposr(&self) -> u16 {
        let mut result = (self.pos.v >> 8) & 1;
        if self.frame.is_long_frame() {
            result |= 0x8000;
        }
        result | (self.revision.id_bits() << 8)
    }

    /// VHPOSR: low vertical byte and horizontal position. The horizontal
    /// counter leads the DMA position by four cycles, and the new vertical
    /// value only becomes visible from cycle 2 of a line.
    #[must_use]
    pub fn peek_vhposr(&self) -> u16 {
        let mut posh = i32::from(self.pos.h) + 4;
        let mut posv = i32::from(self.pos.v);

        if posh > i32::from(HPOS_MAX) {
            posh -= i32::from(HPOS_CNT);
            posv += 1;
            if posv >= i32::from(self.frame.num_lines()) {
                posv = 0;
            }
        }

        if posh > 1 {
            return (((posv & 0xFF) as u16) << 8) | (posh as u16 & 0xFF);
        }
        let old_v = if posv > 0 {
            (posv - 1) as u16
        } else {
            self.frame.prev_last_line()
        };
        ((old_v & 0xFF) << 8) | (posh as u16 & 0xFF)
    }

    //
    // Bus arbitration
    //

    /// May `owner` take the current cycle? Does not claim the bus.
    #[must_use]
    pub fn bus_is_free(&self, owner: BusOwner) -> bool {
        if self.bus_owner[self.pos.h as usize] != BusOwner::None {
            return false;
        }
        match owner {
            BusOwner::Copper => {
                // Cycle 0xE0 is reserved; the copper never gets it.
                self.copdma() && self.pos.h != 0xE0
            }
            BusOwner::Blitter => self.bltdma(),
            _ => {
                debug_assert!(false, "bus_is_free called for {owner:?}");
                false
            }
        }
    }

    /// Claim the current cycle for `owner`. Returns false if the cycle is
    /// already taken or the dynamic rules deny the request.
    pub fn allocate_bus(&mut self, owner: BusOwner) -> bool {
        if self.bus_owner[self.pos.h as usize] != BusOwner::None {
            return false;
        }
        match owner {
            BusOwner::Copper => {
                self.set_bus_owner(BusOwner::Copper);
                true
            }
            BusOwner::Blitter => {
                if !self.bltdma() {
                    return false;
                }
                // The CPU has precedence once it starved, unless the
                // blitter-priority bit is set.
                if self.bls && !self.bltpri() {
                    return false;
                }
                self.set_bus_owner(BusOwner::Blitter);
                true
            }
            _ => {
                debug_assert!(false, "allocate_bus called for {owner:?}");
                false
            }
        }
    }

    fn set_bus_owner(&mut self, owner: BusOwner) {
        let h = self.pos.h as usize;
        debug_assert!(h < HPOS);
        // Accelerated transfers reuse a cycle for the same owner; a claim
        // over a different owner is a contract violation, resolved
        // last-writer-wins.
        if self.bus_owner[h] != BusOwner::None && self.bus_owner[h] != owner {
            debug_assert!(
                false,
                "bus cycle {:#X} claimed twice ({owner:?} over {:?})",
                h, self.bus_owner[h]
            );
            log::warn!(
                "bus cycle {:#X} claimed twice ({owner:?} over {:?})",
                h,
                self.bus_owner[h]
            );
        }
        self.bus_owner[h] = owner;
        self.stats.raw[owner as usize] += 1;
    }

    /// Record ownership and the transported value for the current cycle.
    fn record_bus(&mut self, owner: BusOwner, value: u16) {
        self.set_bus_owner(owner);
        self.bus_value[self.pos.h as usize] = value;
    }

    //
    // DMA transfers
    //

    /// Disk DMA, memory-to-controller direction.
    pub fn do_disk_dma_read<H: ChipsetHost>(&mut self, host: &mut H) -> u16 {
        let value = host.peek_chip16(self.dskpt & self.chip_ram_mask());
        self.dskpt = self.dskpt.wrapping_add(2);
        self.record_bus(BusOwner::Disk, value);
        value
    }

    /// Disk DMA, controller-to-memory direction.
    pub fn do_disk_dma_write<H: ChipsetHost>(&mut self, host: &mut H, value: u16) {
        host.poke_chip16(self.dskpt & self.chip_ram_mask(), value);
        self.dskpt = self.dskpt.wrapping_add(2);
        self.record_bus(BusOwner::Disk, value);
    }

    pub fn do_audio_dma<H: ChipsetHost>(&mut self, host: &mut H, channel: usize) -> u16 {
        let value = host.peek_chip16(self.audpt[channel] & self.chip_ram_mask());
        self.audpt[channel] = self.audpt[channel].wrapping_add(2);
        self.record_bus(BusOwner::Audio, value);
        value
    }

    pub fn do_bitplane_dma<H: ChipsetHost>(&mut self, host: &mut H, plane: usize) -> u16 {
        let value = host.peek_chip16(self.bplpt[plane] & self.chip_ram_mask());
        self.bplpt[plane] = self.bplpt[plane].wrapping_add(2);
        self.record_bus(BusOwner::Bitplane, value);
        value
    }

    pub fn do_sprite_dma<H: ChipsetHost>(&mut self, host: &mut H, nr: usize) -> u16 {
        let value = host.peek_chip16(self.sprpt[nr] & self.chip_ram_mask());
        self.sprpt[nr] = self.sprpt[nr].wrapping_add(2);
        self.record_bus(BusOwner::Sprite, value);
        value
    }

    /// Memory refresh occupies the cycle without transporting data.
    pub fn do_refresh_dma(&mut self) {
        self.set_bus_owner(BusOwner::Refresh);
    }

    pub fn do_copper_dma_read<H: ChipsetHost>(&mut self, host: &mut H, addr: u32) -> u16 {
        let value = host.peek16(BusOwner::Copper, addr & self.chip_ram_mask());
        self.bus_value[self.pos.h as usize] = value;
        self.stats.raw[BusOwner::Copper as usize] += 1;
        value
    }

    /// Blitter word read on a cycle previously claimed via
    /// [`allocate_bus`](Agnus::allocate_bus).
    pub fn do_blitter_dma_read<H: ChipsetHost>(&mut self, host: &mut H, addr: u32) -> u16 {
        debug_assert_eq!(self.bus_owner[self.pos.h as usize], BusOwner::Blitter);
        let value = host.peek16(BusOwner::Blitter, addr & self.chip_ram_mask());
        self.bus_value[self.pos.h as usize] = value;
        self.stats.raw[BusOwner::Blitter as usize] += 1;
        value
    }

    /// Blitter word write on a cycle previously claimed via
    /// [`allocate_bus`](Agnus::allocate_bus).
    pub fn do_blitter_dma_write<H: ChipsetHost>(&mut self, host: &mut H, addr: u32, value: u16) {
        debug_assert_eq!(self.bus_owner[self.pos.h as usize], BusOwner::Blitter);
        host.poke16(BusOwner::Blitter, addr & self.chip_ram_mask(), value);
        self.bus_value[self.pos.h as usize] = value;
        self.stats.raw[BusOwner::Blitter as usize] += 1;
    }

    //
    // Sprite sequencer
    //

    /// Agnus-side SPRxPOS: bits 15-8 hold the low vertical start byte.
    pub fn poke_sprx_pos(&mut self, nr: usize, value: u16) {
        self.spr_vstrt[nr] = (self.spr_vstrt[nr] & 0x100) | (value >> 8);
    }

    /// Agnus-side SPRxCTL: vertical stop and the high vertical bits.
    pub fn poke_sprx_ctl(&mut self, nr: usize, value: u16) {
        self.spr_vstop[nr] = (value >> 8) | ((value & 0b010) << 7);
        self.spr_vstrt[nr] = (self.spr_vstrt[nr] & 0x0FF) | ((value & 0b100) << 6);
    }

    /// Update the sprite DMA sequencer; called by the sprite-DMA-start
    /// marker event near the end of each line. The sprite logic sees the
    /// vertical counter of the line to come.
    pub fn update_sprite_dma(&mut self) {
        let v = self.pos.v + 1;

        // The vertical triggers rearm at the top of the sprite area.
        if v == SPRITE_DMA_FIRST_LINE && self.sprdma() {
            self.spr_vstop = [SPRITE_DMA_FIRST_LINE; 8];
            return;
        }

        if v == self.frame.last_line() {
            self.spr_dma_state = [SpriteDmaState::Idle; 8];
            return;
        }

        for nr in 0..8 {
            if v == self.spr_vstrt[nr] {
                self.spr_dma_state[nr] = SpriteDmaState::Active;
            }
            if v == self.spr_vstop[nr] {
                self.spr_dma_state[nr] = SpriteDmaState::Idle;
            }
        }
    }

    //
    // Statistics
    //

    pub fn clear_stats(&mut self) {
        self.stats = BusStats::default();
    }

    /// Fold the per-frame counters into the smoothed averages.
    pub fn update_stats(&mut self) {
        const W: f64 = 0.5;
        for i in 0..BUS_OWNER_COUNT {
            self.stats.accumulated[i] =
                W * self.stats.accumulated[i] + (1.0 - W) * self.stats.raw[i] as f64;
            self.stats.raw[i] = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VideoStandard;

    fn make_agnus() -> Agnus {
        Agnus::new(&ChipsetConfig::default())
    }

    #[test]
    fn bpu_decoding_clamps_invalid_values() {
        assert_eq!(Agnus::bpu_of(0x0000), 0);
        assert_eq!(Agnus::bpu_of(0x6000), 6);
        assert_eq!(Agnus::bpu_of(0x7000), 4); // invalid lores BPU
        assert_eq!(Agnus::bpu_of(0x8000 | 0x4000), 4);
        assert_eq!(Agnus::bpu_of(0x8000 | 0x5000), 0); // invalid hires BPU
    }

    #[test]
    fn dma_checks_require_master_enable() {
        let mut agnus = make_agnus();
        agnus.dmacon = regs::DMAF_COPEN;
        assert!(!agnus.copdma());
        agnus.dmacon |= regs::DMAF_DMAEN;
        assert!(agnus.copdma());
    }

    #[test]
    fn copper_denied_in_reserved_cycle() {
        let mut agnus = make_agnus();
        agnus.dmacon = regs::DMAF_DMAEN | regs::DMAF_COPEN;
        agnus.pos.h = 0xE0;
        assert!(!agnus.bus_is_free(BusOwner::Copper));
        agnus.pos.h = 0x50;
        assert!(agnus.bus_is_free(BusOwner::Copper));
    }

    #[test]
    fn blitter_defers_to_starved_cpu() {
        let mut agnus = make_agnus();
        agnus.dmacon = regs::DMAF_DMAEN | regs::DMAF_BLTEN;
        agnus.bls = true;
        assert!(!agnus.allocate_bus(BusOwner::Blitter));

        agnus.dmacon |= regs::DMAF_BLITHOG;
        assert!(agnus.allocate_bus(BusOwner::Blitter));
        assert_eq!(agnus.bus_owner[agnus.pos.h as usize], BusOwner::Blitter);
    }

    #[test]
    fn beam_cycle_round_trip() {
        let mut agnus = make_agnus();
        agnus.clock = dma_cycles(5 * i64::from(HPOS_CNT) + 17);
        agnus.pos = Beam::new(5, 17);

        let beam = Beam::new(40, 0x30);
        let cycle = agnus.beam_to_cycle(beam);
        assert_eq!(agnus.cycle_to_beam(cycle), beam);
    }

    #[test]
    fn vhposr_leads_the_dma_position() {
        let mut agnus = make_agnus();
        agnus.pos = Beam::new(0x2C, 0x40);
        assert_eq!(agnus.peek_vhposr(), 0x2C44);
    }

    #[test]
    fn vhposr_wraps_into_next_line() {
        let mut agnus = make_agnus();
        agnus.pos = Beam::new(1, HPOS_MAX);
        // 0xE2 + 4 wraps to cycle 3 of line 2.
        assert_eq!(agnus.peek_vhposr(), 0x0203);
    }

    #[test]
    fn vhposr_keeps_old_vertical_value_early_in_line() {
        let mut agnus = make_agnus();
        agnus.pos = Beam::new(3, HPOS_MAX - 3);
        // Wraps to cycle 0 of line 4, but the old vertical value 3 is
        // still visible.
        assert_eq!(agnus.peek_vhposr(), 0x0300);
    }

    #[test]
    fn vposr_reports_lof_and_id() {
        let mut agnus = make_agnus();
        assert_eq!(agnus.peek_vposr() & 0x8000, 0x8000);
        assert_eq!(agnus.peek_vposr() & 0x2000, 0x2000); // ECS id bits
        agnus.pos.v = 256;
        assert_eq!(agnus.peek_vposr() & 1, 1);
    }

    #[test]
    fn sprite_sequencer_activates_between_vstrt_and_vstop() {
        let mut agnus = make_agnus();
        agnus.frame = Frame::new(VideoStandard::Pal);
        agnus.dmacon = regs::DMAF_DMAEN | regs::DMAF_SPREN;
        agnus.spr_vstrt[2] = 100;
        agnus.spr_vstop[2] = 102;

        agnus.pos.v = 99;
        agnus.update_sprite_dma();
        assert_eq!(agnus.spr_dma_state[2], SpriteDmaState::Active);

        agnus.pos.v = 101;
        agnus.update_sprite_dma();
        assert_eq!(agnus.spr_dma_state[2], SpriteDmaState::Idle);
    }
}
