//! The chipset integration layer.
//!
//! Owns the scheduler, Agnus, the copper, the disk controller, and the
//! interrupt aggregator, and drives one horizontal scanline at bus-cycle
//! granularity. All cross-component logic lives here; the components
//! themselves only hold their own registers and decision logic.
//!
//! The core is single-threaded and cooperative: a single loop advances the
//! clock and dispatches events, and the only suspension point is
//! [`execute_until`](Chipset::execute_until) returning. Out-of-band readers
//! get a mutex-guarded copy of the observable state via
//! [`inspect`](Chipset::inspect).

use std::sync::{Arc, Mutex};

use serde::Serialize;

use crate::agnus::tables::{bpl_base, bpl_plane, DasEvent, BPL_EOL};
use crate::agnus::{Agnus, BusOwner, HsyncActions, SpriteDmaState, HPOS};
use crate::beam::{Beam, HPOS_CNT, HPOS_MAX};
use crate::config::ChipsetConfig;
use crate::copper::Copper;
use crate::custom_regs::{self as regs, set_clr_write};
use crate::disk::{
    DiskController, DiskDmaState, DsklenAction, MIN_SWAP_DELAY_SEC, ROTATION_PERIOD_DMA,
};
use crate::host::{ChipsetHost, PokeSource};
use crate::irq::{InterruptAggregator, IrqSource};
use crate::scheduler::{
    as_cpu_cycles, as_dma_cycles, dma_cycles, sec, Cycle, EventId, EventSlot, Scheduler, Slot,
    NEVER, SLOT_COUNT,
};

/// Registers whose writes take effect a few cycles after the poke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u8)]
pub enum ChangeReg {
    Dmacon = 0,
    Diwstrt,
    Diwstop,
    Ddfstrt,
    Ddfstop,
    Bplcon0,
    Bplcon1,
}

impl ChangeReg {
    #[must_use]
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub fn from_u8(value: u8) -> Option<ChangeReg> {
        use ChangeReg::*;
        [Dmacon, Diwstrt, Diwstop, Ddfstrt, Ddfstop, Bplcon0, Bplcon1]
            .get(usize::from(value))
            .copied()
    }
}

/// A recorded register change waiting for its trigger cycle.
#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub(crate) struct RegChange {
    pub trigger: Cycle,
    pub reg: ChangeReg,
    pub value: u16,
}

/// Pending delayed register changes, kept sorted by trigger; changes with
/// equal triggers apply in insertion order.
#[derive(Debug, Clone, Default, Serialize)]
pub(crate) struct ChangeRecorder {
    pub pending: Vec<RegChange>,
}

impl ChangeRecorder {
    fn insert(&mut self, trigger: Cycle, reg: ChangeReg, value: u16) {
        let idx = self.pending.partition_point(|c| c.trigger <= trigger);
        self.pending.insert(idx, RegChange { trigger, reg, value });
    }

    fn next_trigger(&self) -> Cycle {
        self.pending.first().map_or(NEVER, |c| c.trigger)
    }

    fn pop_due(&mut self, clock: Cycle) -> Option<RegChange> {
        if self.pending.first()?.trigger <= clock {
            Some(self.pending.remove(0))
        } else {
            None
        }
    }
}

/// Working copy of the chipset-level control state, used by the snapshot
/// machinery so load errors never leave the live state half-written.
#[derive(Clone)]
pub(crate) struct ControlState {
    pub adkcon: u16,
    pub blitter_busy: bool,
    pub changes: ChangeRecorder,
}

//
// Inspection snapshots
//

#[derive(Debug, Clone, Default, Serialize)]
pub struct AgnusInfo {
    pub clock: Cycle,
    pub vpos: u16,
    pub hpos: u16,
    pub frame: i64,
    pub lof: bool,
    pub dmacon: u16,
    pub dma_das: u16,
    pub bplcon0: u16,
    pub bplcon1: u16,
    pub bpu: u16,
    pub ddfstrt: u16,
    pub ddfstop: u16,
    pub diwstrt: u16,
    pub diwstop: u16,
    pub bpl1mod: i16,
    pub bpl2mod: i16,
    pub bls: bool,
    pub dskpt: u32,
    pub bplpt: [u32; 6],
    pub audpt: [u32; 4],
    pub audlc: [u32; 4],
    pub sprpt: [u32; 8],
    pub bus_usage: [u64; crate::agnus::BUS_OWNER_COUNT],
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CopperInfo {
    pub coppc: u32,
    pub coplc: [u32; 2],
    pub copins1: u16,
    pub copins2: u16,
    pub cdang: bool,
    pub skip: bool,
    /// True while the copper slot is armed.
    pub active: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DiskControllerInfo {
    pub selected: i8,
    pub state: DiskDmaState,
    pub dsklen: u16,
    pub dsksync: u16,
    pub prb: u8,
    pub sync_flag: bool,
    pub fifo_count: u8,
    pub fifo: [u8; 6],
    pub underruns: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IrqInfo {
    pub intreq: u16,
    pub intena: u16,
    pub level: u8,
}

/// The observable state handed to out-of-band readers.
#[derive(Debug, Clone, Serialize)]
pub struct ChipsetInfo {
    pub agnus: AgnusInfo,
    pub copper: CopperInfo,
    pub disk: DiskControllerInfo,
    pub irq: IrqInfo,
    pub slots: [EventSlot; SLOT_COUNT],
}

impl Default for ChipsetInfo {
    fn default() -> Self {
        Self {
            agnus: AgnusInfo::default(),
            copper: CopperInfo::default(),
            disk: DiskControllerInfo::default(),
            irq: IrqInfo::default(),
            slots: [EventSlot::default(); SLOT_COUNT],
        }
    }
}

//
// The chipset core
//

pub struct Chipset {
    pub config: ChipsetConfig,
    pub scheduler: Scheduler,
    pub agnus: Agnus,
    pub copper: Copper,
    pub disk: DiskController,
    pub irq: InterruptAggregator,
    /// Audio/disk control register; the core consumes the sync-required
    /// bit, the rest is latched for external readers.
    pub adkcon: u16,
    pub(crate) change_recorder: ChangeRecorder,
    pub(crate) blitter_busy: bool,
    suspended: bool,
    inspection: Arc<Mutex<ChipsetInfo>>,
}

impl Chipset {
    #[must_use]
    pub fn new(config: ChipsetConfig) -> Self {
        let mut chipset = Self {
            config,
            scheduler: Scheduler::new(),
            agnus: Agnus::new(&config),
            copper: Copper::new(),
            disk: DiskController::new(),
            irq: InterruptAggregator::new(),
            adkcon: 0,
            change_recorder: ChangeRecorder::default(),
            blitter_busy: false,
            suspended: false,
            inspection: Arc::new(Mutex::new(ChipsetInfo::default())),
        };
        chipset.reset();
        chipset
    }

    /// Reset to the power-on state and arm the initial events.
    pub fn reset(&mut self) {
        let config = self.config;
        self.agnus = Agnus::new(&config);
        self.copper.reset();
        self.disk.reset();
        self.irq.reset();
        self.adkcon = 0;
        self.change_recorder = ChangeRecorder::default();
        self.blitter_busy = false;
        self.suspended = false;

        // Seed the per-line tables for an idle line.
        for i in 0..HPOS {
            self.agnus.bpl_event[i] = self.agnus.bpl_dma[0][0][i];
            self.agnus.das_event[i] = self.agnus.das_dma[0][i];
        }
        self.agnus.update_bpl_jump_table(HPOS_MAX as usize);
        self.agnus.update_das_jump_table(HPOS_MAX as usize);

        self.scheduler.clear();
        self.scheduler.schedule_abs(
            Slot::Raster,
            dma_cycles(i64::from(HPOS_CNT)),
            EventId::RasHsync,
            0,
        );
        self.scheduler
            .schedule_abs(Slot::Vbl, dma_cycles(1), EventId::VblStrobe, 0);
        self.scheduler
            .schedule_abs(Slot::Irq, NEVER, EventId::IrqCheck, 0);
        self.schedule_next_bpl_event();
        self.schedule_next_das_event();
    }

    #[must_use]
    pub fn clock(&self) -> Cycle {
        self.agnus.clock
    }

    #[must_use]
    pub fn beam(&self) -> Beam {
        self.agnus.pos
    }

    #[must_use]
    pub fn blitter_busy(&self) -> bool {
        self.blitter_busy
    }

    /// Reported by the external blitter; gates copper WAITs carrying the
    /// blitter-finished-disable flag and the DMACONR busy bit.
    pub fn set_blitter_busy(&mut self, busy: bool) {
        self.blitter_busy = busy;
    }

    /// Stop the cycle loop at the next cycle boundary.
    pub fn suspend(&mut self) {
        self.suspended = true;
    }

    pub fn resume(&mut self) {
        self.suspended = false;
    }

    #[must_use]
    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    //
    // Scheduling interface
    //

    /// Arm a slot with an absolute trigger. Scheduling into the past is a
    /// contract violation.
    pub fn schedule_abs(&mut self, slot: Slot, trigger: Cycle, id: EventId, data: i64) {
        if trigger < self.agnus.clock {
            debug_assert!(
                false,
                "event scheduled into the past: {slot:?} at {trigger} (clock {})",
                self.agnus.clock
            );
            log::warn!(
                "event scheduled into the past: {slot:?} at {trigger} (clock {})",
                self.agnus.clock
            );
        }
        self.scheduler.schedule_abs(slot, trigger, id, data);
    }

    /// Arm a slot relative to the current clock.
    pub fn schedule_rel(&mut self, slot: Slot, delta: Cycle, id: EventId, data: i64) {
        self.scheduler
            .schedule_abs(slot, self.agnus.clock + delta, id, data);
    }

    /// Disarm a slot.
    pub fn cancel(&mut self, slot: Slot) {
        self.scheduler.cancel(slot);
    }

    fn schedule_copper_rel(&mut self, delta: Cycle, id: EventId) {
        self.schedule_rel(Slot::Copper, delta, id, 0);
    }

    //
    // The execute loop
    //

    /// Advance one bus cycle: step the clock and the horizontal counter,
    /// then dispatch everything that came due.
    pub fn execute<H: ChipsetHost>(&mut self, host: &mut H) {
        self.agnus.clock += dma_cycles(1);
        self.agnus.pos.h += 1;
        if self.scheduler.next_trigger() <= self.agnus.clock {
            self.execute_events(host);
        }
        debug_assert!(self.agnus.pos.h <= HPOS_MAX);
    }

    /// Advance to `target_clock`, dispatching events on the way. If nothing
    /// is due before the target, the clock and the horizontal counter jump
    /// there directly; the result is indistinguishable from stepping every
    /// cycle.
    pub fn execute_until<H: ChipsetHost>(&mut self, host: &mut H, target_clock: Cycle) {
        let target = target_clock & !(dma_cycles(1) - 1);
        let cycles = as_dma_cycles(target - self.agnus.clock);
        if cycles <= 0 || self.suspended {
            return;
        }

        if target < self.scheduler.next_trigger() {
            self.agnus.clock = target;
            self.agnus.pos.h += cycles as u16;
            debug_assert!(self.agnus.pos.h <= HPOS_MAX);
        } else {
            for _ in 0..cycles {
                if self.suspended {
                    break;
                }
                self.execute(host);
            }
        }
    }

    /// Spin the core forward until the CPU can have the bus, charging it
    /// the wait states. Two consecutive denied cycles assert the
    /// blitter-slow-down line.
    pub fn execute_until_bus_is_free<H: ChipsetHost>(&mut self, host: &mut H) {
        if self.agnus.bus_owner[self.agnus.pos.h as usize] != BusOwner::None {
            let mut delay = 0i64;
            loop {
                self.execute(host);
                delay += 1;
                if delay == 2 {
                    self.agnus.bls = true;
                }
                if self.agnus.bus_owner[self.agnus.pos.h as usize] == BusOwner::None {
                    break;
                }
            }
            self.agnus.bls = false;
            host.add_wait_states(as_cpu_cycles(dma_cycles(delay)));
        }

        let h = self.agnus.pos.h as usize;
        self.agnus.bus_owner[h] = BusOwner::Cpu;
        self.agnus.stats.raw[BusOwner::Cpu as usize] += 1;
    }

    fn execute_events<H: ChipsetHost>(&mut self, host: &mut H) {
        while let Some(slot) = self.scheduler.due_slot(self.agnus.clock) {
            let ev = self.scheduler.slots[slot.index()];
            // Disarm before dispatch; handlers re-arm their slot as needed.
            self.scheduler.cancel(slot);
            self.dispatch(host, slot, ev.id, ev.data);
        }
    }

    fn dispatch<H: ChipsetHost>(&mut self, host: &mut H, slot: Slot, id: EventId, data: i64) {
        match slot {
            Slot::Reg => self.service_reg_event(),
            Slot::Raster => self.service_raster_event(host),
            Slot::Bpl => self.service_bpl_event(host, data as u8),
            Slot::Das => self.service_das_event(host, data as u8),
            Slot::Copper => self.service_copper_event(host, id, data),
            Slot::Vbl => self.service_vbl_event(),
            Slot::DiskRotate => self.service_disk_event(host),
            Slot::DiskChange => self.service_disk_change_event(host, id, data),
            Slot::Irq => self.service_irq_event(),
            _ => host.service_external_event(slot, id, data),
        }
    }

    //
    // Horizontal and vertical sync
    //

    fn service_raster_event<H: ChipsetHost>(&mut self, host: &mut H) {
        debug_assert_eq!(self.agnus.pos.h, HPOS_CNT);

        self.agnus.pos.h = 0;
        self.agnus.pos.v += 1;
        if self.agnus.pos.v >= self.agnus.frame.num_lines() {
            self.vsync_handler(host);
        }

        // Vertical display window flipflop.
        if i32::from(self.agnus.pos.v) == i32::from(self.agnus.diw_vstrt) && !self.agnus.diw_vflop
        {
            self.agnus.diw_vflop = true;
        }
        if i32::from(self.agnus.pos.v) == i32::from(self.agnus.diw_vstop) && self.agnus.diw_vflop {
            self.agnus.diw_vflop = false;
        }

        // The fetch flipflop follows the display window outside the last
        // rasterline.
        self.agnus.ddf_vflop =
            self.agnus.pos.v != self.agnus.frame.last_line() && self.agnus.diw_vflop;

        // Bitplane DMA status for the line to come.
        let new_bpl_dma = self.agnus.in_bpl_dma_line();
        if new_bpl_dma != self.agnus.bpl_dma_line {
            self.agnus.hsync_actions |= HsyncActions::UPDATE_BPL_TABLE;
            self.agnus.bpl_dma_line = new_bpl_dma;
        }

        // Disk, audio, and sprite DMA status for the line to come.
        let new_das = self.agnus.compute_dma_das();
        if new_das != self.agnus.dma_das {
            self.agnus.hsync_actions |= HsyncActions::UPDATE_DAS_TABLE;
            self.agnus.dma_das = new_das;
        }

        // Pending per-line work items.
        if self.agnus.hsync_actions.contains(HsyncActions::PREDICT_DDF) {
            self.agnus.hsync_actions.remove(HsyncActions::PREDICT_DDF);
            self.predict_ddf();
        }
        if self
            .agnus
            .hsync_actions
            .contains(HsyncActions::UPDATE_BPL_TABLE)
        {
            self.agnus.hsync_actions.remove(HsyncActions::UPDATE_BPL_TABLE);
            self.agnus.update_bpl_events();
        }
        if self
            .agnus
            .hsync_actions
            .contains(HsyncActions::UPDATE_DAS_TABLE)
        {
            self.agnus.hsync_actions.remove(HsyncActions::UPDATE_DAS_TABLE);
            let das = self.agnus.dma_das;
            self.agnus.update_das_events(das);
        }

        // Clear the bus usage table.
        self.agnus.bus_owner = [BusOwner::None; HPOS];
        self.agnus.bus_value = [0; HPOS];

        // Arm the first events of the new line.
        self.schedule_next_bpl_event();
        self.schedule_next_das_event();
        self.schedule_rel(
            Slot::Raster,
            dma_cycles(i64::from(HPOS_CNT)),
            EventId::RasHsync,
            0,
        );

        host.end_of_line(self.agnus.pos.v);
    }

    fn vsync_handler<H: ChipsetHost>(&mut self, host: &mut H) {
        let lace = self.agnus.lace();
        self.agnus.frame.next(lace);
        self.agnus.pos.v = 0;
        self.agnus.diw_vflop = false;

        // The copper restarts from COP1LC shortly into every frame.
        self.schedule_copper_rel(dma_cycles(4), EventId::CopJmp1);

        self.agnus.update_stats();
        host.end_of_frame(self.agnus.frame.nr);
    }

    fn service_vbl_event(&mut self) {
        self.irq.raise(IrqSource::VertB);
        let frame = self.agnus.cycles_in_frame();
        self.schedule_rel(Slot::Vbl, frame, EventId::VblStrobe, 0);
    }

    //
    // Data-fetch window maintenance
    //

    fn predict_ddf(&mut self) {
        let old_lores = self.agnus.ddf_lores;
        let old_hires = self.agnus.ddf_hires;
        let old_state = self.agnus.ddf_state;

        self.agnus.ddfstrt_reached = if self.agnus.ddfstrt < HPOS_CNT {
            self.agnus.ddfstrt as i16
        } else {
            -1
        };
        self.agnus.ddfstop_reached = if self.agnus.ddfstop < HPOS_CNT {
            self.agnus.ddfstop as i16
        } else {
            -1
        };
        self.compute_ddf_window();

        if self.agnus.ddf_lores != old_lores
            || self.agnus.ddf_hires != old_hires
            || self.agnus.ddf_state != old_state
        {
            self.agnus.hsync_actions |=
                HsyncActions::UPDATE_BPL_TABLE | HsyncActions::PREDICT_DDF;
        }
    }

    fn compute_ddf_window(&mut self) {
        if self.config.revision.is_ocs() {
            self.compute_ddf_window_ocs();
        } else {
            self.compute_ddf_window_ecs();
        }
    }

    fn compute_ddf_window_ocs(&mut self) {
        use crate::agnus::ddf::{ocs_fetch_interval, DdfState};

        // The early-access scan-line effect: a genuinely small DDFSTRT
        // enables DMA only every other line.
        if (0..0x18).contains(&self.agnus.ddfstrt_reached) {
            if self.agnus.ocs_early_access_line == i16::try_from(self.agnus.pos.v).unwrap_or(-1) {
                let strt = self.agnus.ddfstrt_reached;
                let stop = self.agnus.ddfstop_reached;
                let bplcon1 = self.agnus.bplcon1;
                self.agnus.ddf_lores.compute(strt, stop, bplcon1);
                self.agnus.ddf_hires.compute(strt, stop, bplcon1);
            } else {
                self.agnus.ddf_lores.clear();
                self.agnus.ddf_hires.clear();
                self.agnus.ocs_early_access_line = self.agnus.pos.v as i16 + 1;
            }
            return;
        }

        let interval =
            ocs_fetch_interval(self.agnus.ddfstrt_reached, self.agnus.ddfstop_reached);
        self.apply_fetch_interval(interval);
        self.agnus.ddf_state = DdfState::Off;
    }

    fn compute_ddf_window_ecs(&mut self) {
        use crate::agnus::ddf::ecs_fetch_interval;

        let (interval, next_state) = ecs_fetch_interval(
            self.agnus.ddfstrt_reached,
            self.agnus.ddfstop_reached,
            self.agnus.ddf_state,
        );
        self.apply_fetch_interval(interval);
        self.agnus.ddf_state = next_state;
    }

    fn apply_fetch_interval(&mut self, interval: crate::agnus::ddf::FetchInterval) {
        use crate::agnus::ddf::FetchInterval::*;

        let (strt, stop) = match interval {
            Empty => {
                self.agnus.ddf_lores.clear();
                self.agnus.ddf_hires.clear();
                return;
            }
            StrtStop => (self.agnus.ddfstrt_reached, self.agnus.ddfstop_reached),
            StrtD8 => (self.agnus.ddfstrt_reached, 0xD8),
            H18Stop => (0x18, self.agnus.ddfstop_reached),
            H18D8 => (0x18, 0xD8),
        };
        let bplcon1 = self.agnus.bplcon1;
        self.agnus.ddf_lores.compute(strt, stop, bplcon1);
        self.agnus.ddf_hires.compute(strt, stop, bplcon1);
    }

    //
    // Bitplane and DAS event service
    //

    fn schedule_next_bpl_event(&mut self) {
        let h = (self.agnus.pos.h as usize).min(HPOS - 1);
        let next = self.agnus.next_bpl_event[h];
        if next != 0 {
            let trigger = self
                .agnus
                .beam_to_cycle(Beam::new(self.agnus.pos.v, u16::from(next)));
            let entry = self.agnus.bpl_event[usize::from(next)];
            self.scheduler
                .schedule_abs(Slot::Bpl, trigger, EventId::BplFetch, i64::from(entry));
        } else {
            self.scheduler.cancel(Slot::Bpl);
        }
    }

    fn schedule_next_das_event(&mut self) {
        let h = (self.agnus.pos.h as usize).min(HPOS - 1);
        let next = self.agnus.next_das_event[h];
        if next != 0 {
            let trigger = self
                .agnus
                .beam_to_cycle(Beam::new(self.agnus.pos.v, u16::from(next)));
            let entry = self.agnus.das_event[usize::from(next)];
            self.scheduler.schedule_abs(
                Slot::Das,
                trigger,
                EventId::DasService,
                i64::from(entry.to_code()),
            );
        } else {
            self.scheduler.cancel(Slot::Das);
        }
    }

    fn service_bpl_event<H: ChipsetHost>(&mut self, host: &mut H, entry: u8) {
        if let Some(plane) = bpl_plane(entry) {
            let value = self.agnus.do_bitplane_dma(host, plane);
            let reg = regs::BPL1DAT + 2 * plane as u16;
            host.poke_custom16(PokeSource::Agnus, reg, value);
        } else if bpl_base(entry) == BPL_EOL {
            // End of line: add the modulos to the active plane pointers.
            if self.agnus.bpl_dma_line {
                let planes = self.agnus.bpu() as usize;
                for i in 0..planes {
                    let modulo = if i % 2 == 0 {
                        self.agnus.bpl1mod
                    } else {
                        self.agnus.bpl2mod
                    };
                    self.agnus.bplpt[i] =
                        self.agnus.bplpt[i].wrapping_add(modulo as i32 as u32);
                }
            }
        }
        // Shift-register and draw-only entries occupy no bus cycle.

        self.schedule_next_bpl_event();
    }

    fn service_das_event<H: ChipsetHost>(&mut self, host: &mut H, code: u8) {
        match DasEvent::from_code(code) {
            Some(DasEvent::Refresh) => self.agnus.do_refresh_dma(),
            Some(DasEvent::Disk(_)) => self.perform_disk_dma(host),
            Some(DasEvent::Audio(ch)) => {
                let value = self.agnus.do_audio_dma(host, usize::from(ch));
                let reg = regs::AUD0DAT + 0x10 * u16::from(ch);
                host.poke_custom16(PokeSource::Agnus, reg, value);
            }
            Some(DasEvent::Sprite { nr, second: false }) => {
                self.execute_first_sprite_cycle(host, usize::from(nr));
            }
            Some(DasEvent::Sprite { nr, second: true }) => {
                self.execute_second_sprite_cycle(host, usize::from(nr));
            }
            Some(DasEvent::SpriteDmaStart) => self.agnus.update_sprite_dma(),
            Some(DasEvent::None) | None => {}
        }
        self.schedule_next_das_event();
    }

    fn execute_first_sprite_cycle<H: ChipsetHost>(&mut self, host: &mut H, nr: usize) {
        if self.agnus.pos.v == self.agnus.spr_vstop[nr] {
            // Fetch the next control word (POS half).
            self.agnus.spr_dma_state[nr] = SpriteDmaState::Idle;
            let value = self.agnus.do_sprite_dma(host, nr);
            self.agnus.poke_sprx_pos(nr, value);
            host.poke_custom16(PokeSource::Agnus, regs::SPR0POS + 8 * nr as u16, value);
        } else if self.agnus.spr_dma_state[nr] == SpriteDmaState::Active {
            let value = self.agnus.do_sprite_dma(host, nr);
            host.poke_custom16(PokeSource::Agnus, regs::SPR0DATA + 8 * nr as u16, value);
        }
    }

    fn execute_second_sprite_cycle<H: ChipsetHost>(&mut self, host: &mut H, nr: usize) {
        if self.agnus.pos.v == self.agnus.spr_vstop[nr] {
            // Fetch the next control word (CTL half).
            self.agnus.spr_dma_state[nr] = SpriteDmaState::Idle;
            let value = self.agnus.do_sprite_dma(host, nr);
            self.agnus.poke_sprx_ctl(nr, value);
            host.poke_custom16(
                PokeSource::Agnus,
                regs::SPR0POS + 2 + 8 * nr as u16,
                value,
            );
        } else if self.agnus.spr_dma_state[nr] == SpriteDmaState::Active {
            let value = self.agnus.do_sprite_dma(host, nr);
            host.poke_custom16(PokeSource::Agnus, regs::SPR0DATB + 8 * nr as u16, value);
        }
    }

    //
    // Copper
    //

    fn service_copper_event<H: ChipsetHost>(&mut self, host: &mut H, id: EventId, data: i64) {
        match id {
            EventId::CopRequestDma => {
                // A wakeup after WAIT may still be gated on the blitter.
                if data != 0 && self.copper.bfd() && self.blitter_busy {
                    self.schedule_rel(Slot::Copper, dma_cycles(2), EventId::CopRequestDma, data);
                    return;
                }
                if self.agnus.bus_is_free(BusOwner::Copper) {
                    self.schedule_copper_rel(dma_cycles(2), EventId::CopFetch);
                } else {
                    self.schedule_copper_rel(dma_cycles(1), EventId::CopRequestDma);
                }
            }

            EventId::CopFetch => {
                if !self.agnus.bus_is_free(BusOwner::Copper) {
                    self.schedule_copper_rel(dma_cycles(1), EventId::CopFetch);
                    return;
                }
                self.agnus.allocate_bus(BusOwner::Copper);
                let pc = self.copper.coppc;
                self.copper.copins1 = self.agnus.do_copper_dma_read(host, pc);
                self.copper.advance_pc();

                let next = if self.copper.is_move_cmd() {
                    EventId::CopMove
                } else {
                    EventId::CopWaitSkip
                };
                self.schedule_copper_rel(dma_cycles(2), next);
            }

            EventId::CopMove => {
                if !self.agnus.bus_is_free(BusOwner::Copper) {
                    self.schedule_copper_rel(dma_cycles(1), EventId::CopMove);
                    return;
                }
                self.agnus.allocate_bus(BusOwner::Copper);
                let pc = self.copper.coppc;
                self.copper.copins2 = self.agnus.do_copper_dma_read(host, pc);
                self.copper.advance_pc();

                let reg = self.copper.move_target();
                if self.copper.illegal_address(reg) {
                    // The copper halts; the slot stays disarmed until the
                    // vertical blank restart.
                    log::warn!("copper halted on protected register {reg:#05X}");
                    return;
                }

                if self.copper.skip {
                    self.copper.skip = false;
                } else {
                    let value = self.copper.copins2;
                    self.poke_custom16(host, reg, value, PokeSource::Copper);
                }

                // A MOVE to a strobe may have re-armed the slot with a jump.
                if !self.scheduler.has_event(Slot::Copper) {
                    self.schedule_copper_rel(dma_cycles(2), EventId::CopFetch);
                }
            }

            EventId::CopWaitSkip => {
                if !self.agnus.bus_is_free(BusOwner::Copper) {
                    self.schedule_copper_rel(dma_cycles(1), EventId::CopWaitSkip);
                    return;
                }
                self.agnus.allocate_bus(BusOwner::Copper);
                let pc = self.copper.coppc;
                self.copper.copins2 = self.agnus.do_copper_dma_read(host, pc);
                self.copper.advance_pc();

                let beam = self.agnus.pos.encode();
                if self.copper.is_wait_cmd() {
                    match self.copper.wake_position(beam) {
                        Some(wake) => {
                            let wake_beam = Beam::decode(wake);
                            if wake_beam.v < self.agnus.frame.num_lines() {
                                let cycle = self.agnus.beam_to_cycle(wake_beam);
                                self.scheduler.schedule_abs(
                                    Slot::Copper,
                                    cycle,
                                    EventId::CopRequestDma,
                                    1,
                                );
                            }
                            // Out of frame: sleep until the restart.
                        }
                        None => {
                            // No in-frame position triggers; sleep until
                            // the vertical blank restart.
                        }
                    }
                } else {
                    debug_assert!(self.copper.is_skip_cmd());
                    if self.copper.comparator_triggers(beam) {
                        self.copper.skip = true;
                    }
                    self.schedule_copper_rel(dma_cycles(2), EventId::CopFetch);
                }
            }

            EventId::CopJmp1 => {
                self.copper.jump(0);
                self.copper.skip = false;
                self.schedule_copper_rel(dma_cycles(2), EventId::CopRequestDma);
            }

            EventId::CopJmp2 => {
                self.copper.jump(1);
                self.copper.skip = false;
                self.schedule_copper_rel(dma_cycles(2), EventId::CopRequestDma);
            }

            _ => debug_assert!(false, "unexpected copper event {id:?}"),
        }
    }

    //
    // Disk controller
    //

    fn selected_drive_nr(&self) -> Option<usize> {
        (self.disk.selected >= 0).then_some(self.disk.selected as usize)
    }

    fn any_drive_spinning<H: ChipsetHost>(&mut self, host: &mut H) -> bool {
        (0..4).any(|nr| {
            self.disk.connected[nr] && host.drive_mut(nr).is_some_and(|d| d.motor())
        })
    }

    /// Rotation event: move one byte between the selected drive and the
    /// FIFO, then rearm while any motor spins.
    fn service_disk_event<H: ChipsetHost>(&mut self, host: &mut H) {
        self.execute_disk_fifo(host);
        if self.any_drive_spinning(host) {
            self.schedule_rel(
                Slot::DiskRotate,
                dma_cycles(ROTATION_PERIOD_DMA),
                EventId::DskRotate,
                0,
            );
        }
    }

    fn execute_disk_fifo<H: ChipsetHost>(&mut self, host: &mut H) {
        let Some(nr) = self.selected_drive_nr() else {
            return;
        };

        match self.disk.state {
            DiskDmaState::Off => {
                if let Some(drive) = host.drive_mut(nr) {
                    drive.rotate();
                }
            }

            DiskDmaState::Wait | DiskDmaState::Read => {
                let Some(drive) = host.drive_mut(nr) else {
                    return;
                };
                let byte = drive.read_head();
                self.disk.incoming = byte;
                self.disk.incoming_cycle = self.agnus.clock;
                self.disk.fifo.write(byte);

                self.disk.sync_flag = self.disk.fifo.compare(self.disk.dsksync);
                if self.disk.sync_flag {
                    self.irq.raise(IrqSource::DskSyn);
                    if self.disk.state == DiskDmaState::Wait {
                        self.disk.state = DiskDmaState::Read;
                        self.disk.fifo.clear();
                    }
                }
            }

            DiskDmaState::Write | DiskDmaState::Flush => {
                if self.disk.fifo.is_empty() {
                    if self.disk.state == DiskDmaState::Flush {
                        self.disk.state = DiskDmaState::Off;
                    }
                } else {
                    let byte = self.disk.fifo.read();
                    if let Some(drive) = host.drive_mut(nr) {
                        drive.write_head(byte);
                    }
                }
            }
        }
    }

    /// Word transfer performed from within a granted disk DMA timeslot.
    fn perform_disk_dma<H: ChipsetHost>(&mut self, host: &mut H) {
        if !self.disk.transfer_active() {
            return;
        }
        match self.disk.state {
            DiskDmaState::Read => self.perform_disk_dma_read(host),
            DiskDmaState::Write => self.perform_disk_dma_write(host),
            _ => {}
        }
    }

    fn perform_disk_dma_read<H: ChipsetHost>(&mut self, host: &mut H) {
        if !self.disk.fifo.has_word() {
            return;
        }
        let mut remaining = self.disk.acceleration.max(1);
        loop {
            let word = self.disk.fifo.read16();
            self.agnus.do_disk_dma_write(host, word);

            if self.disk.count_word() {
                self.irq.raise(IrqSource::DskBlk);
                self.disk.state = DiskDmaState::Off;
                return;
            }

            remaining -= 1;
            if remaining == 0 {
                return;
            }
            // Accelerated drives compress several rotation periods into
            // one timeslot.
            self.execute_disk_fifo(host);
            self.execute_disk_fifo(host);
            if !self.disk.fifo.has_word() {
                return;
            }
        }
    }

    fn perform_disk_dma_write<H: ChipsetHost>(&mut self, host: &mut H) {
        if !self.disk.fifo.can_store_word() {
            return;
        }
        let mut remaining = self.disk.acceleration.max(1);
        loop {
            let word = self.agnus.do_disk_dma_read(host);
            self.disk.fifo.write((word >> 8) as u8);
            self.disk.fifo.write(word as u8);

            if self.disk.count_word() {
                self.irq.raise(IrqSource::DskBlk);
                // Drain synchronously so the completion interrupt cannot
                // overtake the final bytes on their way to the drive.
                if let Some(nr) = self.selected_drive_nr() {
                    if let Some(drive) = host.drive_mut(nr) {
                        while !self.disk.fifo.is_empty() {
                            let byte = self.disk.fifo.read();
                            drive.write_head(byte);
                        }
                    }
                }
                self.disk.state = DiskDmaState::Off;
                return;
            }

            remaining -= 1;
            if remaining == 0 {
                return;
            }
            self.execute_disk_fifo(host);
            self.execute_disk_fifo(host);
            if !self.disk.fifo.can_store_word() {
                return;
            }
        }
    }

    fn poke_dsklen<H: ChipsetHost>(&mut self, host: &mut H, value: u16) {
        let word_sync = DiskController::word_sync_required(self.adkcon);
        let action = self.disk.apply_dsklen(value, word_sync);

        if action == DsklenAction::None || action == DsklenAction::Off {
            return;
        }
        // Turbo drives bypass the cycle-accurate path entirely.
        if let Some(nr) = self.selected_drive_nr() {
            let turbo = host.drive_mut(nr).is_some_and(|d| d.is_turbo());
            if turbo {
                self.perform_turbo_dma(host, nr);
            }
        }
    }

    fn perform_turbo_dma<H: ChipsetHost>(&mut self, host: &mut H, nr: usize) {
        let count = usize::from(self.disk.words_remaining());
        if count == 0 {
            return;
        }

        match self.disk.state {
            DiskDmaState::Wait | DiskDmaState::Read => {
                let mut words = Vec::with_capacity(count);
                if let Some(drive) = host.drive_mut(nr) {
                    if self.disk.state == DiskDmaState::Wait {
                        drive.find_sync_mark();
                    }
                    for _ in 0..count {
                        words.push(drive.read_head16());
                    }
                }
                let mask = self.agnus.chip_ram_mask();
                for word in words {
                    host.poke_chip16(self.agnus.dskpt & mask, word);
                    self.agnus.dskpt = self.agnus.dskpt.wrapping_add(2);
                }
            }
            DiskDmaState::Write => {
                let mask = self.agnus.chip_ram_mask();
                let mut words = Vec::with_capacity(count);
                for _ in 0..count {
                    words.push(host.peek_chip16(self.agnus.dskpt & mask));
                    self.agnus.dskpt = self.agnus.dskpt.wrapping_add(2);
                }
                if let Some(drive) = host.drive_mut(nr) {
                    for word in words {
                        drive.write_head16(word);
                    }
                }
            }
            _ => return,
        }

        self.raise_irq(IrqSource::DskBlk, dma_cycles(512));
        self.disk.state = DiskDmaState::Off;
    }

    /// The drive-select port latch changed; redistribute it and manage the
    /// rotation event lifecycle.
    pub fn prb_did_change<H: ChipsetHost>(&mut self, host: &mut H, old: u8, new: u8) {
        self.disk.prb = new;
        self.disk.selected = -1;

        for nr in 0..4 {
            if !self.disk.connected[nr] {
                continue;
            }
            let Some(drive) = host.drive_mut(nr) else {
                continue;
            };
            drive.prb_did_change(old, new);
            if drive.is_selected() {
                self.disk.selected = nr as i8;
                self.disk.acceleration = drive.speed();
            }
        }

        if !self.any_drive_spinning(host) {
            self.scheduler.cancel(Slot::DiskRotate);
        } else if !self.scheduler.has_event(Slot::DiskRotate) {
            self.schedule_rel(
                Slot::DiskRotate,
                dma_cycles(ROTATION_PERIOD_DMA),
                EventId::DskRotate,
                0,
            );
        }
    }

    /// Combined active-low status flags of all connected drives.
    pub fn drive_status_flags<H: ChipsetHost>(&mut self, host: &mut H) -> u8 {
        let mut result = 0xFF;
        for nr in 0..4 {
            if self.disk.connected[nr] {
                if let Some(drive) = host.drive_mut(nr) {
                    result &= drive.drive_status_flags();
                }
            }
        }
        result
    }

    /// Post a disk insertion. If the drive still holds a disk it is ejected
    /// first and the delay is stretched to the minimum swap time.
    pub fn insert_disk<H: ChipsetHost>(&mut self, host: &mut H, nr: usize, delay: Cycle) {
        let mut delay = delay;
        if let Some(drive) = host.drive_mut(nr) {
            if drive.has_disk() {
                drive.eject_disk();
                delay = delay.max(sec(MIN_SWAP_DELAY_SEC));
            }
        }
        self.schedule_rel(Slot::DiskChange, delay, EventId::DchInsert, nr as i64);
    }

    /// Post a disk ejection.
    pub fn eject_disk(&mut self, nr: usize, delay: Cycle) {
        self.schedule_rel(Slot::DiskChange, delay, EventId::DchEject, nr as i64);
    }

    fn service_disk_change_event<H: ChipsetHost>(&mut self, host: &mut H, id: EventId, data: i64) {
        let nr = (data as usize) & 3;
        let Some(drive) = host.drive_mut(nr) else {
            return;
        };
        match id {
            EventId::DchInsert => drive.insert_disk(),
            EventId::DchEject => drive.eject_disk(),
            _ => debug_assert!(false, "unexpected disk change event {id:?}"),
        }
    }

    //
    // Interrupts
    //

    /// Raise an interrupt source, optionally delayed by `delay` cycles.
    pub fn raise_irq(&mut self, source: IrqSource, delay: Cycle) {
        if delay <= 0 {
            self.irq.raise(source);
            return;
        }
        self.irq.raise_at(source, self.agnus.clock + delay);
        let next = self.irq.next_delayed();
        self.scheduler
            .schedule_abs(Slot::Irq, next, EventId::IrqCheck, 0);
    }

    fn service_irq_event(&mut self) {
        let next = self.irq.service_delayed(self.agnus.clock);
        if next != NEVER {
            self.scheduler
                .schedule_abs(Slot::Irq, next, EventId::IrqCheck, 0);
        }
    }

    //
    // Delayed register changes
    //

    fn record_register_change(&mut self, delay: Cycle, reg: ChangeReg, value: u16) {
        self.change_recorder
            .insert(self.agnus.clock + delay, reg, value);
        let next = self.change_recorder.next_trigger();
        self.scheduler
            .schedule_abs(Slot::Reg, next, EventId::RegChange, 0);
    }

    fn service_reg_event(&mut self) {
        while let Some(change) = self.change_recorder.pop_due(self.agnus.clock) {
            self.apply_register_change(change.reg, change.value);
        }
        let next = self.change_recorder.next_trigger();
        if next != NEVER {
            self.scheduler
                .schedule_abs(Slot::Reg, next, EventId::RegChange, 0);
        }
    }

    fn apply_register_change(&mut self, reg: ChangeReg, value: u16) {
        match reg {
            ChangeReg::Dmacon => self.set_dmacon(value),
            ChangeReg::Diwstrt => self.set_diwstrt(value),
            ChangeReg::Diwstop => self.set_diwstop(value),
            ChangeReg::Ddfstrt => self.set_ddfstrt(value),
            ChangeReg::Ddfstop => self.set_ddfstop(value),
            ChangeReg::Bplcon0 => self.set_bplcon0(value),
            ChangeReg::Bplcon1 => self.set_bplcon1(value),
        }
    }

    fn set_dmacon(&mut self, value: u16) {
        let old = self.agnus.dmacon;
        let mut new = old;
        set_clr_write(&mut new, value);
        new &= 0x7FFF;
        if new == old {
            return;
        }

        let was_bpl_line = self.agnus.in_bpl_dma_line();
        self.agnus.dmacon = new;

        // Bitplane enable changes take effect mid-line.
        let is_bpl_line = self.agnus.in_bpl_dma_line();
        if was_bpl_line != is_bpl_line {
            self.agnus.bpl_dma_line = is_bpl_line;
            let h = self.agnus.pos.h as usize;
            self.agnus.update_bpl_events_from(h.min(HPOS - 1));
            self.schedule_next_bpl_event();
            self.agnus.hsync_actions |= HsyncActions::UPDATE_BPL_TABLE;
        }

        // Disk, audio, and sprite slots follow the new enable bits.
        let new_das = self.agnus.compute_dma_das();
        if new_das != self.agnus.dma_das {
            self.agnus.dma_das = new_das;
            self.agnus.update_das_events(new_das);
            self.schedule_next_das_event();
        }
    }

    fn set_diwstrt(&mut self, value: u16) {
        self.agnus.diwstrt = value;

        let new_vstrt = (value >> 8) as i16;
        let mut new_hstrt = (value & 0xFF) as i16;
        if new_hstrt < 2 {
            new_hstrt = -1;
        }
        self.agnus.diw_vstrt = new_vstrt;
        self.agnus.diw_hstrt = new_hstrt;

        if i32::from(self.agnus.pos.v) == i32::from(self.agnus.diw_vstrt) {
            self.agnus.diw_vflop = true;
        }
        if i32::from(self.agnus.pos.v) == i32::from(self.agnus.diw_vstop) {
            self.agnus.diw_vflop = false;
        }
    }

    fn set_diwstop(&mut self, value: u16) {
        self.agnus.diwstop = value;

        let mut new_vstop = (value >> 8) as i16;
        if value & 0x8000 == 0 {
            new_vstop |= 0x100;
        }
        let mut new_hstop = ((value & 0xFF) as i16) | 0x100;
        if new_hstop > 0x1C7 {
            new_hstop = -1;
        }
        self.agnus.diw_vstop = new_vstop;
        self.agnus.diw_hstop = new_hstop;

        if i32::from(self.agnus.pos.v) == i32::from(self.agnus.diw_vstrt) {
            self.agnus.diw_vflop = true;
        }
        if i32::from(self.agnus.pos.v) == i32::from(self.agnus.diw_vstop) {
            self.agnus.diw_vflop = false;
        }
    }

    fn set_ddfstrt(&mut self, value: u16) {
        self.agnus.ddfstrt = value;
        self.agnus.hsync_actions |= HsyncActions::PREDICT_DDF;

        // Take immediate action only if the old start has not been passed.
        let h = self.agnus.pos.h as i16;
        if h < self.agnus.ddfstrt_reached {
            if value as i16 <= h + 2 {
                // The new start can no longer match in this line.
                self.agnus.ddfstrt_reached = -1;
                self.agnus.clear_bpl_events();
                self.schedule_next_bpl_event();
            } else {
                self.agnus.ddfstrt_reached = if value > HPOS_MAX { -1 } else { value as i16 };
                self.compute_ddf_window();
                self.agnus.update_bpl_events();
                self.schedule_next_bpl_event();
            }
        }
    }

    fn set_ddfstop(&mut self, value: u16) {
        self.agnus.ddfstop = value;
        self.agnus.hsync_actions |= HsyncActions::PREDICT_DDF;

        let h = self.agnus.pos.h as i16;
        if h + 2 < self.agnus.ddfstop_reached || self.agnus.ddfstop_reached == -1 {
            if value as i16 <= h + 2 {
                // The stop position will not match in this line.
                self.agnus.ddfstop_reached = -1;
            } else {
                self.agnus.ddfstop_reached = if value > HPOS_MAX { -1 } else { value as i16 };
                if self.agnus.ddfstrt_reached >= 0 {
                    self.compute_ddf_window();
                    self.agnus.update_bpl_events();
                    self.schedule_next_bpl_event();
                }
            }
        }
    }

    fn set_bplcon0(&mut self, value: u16) {
        let old = self.agnus.bplcon0;
        if old == value {
            return;
        }
        self.agnus.bplcon0 = value;
        self.agnus.hsync_actions |= HsyncActions::UPDATE_BPL_TABLE;

        // Plane count or resolution changes rewrite the rest of the line.
        if (old ^ value) & 0xF000 != 0 {
            let h = self.agnus.pos.h as usize;
            self.agnus.update_bpl_events_from(h.min(HPOS - 1));
            self.schedule_next_bpl_event();
        }
    }

    fn set_bplcon1(&mut self, value: u16) {
        self.agnus.bplcon1 = value & 0xFF;
        self.agnus.set_scroll_values(self.agnus.bplcon1);

        let h = self.agnus.pos.h as usize;
        self.agnus.update_bpl_events_from(h.min(HPOS - 1));
        self.schedule_next_bpl_event();

        self.agnus.hsync_actions |=
            HsyncActions::UPDATE_BPL_TABLE | HsyncActions::PREDICT_DDF;
    }

    //
    // Register routing
    //

    /// Write a custom chip register. Registers owned by the core are
    /// handled here; everything else is forwarded to the host, tagged with
    /// its source.
    pub fn poke_custom16<H: ChipsetHost>(
        &mut self,
        host: &mut H,
        reg: u16,
        value: u16,
        source: PokeSource,
    ) {
        match reg & 0x1FE {
            regs::DMACON => self.record_register_change(dma_cycles(2), ChangeReg::Dmacon, value),
            regs::INTENA => self.irq.poke_intena(value),
            regs::INTREQ => self.irq.poke_intreq(value),
            regs::ADKCON => set_clr_write(&mut self.adkcon, value),

            regs::COPCON => self.copper.cdang = value & 0b10 != 0,
            regs::COP1LCH => self.copper.poke_coplc_hi(0, value),
            regs::COP1LCL => self.copper.poke_coplc_lo(0, value),
            regs::COP2LCH => self.copper.poke_coplc_hi(1, value),
            regs::COP2LCL => self.copper.poke_coplc_lo(1, value),
            regs::COPJMP1 => self.schedule_copper_rel(dma_cycles(1), EventId::CopJmp1),
            regs::COPJMP2 => self.schedule_copper_rel(dma_cycles(1), EventId::CopJmp2),
            regs::COPINS => {
                // Dummy write path: fills whichever instruction register
                // the state machine would fetch into next.
                if matches!(
                    self.scheduler.slot_id(Slot::Copper),
                    EventId::CopMove | EventId::CopWaitSkip
                ) {
                    self.copper.copins2 = value;
                } else {
                    self.copper.copins1 = value;
                }
            }

            regs::DSKPTH => {
                self.agnus.dskpt = (self.agnus.dskpt & 0x0000_FFFF) | (u32::from(value) << 16);
            }
            regs::DSKPTL => {
                self.agnus.dskpt =
                    (self.agnus.dskpt & 0xFFFF_0000) | u32::from(value & 0xFFFE);
            }
            regs::DSKLEN => self.poke_dsklen(host, value),
            regs::DSKDAT => {} // strobe register, inaccessible to pokes
            regs::DSKSYNC => self.disk.dsksync = value,

            regs::DIWSTRT => {
                self.record_register_change(dma_cycles(2), ChangeReg::Diwstrt, value);
            }
            regs::DIWSTOP => {
                self.record_register_change(dma_cycles(2), ChangeReg::Diwstop, value);
            }
            regs::DDFSTRT => {
                let value = value & self.config.revision.ddf_mask();
                self.record_register_change(dma_cycles(2), ChangeReg::Ddfstrt, value);
            }
            regs::DDFSTOP => {
                let value = value & self.config.revision.ddf_mask();
                self.record_register_change(dma_cycles(2), ChangeReg::Ddfstop, value);
            }
            regs::BPLCON0 => {
                if value != self.agnus.bplcon0 {
                    self.record_register_change(dma_cycles(4), ChangeReg::Bplcon0, value);
                }
            }
            regs::BPLCON1 => {
                if value != self.agnus.bplcon1 {
                    self.record_register_change(dma_cycles(1), ChangeReg::Bplcon1, value);
                }
            }
            regs::BPL1MOD => self.agnus.bpl1mod = (value & 0xFFFE) as i16,
            regs::BPL2MOD => self.agnus.bpl2mod = (value & 0xFFFE) as i16,

            regs::VPOSW | regs::VHPOSW => {
                log::trace!("beam counter write ignored ({reg:#05X} = {value:#06X})");
            }

            r if (regs::BPL1PTH..=regs::BPL6PTL).contains(&r) => {
                let plane = usize::from((r - regs::BPL1PTH) / 4);
                if r & 2 == 0 {
                    self.agnus.bplpt[plane] =
                        (self.agnus.bplpt[plane] & 0x0000_FFFF) | (u32::from(value) << 16);
                } else {
                    self.agnus.bplpt[plane] =
                        (self.agnus.bplpt[plane] & 0xFFFF_0000) | u32::from(value & 0xFFFE);
                }
            }

            r if (regs::SPR0PTH..=regs::SPR7PTL).contains(&r) => {
                let nr = usize::from((r - regs::SPR0PTH) / 4);
                if r & 2 == 0 {
                    self.agnus.sprpt[nr] =
                        (self.agnus.sprpt[nr] & 0x0000_FFFF) | (u32::from(value) << 16);
                } else {
                    self.agnus.sprpt[nr] =
                        (self.agnus.sprpt[nr] & 0xFFFF_0000) | u32::from(value & 0xFFFE);
                }
            }

            r if (regs::SPR0POS..=regs::SPR7DATB).contains(&r) => {
                let nr = usize::from((r - regs::SPR0POS) / 8);
                match (r - regs::SPR0POS) % 8 {
                    0 => self.agnus.poke_sprx_pos(nr, value),
                    2 => self.agnus.poke_sprx_ctl(nr, value),
                    _ => {} // data registers belong to the video stage
                }
                // The video stage keeps its own copy of all four halves.
                host.poke_custom16(source, r, value);
            }

            r if (regs::AUD0LCH..=0x0D2).contains(&r) && r & 0xF <= 2 => {
                let ch = usize::from((r - regs::AUD0LCH) >> 4);
                if r & 0xF == 0 {
                    self.agnus.audlc[ch] =
                        (self.agnus.audlc[ch] & 0x0000_FFFF) | (u32::from(value) << 16);
                } else {
                    self.agnus.audlc[ch] =
                        (self.agnus.audlc[ch] & 0xFFFF_0000) | u32::from(value & 0xFFFE);
                }
            }

            r => host.poke_custom16(source, r, value),
        }
    }

    /// Read a custom chip register owned by the core. Unknown registers
    /// read as zero.
    #[must_use]
    pub fn peek_custom16(&self, reg: u16) -> u16 {
        match reg & 0x1FE {
            regs::DMACONR => self.agnus.peek_dmaconr(self.blitter_busy),
            regs::VPOSR => self.agnus.peek_vposr(),
            regs::VHPOSR => self.agnus.peek_vhposr(),
            regs::DSKDATR => 0, // strobe register, inaccessible to peeks
            regs::DSKBYTR => {
                let byte_valid =
                    self.agnus.clock - self.disk.incoming_cycle < dma_cycles(1);
                self.disk.peek_dskbytr(self.agnus.dskdma(), byte_valid)
            }
            regs::INTENAR => self.irq.intena,
            regs::INTREQR => self.irq.intreq,
            regs::ADKCONR => self.adkcon,
            _ => 0,
        }
    }

    /// Latch AUDxLC into the channel's DMA pointer; called by the external
    /// audio unit at the start of each block.
    pub fn reload_audio_pointer(&mut self, channel: usize) {
        self.agnus.audpt[channel] = self.agnus.audlc[channel];
    }

    //
    // Inspection
    //

    /// Refresh the shared inspection buffer from live state. The lock is
    /// held only for the copy.
    pub fn inspect(&self) {
        let info = self.build_info();
        let mut guard = self
            .inspection
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = info;
    }

    /// A clone of the most recently published inspection state.
    #[must_use]
    pub fn info(&self) -> ChipsetInfo {
        self.inspection
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Handle for out-of-band readers (debugger, UI thread).
    #[must_use]
    pub fn inspection_handle(&self) -> Arc<Mutex<ChipsetInfo>> {
        Arc::clone(&self.inspection)
    }

    pub(crate) fn control_copy(&self) -> ControlState {
        ControlState {
            adkcon: self.adkcon,
            blitter_busy: self.blitter_busy,
            changes: self.change_recorder.clone(),
        }
    }

    pub(crate) fn apply_control_copy(&mut self, control: ControlState) {
        self.adkcon = control.adkcon;
        self.blitter_busy = control.blitter_busy;
        self.change_recorder = control.changes;
    }

    fn build_info(&self) -> ChipsetInfo {
        let mask = self.agnus.chip_ram_mask();
        let a = &self.agnus;

        let mut bplpt = a.bplpt;
        let mut audpt = a.audpt;
        let mut audlc = a.audlc;
        let mut sprpt = a.sprpt;
        for p in &mut bplpt {
            *p &= mask;
        }
        for p in &mut audpt {
            *p &= mask;
        }
        for p in &mut audlc {
            *p &= mask;
        }
        for p in &mut sprpt {
            *p &= mask;
        }

        ChipsetInfo {
            agnus: AgnusInfo {
                clock: a.clock,
                vpos: a.pos.v,
                hpos: a.pos.h,
                frame: a.frame.nr,
                lof: a.frame.is_long_frame(),
                dmacon: a.dmacon,
                dma_das: a.dma_das,
                bplcon0: a.bplcon0,
                bplcon1: a.bplcon1,
                bpu: a.bpu(),
                ddfstrt: a.ddfstrt,
                ddfstop: a.ddfstop,
                diwstrt: a.diwstrt,
                diwstop: a.diwstop,
                bpl1mod: a.bpl1mod,
                bpl2mod: a.bpl2mod,
                bls: a.bls,
                dskpt: a.dskpt & mask,
                bplpt,
                audpt,
                audlc,
                sprpt,
                bus_usage: a.stats.raw,
            },
            copper: CopperInfo {
                coppc: self.copper.coppc & mask,
                coplc: self.copper.coplc,
                copins1: self.copper.copins1,
                copins2: self.copper.copins2,
                cdang: self.copper.cdang,
                skip: self.copper.skip,
                active: self.scheduler.has_event(Slot::Copper),
            },
            disk: DiskControllerInfo {
                selected: self.disk.selected,
                state: self.disk.state,
                dsklen: self.disk.dsklen,
                dsksync: self.disk.dsksync,
                prb: self.disk.prb,
                sync_flag: self.disk.sync_flag,
                fifo_count: self.disk.fifo.len(),
                fifo: self.disk.fifo.bytes(),
                underruns: self.disk.fifo.underruns,
            },
            irq: IrqInfo {
                intreq: self.irq.intreq,
                intena: self.irq.intena,
                level: self.irq.level(),
            },
            slots: self.scheduler.slots,
        }
    }
}
