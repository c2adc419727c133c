//! The event scheduler.
//!
//! A fixed set of slots, one per logical activity, each holding the next
//! trigger cycle, an event kind, and an opaque data word. The chipset's
//! execute loop dispatches the earliest due slot until the target cycle is
//! reached. Events with equal triggers dispatch in slot-index order.

use serde::Serialize;

/// A timestamp in master clock cycles since power-on.
pub type Cycle = i64;

/// Trigger value encoding a disabled slot.
pub const NEVER: Cycle = i64::MAX;

/// Master clock frequency (PAL).
pub const MASTER_FREQUENCY: i64 = 28_375_160;

/// Convert DMA cycles to master cycles. One DMA cycle is eight master
/// cycles.
#[must_use]
pub const fn dma_cycles(n: i64) -> Cycle {
    n << 3
}

/// Convert master cycles to DMA cycles.
#[must_use]
pub const fn as_dma_cycles(c: Cycle) -> i64 {
    c >> 3
}

/// Convert CPU cycles to master cycles. The CPU runs at a quarter of the
/// master clock.
#[must_use]
pub const fn cpu_cycles(n: i64) -> Cycle {
    n << 2
}

/// Convert master cycles to CPU cycles.
#[must_use]
pub const fn as_cpu_cycles(c: Cycle) -> i64 {
    c >> 2
}

/// Master cycles in the given number of seconds.
#[must_use]
pub fn sec(s: f64) -> Cycle {
    (s * MASTER_FREQUENCY as f64) as Cycle
}

/// Scheduler slots. The declaration order is the dispatch order for events
/// sharing a trigger cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(usize)]
pub enum Slot {
    /// Delayed custom register changes.
    Reg,
    /// End-of-line handling.
    Raster,
    /// CIA A wakeups (serviced by the embedder).
    CiaA,
    /// CIA B wakeups (serviced by the embedder).
    CiaB,
    /// Bitplane DMA, driven by the per-line bitplane event table.
    Bpl,
    /// Disk, audio, and sprite DMA, driven by the per-line DAS event table.
    Das,
    /// Copper execution.
    Copper,
    /// Blitter micro-operations (serviced by the embedder).
    Blitter,
    /// Vertical blank strobe.
    Vbl,
    /// Disk rotation, one byte per event.
    DiskRotate,
    /// Disk insertion and ejection.
    DiskChange,
    /// Delayed interrupt requests.
    Irq,
    /// Mouse events (serviced by the embedder).
    Mouse1,
    /// Mouse events, second port (serviced by the embedder).
    Mouse2,
    /// Keyboard events (serviced by the embedder).
    Keyboard,
    /// Spare slot for embedder use.
    Secondary,
}

/// Number of scheduler slots.
pub const SLOT_COUNT: usize = 16;

impl Slot {
    pub const ALL: [Slot; SLOT_COUNT] = [
        Slot::Reg,
        Slot::Raster,
        Slot::CiaA,
        Slot::CiaB,
        Slot::Bpl,
        Slot::Das,
        Slot::Copper,
        Slot::Blitter,
        Slot::Vbl,
        Slot::DiskRotate,
        Slot::DiskChange,
        Slot::Irq,
        Slot::Mouse1,
        Slot::Mouse2,
        Slot::Keyboard,
        Slot::Secondary,
    ];

    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }

    #[must_use]
    pub fn from_index(index: usize) -> Option<Slot> {
        Slot::ALL.get(index).copied()
    }

    /// True for slots whose events are serviced by the embedder rather than
    /// the core.
    #[must_use]
    pub fn is_external(self) -> bool {
        matches!(
            self,
            Slot::CiaA
                | Slot::CiaB
                | Slot::Blitter
                | Slot::Mouse1
                | Slot::Mouse2
                | Slot::Keyboard
                | Slot::Secondary
        )
    }
}

/// Event kinds dispatched through the scheduler slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u8)]
pub enum EventId {
    None = 0,
    /// Apply pending delayed register changes.
    RegChange,
    /// End-of-line processing.
    RasHsync,
    /// A bitplane table event; the slot data holds the table entry.
    BplFetch,
    /// A DAS table event; the slot data holds the encoded table entry.
    DasService,
    /// Copper waits for a free bus cycle.
    CopRequestDma,
    /// Copper fetches the first instruction word.
    CopFetch,
    /// Copper fetches the second word of a MOVE and writes the register.
    CopMove,
    /// Copper fetches the second word of a WAIT or SKIP.
    CopWaitSkip,
    /// Copper reloads its program counter from COP1LC.
    CopJmp1,
    /// Copper reloads its program counter from COP2LC.
    CopJmp2,
    /// Vertical blank interrupt strobe.
    VblStrobe,
    /// Disk controller rotation step.
    DskRotate,
    /// Commit a pending disk insertion; the slot data holds the drive.
    DchInsert,
    /// Commit a pending disk ejection; the slot data holds the drive.
    DchEject,
    /// Serve delayed interrupt requests.
    IrqCheck,
    /// An event owned by the embedder (CIA, blitter, mouse, keyboard).
    External,
}

impl EventId {
    #[must_use]
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub fn from_u8(value: u8) -> Option<EventId> {
        use EventId::*;
        const ALL: [EventId; 17] = [
            None, RegChange, RasHsync, BplFetch, DasService, CopRequestDma, CopFetch, CopMove,
            CopWaitSkip, CopJmp1, CopJmp2, VblStrobe, DskRotate, DchInsert, DchEject, IrqCheck,
            External,
        ];
        ALL.get(usize::from(value)).copied()
    }
}

/// One scheduler slot.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct EventSlot {
    /// Master cycle at which the event is due. `NEVER` disables the slot.
    pub trigger: Cycle,
    pub id: EventId,
    pub data: i64,
}

impl Default for EventSlot {
    fn default() -> Self {
        Self {
            trigger: NEVER,
            id: EventId::None,
            data: 0,
        }
    }
}

/// The slot array plus the cached minimum trigger.
#[derive(Debug, Clone, Serialize)]
pub struct Scheduler {
    pub slots: [EventSlot; SLOT_COUNT],
    next_trigger: Cycle,
}

impl Scheduler {
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: [EventSlot::default(); SLOT_COUNT],
            next_trigger: NEVER,
        }
    }

    /// Reset all slots to the disabled state.
    pub fn clear(&mut self) {
        self.slots = [EventSlot::default(); SLOT_COUNT];
        self.next_trigger = NEVER;
    }

    /// The earliest trigger over all slots.
    #[must_use]
    pub fn next_trigger(&self) -> Cycle {
        self.next_trigger
    }

    /// Arm a slot with an absolute trigger cycle.
    pub fn schedule_abs(&mut self, slot: Slot, trigger: Cycle, id: EventId, data: i64) {
        let s = &mut self.slots[slot.index()];
        s.trigger = trigger;
        s.id = id;
        s.data = data;
        self.update_next_trigger();
    }

    /// Move a slot's trigger, keeping its event kind and data.
    pub fn reschedule_abs(&mut self, slot: Slot, trigger: Cycle) {
        self.slots[slot.index()].trigger = trigger;
        self.update_next_trigger();
    }

    /// Disarm a slot. Cancelling an inactive slot is a no-op.
    pub fn cancel(&mut self, slot: Slot) {
        self.slots[slot.index()] = EventSlot::default();
        self.update_next_trigger();
    }

    /// True if the slot is armed.
    #[must_use]
    pub fn has_event(&self, slot: Slot) -> bool {
        self.slots[slot.index()].trigger != NEVER
    }

    /// The event kind currently armed in a slot.
    #[must_use]
    pub fn slot_id(&self, slot: Slot) -> EventId {
        self.slots[slot.index()].id
    }

    /// The earliest slot due at or before `clock`, ties resolved by slot
    /// index.
    #[must_use]
    pub fn due_slot(&self, clock: Cycle) -> Option<Slot> {
        let mut best: Option<(Cycle, Slot)> = None;
        for slot in Slot::ALL {
            let trigger = self.slots[slot.index()].trigger;
            if trigger > clock {
                continue;
            }
            match best {
                Some((t, _)) if t <= trigger => {}
                _ => best = Some((trigger, slot)),
            }
        }
        best.map(|(_, slot)| slot)
    }

    /// Recompute the cached minimum after slots were restored wholesale.
    pub(crate) fn refresh_next_trigger(&mut self) {
        self.update_next_trigger();
    }

    fn update_next_trigger(&mut self) {
        self.next_trigger = self
            .slots
            .iter()
            .map(|s| s.trigger)
            .min()
            .unwrap_or(NEVER);
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_trigger_tracks_minimum() {
        let mut sched = Scheduler::new();
        assert_eq!(sched.next_trigger(), NEVER);

        sched.schedule_abs(Slot::Copper, 100, EventId::CopFetch, 0);
        sched.schedule_abs(Slot::Raster, 50, EventId::RasHsync, 0);
        assert_eq!(sched.next_trigger(), 50);

        sched.cancel(Slot::Raster);
        assert_eq!(sched.next_trigger(), 100);
    }

    #[test]
    fn equal_triggers_dispatch_in_slot_order() {
        let mut sched = Scheduler::new();
        sched.schedule_abs(Slot::Copper, 80, EventId::CopFetch, 0);
        sched.schedule_abs(Slot::Raster, 80, EventId::RasHsync, 0);

        // Raster precedes Copper in the slot declaration order.
        assert_eq!(sched.due_slot(80), Some(Slot::Raster));
        sched.cancel(Slot::Raster);
        assert_eq!(sched.due_slot(80), Some(Slot::Copper));
        sched.cancel(Slot::Copper);
        assert_eq!(sched.due_slot(80), None);
    }

    #[test]
    fn nothing_due_before_trigger() {
        let mut sched = Scheduler::new();
        sched.schedule_abs(Slot::Vbl, 10, EventId::VblStrobe, 0);
        assert_eq!(sched.due_slot(9), None);
        assert_eq!(sched.due_slot(10), Some(Slot::Vbl));
    }

    #[test]
    fn cancel_inactive_slot_is_noop() {
        let mut sched = Scheduler::new();
        sched.cancel(Slot::Secondary);
        assert_eq!(sched.next_trigger(), NEVER);
    }

    #[test]
    fn cycle_conversions() {
        assert_eq!(dma_cycles(1), 8);
        assert_eq!(as_dma_cycles(dma_cycles(227)), 227);
        assert_eq!(as_cpu_cycles(dma_cycles(2)), 4);
    }
}
