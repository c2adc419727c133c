//! The interface the chipset core consumes from its surroundings.
//!
//! The core never owns memory, the CPU, drives, or peripheral chips; it
//! reaches all of them through a single `ChipsetHost` borrowed for the
//! duration of each execute call.

use crate::agnus::BusOwner;
use crate::drive::FloppyDrive;
use crate::scheduler::{EventId, Slot};

/// Originator of a custom register write, for debug visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PokeSource {
    Cpu,
    Copper,
    /// DMA data forwarded by the chipset itself (bitplane, sprite, audio).
    Agnus,
}

/// External collaborators of the chipset core.
///
/// Memory accessors receive addresses already masked to the chip RAM range.
/// All methods are called from the core thread only.
pub trait ChipsetHost {
    /// Chip RAM word read.
    fn peek_chip16(&mut self, addr: u32) -> u16;

    /// Chip RAM word write.
    fn poke_chip16(&mut self, addr: u32, value: u16);

    /// Word read tagged with the requesting bus owner.
    fn peek16(&mut self, owner: BusOwner, addr: u32) -> u16 {
        let _ = owner;
        self.peek_chip16(addr)
    }

    /// Word write tagged with the requesting bus owner.
    fn poke16(&mut self, owner: BusOwner, addr: u32, value: u16) {
        let _ = owner;
        self.poke_chip16(addr, value);
    }

    /// Write to a custom register the core does not own (video, audio,
    /// sprite data, blitter registers).
    fn poke_custom16(&mut self, source: PokeSource, reg: u16, value: u16);

    /// Charge the CPU with wait states, in CPU clock units.
    fn add_wait_states(&mut self, cpu_cycles: i64);

    /// Access to a floppy drive mechanism, if one is attached.
    fn drive_mut(&mut self, nr: usize) -> Option<&mut dyn FloppyDrive>;

    /// An event fired in one of the embedder-owned scheduler slots
    /// (CIAs, blitter, mouse, keyboard, secondary).
    fn service_external_event(&mut self, slot: Slot, id: EventId, data: i64) {
        let _ = (slot, id, data);
    }

    /// End-of-line notification, after all per-line work completed.
    fn end_of_line(&mut self, vpos: u16) {
        let _ = vpos;
    }

    /// End-of-frame notification.
    fn end_of_frame(&mut self, frame: i64) {
        let _ = frame;
    }
}
