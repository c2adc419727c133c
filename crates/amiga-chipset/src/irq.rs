//! The interrupt aggregator.
//!
//! Components raise interrupt sources, optionally with a delay; the
//! aggregator sets bits in INTREQ and computes the priority level a CPU
//! consumer would see. Forwarding to the CPU is outside the core.

use serde::Serialize;

use crate::custom_regs::set_clr_write;
use crate::scheduler::{Cycle, NEVER};

/// Number of interrupt sources.
pub const IRQ_SOURCE_COUNT: usize = 14;

/// Interrupt sources, bit positions in INTREQ/INTENA.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u8)]
pub enum IrqSource {
    /// Serial transmit buffer empty.
    Tbe = 0,
    /// Disk block transfer complete.
    DskBlk = 1,
    Soft = 2,
    /// CIA A.
    Ports = 3,
    Coper = 4,
    VertB = 5,
    Blit = 6,
    Aud0 = 7,
    Aud1 = 8,
    Aud2 = 9,
    Aud3 = 10,
    /// Serial receive buffer full.
    Rbf = 11,
    /// Disk sync-mark match.
    DskSyn = 12,
    /// CIA B.
    Exter = 13,
}

impl IrqSource {
    #[must_use]
    pub fn bit(self) -> u16 {
        1 << (self as u16)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InterruptAggregator {
    pub intreq: u16,
    pub intena: u16,
    /// Per-source trigger cycles for delayed requests.
    delayed: [Cycle; IRQ_SOURCE_COUNT],
}

impl InterruptAggregator {
    #[must_use]
    pub fn new() -> Self {
        Self {
            intreq: 0,
            intena: 0,
            delayed: [NEVER; IRQ_SOURCE_COUNT],
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// SET/CLR write to INTREQ.
    pub fn poke_intreq(&mut self, value: u16) {
        set_clr_write(&mut self.intreq, value);
    }

    /// SET/CLR write to INTENA.
    pub fn poke_intena(&mut self, value: u16) {
        set_clr_write(&mut self.intena, value);
    }

    /// Raise a source immediately.
    pub fn raise(&mut self, source: IrqSource) {
        self.intreq |= source.bit();
    }

    /// Post a source for a later cycle. An earlier pending trigger for the
    /// same source wins.
    pub fn raise_at(&mut self, source: IrqSource, trigger: Cycle) {
        let slot = &mut self.delayed[source as usize];
        *slot = (*slot).min(trigger);
    }

    /// The earliest pending delayed trigger.
    #[must_use]
    pub fn next_delayed(&self) -> Cycle {
        self.delayed.iter().copied().min().unwrap_or(NEVER)
    }

    /// Move all due delayed requests into INTREQ. Returns the next pending
    /// trigger, or `NEVER`.
    pub fn service_delayed(&mut self, clock: Cycle) -> Cycle {
        for (i, trigger) in self.delayed.iter_mut().enumerate() {
            if *trigger <= clock {
                self.intreq |= 1 << i;
                *trigger = NEVER;
            }
        }
        self.next_delayed()
    }

    /// The interrupt priority level presented to the CPU, 0 when masked.
    #[must_use]
    pub fn level(&self) -> u8 {
        if self.intena & 0x4000 == 0 {
            return 0;
        }
        let active = self.intena & self.intreq & 0x3FFF;
        if active == 0 {
            return 0;
        }
        if active & 0x2000 != 0 {
            return 6; // EXTER
        }
        if active & 0x1800 != 0 {
            return 5; // DSKSYN, RBF
        }
        if active & 0x0780 != 0 {
            return 4; // AUD3-0
        }
        if active & 0x0070 != 0 {
            return 3; // BLIT, VERTB, COPER
        }
        if active & 0x0008 != 0 {
            return 2; // PORTS
        }
        1 // SOFT, DSKBLK, TBE
    }

    pub(crate) fn delayed_raw_mut(&mut self) -> &mut [Cycle; IRQ_SOURCE_COUNT] {
        &mut self.delayed
    }
}

impl Default for InterruptAggregator {
    fn default() -> Self {
        Self::new()
    }
}
