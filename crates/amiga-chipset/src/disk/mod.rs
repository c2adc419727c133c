//! The disk controller: a word-oriented DMA engine coupled to byte-serial
//! drives through the FIFO.
//!
//! The controller state machine has five phases. DMA is armed by writing
//! DSKLEN twice with the enable bit set; a single write with the bit clear
//! always disarms. Bytes stream between the selected drive and the FIFO on
//! rotation events; words move between the FIFO and memory in the disk DMA
//! timeslots.
//!
//! The drive mechanisms themselves live behind
//! [`FloppyDrive`](crate::drive::FloppyDrive); the orchestration of memory
//! access, interrupts, and scheduling is in the chipset integration layer.

pub mod fifo;

use serde::Serialize;

use crate::custom_regs::{ADKF_WORDSYNC, DSKLEN_COUNT, DSKLEN_DMAEN, DSKLEN_WRITE};
use crate::scheduler::Cycle;

use fifo::DiskFifo;

/// Rotation event period in DMA cycles: one drive byte every 56 slots.
pub const ROTATION_PERIOD_DMA: i64 = 56;

/// Minimum delay between ejecting one disk and inserting another.
pub const MIN_SWAP_DELAY_SEC: f64 = 1.5;

/// Controller phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[repr(u8)]
pub enum DiskDmaState {
    #[default]
    Off = 0,
    /// DMA armed, waiting for a sync-mark match.
    Wait,
    Read,
    Write,
    /// Write DMA complete, draining the FIFO to the drive.
    Flush,
}

impl DiskDmaState {
    #[must_use]
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub fn from_u8(value: u8) -> Option<DiskDmaState> {
        use DiskDmaState::*;
        [Off, Wait, Read, Write, Flush].get(usize::from(value)).copied()
    }
}

/// Effect of a DSKLEN write, to be acted on by the integration layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DsklenAction {
    /// Nothing armed; the value was only latched.
    None,
    /// DMA switched off.
    Off,
    StartRead,
    /// Reading armed, but gated on a sync-mark match first.
    StartWait,
    StartWrite,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiskController {
    pub state: DiskDmaState,
    pub fifo: DiskFifo,

    /// DMA enable, write bit, and word count.
    pub dsklen: u16,
    /// Sync pattern compared against the FIFO's youngest word.
    pub dsksync: u16,
    /// Drive-select port latch.
    pub prb: u8,
    /// Selected drive number, or -1.
    pub selected: i8,
    /// Which drive bays have a mechanism attached.
    pub connected: [bool; 4],
    /// Words transferred per granted DMA slot for the selected drive.
    pub acceleration: u32,

    /// Most recent byte read from the drive, and when it arrived.
    pub incoming: u8,
    pub incoming_cycle: Cycle,

    /// Latched sync comparison result.
    pub sync_flag: bool,
}

impl Default for DiskController {
    fn default() -> Self {
        Self::new()
    }
}

impl DiskController {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: DiskDmaState::Off,
            fifo: DiskFifo::new(),
            dsklen: 0,
            dsksync: 0x4489,
            prb: 0xFF,
            selected: -1,
            connected: [true, false, false, false],
            acceleration: 1,
            incoming: 0,
            incoming_cycle: 0,
            sync_flag: false,
        }
    }

    pub fn reset(&mut self) {
        let connected = self.connected;
        *self = Self::new();
        self.connected = connected;
    }

    /// Latch a DSKLEN write. The enable bit must be seen twice in a row to
    /// arm DMA, and the write bit twice to arm a write transfer; any write
    /// with the enable bit clear disarms immediately. `word_sync` is the
    /// sync-required bit from ADKCON.
    pub fn apply_dsklen(&mut self, value: u16, word_sync: bool) -> DsklenAction {
        let old = self.dsklen;
        self.dsklen = value;

        if value & DSKLEN_DMAEN == 0 {
            self.state = DiskDmaState::Off;
            self.fifo.clear();
            return DsklenAction::Off;
        }

        if old & value & DSKLEN_DMAEN != 0 {
            self.fifo.clear();
            if old & value & DSKLEN_WRITE != 0 {
                self.state = DiskDmaState::Write;
                DsklenAction::StartWrite
            } else if word_sync {
                self.state = DiskDmaState::Wait;
                DsklenAction::StartWait
            } else {
                self.state = DiskDmaState::Read;
                DsklenAction::StartRead
            }
        } else {
            DsklenAction::None
        }
    }

    /// Convenience for callers holding the ADKCON value.
    #[must_use]
    pub fn word_sync_required(adkcon: u16) -> bool {
        adkcon & ADKF_WORDSYNC != 0
    }

    /// Remaining word count of the current transfer.
    #[must_use]
    pub fn words_remaining(&self) -> u16 {
        self.dsklen & DSKLEN_COUNT
    }

    /// Decrement the word count; true when the transfer just completed.
    pub fn count_word(&mut self) -> bool {
        self.dsklen = self.dsklen.wrapping_sub(1);
        self.dsklen & DSKLEN_COUNT == 0
    }

    /// True if a drive is selected and DMA is in a transferring phase with
    /// words left to move.
    #[must_use]
    pub fn transfer_active(&self) -> bool {
        self.selected >= 0
            && self.words_remaining() != 0
            && matches!(self.state, DiskDmaState::Read | DiskDmaState::Write)
    }

    /// Assemble the DSKBYTR value. `dsk_dma_enabled` is the DMA class
    /// enable from DMACON; `byte_valid` reports whether the incoming byte
    /// is still fresh.
    #[must_use]
    pub fn peek_dskbytr(&self, dsk_dma_enabled: bool, byte_valid: bool) -> u16 {
        let mut result = u16::from(self.incoming);
        if byte_valid {
            result |= 0x8000;
        }
        if dsk_dma_enabled && self.state != DiskDmaState::Off {
            result |= 0x4000;
        }
        if self.dsklen & DSKLEN_WRITE != 0 {
            result |= 0x2000;
        }
        if self.sync_flag {
            result |= 0x1000;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_enable_write_does_not_arm() {
        let mut dc = DiskController::new();
        assert_eq!(dc.apply_dsklen(0x8003, false), DsklenAction::None);
        assert_eq!(dc.state, DiskDmaState::Off);
    }

    #[test]
    fn double_enable_write_arms_read() {
        let mut dc = DiskController::new();
        dc.apply_dsklen(0x8003, false);
        assert_eq!(dc.apply_dsklen(0x8003, false), DsklenAction::StartRead);
        assert_eq!(dc.state, DiskDmaState::Read);
        assert_eq!(dc.words_remaining(), 3);
    }

    #[test]
    fn sync_required_arms_wait() {
        let mut dc = DiskController::new();
        dc.apply_dsklen(0x8003, true);
        assert_eq!(dc.apply_dsklen(0x8003, true), DsklenAction::StartWait);
        assert_eq!(dc.state, DiskDmaState::Wait);
    }

    #[test]
    fn write_bit_needs_double_write_too() {
        let mut dc = DiskController::new();
        // Write bit set only on the second write: read DMA starts.
        dc.apply_dsklen(0x8003, false);
        assert_eq!(dc.apply_dsklen(0xC003, false), DsklenAction::StartRead);

        dc.apply_dsklen(0x0000, false);
        dc.apply_dsklen(0xC003, false);
        assert_eq!(dc.apply_dsklen(0xC003, false), DsklenAction::StartWrite);
        assert_eq!(dc.state, DiskDmaState::Write);
    }

    #[test]
    fn clear_enable_bit_forces_off() {
        let mut dc = DiskController::new();
        dc.apply_dsklen(0x8003, false);
        dc.apply_dsklen(0x8003, false);
        dc.fifo.write(0xAA);
        assert_eq!(dc.apply_dsklen(0x0003, false), DsklenAction::Off);
        assert_eq!(dc.state, DiskDmaState::Off);
        assert!(dc.fifo.is_empty());
    }

    #[test]
    fn word_count_completion() {
        let mut dc = DiskController::new();
        dc.apply_dsklen(0x8002, false);
        dc.apply_dsklen(0x8002, false);
        assert!(!dc.count_word());
        assert!(dc.count_word());
    }

    #[test]
    fn dskbytr_flag_assembly() {
        let mut dc = DiskController::new();
        dc.incoming = 0x42;
        dc.state = DiskDmaState::Read;
        dc.dsklen = DSKLEN_DMAEN | DSKLEN_WRITE | 2;
        dc.sync_flag = true;

        let value = dc.peek_dskbytr(true, true);
        assert_eq!(value & 0x00FF, 0x42);
        assert_ne!(value & 0x8000, 0);
        assert_ne!(value & 0x4000, 0);
        assert_ne!(value & 0x2000, 0);
        assert_ne!(value & 0x1000, 0);

        let value = dc.peek_dskbytr(false, false);
        assert_eq!(value & 0x8000, 0);
        assert_eq!(value & 0x4000, 0);
    }
}
