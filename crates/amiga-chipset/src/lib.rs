//! Cycle-accurate Amiga chipset core.
//!
//! Emulates the timing heart of the custom chipset: the event scheduler,
//! the DMA timeslot allocation tables, bus arbitration between display DMA,
//! the copper, the blitter and the CPU, the copper micro-engine, and the
//! disk controller with its drive FIFO. The CPU, memory, drives, and
//! peripheral chips stay outside, reached through [`ChipsetHost`].
//!
//! The driving loop is [`Chipset::execute_until`]; everything the core does
//! happens synchronously inside it, one bus cycle at a time.

pub mod agnus;
pub mod beam;
pub mod chipset;
pub mod config;
pub mod copper;
pub mod custom_regs;
pub mod disk;
pub mod drive;
pub mod host;
pub mod irq;
pub mod scheduler;
pub mod snapshot;

pub use agnus::{Agnus, BusOwner};
pub use beam::{Beam, Frame, HPOS_CNT, HPOS_MAX};
pub use chipset::{
    AgnusInfo, ChipsetInfo, Chipset, CopperInfo, DiskControllerInfo, IrqInfo,
};
pub use config::{AgnusRevision, ChipsetConfig, VideoStandard};
pub use copper::Copper;
pub use disk::{DiskController, DiskDmaState};
pub use drive::{DriveHead, FloppyDrive};
pub use host::{ChipsetHost, PokeSource};
pub use irq::{InterruptAggregator, IrqSource};
pub use scheduler::{dma_cycles, Cycle, EventId, EventSlot, Scheduler, Slot, NEVER};
pub use snapshot::{SnapshotError, SNAPSHOT_VERSION};
