//! The floppy drive mechanism interface.
//!
//! The drive itself (head positioning, motor physics, track encoding) lives
//! outside the core; the disk controller drives it byte by byte through
//! this trait.

/// Read/write head position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriveHead {
    pub cylinder: u8,
    pub side: u8,
    /// Byte offset within the current track.
    pub offset: u32,
}

/// A drive mechanism as seen by the disk controller.
///
/// `read_head`/`write_head` transfer one byte and advance the head by one
/// byte position. Disk images are staged by the embedder; the controller
/// only decides *when* an insertion or ejection is committed, via
/// [`insert_disk`](FloppyDrive::insert_disk) and
/// [`eject_disk`](FloppyDrive::eject_disk).
pub trait FloppyDrive {
    /// Read the byte under the head and advance one position.
    fn read_head(&mut self) -> u8;

    /// Write a byte at the head position and advance one position.
    fn write_head(&mut self, value: u8);

    /// Read a big-endian word, advancing two positions.
    fn read_head16(&mut self) -> u16 {
        let hi = self.read_head();
        let lo = self.read_head();
        (u16::from(hi) << 8) | u16::from(lo)
    }

    /// Write a big-endian word, advancing two positions.
    fn write_head16(&mut self, value: u16) {
        self.write_head((value >> 8) as u8);
        self.write_head(value as u8);
    }

    /// Advance the head one byte without transferring data.
    fn rotate(&mut self);

    /// Spin the head forward to the next sync mark, if any.
    fn find_sync_mark(&mut self);

    /// True while the motor is spinning.
    fn motor(&self) -> bool;

    /// True if the most recent select-line state addresses this drive.
    fn is_selected(&self) -> bool;

    /// True for drives that bypass cycle-accurate DMA.
    fn is_turbo(&self) -> bool {
        false
    }

    /// DMA acceleration factor (words transferred per granted disk slot).
    fn speed(&self) -> u32 {
        1
    }

    fn head(&self) -> DriveHead;

    /// Active-low status bits for the CIA port (disk change, write protect,
    /// track zero, motor ready).
    fn drive_status_flags(&self) -> u8;

    /// A new value was latched into the drive-select port register.
    /// The drive decodes its own select and motor lines from it.
    fn prb_did_change(&mut self, old: u8, new: u8);

    /// Commit a previously staged disk image.
    fn insert_disk(&mut self);

    /// Remove the current disk.
    fn eject_disk(&mut self);

    fn has_disk(&self) -> bool;
}
