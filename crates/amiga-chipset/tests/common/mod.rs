//! Shared harness for the integration tests: a chip-RAM host and a
//! scriptable drive mechanism.
#![allow(dead_code)]

use amiga_chipset::drive::{DriveHead, FloppyDrive};
use amiga_chipset::host::{ChipsetHost, PokeSource};
use amiga_chipset::scheduler::{EventId, Slot};
use amiga_chipset::{BusOwner, Chipset, ChipsetConfig};

/// A drive mechanism backed by an in-memory byte track.
pub struct MockDrive {
    nr: usize,
    pub track: Vec<u8>,
    pub offset: usize,
    pub written: Vec<u8>,
    pub motor_on: bool,
    pub selected: bool,
    pub turbo: bool,
    pub disk_present: bool,
    pub staged_disk: bool,
    pub cylinder: u8,
    pub side: u8,
}

impl MockDrive {
    pub fn new(nr: usize) -> Self {
        Self {
            nr,
            track: Vec::new(),
            offset: 0,
            written: Vec::new(),
            motor_on: false,
            selected: false,
            turbo: false,
            disk_present: false,
            staged_disk: false,
            cylinder: 0,
            side: 0,
        }
    }
}

impl FloppyDrive for MockDrive {
    fn read_head(&mut self) -> u8 {
        if self.track.is_empty() {
            return 0;
        }
        let byte = self.track[self.offset % self.track.len()];
        self.offset += 1;
        byte
    }

    fn write_head(&mut self, value: u8) {
        self.written.push(value);
        self.offset += 1;
    }

    fn rotate(&mut self) {
        self.offset += 1;
    }

    fn find_sync_mark(&mut self) {
        for _ in 0..self.track.len().max(1) {
            if self.read_head() != 0x44 {
                continue;
            }
            if self.read_head() != 0x89 {
                continue;
            }
            break;
        }
    }

    fn motor(&self) -> bool {
        self.motor_on
    }

    fn is_selected(&self) -> bool {
        self.selected
    }

    fn is_turbo(&self) -> bool {
        self.turbo
    }

    fn head(&self) -> DriveHead {
        DriveHead {
            cylinder: self.cylinder,
            side: self.side,
            offset: self.offset as u32,
        }
    }

    fn drive_status_flags(&self) -> u8 {
        let mut flags = 0xFF;
        if self.motor_on {
            flags &= !0x20;
        }
        if self.cylinder == 0 {
            flags &= !0x10;
        }
        flags
    }

    fn prb_did_change(&mut self, _old: u8, new: u8) {
        // Active-low select on bit 3+nr; the motor line latches on select.
        let sel = new & (1 << (3 + self.nr)) == 0;
        self.selected = sel;
        if sel {
            self.motor_on = new & 0x80 == 0;
        }
    }

    fn insert_disk(&mut self) {
        if self.staged_disk {
            self.disk_present = true;
            self.staged_disk = false;
        }
    }

    fn eject_disk(&mut self) {
        self.disk_present = false;
    }

    fn has_disk(&self) -> bool {
        self.disk_present
    }
}

/// Chip RAM plus recording hooks for everything the core pushes outward.
pub struct TestHost {
    pub ram: Vec<u8>,
    pub drives: Vec<MockDrive>,
    pub wait_states: i64,
    pub custom_writes: Vec<(PokeSource, u16, u16)>,
    pub external_events: Vec<(Slot, EventId, i64)>,
    pub lines_completed: Vec<u16>,
    pub frames_completed: Vec<i64>,
}

impl TestHost {
    pub fn new() -> Self {
        Self {
            ram: vec![0; 512 * 1024],
            drives: (0..4).map(MockDrive::new).collect(),
            wait_states: 0,
            custom_writes: Vec::new(),
            external_events: Vec::new(),
            lines_completed: Vec::new(),
            frames_completed: Vec::new(),
        }
    }

    pub fn write_word(&mut self, addr: u32, value: u16) {
        let addr = (addr as usize % self.ram.len()) & !1;
        self.ram[addr] = (value >> 8) as u8;
        self.ram[addr + 1] = value as u8;
    }

    pub fn read_word(&self, addr: u32) -> u16 {
        let addr = (addr as usize % self.ram.len()) & !1;
        (u16::from(self.ram[addr]) << 8) | u16::from(self.ram[addr + 1])
    }

    /// Place a word program into chip RAM.
    pub fn load_program(&mut self, addr: u32, words: &[u16]) {
        for (i, word) in words.iter().enumerate() {
            self.write_word(addr + 2 * i as u32, *word);
        }
    }
}

impl ChipsetHost for TestHost {
    fn peek_chip16(&mut self, addr: u32) -> u16 {
        self.read_word(addr % self.ram.len() as u32)
    }

    fn poke_chip16(&mut self, addr: u32, value: u16) {
        let addr = addr % self.ram.len() as u32;
        self.write_word(addr, value);
    }

    fn poke_custom16(&mut self, source: PokeSource, reg: u16, value: u16) {
        self.custom_writes.push((source, reg, value));
    }

    fn add_wait_states(&mut self, cpu_cycles: i64) {
        self.wait_states += cpu_cycles;
    }

    fn drive_mut(&mut self, nr: usize) -> Option<&mut dyn FloppyDrive> {
        self.drives
            .get_mut(nr)
            .map(|d| d as &mut dyn FloppyDrive)
    }

    fn service_external_event(&mut self, slot: Slot, id: EventId, data: i64) {
        self.external_events.push((slot, id, data));
    }

    fn end_of_line(&mut self, vpos: u16) {
        self.lines_completed.push(vpos);
    }

    fn end_of_frame(&mut self, frame: i64) {
        self.frames_completed.push(frame);
    }
}

/// A fresh chipset and host pair with the default configuration.
pub fn make_chipset() -> (Chipset, TestHost) {
    (Chipset::new(ChipsetConfig::default()), TestHost::new())
}

/// Advance the core by whole DMA cycles, one at a time.
pub fn run_cycles(chipset: &mut Chipset, host: &mut TestHost, cycles: i64) {
    for _ in 0..cycles {
        chipset.execute(host);
    }
}

/// Run until `predicate` holds, with a cycle bound.
pub fn run_until(
    chipset: &mut Chipset,
    host: &mut TestHost,
    bound: i64,
    mut predicate: impl FnMut(&Chipset, &TestHost) -> bool,
) -> bool {
    for _ in 0..bound {
        if predicate(chipset, host) {
            return true;
        }
        chipset.execute(host);
    }
    predicate(chipset, host)
}

/// Latch the drive-select port so drive `nr` is selected with the motor
/// running.
pub fn select_drive(chipset: &mut Chipset, host: &mut TestHost, nr: usize) {
    let prb = 0xFF & !(1u8 << (3 + nr)) & !0x80;
    chipset.prb_did_change(host, 0xFF, prb);
}

/// Count bus cycles of the current line owned by `owner`.
pub fn owned_cycles(chipset: &Chipset, owner: BusOwner) -> usize {
    chipset
        .agnus
        .bus_owner
        .iter()
        .filter(|&&o| o == owner)
        .count()
}
