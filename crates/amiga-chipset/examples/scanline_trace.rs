//! Trace the bus allocation of a display line.
//!
//! Wires the chipset core to a minimal in-memory host, starts a copper
//! list, enables six lores bitplanes, and prints who owned each DMA cycle
//! of one scanline.
//!
//!     cargo run --example scanline_trace

use amiga_chipset::drive::FloppyDrive;
use amiga_chipset::host::{ChipsetHost, PokeSource};
use amiga_chipset::{custom_regs as regs, Beam, BusOwner, Chipset, ChipsetConfig, HPOS_CNT};

/// Chip RAM only; no drives, no CPU.
struct Host {
    ram: Vec<u8>,
}

impl ChipsetHost for Host {
    fn peek_chip16(&mut self, addr: u32) -> u16 {
        let addr = (addr as usize % self.ram.len()) & !1;
        (u16::from(self.ram[addr]) << 8) | u16::from(self.ram[addr + 1])
    }

    fn poke_chip16(&mut self, addr: u32, value: u16) {
        let addr = (addr as usize % self.ram.len()) & !1;
        self.ram[addr] = (value >> 8) as u8;
        self.ram[addr + 1] = value as u8;
    }

    fn poke_custom16(&mut self, _source: PokeSource, _reg: u16, _value: u16) {}

    fn add_wait_states(&mut self, _cpu_cycles: i64) {}

    fn drive_mut(&mut self, _nr: usize) -> Option<&mut dyn FloppyDrive> {
        None
    }
}

fn owner_glyph(owner: BusOwner) -> char {
    match owner {
        BusOwner::None => '.',
        BusOwner::Cpu => 'c',
        BusOwner::Refresh => 'R',
        BusOwner::Disk => 'D',
        BusOwner::Audio => 'A',
        BusOwner::Bitplane => 'B',
        BusOwner::Sprite => 'S',
        BusOwner::Copper => 'C',
        BusOwner::Blitter => 'X',
    }
}

fn main() {
    let mut chipset = Chipset::new(ChipsetConfig::default());
    let mut host = Host {
        ram: vec![0; 512 * 1024],
    };

    // A short copper list: wait for line 0x40, retarget bitplane 1, stop.
    for (i, word) in [0x4001u16, 0xFF00, 0x00E0, 0x0001, 0xFFFF, 0xFFFE]
        .iter()
        .enumerate()
    {
        host.poke_chip16(0x1000 + 2 * i as u32, *word);
    }

    let mut poke = |chipset: &mut Chipset, host: &mut Host, reg, value| {
        chipset.poke_custom16(host, reg, value, PokeSource::Cpu);
    };

    poke(&mut chipset, &mut host, regs::COP1LCH, 0x0000);
    poke(&mut chipset, &mut host, regs::COP1LCL, 0x1000);
    poke(&mut chipset, &mut host, regs::DIWSTRT, 0x2C81);
    poke(&mut chipset, &mut host, regs::DIWSTOP, 0xF4C1);
    poke(&mut chipset, &mut host, regs::DDFSTRT, 0x0038);
    poke(&mut chipset, &mut host, regs::DDFSTOP, 0x00D0);
    poke(&mut chipset, &mut host, regs::BPLCON0, 0x6000);
    poke(
        &mut chipset,
        &mut host,
        regs::DMACON,
        0x8000 | regs::DMAF_DMAEN | regs::DMAF_BPLEN | regs::DMAF_COPEN | regs::DMAF_DSKEN,
    );
    poke(&mut chipset, &mut host, regs::COPJMP1, 0);

    // Run to the start of a display line, then walk it.
    while chipset.beam() != Beam::new(0x41, 0) {
        chipset.execute(&mut host);
    }
    for _ in 0..HPOS_CNT - 1 {
        chipset.execute(&mut host);
    }

    println!("line 0x41, one glyph per DMA cycle:");
    for (h, owner) in chipset.agnus.bus_owner.iter().enumerate() {
        if h % 64 == 0 {
            print!("\n{h:#05X}  ");
        }
        print!("{}", owner_glyph(*owner));
    }
    println!();

    let info = {
        chipset.inspect();
        chipset.info()
    };
    println!(
        "clock={} beam=({},{}) copper pc={:#07X} bitplane cycles={}",
        info.agnus.clock,
        info.agnus.vpos,
        info.agnus.hpos,
        info.copper.coppc,
        info.agnus.bus_usage[BusOwner::Bitplane as usize],
    );
}
