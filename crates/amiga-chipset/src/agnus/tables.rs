//! The DMA timeslot allocation tables.
//!
//! Two static lookup tables describe every possible line layout: one for
//! bitplane DMA indexed by resolution and plane count, one for disk, audio
//! and sprite DMA indexed by the six DMA enable bits. Per-line working
//! tables are filled from them, and jump tables point each position at the
//! next armed one so the scheduler can skip idle stretches.
//!
//! Bitplane entries carry two flag bits (odd/even drawing) superimposed on
//! the event id; the id proper is the entry with the low two bits cleared.

use serde::Serialize;

use super::{Agnus, HPOS};
use crate::beam::HPOS_MAX;

/// A bitplane table entry: an event id in the upper bits, drawing flags in
/// the low two bits.
pub type BplEventId = u8;

/// Drawing flag for odd planes.
pub const BPL_DRAW_ODD: u8 = 0b01;
/// Drawing flag for even planes.
pub const BPL_DRAW_EVEN: u8 = 0b10;

pub const BPL_NONE: u8 = 0x00;
pub const BPL_L1: u8 = 0x04;
pub const BPL_L2: u8 = 0x08;
pub const BPL_L3: u8 = 0x0C;
pub const BPL_L4: u8 = 0x10;
pub const BPL_L5: u8 = 0x14;
pub const BPL_L6: u8 = 0x18;
pub const BPL_H1: u8 = 0x1C;
pub const BPL_H2: u8 = 0x20;
pub const BPL_H3: u8 = 0x24;
pub const BPL_H4: u8 = 0x28;
/// Shift-register load without DMA, inserted where the odd and even fetch
/// windows differ.
pub const BPL_SR: u8 = 0x2C;
/// End-of-line marker; performs no DMA, adds the modulos.
pub const BPL_EOL: u8 = 0x30;

/// The event id with the drawing flags stripped.
#[must_use]
pub fn bpl_base(id: BplEventId) -> u8 {
    id & !0b11
}

/// The bitplane a fetch entry serves (L1/H1 -> 0), or `None` for entries
/// that do not fetch.
#[must_use]
pub fn bpl_plane(id: BplEventId) -> Option<usize> {
    match bpl_base(id) {
        BPL_L1 | BPL_H1 => Some(0),
        BPL_L2 | BPL_H2 => Some(1),
        BPL_L3 | BPL_H3 => Some(2),
        BPL_L4 | BPL_H4 => Some(3),
        BPL_L5 => Some(4),
        BPL_L6 => Some(5),
        _ => None,
    }
}

/// A disk/audio/sprite table entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum DasEvent {
    #[default]
    None,
    Refresh,
    Disk(u8),
    Audio(u8),
    Sprite {
        nr: u8,
        second: bool,
    },
    /// Marker near the end of the line that advances the sprite sequencer.
    SpriteDmaStart,
}

impl DasEvent {
    /// Stable byte encoding, used for scheduler data words and snapshots.
    #[must_use]
    pub fn to_code(self) -> u8 {
        match self {
            DasEvent::None => 0,
            DasEvent::Refresh => 1,
            DasEvent::Disk(n) => 2 + n,
            DasEvent::Audio(n) => 5 + n,
            DasEvent::Sprite { nr, second } => 9 + nr * 2 + u8::from(second),
            DasEvent::SpriteDmaStart => 25,
        }
    }

    #[must_use]
    pub fn from_code(code: u8) -> Option<DasEvent> {
        match code {
            0 => Some(DasEvent::None),
            1 => Some(DasEvent::Refresh),
            2..=4 => Some(DasEvent::Disk(code - 2)),
            5..=8 => Some(DasEvent::Audio(code - 5)),
            9..=24 => Some(DasEvent::Sprite {
                nr: (code - 9) / 2,
                second: (code - 9) % 2 == 1,
            }),
            25 => Some(DasEvent::SpriteDmaStart),
            _ => None,
        }
    }
}

// DMA enable bits as they index the static DAS table (DMACON bits 0-5).
const DAS_DSKEN: u16 = 0x10;
const DAS_SPREN: u16 = 0x20;

impl Agnus {
    /// Build the static lookup tables. Called once at construction.
    pub(crate) fn init_lookup_tables(&mut self) {
        self.init_bpl_table_lores();
        self.init_bpl_table_hires();
        self.init_das_table();
    }

    /// Lores allocation: one eight-cycle fetch unit per 16 pixels, planes
    /// interleaved in the fixed hardware order, 22 units per line.
    fn init_bpl_table_lores(&mut self) {
        for bpu in 0..7 {
            let table = &mut self.bpl_dma[0][bpu];
            *table = [BPL_NONE; HPOS];

            let mut i = 0;
            while i <= 0xD8 {
                if bpu >= 6 {
                    table[i + 2] = BPL_L6;
                }
                if bpu >= 5 {
                    table[i + 6] = BPL_L5;
                }
                if bpu >= 4 {
                    table[i + 1] = BPL_L4;
                }
                if bpu >= 3 {
                    table[i + 5] = BPL_L3;
                }
                if bpu >= 2 {
                    table[i + 3] = BPL_L2;
                }
                if bpu >= 1 {
                    table[i + 7] = BPL_L1;
                }
                i += 8;
            }
            table[HPOS_MAX as usize] = BPL_EOL;
        }
    }

    /// Hires allocation: four-cycle fetch units, each plane fetched twice
    /// per eight-cycle group.
    fn init_bpl_table_hires(&mut self) {
        for bpu in 0..7 {
            let table = &mut self.bpl_dma[1][bpu];
            *table = [BPL_NONE; HPOS];

            let mut i = 0;
            while i <= 0xD8 {
                if bpu >= 4 {
                    table[i] = BPL_H4;
                    table[i + 4] = BPL_H4;
                }
                if bpu >= 3 {
                    table[i + 2] = BPL_H3;
                    table[i + 6] = BPL_H3;
                }
                if bpu >= 2 {
                    table[i + 1] = BPL_H2;
                    table[i + 5] = BPL_H2;
                }
                if bpu >= 1 {
                    table[i + 3] = BPL_H1;
                    table[i + 7] = BPL_H1;
                }
                i += 8;
            }
            table[HPOS_MAX as usize] = BPL_EOL;
        }
    }

    /// Disk, audio and sprite allocation for each combination of the six
    /// DMA enable bits.
    fn init_das_table(&mut self) {
        for dmacon in 0..64u16 {
            let table = &mut self.das_dma[dmacon as usize];
            *table = [DasEvent::None; HPOS];

            table[0x01] = DasEvent::Refresh;

            if dmacon & DAS_DSKEN != 0 {
                table[0x07] = DasEvent::Disk(0);
                table[0x09] = DasEvent::Disk(1);
                table[0x0B] = DasEvent::Disk(2);
            }

            for ch in 0..4 {
                if dmacon & (1 << ch) != 0 {
                    table[0x0D + 2 * ch] = DasEvent::Audio(ch as u8);
                }
            }

            if dmacon & DAS_SPREN != 0 {
                for nr in 0..8u8 {
                    let base = 0x15 + usize::from(nr) * 4;
                    table[base] = DasEvent::Sprite { nr, second: false };
                    table[base + 2] = DasEvent::Sprite { nr, second: true };
                }
            }

            table[0xDF] = DasEvent::SpriteDmaStart;
        }
    }

    /// Clear the bitplane working table; only the jump sentinels remain.
    pub fn clear_bpl_events(&mut self) {
        for i in 0..HPOS_MAX as usize {
            self.bpl_event[i] = BPL_NONE;
            self.next_bpl_event[i] = HPOS_MAX as u8;
        }
        self.bpl_event[HPOS_MAX as usize] = BPL_EOL;
        self.next_bpl_event[HPOS_MAX as usize] = 0;
    }

    /// Refill the bitplane working table from `first` to the end of the
    /// line, restricted to the active data-fetch windows, then reapply the
    /// drawing flags and rebuild the jump table.
    pub fn update_bpl_events_from(&mut self, first: usize) {
        let hires = Self::hires(self.bplcon0);
        let channels = if self.in_bpl_dma_line() {
            self.bpu() as usize
        } else {
            0
        };
        debug_assert!(channels <= 6);

        if hires {
            for i in first..HPOS {
                let h = i as i16;
                self.bpl_event[i] =
                    if self.ddf_hires.in_area_odd(h) || self.ddf_hires.in_area_even(h) {
                        self.bpl_dma[1][channels][i]
                    } else {
                        BPL_NONE
                    };
            }
            // Where the odd and even windows differ, the shift register
            // still has to be loaded at the end of each fetch unit.
            for i in self.ddf_hires.strt_even.max(0)..self.ddf_hires.strt_odd.max(0) {
                let i = i as usize;
                if i & 3 == 3 && self.bpl_event[i] == BPL_NONE {
                    self.bpl_event[i] = BPL_SR;
                }
            }
            for i in self.ddf_hires.stop_odd.max(0)..self.ddf_hires.stop_even.max(0) {
                let i = i as usize;
                if i & 3 == 3 && self.bpl_event[i] == BPL_NONE {
                    self.bpl_event[i] = BPL_SR;
                }
            }
        } else {
            for i in first..HPOS {
                let h = i as i16;
                self.bpl_event[i] =
                    if self.ddf_lores.in_area_odd(h) || self.ddf_lores.in_area_even(h) {
                        self.bpl_dma[0][channels][i]
                    } else {
                        BPL_NONE
                    };
            }
            for i in self.ddf_lores.strt_even.max(0)..self.ddf_lores.strt_odd.max(0) {
                let i = i as usize;
                if i & 7 == 7 && self.bpl_event[i] == BPL_NONE {
                    self.bpl_event[i] = BPL_SR;
                }
            }
            for i in self.ddf_lores.stop_odd.max(0)..self.ddf_lores.stop_even.max(0) {
                let i = i as usize;
                if i & 7 == 7 && self.bpl_event[i] == BPL_NONE {
                    self.bpl_event[i] = BPL_SR;
                }
            }
        }

        self.bpl_event[HPOS_MAX as usize] = BPL_EOL;
        self.update_drawing_flags(hires);
    }

    /// Refill the whole bitplane working table.
    pub fn update_bpl_events(&mut self) {
        self.update_bpl_events_from(0);
    }

    /// Superimpose the drawing flags derived from the BPLCON1 scroll values
    /// and rebuild the jump table.
    pub fn update_drawing_flags(&mut self, hires: bool) {
        if hires {
            let mut i = self.scroll_hires_odd as usize;
            while i < HPOS {
                self.bpl_event[i] |= BPL_DRAW_ODD;
                i += 4;
            }
            let mut i = self.scroll_hires_even as usize;
            while i < HPOS {
                self.bpl_event[i] |= BPL_DRAW_EVEN;
                i += 4;
            }
        } else {
            let mut i = self.scroll_lores_odd as usize;
            while i < HPOS {
                self.bpl_event[i] |= BPL_DRAW_ODD;
                i += 8;
            }
            let mut i = self.scroll_lores_even as usize;
            while i < HPOS {
                self.bpl_event[i] |= BPL_DRAW_EVEN;
                i += 8;
            }
        }
        self.update_bpl_jump_table(HPOS_MAX as usize);
    }

    /// Latch the BPLCON1 scroll comparison values.
    pub fn set_scroll_values(&mut self, bplcon1: u16) {
        self.scroll_lores_odd = (bplcon1 & 0b0000_1110) >> 1;
        self.scroll_lores_even = (bplcon1 & 0b1110_0000) >> 5;
        self.scroll_hires_odd = (bplcon1 & 0b0000_0110) >> 1;
        self.scroll_hires_even = (bplcon1 & 0b0110_0000) >> 5;
    }

    /// Refill the mask-dependent part of the DAS working table and its jump
    /// table. Only positions up to 0x37 depend on the enable bits; the
    /// sprite-DMA-start marker at 0xDF is fixed.
    pub fn update_das_events(&mut self, das_bits: u16) {
        debug_assert!(das_bits < 64);
        for i in 0..0x38 {
            self.das_event[i] = self.das_dma[das_bits as usize][i];
        }
        self.update_das_jump_table(0x38);
    }

    /// Rebuild the bitplane jump table below `end`, scanning right to left.
    pub fn update_bpl_jump_table(&mut self, end: usize) {
        debug_assert!(end <= HPOS_MAX as usize);
        let mut next = self.next_bpl_event[end];
        for i in (0..=end).rev() {
            self.next_bpl_event[i] = next;
            if self.bpl_event[i] != BPL_NONE {
                next = i as u8;
            }
        }
    }

    /// Rebuild the DAS jump table below `end`, scanning right to left.
    pub fn update_das_jump_table(&mut self, end: usize) {
        debug_assert!(end <= HPOS_MAX as usize);
        let mut next = self.next_das_event[end];
        for i in (0..=end).rev() {
            self.next_das_event[i] = next;
            if self.das_event[i] != DasEvent::None {
                next = i as u8;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agnus::ddf::DdfState;
    use crate::config::ChipsetConfig;
    use crate::custom_regs as regs;

    fn make_agnus() -> Agnus {
        Agnus::new(&ChipsetConfig::default())
    }

    /// Reference check for a jump table: each entry points at the smallest
    /// later armed position, with the line-end sentinels in place.
    fn verify_bpl_jump_table(agnus: &Agnus) {
        for h in 0..HPOS_MAX as usize {
            let expected = ((h + 1)..HPOS)
                .find(|&i| agnus.bpl_event[i] != BPL_NONE)
                .map_or(HPOS_MAX as u8, |i| i as u8);
            assert_eq!(agnus.next_bpl_event[h], expected, "at {h:#X}");
        }
        assert_eq!(agnus.next_bpl_event[HPOS_MAX as usize], 0);
    }

    #[test]
    fn lores_fetch_order_matches_hardware_interleave() {
        let agnus = make_agnus();
        let table = &agnus.bpl_dma[0][6];
        // Within a fetch unit starting at 0x28: L4 L6 L2 - L3 L5 L1
        assert_eq!(table[0x28], BPL_NONE);
        assert_eq!(table[0x29], BPL_L4);
        assert_eq!(table[0x2A], BPL_L6);
        assert_eq!(table[0x2B], BPL_L2);
        assert_eq!(table[0x2C], BPL_NONE);
        assert_eq!(table[0x2D], BPL_L3);
        assert_eq!(table[0x2E], BPL_L5);
        assert_eq!(table[0x2F], BPL_L1);
        assert_eq!(table[HPOS_MAX as usize], BPL_EOL);
    }

    #[test]
    fn lores_tables_nest_by_plane_count() {
        let agnus = make_agnus();
        for bpu in 1..=6usize {
            for h in 0..HPOS {
                let lower = agnus.bpl_dma[0][bpu - 1][h];
                let upper = agnus.bpl_dma[0][bpu][h];
                if lower != BPL_NONE {
                    assert_eq!(lower, upper, "bpu {bpu} at {h:#X}");
                }
            }
        }
    }

    #[test]
    fn hires_four_planes_fill_every_cycle_of_a_unit() {
        let agnus = make_agnus();
        let table = &agnus.bpl_dma[1][4];
        for h in 0..8 {
            assert_ne!(table[h], BPL_NONE, "at {h:#X}");
        }
    }

    #[test]
    fn das_table_layout_matches_timeslot_diagram() {
        let agnus = make_agnus();
        let full = &agnus.das_dma[0x3F];
        assert_eq!(full[0x01], DasEvent::Refresh);
        assert_eq!(full[0x07], DasEvent::Disk(0));
        assert_eq!(full[0x09], DasEvent::Disk(1));
        assert_eq!(full[0x0B], DasEvent::Disk(2));
        assert_eq!(full[0x0D], DasEvent::Audio(0));
        assert_eq!(full[0x13], DasEvent::Audio(3));
        assert_eq!(full[0x15], DasEvent::Sprite { nr: 0, second: false });
        assert_eq!(full[0x17], DasEvent::Sprite { nr: 0, second: true });
        assert_eq!(full[0x33], DasEvent::Sprite { nr: 7, second: true });
        assert_eq!(full[0xDF], DasEvent::SpriteDmaStart);

        let empty = &agnus.das_dma[0x00];
        assert_eq!(empty[0x01], DasEvent::Refresh);
        assert_eq!(empty[0x07], DasEvent::None);
        assert_eq!(empty[0x15], DasEvent::None);
        assert_eq!(empty[0xDF], DasEvent::SpriteDmaStart);
    }

    #[test]
    fn das_event_codes_round_trip() {
        for code in 0..=25u8 {
            let event = DasEvent::from_code(code).expect("valid code");
            assert_eq!(event.to_code(), code);
        }
        assert_eq!(DasEvent::from_code(26), None);
    }

    #[test]
    fn jump_table_points_at_next_armed_position() {
        let mut agnus = make_agnus();
        agnus.clear_bpl_events();

        agnus.dmacon = regs::DMAF_DMAEN | regs::DMAF_BPLEN;
        agnus.bplcon0 = 0x4000; // 4 planes, lores
        agnus.ddf_vflop = true;
        agnus.ddfstrt_reached = 0x38;
        agnus.ddfstop_reached = 0xD0;
        agnus.ddf_lores.compute(0x38, 0xD0, 0);
        agnus.ddf_state = DdfState::Off;

        agnus.update_bpl_events();
        verify_bpl_jump_table(&agnus);
    }

    #[test]
    fn das_jump_table_reaches_sprite_marker() {
        let mut agnus = make_agnus();
        // Seed the working table the way reset does.
        agnus.das_event = agnus.das_dma[0];
        agnus.next_das_event[HPOS_MAX as usize] = 0;
        agnus.update_das_jump_table(HPOS_MAX as usize);

        // With no DMA enabled, everything between refresh and the sprite
        // marker is idle.
        for h in 0x34..0xDF {
            assert_eq!(agnus.next_das_event[h], 0xDF, "at {h:#X}");
        }
        for h in 0xE0..HPOS {
            assert_eq!(agnus.next_das_event[h], 0, "at {h:#X}");
        }

        agnus.update_das_events(0x3F);
        assert_eq!(agnus.next_das_event[0x01], 0x07);
        assert_eq!(agnus.next_das_event[0x07], 0x09);
    }

    #[test]
    fn drawing_flags_mark_every_fetch_group() {
        let mut agnus = make_agnus();
        agnus.clear_bpl_events();
        agnus.set_scroll_values(0x0022); // odd scroll 1, even scroll 1
        agnus.update_bpl_events();

        assert_eq!(agnus.scroll_lores_odd, 1);
        assert_eq!(agnus.scroll_lores_even, 1);
        assert_eq!(agnus.bpl_event[1] & 0b11, BPL_DRAW_ODD | BPL_DRAW_EVEN);
        assert_eq!(agnus.bpl_event[9] & 0b11, BPL_DRAW_ODD | BPL_DRAW_EVEN);
        assert_eq!(agnus.bpl_event[2], BPL_NONE);
    }
}
