//! Binary state snapshots.
//!
//! Every component serializes its named fields through a single visitor
//! declaration; the writer and the reader are two implementations of the
//! same trait, so the two directions cannot drift apart. The container
//! format is little-endian: a one-byte version tag followed by tagged,
//! size-prefixed component sections, so readers can skip sections they do
//! not know.
//!
//! Loading never mutates state partially: sections are parsed into copies
//! and committed only after the whole snapshot validated.

use std::fmt;

use crate::agnus::{Agnus, BusOwner, HsyncActions, SpriteDmaState, HPOS};
use crate::agnus::ddf::{DdfState, DdfWindow};
use crate::agnus::tables::DasEvent;
use crate::chipset::{ChangeReg, Chipset, ControlState, RegChange};
use crate::copper::Copper;
use crate::disk::{DiskController, DiskDmaState};
use crate::irq::InterruptAggregator;
use crate::scheduler::{EventId, Scheduler};

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u8 = 1;

const TAG_AGNUS: u8 = 1;
const TAG_COPPER: u8 = 2;
const TAG_DISK: u8 = 3;
const TAG_IRQ: u8 = 4;
const TAG_SCHEDULER: u8 = 5;
const TAG_CONTROL: u8 = 6;

/// Snapshot failure, surfaced to the caller without touching live state.
#[derive(Debug)]
pub enum SnapshotError {
    /// The version tag did not match this implementation.
    BadVersion(u8),
    /// The data ended in the middle of a field or section header.
    Truncated,
    /// A component section did not consume exactly its declared size.
    SizeMismatch {
        component: &'static str,
        declared: usize,
        consumed: usize,
    },
    /// A field held a value no component state can take.
    Corrupt(&'static str),
}

impl fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadVersion(found) => write!(
                f,
                "unsupported snapshot version {found} (expected {SNAPSHOT_VERSION})"
            ),
            Self::Truncated => write!(f, "snapshot data is truncated"),
            Self::SizeMismatch {
                component,
                declared,
                consumed,
            } => write!(
                f,
                "component '{component}' consumed {consumed} of {declared} declared bytes"
            ),
            Self::Corrupt(component) => {
                write!(f, "component '{component}' holds an invalid field value")
            }
        }
    }
}

impl std::error::Error for SnapshotError {}

/// One direction of the snapshot transformation. The writer reads the
/// visited fields; the reader overwrites them.
pub trait SnapshotVisitor {
    fn visit_bool(&mut self, v: &mut bool) -> Result<(), SnapshotError>;
    fn visit_u8(&mut self, v: &mut u8) -> Result<(), SnapshotError>;
    fn visit_u16(&mut self, v: &mut u16) -> Result<(), SnapshotError>;
    fn visit_u32(&mut self, v: &mut u32) -> Result<(), SnapshotError>;
    fn visit_u64(&mut self, v: &mut u64) -> Result<(), SnapshotError>;
    fn visit_i8(&mut self, v: &mut i8) -> Result<(), SnapshotError>;
    fn visit_i16(&mut self, v: &mut i16) -> Result<(), SnapshotError>;
    fn visit_i64(&mut self, v: &mut i64) -> Result<(), SnapshotError>;
}

struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    fn new() -> Self {
        Self { buf: Vec::new() }
    }
}

macro_rules! write_le {
    ($name:ident, $ty:ty) => {
        fn $name(&mut self, v: &mut $ty) -> Result<(), SnapshotError> {
            self.buf.extend_from_slice(&v.to_le_bytes());
            Ok(())
        }
    };
}

impl SnapshotVisitor for Writer {
    fn visit_bool(&mut self, v: &mut bool) -> Result<(), SnapshotError> {
        self.buf.push(u8::from(*v));
        Ok(())
    }

    write_le!(visit_u8, u8);
    write_le!(visit_u16, u16);
    write_le!(visit_u32, u32);
    write_le!(visit_u64, u64);
    write_le!(visit_i8, i8);
    write_le!(visit_i16, i16);
    write_le!(visit_i64, i64);
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], SnapshotError> {
        let end = self.pos.checked_add(N).ok_or(SnapshotError::Truncated)?;
        let slice = self.data.get(self.pos..end).ok_or(SnapshotError::Truncated)?;
        self.pos = end;
        let mut out = [0; N];
        out.copy_from_slice(slice);
        Ok(out)
    }

    fn consumed(&self) -> usize {
        self.pos
    }
}

macro_rules! read_le {
    ($name:ident, $ty:ty) => {
        fn $name(&mut self, v: &mut $ty) -> Result<(), SnapshotError> {
            *v = <$ty>::from_le_bytes(self.take()?);
            Ok(())
        }
    };
}

impl SnapshotVisitor for Reader<'_> {
    fn visit_bool(&mut self, v: &mut bool) -> Result<(), SnapshotError> {
        let [byte] = self.take::<1>()?;
        *v = byte != 0;
        Ok(())
    }

    read_le!(visit_u8, u8);
    read_le!(visit_u16, u16);
    read_le!(visit_u32, u32);
    read_le!(visit_u64, u64);
    read_le!(visit_i8, i8);
    read_le!(visit_i16, i16);
    read_le!(visit_i64, i64);
}

fn visit_u16_slice<V: SnapshotVisitor>(v: &mut V, values: &mut [u16]) -> Result<(), SnapshotError> {
    for value in values {
        v.visit_u16(value)?;
    }
    Ok(())
}

fn visit_u32_slice<V: SnapshotVisitor>(v: &mut V, values: &mut [u32]) -> Result<(), SnapshotError> {
    for value in values {
        v.visit_u32(value)?;
    }
    Ok(())
}

fn visit_u8_slice<V: SnapshotVisitor>(v: &mut V, values: &mut [u8]) -> Result<(), SnapshotError> {
    for value in values {
        v.visit_u8(value)?;
    }
    Ok(())
}

fn visit_ddf_window<V: SnapshotVisitor>(
    v: &mut V,
    win: &mut DdfWindow,
) -> Result<(), SnapshotError> {
    v.visit_i16(&mut win.strt_odd)?;
    v.visit_i16(&mut win.stop_odd)?;
    v.visit_i16(&mut win.strt_even)?;
    v.visit_i16(&mut win.stop_even)
}

fn visit_agnus<V: SnapshotVisitor>(a: &mut Agnus, v: &mut V) -> Result<(), SnapshotError> {
    v.visit_i64(&mut a.clock)?;
    v.visit_u16(&mut a.pos.v)?;
    v.visit_u16(&mut a.pos.h)?;
    v.visit_i64(&mut a.frame.nr)?;
    v.visit_bool(&mut a.frame.lof)?;
    v.visit_bool(&mut a.frame.interlaced)?;
    v.visit_u16(&mut a.frame.prev_lines)?;

    v.visit_u16(&mut a.dmacon)?;
    v.visit_u16(&mut a.dma_das)?;
    v.visit_bool(&mut a.bls)?;

    for owner in &mut a.bus_owner {
        let mut code = owner.to_u8();
        v.visit_u8(&mut code)?;
        *owner = BusOwner::from_u8(code).ok_or(SnapshotError::Corrupt("agnus"))?;
    }
    visit_u16_slice(v, &mut a.bus_value)?;

    v.visit_u32(&mut a.dskpt)?;
    visit_u32_slice(v, &mut a.audpt)?;
    visit_u32_slice(v, &mut a.audlc)?;
    visit_u32_slice(v, &mut a.bplpt)?;
    visit_u32_slice(v, &mut a.sprpt)?;

    v.visit_u16(&mut a.diwstrt)?;
    v.visit_u16(&mut a.diwstop)?;
    v.visit_i16(&mut a.diw_vstrt)?;
    v.visit_i16(&mut a.diw_vstop)?;
    v.visit_i16(&mut a.diw_hstrt)?;
    v.visit_i16(&mut a.diw_hstop)?;
    v.visit_bool(&mut a.diw_vflop)?;

    v.visit_u16(&mut a.ddfstrt)?;
    v.visit_u16(&mut a.ddfstop)?;
    v.visit_i16(&mut a.ddfstrt_reached)?;
    v.visit_i16(&mut a.ddfstop_reached)?;
    let mut ddf_state = match a.ddf_state {
        DdfState::Off => 0u8,
        DdfState::On => 1,
    };
    v.visit_u8(&mut ddf_state)?;
    a.ddf_state = match ddf_state {
        0 => DdfState::Off,
        1 => DdfState::On,
        _ => return Err(SnapshotError::Corrupt("agnus")),
    };
    v.visit_bool(&mut a.ddf_vflop)?;
    v.visit_i16(&mut a.ocs_early_access_line)?;
    visit_ddf_window(v, &mut a.ddf_lores)?;
    visit_ddf_window(v, &mut a.ddf_hires)?;

    v.visit_u16(&mut a.bplcon0)?;
    v.visit_u16(&mut a.bplcon1)?;
    v.visit_i16(&mut a.bpl1mod)?;
    v.visit_i16(&mut a.bpl2mod)?;
    v.visit_bool(&mut a.bpl_dma_line)?;

    let mut actions = a.hsync_actions.bits();
    v.visit_u8(&mut actions)?;
    a.hsync_actions =
        HsyncActions::from_bits(actions).ok_or(SnapshotError::Corrupt("agnus"))?;

    visit_u16_slice(v, &mut a.spr_vstrt)?;
    visit_u16_slice(v, &mut a.spr_vstop)?;
    for state in &mut a.spr_dma_state {
        let mut code = match state {
            SpriteDmaState::Idle => 0u8,
            SpriteDmaState::Active => 1,
        };
        v.visit_u8(&mut code)?;
        *state = match code {
            0 => SpriteDmaState::Idle,
            1 => SpriteDmaState::Active,
            _ => return Err(SnapshotError::Corrupt("agnus")),
        };
    }

    visit_u8_slice(v, &mut a.bpl_event)?;
    for event in &mut a.das_event {
        let mut code = event.to_code();
        v.visit_u8(&mut code)?;
        *event = DasEvent::from_code(code).ok_or(SnapshotError::Corrupt("agnus"))?;
    }
    visit_u8_slice(v, &mut a.next_bpl_event)?;
    visit_u8_slice(v, &mut a.next_das_event)?;

    debug_assert_eq!(a.bus_owner.len(), HPOS);
    Ok(())
}

fn visit_copper<V: SnapshotVisitor>(c: &mut Copper, v: &mut V) -> Result<(), SnapshotError> {
    v.visit_u32(&mut c.coplc[0])?;
    v.visit_u32(&mut c.coplc[1])?;
    v.visit_u32(&mut c.coppc)?;
    v.visit_u16(&mut c.copins1)?;
    v.visit_u16(&mut c.copins2)?;
    v.visit_bool(&mut c.cdang)?;
    v.visit_bool(&mut c.skip)
}

fn visit_disk<V: SnapshotVisitor>(d: &mut DiskController, v: &mut V) -> Result<(), SnapshotError> {
    let mut state = d.state.to_u8();
    v.visit_u8(&mut state)?;
    d.state = DiskDmaState::from_u8(state).ok_or(SnapshotError::Corrupt("disk"))?;

    let (mut bits, mut count) = d.fifo.raw();
    v.visit_u64(&mut bits)?;
    v.visit_u8(&mut count)?;
    if count > 6 {
        return Err(SnapshotError::Corrupt("disk"));
    }
    d.fifo.set_raw(bits, count);
    v.visit_u64(&mut d.fifo.underruns)?;

    v.visit_u16(&mut d.dsklen)?;
    v.visit_u16(&mut d.dsksync)?;
    v.visit_u8(&mut d.prb)?;
    v.visit_i8(&mut d.selected)?;
    for connected in &mut d.connected {
        v.visit_bool(connected)?;
    }
    v.visit_u32(&mut d.acceleration)?;
    v.visit_u8(&mut d.incoming)?;
    v.visit_i64(&mut d.incoming_cycle)?;
    v.visit_bool(&mut d.sync_flag)
}

fn visit_irq<V: SnapshotVisitor>(
    irq: &mut InterruptAggregator,
    v: &mut V,
) -> Result<(), SnapshotError> {
    v.visit_u16(&mut irq.intreq)?;
    v.visit_u16(&mut irq.intena)?;
    for trigger in irq.delayed_raw_mut() {
        v.visit_i64(trigger)?;
    }
    Ok(())
}

fn visit_scheduler<V: SnapshotVisitor>(s: &mut Scheduler, v: &mut V) -> Result<(), SnapshotError> {
    for slot in &mut s.slots {
        v.visit_i64(&mut slot.trigger)?;
        let mut id = slot.id.to_u8();
        v.visit_u8(&mut id)?;
        slot.id = EventId::from_u8(id).ok_or(SnapshotError::Corrupt("scheduler"))?;
        v.visit_i64(&mut slot.data)?;
    }
    s.refresh_next_trigger();
    Ok(())
}

fn visit_control<V: SnapshotVisitor>(c: &mut ControlState, v: &mut V) -> Result<(), SnapshotError> {
    v.visit_u16(&mut c.adkcon)?;
    v.visit_bool(&mut c.blitter_busy)?;

    let mut count = c.changes.pending.len() as u32;
    v.visit_u32(&mut count)?;
    if count > 256 {
        return Err(SnapshotError::Corrupt("control"));
    }
    c.changes.pending.resize(
        count as usize,
        RegChange {
            trigger: 0,
            reg: ChangeReg::Dmacon,
            value: 0,
        },
    );
    for change in &mut c.changes.pending {
        v.visit_i64(&mut change.trigger)?;
        let mut reg = change.reg.to_u8();
        v.visit_u8(&mut reg)?;
        change.reg = ChangeReg::from_u8(reg).ok_or(SnapshotError::Corrupt("control"))?;
        v.visit_u16(&mut change.value)?;
    }
    Ok(())
}

fn write_section(out: &mut Vec<u8>, tag: u8, payload: Vec<u8>) {
    out.push(tag);
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(&payload);
}

fn serialize<F>(visit: F) -> Vec<u8>
where
    F: FnOnce(&mut Writer) -> Result<(), SnapshotError>,
{
    let mut writer = Writer::new();
    // Writing cannot fail; the Result only exists for the reading side.
    let _ = visit(&mut writer);
    writer.buf
}

impl Chipset {
    /// Serialize the complete core state.
    #[must_use]
    pub fn save_snapshot(&self) -> Vec<u8> {
        let mut out = vec![SNAPSHOT_VERSION];

        let mut agnus = self.agnus.clone();
        write_section(
            &mut out,
            TAG_AGNUS,
            serialize(|w| visit_agnus(&mut agnus, w)),
        );

        let mut copper = self.copper.clone();
        write_section(
            &mut out,
            TAG_COPPER,
            serialize(|w| visit_copper(&mut copper, w)),
        );

        let mut disk = self.disk.clone();
        write_section(&mut out, TAG_DISK, serialize(|w| visit_disk(&mut disk, w)));

        let mut irq = self.irq.clone();
        write_section(&mut out, TAG_IRQ, serialize(|w| visit_irq(&mut irq, w)));

        let mut scheduler = self.scheduler.clone();
        write_section(
            &mut out,
            TAG_SCHEDULER,
            serialize(|w| visit_scheduler(&mut scheduler, w)),
        );

        let mut control = self.control_copy();
        write_section(
            &mut out,
            TAG_CONTROL,
            serialize(|w| visit_control(&mut control, w)),
        );

        out
    }

    /// Restore the core from a snapshot. On error the live state is left
    /// untouched.
    pub fn load_snapshot(&mut self, data: &[u8]) -> Result<(), SnapshotError> {
        let version = *data.first().ok_or(SnapshotError::Truncated)?;
        if version != SNAPSHOT_VERSION {
            return Err(SnapshotError::BadVersion(version));
        }

        let mut agnus = self.agnus.clone();
        let mut copper = self.copper.clone();
        let mut disk = self.disk.clone();
        let mut irq = self.irq.clone();
        let mut scheduler = self.scheduler.clone();
        let mut control = self.control_copy();

        let mut pos = 1;
        while pos < data.len() {
            let tag = data[pos];
            let header_end = pos + 5;
            let len_bytes = data.get(pos + 1..header_end).ok_or(SnapshotError::Truncated)?;
            let len = u32::from_le_bytes([
                len_bytes[0],
                len_bytes[1],
                len_bytes[2],
                len_bytes[3],
            ]) as usize;
            let payload = data
                .get(header_end..header_end + len)
                .ok_or(SnapshotError::Truncated)?;
            pos = header_end + len;

            let mut reader = Reader::new(payload);
            let (component, result) = match tag {
                TAG_AGNUS => ("agnus", visit_agnus(&mut agnus, &mut reader)),
                TAG_COPPER => ("copper", visit_copper(&mut copper, &mut reader)),
                TAG_DISK => ("disk", visit_disk(&mut disk, &mut reader)),
                TAG_IRQ => ("irq", visit_irq(&mut irq, &mut reader)),
                TAG_SCHEDULER => ("scheduler", visit_scheduler(&mut scheduler, &mut reader)),
                TAG_CONTROL => ("control", visit_control(&mut control, &mut reader)),
                // Unknown component: skippable by construction.
                _ => continue,
            };
            result?;
            if reader.consumed() != len {
                return Err(SnapshotError::SizeMismatch {
                    component,
                    declared: len,
                    consumed: reader.consumed(),
                });
            }
        }

        // Everything validated; commit.
        self.agnus = agnus;
        self.copper = copper;
        self.disk = disk;
        self.irq = irq;
        self.scheduler = scheduler;
        self.apply_control_copy(control);

        // Derived values not worth carrying in the format.
        let bplcon1 = self.agnus.bplcon1;
        self.agnus.set_scroll_values(bplcon1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChipsetConfig;

    #[test]
    fn writer_and_reader_agree_on_field_layout() {
        let mut value_a = 0x1234u16;
        let mut value_b = -5i64;
        let mut flag = true;

        let mut writer = Writer::new();
        writer.visit_u16(&mut value_a).expect("write");
        writer.visit_i64(&mut value_b).expect("write");
        writer.visit_bool(&mut flag).expect("write");

        let buf = writer.buf;
        let mut reader = Reader::new(&buf);
        let mut out_a = 0u16;
        let mut out_b = 0i64;
        let mut out_flag = false;
        reader.visit_u16(&mut out_a).expect("read");
        reader.visit_i64(&mut out_b).expect("read");
        reader.visit_bool(&mut out_flag).expect("read");

        assert_eq!(out_a, 0x1234);
        assert_eq!(out_b, -5);
        assert!(out_flag);
        assert_eq!(reader.consumed(), buf.len());
    }

    #[test]
    fn reader_reports_truncation() {
        let mut reader = Reader::new(&[0x01]);
        let mut value = 0u32;
        assert!(matches!(
            reader.visit_u32(&mut value),
            Err(SnapshotError::Truncated)
        ));
    }

    #[test]
    fn bad_version_is_rejected() {
        let mut chipset = Chipset::new(ChipsetConfig::default());
        let mut data = chipset.save_snapshot();
        data[0] = 99;
        assert!(matches!(
            chipset.load_snapshot(&data),
            Err(SnapshotError::BadVersion(99))
        ));
    }
}
