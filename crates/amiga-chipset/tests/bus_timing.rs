mod common;

use amiga_chipset::agnus::tables::bpl_plane;
use amiga_chipset::custom_regs as regs;
use amiga_chipset::host::PokeSource;
use amiga_chipset::{dma_cycles, Beam, BusOwner, Chipset, HPOS_CNT};

use common::{make_chipset, owned_cycles, run_cycles, run_until, TestHost};

const DMACON_SET: u16 = 0x8000;

fn poke(chipset: &mut Chipset, host: &mut TestHost, reg: u16, value: u16) {
    chipset.poke_custom16(host, reg, value, PokeSource::Cpu);
}

/// Open the display and fetch windows and enable six lores bitplanes plus
/// the blitter.
fn enable_display_dma(chipset: &mut Chipset, host: &mut TestHost) {
    poke(chipset, host, regs::DIWSTRT, 0x2C81);
    poke(chipset, host, regs::DIWSTOP, 0xF4C1);
    poke(chipset, host, regs::DDFSTRT, 0x0038);
    poke(chipset, host, regs::DDFSTOP, 0x00D0);
    poke(chipset, host, regs::BPLCON0, 0x6000);
    poke(
        chipset,
        host,
        regs::DMACON,
        DMACON_SET | regs::DMAF_DMAEN | regs::DMAF_BPLEN | regs::DMAF_BLTEN,
    );
}

#[test]
fn end_of_line_arithmetic() {
    let (mut chipset, mut host) = make_chipset();
    assert_eq!(chipset.beam(), Beam::new(0, 0));

    run_cycles(&mut chipset, &mut host, i64::from(HPOS_CNT));

    assert_eq!(chipset.beam(), Beam::new(1, 0));
    assert_eq!(host.lines_completed, vec![1], "one end-of-line exactly");
    assert!(
        chipset.agnus.bus_owner.iter().all(|&o| o == BusOwner::None),
        "bus usage table cleared at end of line"
    );
    assert_eq!(chipset.clock(), dma_cycles(i64::from(HPOS_CNT)));
}

#[test]
fn vertical_blank_interrupt_fires_at_line_start() {
    let (mut chipset, mut host) = make_chipset();
    assert_eq!(chipset.irq.intreq & 0x0020, 0);

    // The strobe sits at cycle 1 of the frame.
    run_cycles(&mut chipset, &mut host, 1);
    assert_ne!(chipset.irq.intreq & 0x0020, 0, "VERTB raised");
}

#[test]
fn single_stepping_equals_fast_forward() {
    let (mut stepped, mut host_a) = make_chipset();
    let (mut jumped, mut host_b) = make_chipset();
    enable_display_dma(&mut stepped, &mut host_a);
    enable_display_dma(&mut jumped, &mut host_b);

    let total = 3 * i64::from(HPOS_CNT) + 41;
    run_cycles(&mut stepped, &mut host_a, total);

    // The same distance in uneven chunks through the fast-forward path.
    let target = jumped.clock() + dma_cycles(total);
    while jumped.clock() < target {
        let next = (jumped.clock() + dma_cycles(97)).min(target);
        jumped.execute_until(&mut host_b, next);
    }

    assert_eq!(stepped.clock(), jumped.clock());
    assert_eq!(stepped.beam(), jumped.beam());
    assert_eq!(stepped.agnus.bus_owner, jumped.agnus.bus_owner);
    for (a, b) in stepped
        .scheduler
        .slots
        .iter()
        .zip(jumped.scheduler.slots.iter())
    {
        assert_eq!(a.trigger, b.trigger);
        assert_eq!(a.id, b.id);
        assert_eq!(a.data, b.data);
    }
}

#[test]
fn bitplane_dma_wins_fetch_cycles_and_blitter_takes_the_rest() {
    let (mut chipset, mut host) = make_chipset();
    enable_display_dma(&mut chipset, &mut host);

    // Let the configuration settle and reach a display line.
    let reached = run_until(&mut chipset, &mut host, 60 * i64::from(HPOS_CNT), |c, _| {
        c.beam() == Beam::new(50, 0)
    });
    assert!(reached, "display line reached");
    assert!(chipset.agnus.in_bpl_dma_line());

    // Walk the line cycle by cycle. A fake blitter begs for every cycle
    // the allocation table leaves free.
    let mut blitter_cycles = 0;
    for _ in 0..(HPOS_CNT - 1) {
        chipset.execute(&mut host);
        let h = chipset.beam().h as usize;

        let entry = chipset.agnus.bpl_event[h];
        if bpl_plane(entry).is_some() {
            assert_eq!(
                chipset.agnus.bus_owner[h],
                BusOwner::Bitplane,
                "fetch cycle {h:#X} must belong to bitplane DMA"
            );
        } else if chipset.agnus.bus_owner[h] == BusOwner::None
            && chipset.agnus.allocate_bus(BusOwner::Blitter)
        {
            blitter_cycles += 1;
        }
    }

    // Six planes in lores: six fetches per eight-cycle unit, twenty units.
    assert_eq!(owned_cycles(&chipset, BusOwner::Bitplane), 120);
    assert!(blitter_cycles > 0, "the blitter got the leftover cycles");

    // No cycle carries two owners: fetch cycles stayed bitplane-owned.
    for (h, &owner) in chipset.agnus.bus_owner.iter().enumerate() {
        if bpl_plane(chipset.agnus.bpl_event[h]).is_some() {
            assert_eq!(owner, BusOwner::Bitplane);
        }
    }
}

#[test]
fn starved_cpu_blocks_the_blitter() {
    let (mut chipset, mut host) = make_chipset();
    poke(
        &mut chipset,
        &mut host,
        regs::DMACON,
        DMACON_SET | regs::DMAF_DMAEN | regs::DMAF_BLTEN,
    );
    run_cycles(&mut chipset, &mut host, 8);

    chipset.agnus.bls = true;
    assert!(
        !chipset.agnus.allocate_bus(BusOwner::Blitter),
        "blitter must yield to a starved CPU"
    );

    poke(
        &mut chipset,
        &mut host,
        regs::DMACON,
        DMACON_SET | regs::DMAF_BLITHOG,
    );
    run_cycles(&mut chipset, &mut host, 4);
    assert!(
        chipset.agnus.allocate_bus(BusOwner::Blitter),
        "blitter priority overrides the CPU"
    );
}

#[test]
fn cpu_is_charged_wait_states_for_occupied_cycles() {
    let (mut chipset, mut host) = make_chipset();

    // Advance into the refresh cycle at position 1.
    run_cycles(&mut chipset, &mut host, i64::from(HPOS_CNT) + 1);
    assert_eq!(chipset.beam().h, 1);
    assert_eq!(chipset.agnus.bus_owner[1], BusOwner::Refresh);

    chipset.execute_until_bus_is_free(&mut host);

    assert_eq!(chipset.beam().h, 2);
    assert_eq!(chipset.agnus.bus_owner[2], BusOwner::Cpu);
    // One denied DMA cycle, reported in CPU clock units.
    assert_eq!(host.wait_states, 2);
    assert!(!chipset.agnus.bls);
}

#[test]
fn free_cycle_goes_to_the_cpu_without_wait_states() {
    let (mut chipset, mut host) = make_chipset();
    run_cycles(&mut chipset, &mut host, 40);

    let h = chipset.beam().h as usize;
    assert_eq!(chipset.agnus.bus_owner[h], BusOwner::None);
    chipset.execute_until_bus_is_free(&mut host);
    assert_eq!(chipset.agnus.bus_owner[h], BusOwner::Cpu);
    assert_eq!(host.wait_states, 0);
}

#[test]
fn suspension_stops_at_a_cycle_boundary() {
    let (mut chipset, mut host) = make_chipset();
    run_cycles(&mut chipset, &mut host, 10);

    chipset.suspend();
    let before = chipset.clock();
    chipset.execute_until(&mut host, before + dma_cycles(500));
    assert_eq!(chipset.clock(), before, "suspended core does not advance");

    chipset.resume();
    chipset.execute_until(&mut host, before + dma_cycles(500));
    assert_eq!(chipset.clock(), before + dma_cycles(500));
}
