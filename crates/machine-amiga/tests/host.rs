//! The simulated machine as the loader sees it: through the bus, the
//! allocator and the supervisor only.

use std::io::Write;

use machine_amiga::{AmigaModel, BusEvent, ExecOp, MachineConfig, SimMachine};
use stateload_core::map::{cia, custom};
use stateload_core::{ChipBus, Cia, CiaId, Custom, Exec, PoolId, Supervisor, forbid};

#[test]
fn floppy_head_follows_cia_b_port() {
    let mut m = SimMachine::new(MachineConfig {
        drives: vec![3],
        ..MachineConfig::preset(AmigaModel::A500)
    })
    .expect("config");

    let mut ciab = Cia::new(&mut m, CiaId::B);
    ciab.write(cia::PRB, 0xFF);
    ciab.clear_bits(cia::PRB, cia::PRB_DSKSEL0);
    for _ in 0..3 {
        ciab.clear_bits(cia::PRB, cia::PRB_DSKSTEP);
        ciab.set_bits(cia::PRB, cia::PRB_DSKSTEP);
    }
    assert_eq!(m.drive(0).cylinder(), 0);
    let pra = Cia::new(&mut m, CiaId::A).read(cia::PRA);
    assert_eq!(pra & cia::PRA_DSKTRACK0, 0, "track 0 is active low");
}

#[test]
fn absent_drive_never_reaches_track0() {
    let mut m = SimMachine::preset(AmigaModel::A500);
    let mut ciab = Cia::new(&mut m, CiaId::B);
    ciab.write(cia::PRB, 0xFF & !(cia::PRB_DSKSEL0 << 2));
    let pra = Cia::new(&mut m, CiaId::A).read(cia::PRA);
    assert_ne!(pra & cia::PRA_DSKTRACK0, 0);
}

#[test]
fn tod_written_high_first_is_not_torn() {
    let mut m = SimMachine::preset(AmigaModel::A1200);
    {
        let mut ciaa = Cia::new(&mut m, CiaId::A);
        ciaa.write(cia::TODHI, 0x00);
        ciaa.write(cia::TODMID, 0x12);
    }
    // A frame passes between the writes.
    m.wait_tof();
    Cia::new(&mut m, CiaId::A).write(cia::TODLOW, 0x34);
    assert_eq!(m.cia(CiaId::A).tod_counter(), 0x1234);
}

#[test]
fn custom_writes_are_traced() {
    let mut m = SimMachine::preset(AmigaModel::A600);
    Custom::new(&mut m).write(custom::COLOR00, 0x0400);
    assert_eq!(
        m.trace().last(),
        Some(&BusEvent::Custom {
            reg: custom::COLOR00,
            value: 0x0400
        })
    );
    assert_eq!(m.custom().shadow(custom::COLOR00), 0x0400);
}

#[test]
fn vhposr_polling_moves_the_beam() {
    let mut m = SimMachine::preset(AmigaModel::A600);
    let mut c = Custom::new(&mut m);
    let a = c.read(custom::VHPOSR) & 0xFF00;
    let b = c.read(custom::VHPOSR) & 0xFF00;
    assert_ne!(a, b);
}

#[test]
fn memory_list_walk_is_counted_outside_forbid() {
    let mut m = SimMachine::preset(AmigaModel::A1200);
    {
        let guard = forbid(&mut m);
        assert_eq!(guard.mem_headers().len(), 2);
    }
    assert_eq!(m.forbid_depth(), 0);
    assert_eq!(m.unguarded_scans(), 0);
    let _ = m.mem_headers();
    assert_eq!(m.unguarded_scans(), 1);
}

#[test]
fn alloc_abs_and_free_mem_round_trip() {
    let mut m = SimMachine::preset(AmigaModel::A1200);
    let before = m.free_bytes(0x20_0000).expect("fast");
    let addr = m.alloc_abs(0x1_0000, 0x30_0000).expect("free");
    assert_eq!(addr, 0x30_0000);
    assert_eq!(m.alloc_abs(0x10, 0x30_0100), None);
    assert_eq!(m.failed_abs(), 1);
    m.free_mem(addr, 0x1_0000);
    assert_eq!(m.free_bytes(0x20_0000), Some(before));
    let log = m.exec_log();
    assert_eq!(
        &log[log.len() - 2..],
        &[
            ExecOp::AllocAbs {
                addr: 0x30_0000,
                size: 0x1_0000
            },
            ExecOp::FreeMem {
                addr: 0x30_0000,
                size: 0x1_0000
            },
        ]
    );
}

#[test]
fn allocate_from_named_pool() {
    let mut m = SimMachine::preset(AmigaModel::A1200);
    let chip = m
        .mem_headers()
        .into_iter()
        .find(|h| h.start() == 0)
        .expect("chip header");
    let addr = m.allocate(chip.id, 100).expect("chip");
    assert!(addr < 0x20_0000);
    m.deallocate(chip.id, addr, 100);
    assert!(matches!(m.exec_log().last(), Some(ExecOp::Deallocate { .. })));
    assert_eq!(m.allocate(PoolId(99), 8), None);
}

#[test]
fn block_writes_land_in_ram() {
    let mut m = SimMachine::preset(AmigaModel::A500);
    m.write_block(0x1_0000, &[1, 2, 3, 4]);
    assert_eq!(m.ram(0x1_0000, 4), Some(&[1, 2, 3, 4][..]));
    let mut back = [0u8; 4];
    m.read_block(0x1_0000, &mut back);
    assert_eq!(back, [1, 2, 3, 4]);
}

#[test]
fn scripted_keys_then_silence() {
    let mut m = SimMachine::preset(AmigaModel::A500).with_keys(*b"\n");
    assert_eq!(m.wait_key(), Some(b'\n'));
    assert_eq!(m.wait_key(), None);
}

#[test]
fn display_shutdown_and_delay() {
    let mut m = SimMachine::preset(AmigaModel::A1200);
    assert!(m.display_on());
    m.load_view_null();
    assert!(!m.display_on());
    let frame = m.custom().frame;
    m.delay(3);
    assert_eq!(m.custom().frame, frame + 3);
    assert_eq!(m.delayed_ticks(), 3);
    assert_eq!(m.graphics_version(), 40);
}

#[test]
fn machine_description_from_file() {
    let mut file = tempfile::NamedTempFile::new().expect("tempfile");
    write!(
        file,
        r#"{{ "model": "a3000", "drives": [10, 20, 30] }}"#
    )
    .expect("write");
    let cfg = MachineConfig::load(file.path()).expect("load");
    assert_eq!(cfg.cpu, 68030);
    let m = SimMachine::new(cfg).expect("machine");
    assert_eq!(m.drive(2).cylinder(), 30);
    assert!(!m.drive(3).connected());
}
