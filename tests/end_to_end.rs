//! The six end-to-end scenarios spelled out for this simulator: a
//! single-instruction step, a conditional-branch program, a load through
//! mapped RAM, an exception-entry sequence, an out-of-range bus write, and
//! a GDB memory read.

use armsim::bus::{AddressableNode, Bus, Ram};
use armsim::cpu::cp15::Selector;
use armsim::cpu::execute;
use armsim::cpu::CpuCore;

fn cpu_with_flat_ram(size_words: usize) -> (CpuCore, Ram) {
    let (mut cpu, _pending) = CpuCore::new();
    cpu.cp15.write(Selector::Sctlr, 0, true, true).unwrap(); // MMU off: identity map
    cpu.regs.set_pc(0);
    (cpu, Ram::new("ram", size_words))
}

#[test]
fn mov_immediate_sets_r0_and_advances_ip_by_four() {
    let (mut cpu, mut ram) = cpu_with_flat_ram(4);
    ram.write_default(0, 0xE3A0_0001).unwrap(); // MOV R0, #1
    execute::step(&mut cpu, &mut ram).unwrap();
    assert_eq!(cpu.register_read(0), 1);
    assert_eq!(cpu.pc(), 4);
}

#[test]
fn cmp_and_branch_if_equal_skips_the_intervening_mov() {
    let (mut cpu, mut ram) = cpu_with_flat_ram(8);
    ram.write_default(0, 0xE350_0000).unwrap(); // CMP R0, #0
    ram.write_default(4, 0x0A00_0000).unwrap(); // BEQ .+8
    ram.write_default(8, 0xE3A0_1002).unwrap(); // MOV R1, #2
    ram.write_default(12, 0xE3A0_1003).unwrap(); // MOV R1, #3
    cpu.register_write(0, 0);

    for _ in 0..4 {
        execute::step(&mut cpu, &mut ram).unwrap();
    }

    assert_eq!(cpu.register_read(1), 3);
    assert_eq!(cpu.pc(), 16);
}

#[test]
fn load_from_mapped_ram_via_a_pc_relative_literal_pool() {
    let mut bus = Bus::flat("bus");
    bus.attach(0, 0x1000, 0, Box::new(Ram::new("code", 0x400)));
    bus.attach(0x4030_0000, 0x4030_0400, 0, Box::new(Ram::new("data", 0x100)));
    bus.write_default(0x4030_0010, 0xDEAD_BEEF).unwrap();

    let (mut cpu, _pending) = CpuCore::new();
    cpu.cp15.write(Selector::Sctlr, 0, true, true).unwrap();
    cpu.regs.set_pc(0);
    // LDR R2, [PC, #4] at address 0: literal pool at PC+8+4=12 holds the RAM address.
    bus.write_default(0, 0xE59F_2004).unwrap();
    bus.write_default(12, 0x4030_0010).unwrap();
    // LDR R3, [R2] at address 4.
    bus.write_default(4, 0xE592_3000).unwrap();

    execute::step(&mut cpu, &mut bus).unwrap();
    assert_eq!(cpu.register_read(2), 0x4030_0010);
    execute::step(&mut cpu, &mut bus).unwrap();
    assert_eq!(cpu.register_read(3), 0xDEAD_BEEF);
}

#[test]
fn svc_routes_through_exception_entry_to_the_vbar_based_vector() {
    let (mut cpu, mut ram) = cpu_with_flat_ram(0x4100);
    cpu.cp15.write(Selector::Vbar, 0x1_0000, true, true).unwrap();
    cpu.regs.set_pc(0x4000);
    let saved_cpsr = cpu.cpsr;
    ram.write_default(0x4000, 0xEF00_0000).unwrap(); // SVC #0

    execute::step(&mut cpu, &mut ram).unwrap(); // executes SVC, raises pending
    execute::step(&mut cpu, &mut ram).unwrap(); // services the pending exception

    assert_eq!(cpu.mode(), armsim::cpu::Mode::Svc);
    assert_eq!(cpu.pc(), 0x1_0008);
    assert_eq!(cpu.spsr(), Some(saved_cpsr));
    assert_eq!(cpu.register_read(14), 0x4004);
}

#[test]
fn bus_write_out_of_range_fails_without_mutating_mapped_memory() {
    let mut bus = Bus::flat("bus");
    bus.attach(0, 0x1000, 0, Box::new(Ram::new("ram", 0x400)));
    assert!(bus.write_default(0x2000, 0xFFFF_FFFF).is_err());
    assert_eq!(bus.read_default(0).unwrap(), 0);
}

#[test]
fn gdb_memory_read_reports_little_endian_bytes() {
    use armsim::gdb::rungate::RunGate;
    use armsim::gdb::Machine;
    use std::sync::{Arc, Mutex};

    let mut ram = Ram::new("ram", 0x100);
    ram.write_default(0x4030_0000, 0x1234_5678).unwrap();
    let (cpu, _pending) = CpuCore::new();

    let machine = Machine {
        cpu: Mutex::new(cpu),
        bus: Mutex::new(ram),
        run_gate: Arc::new(RunGate::new()),
    };

    // The wire-level request is `$m40300000,4#...`; we exercise the memory
    // read path directly since it doesn't touch the TCP transport.
    let mut cpu = machine.cpu.lock().unwrap();
    let mut bus = machine.bus.lock().unwrap();
    let word = cpu.mmu_read(&mut *bus, 0x4030_0000 & !0x3, false).unwrap();
    assert_eq!(word.to_le_bytes(), [0x78, 0x56, 0x34, 0x12]);
}
