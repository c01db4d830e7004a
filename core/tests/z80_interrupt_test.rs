use markiii_core::cpu::Z80;
mod common;
use common::TestBus;

fn cpu_at(pc: u16) -> Z80 {
    let mut cpu = Z80::new();
    cpu.pc = pc;
    cpu.sp = 0x1000;
    cpu
}

// ============================================================
// NMI
// ============================================================

#[test]
fn test_nmi_basic() {
    let mut cpu = cpu_at(0x0100);
    let mut bus = TestBus::new();
    cpu.iff1 = true;
    cpu.iff2 = true;
    bus.load(0x0100, &[0x00]);

    cpu.step(&mut bus); // NOP
    assert_eq!(cpu.pc, 0x0101);

    cpu.nmi();
    let cycles = cpu.step(&mut bus);
    assert_eq!(cycles, 11, "NMI response is 11 T-states");
    assert_eq!(cpu.pc, 0x0066);
    assert_eq!(cpu.sp, 0x0FFE);
    assert_eq!(bus.memory[0x0FFF], 0x01, "return address high");
    assert_eq!(bus.memory[0x0FFE], 0x01, "return address low");
    assert!(!cpu.iff1, "IFF1 cleared");
    assert!(cpu.iff2, "IFF2 preserved for RETN");
}

#[test]
fn test_nmi_latch_consumed_once() {
    let mut cpu = cpu_at(0x0100);
    let mut bus = TestBus::new();
    bus.load(0x0100, &[0x00, 0x00]);
    bus.load(0x0066, &[0x00]);

    cpu.nmi();
    cpu.step(&mut bus);
    assert_eq!(cpu.pc, 0x0066, "latched NMI taken");

    cpu.step(&mut bus);
    assert_eq!(cpu.pc, 0x0067, "no second NMI without a new edge");
}

#[test]
fn test_retn_restores_iff1() {
    let mut cpu = cpu_at(0x0100);
    let mut bus = TestBus::new();
    cpu.iff1 = true;
    cpu.iff2 = true;
    bus.load(0x0100, &[0x00]);
    bus.load(0x0066, &[0xED, 0x45]); // RETN

    cpu.step(&mut bus);
    cpu.nmi();
    cpu.step(&mut bus);
    assert!(!cpu.iff1);

    let cycles = cpu.step(&mut bus); // RETN
    assert_eq!(cycles, 14);
    assert!(cpu.iff1, "RETN restores IFF1 from IFF2");
    assert_eq!(cpu.pc, 0x0101);
}

#[test]
fn test_nmi_priority_over_irq() {
    let mut cpu = cpu_at(0x0100);
    let mut bus = TestBus::new();
    cpu.iff1 = true;
    cpu.im = 1;
    bus.load(0x0100, &[0x00]);

    cpu.nmi();
    cpu.set_irq(true);
    cpu.step(&mut bus);
    assert_eq!(cpu.pc, 0x0066, "NMI wins");
}

// ============================================================
// Maskable interrupt (IM 1)
// ============================================================

#[test]
fn test_irq_im1_basic() {
    let mut cpu = cpu_at(0x0200);
    let mut bus = TestBus::new();
    cpu.iff1 = true;
    cpu.iff2 = true;
    cpu.im = 1;
    bus.load(0x0200, &[0x00]);

    cpu.set_irq(true);
    let cycles = cpu.step(&mut bus);
    assert_eq!(cycles, 13, "IM 1 response is 13 T-states");
    assert_eq!(cpu.pc, 0x0038);
    assert_eq!(cpu.sp, 0x0FFE);
    assert_eq!(bus.memory[0x0FFF], 0x02);
    assert_eq!(bus.memory[0x0FFE], 0x00);
    assert!(!cpu.iff1);
    assert!(!cpu.iff2);
}

#[test]
fn test_irq_masked_by_iff1() {
    let mut cpu = cpu_at(0x0200);
    let mut bus = TestBus::new();
    cpu.iff1 = false;
    cpu.im = 1;
    bus.load(0x0200, &[0x00, 0x00]);

    cpu.set_irq(true);
    cpu.step(&mut bus);
    assert_eq!(cpu.pc, 0x0201, "masked IRQ is ignored");
}

#[test]
fn test_irq_level_triggered_until_deasserted() {
    let mut cpu = cpu_at(0x0200);
    let mut bus = TestBus::new();
    cpu.iff1 = true;
    cpu.im = 1;
    bus.load(0x0200, &[0x00]);
    bus.load(0x0038, &[0xFB, 0x00]); // EI; NOP

    cpu.set_irq(true);
    cpu.step(&mut bus);
    assert_eq!(cpu.pc, 0x0038);

    // Handler re-enables interrupts while the line stays high:
    // after the EI-delay instruction, it is taken again.
    cpu.step(&mut bus); // EI
    cpu.step(&mut bus); // NOP (delay slot)
    cpu.step(&mut bus); // second acknowledge
    assert_eq!(cpu.pc, 0x0038, "level-triggered line re-fires");
}

#[test]
fn test_irq_im2_vectored() {
    let mut cpu = cpu_at(0x0200);
    let mut bus = TestBus::new();
    cpu.iff1 = true;
    cpu.im = 2;
    cpu.i = 0x80;
    // Floating bus gives vector low byte 0xFF: table entry at 0x80FF
    bus.memory[0x80FF] = 0x34;
    bus.memory[0x8100] = 0x12;
    bus.load(0x0200, &[0x00]);

    cpu.set_irq(true);
    let cycles = cpu.step(&mut bus);
    assert_eq!(cycles, 19, "IM 2 response is 19 T-states");
    assert_eq!(cpu.pc, 0x1234);
}

// ============================================================
// EI delay
// ============================================================

#[test]
fn test_ei_delay_defers_one_instruction() {
    let mut cpu = cpu_at(0x0100);
    let mut bus = TestBus::new();
    cpu.im = 1;
    bus.load(0x0100, &[0xFB, 0x00, 0x00]); // EI; NOP; NOP

    cpu.set_irq(true);

    cpu.step(&mut bus); // EI
    assert!(cpu.iff1);
    assert_eq!(cpu.pc, 0x0101);

    cpu.step(&mut bus); // NOP executes despite pending IRQ
    assert_eq!(cpu.pc, 0x0102, "interrupt hidden for one instruction");

    cpu.step(&mut bus);
    assert_eq!(cpu.pc, 0x0038, "taken after the delay slot");
}

#[test]
fn test_di_masks() {
    let mut cpu = cpu_at(0x0100);
    let mut bus = TestBus::new();
    cpu.iff1 = true;
    cpu.im = 1;
    bus.load(0x0100, &[0xF3, 0x00]); // DI; NOP

    cpu.step(&mut bus);
    assert!(!cpu.iff1);

    cpu.set_irq(true);
    cpu.step(&mut bus);
    assert_eq!(cpu.pc, 0x0102, "IRQ masked after DI");
}

// ============================================================
// HALT
// ============================================================

#[test]
fn test_halt_burns_4t_nops() {
    let mut cpu = cpu_at(0x0100);
    let mut bus = TestBus::new();
    bus.load(0x0100, &[0x76]);

    assert_eq!(cpu.step(&mut bus), 4);
    assert!(cpu.halted);
    assert_eq!(cpu.pc, 0x0101, "PC rests past the HALT");

    assert_eq!(cpu.step(&mut bus), 4, "idle step");
    assert!(cpu.halted);
    assert_eq!(cpu.pc, 0x0101);
}

#[test]
fn test_halt_wake_on_irq() {
    let mut cpu = cpu_at(0x0100);
    let mut bus = TestBus::new();
    cpu.iff1 = true;
    cpu.im = 1;
    bus.load(0x0100, &[0x76]);

    cpu.step(&mut bus);
    assert!(cpu.halted);

    cpu.set_irq(true);
    cpu.step(&mut bus);
    assert!(!cpu.halted);
    assert_eq!(cpu.pc, 0x0038);
    // Return address is past the HALT
    assert_eq!(bus.memory[0x0FFF], 0x01);
    assert_eq!(bus.memory[0x0FFE], 0x01);
}

#[test]
fn test_halt_wakes_even_when_masked() {
    let mut cpu = cpu_at(0x0100);
    let mut bus = TestBus::new();
    cpu.iff1 = false;
    cpu.im = 1;
    bus.load(0x0100, &[0x76, 0x00]);

    cpu.step(&mut bus);
    assert!(cpu.halted);

    cpu.set_irq(true);
    cpu.step(&mut bus);
    assert!(!cpu.halted, "pending request wakes the CPU");
    assert_eq!(cpu.pc, 0x0102, "but is not serviced with IFF1 clear");
}

#[test]
fn test_ei_halt_idiom_single_irq() {
    // EI; HALT with the request already pending must advance past the
    // HALT after exactly one acknowledge, not two.
    let mut cpu = cpu_at(0x0100);
    let mut bus = TestBus::new();
    cpu.im = 1;
    bus.load(0x0100, &[0xFB, 0x76, 0x00]); // EI; HALT; NOP
    bus.load(0x0038, &[0xED, 0x45]); // RETN

    cpu.set_irq(true);

    cpu.step(&mut bus); // EI (delay armed)
    cpu.step(&mut bus); // HALT executes with the IRQ hidden
    assert!(cpu.halted);

    cpu.step(&mut bus); // acknowledge
    assert_eq!(cpu.pc, 0x0038);
    assert!(!cpu.halted);

    cpu.set_irq(false);
    cpu.step(&mut bus); // RETN
    assert_eq!(cpu.pc, 0x0102, "resumes past the HALT");
}
