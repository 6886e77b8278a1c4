use mica16::isa::{AluOp, Reg, Status};
use mica16::memory::{Access, BufferDevice, MemoryDevice};
use mica16::CpuState;

// Format A: O at 13:10, X at 7:4, Y at 3:0.
fn alu_rr(op: AluOp, rd: Reg, rs: Reg) -> u16 {
    (op as u16) << 10 | (rd as u16) << 4 | rs as u16
}

// Format IA: immediate split into IH (9:8) and IL (3:0).
fn alu_ri(op: AluOp, rd: Reg, imm: u8) -> u16 {
    0x4000 | (op as u16) << 10 | (u16::from(imm) << 4) & 0x0300 | (rd as u16) << 4 | u16::from(imm) & 0x000F
}

fn ram(words: &[u16]) -> BufferDevice {
    let mem = BufferDevice::new(256, Access::READ_WRITE);
    mem.debug_load_words(0, words);
    mem
}

fn flags(cpu: &CpuState) -> Status {
    Status::from_bits_truncate(cpu.registers[Reg::Sr as usize])
}

#[test]
fn mov_imm_fits_signed_six() {
    let mem = ram(&[alu_ri(AluOp::Mov, Reg::Ga, 5)]);
    let mut cpu = CpuState::new();
    cpu.reset();

    cpu.step(&mem).unwrap();
    assert_eq!(cpu.registers[Reg::Ga as usize], 5);
    assert_eq!(cpu.pc, 2);
    assert_eq!(cpu.cycle, 5);
}

#[test]
fn mov_imm_sign_extends() {
    // imm field 0x3E is -2
    let mem = ram(&[alu_ri(AluOp::Mov, Reg::Ga, 0x3E)]);
    let mut cpu = CpuState::new();
    cpu.reset();

    cpu.step(&mem).unwrap();
    assert_eq!(cpu.registers[Reg::Ga as usize], 0xFE);
}

#[test]
fn mov_imm_two_word_expansion() {
    // 0x41 is outside signed-6: MOV low six bits, MOVH top two.
    let mem = ram(&[
        alu_ri(AluOp::Mov, Reg::Ga, 0x41),
        alu_ri(AluOp::Movh, Reg::Ga, 0x41 >> 6),
    ]);
    let mut cpu = CpuState::new();
    cpu.reset();

    cpu.step(&mem).unwrap();
    cpu.step(&mem).unwrap();
    assert_eq!(cpu.registers[Reg::Ga as usize], 0x41);
    assert_eq!(cpu.pc, 4);
}

#[test]
fn mov_does_not_touch_flags() {
    let mem = ram(&[
        alu_ri(AluOp::Cmp, Reg::Ga, 0), // 0 - 0: Z and C set
        alu_ri(AluOp::Mov, Reg::Gb, 7),
    ]);
    let mut cpu = CpuState::new();
    cpu.reset();

    cpu.step(&mem).unwrap();
    let before = flags(&cpu);
    assert!(before.contains(Status::Z | Status::C));
    cpu.step(&mem).unwrap();
    assert_eq!(flags(&cpu), before);
}

#[test]
fn add_overflow_sets_n_and_v() {
    let mem = ram(&[
        alu_ri(AluOp::Mov, Reg::Ga, 0x3F),
        alu_ri(AluOp::Movh, Reg::Ga, 1), // GA = 0x7F
        alu_ri(AluOp::Add, Reg::Ga, 1),
    ]);
    let mut cpu = CpuState::new();
    cpu.reset();

    for _ in 0..3 {
        cpu.step(&mem).unwrap();
    }
    assert_eq!(cpu.registers[Reg::Ga as usize], 0x80);
    assert_eq!(flags(&cpu), Status::N | Status::V);
}

#[test]
fn sub_carry_means_no_borrow() {
    let mem = ram(&[
        alu_ri(AluOp::Mov, Reg::Ga, 8),
        alu_ri(AluOp::Sub, Reg::Ga, 3),
    ]);
    let mut cpu = CpuState::new();
    cpu.reset();

    cpu.step(&mem).unwrap();
    cpu.step(&mem).unwrap();
    assert_eq!(cpu.registers[Reg::Ga as usize], 5);
    assert!(flags(&cpu).contains(Status::C));
    assert!(!flags(&cpu).contains(Status::Z));
}

#[test]
fn cmp_sets_flags_without_writing() {
    let mem = ram(&[
        alu_ri(AluOp::Mov, Reg::Ga, 5),
        alu_ri(AluOp::Cmp, Reg::Ga, 5),
    ]);
    let mut cpu = CpuState::new();
    cpu.reset();

    cpu.step(&mem).unwrap();
    cpu.step(&mem).unwrap();
    assert_eq!(cpu.registers[Reg::Ga as usize], 5);
    assert!(flags(&cpu).contains(Status::Z | Status::C));
}

#[test]
fn adc_accumulates_multibyte_zero() {
    // 0x00FF + 1 = 0x0100 across two byte adds: both bytes zero, Z stays
    // set and the carry rides through.
    let mem = ram(&[
        alu_ri(AluOp::Mov, Reg::Ga, 0x3F),
        alu_ri(AluOp::Movh, Reg::Ga, 3), // GA = 0xFF
        alu_ri(AluOp::Mov, Reg::Gb, 0),
        alu_ri(AluOp::Add, Reg::Ga, 1),  // low byte: 0x00, C=1, Z=1
        alu_ri(AluOp::Adc, Reg::Gb, 0),  // high byte: 0x00, Z stays
    ]);
    let mut cpu = CpuState::new();
    cpu.reset();

    for _ in 0..5 {
        cpu.step(&mem).unwrap();
    }
    assert_eq!(cpu.registers[Reg::Ga as usize], 0);
    assert_eq!(cpu.registers[Reg::Gb as usize], 1);
    assert!(flags(&cpu).contains(Status::Z));
}

#[test]
fn adc_clears_zero_on_nonzero_byte() {
    let mem = ram(&[
        alu_ri(AluOp::Mov, Reg::Ga, 0x3F),
        alu_ri(AluOp::Movh, Reg::Ga, 3),
        alu_ri(AluOp::Add, Reg::Ga, 1),  // Z=1, C=1
        alu_ri(AluOp::Adc, Reg::Ga, 5),  // 0 + 5 + 1 = 6
    ]);
    let mut cpu = CpuState::new();
    cpu.reset();

    for _ in 0..4 {
        cpu.step(&mem).unwrap();
    }
    assert_eq!(cpu.registers[Reg::Ga as usize], 6);
    assert!(!flags(&cpu).contains(Status::Z));
}

#[test]
fn shifts_mask_the_count() {
    let mem = ram(&[
        alu_ri(AluOp::Mov, Reg::Ga, 0x11),
        alu_ri(AluOp::Shl, Reg::Ga, 3),
        alu_ri(AluOp::Shr, Reg::Ga, 1),
    ]);
    let mut cpu = CpuState::new();
    cpu.reset();

    cpu.step(&mem).unwrap();
    cpu.step(&mem).unwrap();
    assert_eq!(cpu.registers[Reg::Ga as usize], 0x88);
    assert!(flags(&cpu).contains(Status::N));
    cpu.step(&mem).unwrap();
    assert_eq!(cpu.registers[Reg::Ga as usize], 0x44);
}

#[test]
fn reg_reg_alu_uses_y_operand() {
    let mem = ram(&[
        alu_ri(AluOp::Mov, Reg::Ga, 12),
        alu_ri(AluOp::Mov, Reg::Gb, 30),
        alu_rr(AluOp::Add, Reg::Ga, Reg::Gb),
    ]);
    let mut cpu = CpuState::new();
    cpu.reset();

    for _ in 0..3 {
        cpu.step(&mem).unwrap();
    }
    assert_eq!(cpu.registers[Reg::Ga as usize], 42);
}

#[test]
fn tsb_reads_the_selected_bit() {
    let mem = ram(&[
        alu_ri(AluOp::Mov, Reg::Ga, 0x08),
        alu_ri(AluOp::Tsb, Reg::Ga, 3), // bit 3 of GA is set
        alu_ri(AluOp::Tsb, Reg::Ga, 2), // bit 2 is clear
    ]);
    let mut cpu = CpuState::new();
    cpu.reset();

    cpu.step(&mem).unwrap();
    cpu.step(&mem).unwrap();
    assert!(flags(&cpu).contains(Status::Z));
    assert!(!flags(&cpu).contains(Status::N)); // operand bit 3 clear
    cpu.step(&mem).unwrap();
    assert!(!flags(&cpu).contains(Status::Z));
    // GA is never written by TSB
    assert_eq!(cpu.registers[Reg::Ga as usize], 0x08);
}

#[test]
fn seb_sets_and_clears_single_bits() {
    let mem = ram(&[
        alu_ri(AluOp::Seb, Reg::Ga, 0x0B), // set bit 3
        alu_ri(AluOp::Seb, Reg::Ga, 0x03), // clear bit 3
    ]);
    let mut cpu = CpuState::new();
    cpu.reset();

    cpu.step(&mem).unwrap();
    assert_eq!(cpu.registers[Reg::Ga as usize], 0x08);
    cpu.step(&mem).unwrap();
    assert_eq!(cpu.registers[Reg::Ga as usize], 0x00);
    assert!(flags(&cpu).contains(Status::Z));
}

#[test]
fn mvh_merges_high_two_bits() {
    let mem = ram(&[
        alu_ri(AluOp::Mov, Reg::Ga, 0x15),
        alu_ri(AluOp::Movh, Reg::Ga, 2),
    ]);
    let mut cpu = CpuState::new();
    cpu.reset();

    cpu.step(&mem).unwrap();
    cpu.step(&mem).unwrap();
    assert_eq!(cpu.registers[Reg::Ga as usize], 0x95);
}
