use mica16::cpu::Trap;
use mica16::isa::{AluOp, Reg};
use mica16::memory::{Access, BufferDevice, MemoryDevice};
use mica16::CpuState;

fn alu_ri(op: AluOp, rd: Reg, imm: u8) -> u16 {
    0x4000 | (op as u16) << 10 | (u16::from(imm) << 4) & 0x0300 | (rd as u16) << 4 | u16::from(imm) & 0x000F
}

// Format C: S at 13, M at 12:10, N at 7, C at 6:4, offset in IH/IL.
fn ctl(call: bool, mode: u16, negate: bool, cond: u16, offset: u8) -> u16 {
    0xC000
        | u16::from(call) << 13
        | mode << 10
        | (u16::from(offset) << 4) & 0x0300
        | u16::from(negate) << 7
        | cond << 4
        | u16::from(offset) & 0x000F
}

const MODE_REL: u16 = 2;
const MODE_RET: u16 = 3;
const MODE_GE: u16 = 4;
const COND_Z: u16 = 3;
const COND_ALW: u16 = 7;

fn ram(words: &[u16]) -> BufferDevice {
    let mem = BufferDevice::new(256, Access::READ_WRITE);
    mem.debug_load_words(0, words);
    mem
}

#[test]
fn rjmp_skips_the_next_instruction() {
    let mem = ram(&[
        alu_ri(AluOp::Mov, Reg::Ga, 1),
        ctl(false, MODE_REL, false, COND_ALW, 1), // pc 4 + 2 = 6
        alu_ri(AluOp::Mov, Reg::Ga, 9),
        alu_ri(AluOp::Mov, Reg::Gb, 7),
    ]);
    let mut cpu = CpuState::new();
    cpu.reset();

    for _ in 0..3 {
        cpu.step(&mem).unwrap();
    }
    assert_eq!(cpu.registers[Reg::Ga as usize], 1);
    assert_eq!(cpu.registers[Reg::Gb as usize], 7);
}

#[test]
fn backward_rjmp_spins_in_place() {
    // offset field -1 in instruction units: target is the jump itself
    let mem = ram(&[ctl(false, MODE_REL, false, COND_ALW, 0x3F)]);
    let mut cpu = CpuState::new();
    cpu.reset();

    for _ in 0..10 {
        cpu.step(&mem).unwrap();
    }
    assert_eq!(cpu.pc, 0); // the jump keeps winding pc back
}

#[test]
fn conditional_jump_falls_through_when_clear() {
    let mem = ram(&[
        ctl(false, MODE_REL, false, COND_Z, 1),
        alu_ri(AluOp::Mov, Reg::Ga, 9),
    ]);
    let mut cpu = CpuState::new();
    cpu.reset();

    cpu.step(&mem).unwrap();
    cpu.step(&mem).unwrap();
    assert_eq!(cpu.registers[Reg::Ga as usize], 9);
}

#[test]
fn conditional_jump_taken_when_set() {
    let mem = ram(&[
        alu_ri(AluOp::Cmp, Reg::Ga, 0), // Z := 1
        ctl(false, MODE_REL, false, COND_Z, 1),
        alu_ri(AluOp::Mov, Reg::Ga, 9),
        alu_ri(AluOp::Mov, Reg::Gb, 7),
    ]);
    let mut cpu = CpuState::new();
    cpu.reset();

    for _ in 0..3 {
        cpu.step(&mem).unwrap();
    }
    assert_eq!(cpu.registers[Reg::Ga as usize], 0);
    assert_eq!(cpu.registers[Reg::Gb as usize], 7);
}

#[test]
fn negate_bit_inverts_the_condition() {
    // Z is clear, so "not Z" jumps.
    let mem = ram(&[
        ctl(false, MODE_REL, true, COND_Z, 1),
        alu_ri(AluOp::Mov, Reg::Ga, 9),
        alu_ri(AluOp::Mov, Reg::Gb, 7),
    ]);
    let mut cpu = CpuState::new();
    cpu.reset();

    cpu.step(&mem).unwrap();
    cpu.step(&mem).unwrap();
    assert_eq!(cpu.registers[Reg::Ga as usize], 0);
    assert_eq!(cpu.registers[Reg::Gb as usize], 7);
}

/// Run `jmp <cond>` against a hand-set SR and report whether it was taken.
fn jump_taken(sr: u8, cond: u16) -> bool {
    let mem = ram(&[
        alu_ri(AluOp::Mov, Reg::Sr, sr),
        ctl(false, MODE_REL, false, cond, 1),
        alu_ri(AluOp::Mov, Reg::Ga, 9),
        alu_ri(AluOp::Mov, Reg::Gb, 7),
    ]);
    let mut cpu = CpuState::new();
    cpu.reset();
    for _ in 0..3 {
        cpu.step(&mem).unwrap();
    }
    cpu.registers[Reg::Ga as usize] == 0
}

#[test]
fn signed_and_unsigned_comparisons() {
    const C: u8 = 0x08;
    const V: u8 = 0x04;
    const N: u8 = 0x02;
    const Z: u8 = 0x01;
    const COND_G: u16 = 4;
    const COND_GE: u16 = 5;
    const COND_GU: u16 = 6;

    // G = (!V ? !N : C) && !Z
    assert!(jump_taken(0, COND_G));
    assert!(!jump_taken(Z, COND_G));
    assert!(!jump_taken(N, COND_G));
    assert!(jump_taken(C | V, COND_G));
    assert!(!jump_taken(V | N, COND_G));

    // GE drops the !Z term
    assert!(jump_taken(0, COND_GE));
    assert!(jump_taken(Z, COND_GE));
    assert!(!jump_taken(N, COND_GE));
    assert!(jump_taken(C | V, COND_GE));

    // GU = C && !Z
    assert!(jump_taken(C, COND_GU));
    assert!(!jump_taken(C | Z, COND_GU));
    assert!(!jump_taken(0, COND_GU));
}

#[test]
fn jmp_through_wide_register() {
    let mem = ram(&[
        alu_ri(AluOp::Mov, Reg::GeL, 8),
        alu_ri(AluOp::Mov, Reg::GeH, 0),
        ctl(false, MODE_GE, false, COND_ALW, 0),
        alu_ri(AluOp::Mov, Reg::Ga, 9),
        alu_ri(AluOp::Mov, Reg::Gb, 7), // at 8
    ]);
    let mut cpu = CpuState::new();
    cpu.reset();

    for _ in 0..4 {
        cpu.step(&mem).unwrap();
    }
    assert_eq!(cpu.registers[Reg::Ga as usize], 0);
    assert_eq!(cpu.registers[Reg::Gb as usize], 7);
}

#[test]
fn call_saves_return_and_ret_comes_back() {
    let mem = ram(&[
        alu_ri(AluOp::Mov, Reg::GeL, 8),
        alu_ri(AluOp::Mov, Reg::GeH, 0),
        ctl(true, MODE_GE, false, COND_ALW, 0), // call 0x0008, RA := 6
        alu_ri(AluOp::Mov, Reg::Ga, 5),         // return target
        alu_ri(AluOp::Mov, Reg::Gb, 9),         // subroutine at 8
        ctl(false, MODE_RET, false, COND_ALW, 0),
    ]);
    let mut cpu = CpuState::new();
    cpu.reset();

    for _ in 0..6 {
        cpu.step(&mem).unwrap();
    }
    assert_eq!(cpu.registers[Reg::RaL as usize], 6);
    assert_eq!(cpu.registers[Reg::RaH as usize], 0);
    assert_eq!(cpu.registers[Reg::Gb as usize], 9);
    assert_eq!(cpu.registers[Reg::Ga as usize], 5);
}

#[test]
fn bld_low_jump_lands_in_the_block() {
    let mem = ram(&[ctl(false, 0, false, COND_ALW, 2)]); // 0x40 + 4
    mem.debug_load_words(0x44, &[alu_ri(AluOp::Mov, Reg::Ga, 7)]);
    let mut cpu = CpuState::new();
    cpu.reset();

    cpu.step(&mem).unwrap();
    cpu.step(&mem).unwrap();
    assert_eq!(cpu.registers[Reg::Ga as usize], 7);
    assert_eq!(cpu.pc, 0x46);
}

#[test]
fn reserved_alu_op_traps() {
    let mem = ram(&[0x2C00]); // format A, O = 0xB
    let mut cpu = CpuState::new();
    cpu.reset();

    let err = cpu.step(&mem).unwrap_err();
    assert_eq!(err, Trap::IllegalInstruction { word: 0x2C00 });
}
