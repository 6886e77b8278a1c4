//! Encoder primitives.
//!
//! Each primitive computes one or two 16-bit words from the field layout in
//! `mica16::isa` and serializes them big-endian, or returns a diagnostic
//! naming the offending operand. The catalog decides which primitive runs
//! for which signature; `run` dispatches on the small `EncoderOp` enum so
//! the catalog itself stays data-only.

use mica16::isa::{self, AluOp, Cond, CtlMode, Fmt, MemMode, Reg, WideReg};

use crate::catalog::{Encoder, EncoderOp};
use crate::lexer::{Token, TokenKind};

fn word(w: u16) -> Vec<u8> {
    w.to_be_bytes().to_vec()
}

fn words(ws: &[u16]) -> Vec<u8> {
    ws.iter().flat_map(|w| w.to_be_bytes()).collect()
}

/// True when `value` fits the signed field of the given width.
fn fits_signed(value: u8, width: u32) -> bool {
    let mask = !0u8 << (width - 1);
    let rem = value & mask;
    rem == 0 || rem == mask
}

fn reg_arg(args: &[Token], i: usize) -> Reg {
    match args[i].kind {
        TokenKind::Reg(reg) => reg,
        _ => unreachable!("signature guarantees a data register"),
    }
}

fn wide_arg(args: &[Token], i: usize) -> WideReg {
    match args[i].kind {
        TokenKind::Wide(reg) => reg,
        _ => unreachable!("signature guarantees a wide register"),
    }
}

fn label_arg(args: &[Token], i: usize) -> (&str, usize) {
    match &args[i].kind {
        TokenKind::Label { name, address } => (name, *address),
        _ => unreachable!("signature guarantees a label"),
    }
}

/// Split an 8-bit immediate across the IH and IL fields.
fn imm_fields(imm: u8) -> u16 {
    (u16::from(imm) << isa::IH_SHIFT) & isa::IH_MASK | u16::from(imm) & isa::IL_MASK
}

fn alu_reg_reg(op: AluOp, rd: Reg, rs: Reg) -> u16 {
    (op as u16) << isa::O_SHIFT | (rd as u16) << isa::X_SHIFT | (rs as u16) << isa::Y_SHIFT
}

fn alu_reg_imm(op: AluOp, rd: Reg, imm: u8) -> u16 {
    (Fmt::Ia as u16) << isa::FMT_SHIFT
        | (op as u16) << isa::O_SHIFT
        | (rd as u16) << isa::X_SHIFT
        | imm_fields(imm)
}

fn mem_word(store: bool, mode: MemMode, reg: Reg, offset: u8) -> u16 {
    (Fmt::M as u16) << isa::FMT_SHIFT
        | u16::from(store) << isa::S_SHIFT
        | (mode as u16) << isa::M_SHIFT
        | (reg as u16) << isa::X_SHIFT
        | imm_fields(offset)
}

fn jump_word(call: bool, mode: CtlMode, negate: bool, cond: Cond, offset: u8) -> u16 {
    (Fmt::C as u16) << isa::FMT_SHIFT
        | u16::from(call) << isa::S_SHIFT
        | (mode as u16) << isa::M_SHIFT
        | u16::from(negate) << isa::N_SHIFT
        | (cond as u16) << isa::C_SHIFT
        | imm_fields(offset)
}

/// One MOV word when the value fits signed-6, else MOV of the low six bits
/// followed by MOVH of the top two.
fn mov_reg_imm(rd: Reg, imm: u8) -> Vec<u8> {
    if fits_signed(imm, isa::IMM_WIDTH) {
        word(alu_reg_imm(AluOp::Mov, rd, imm))
    } else {
        mov_reg_imm_wide(rd, imm)
    }
}

fn mov_reg_imm_wide(rd: Reg, imm: u8) -> Vec<u8> {
    words(&[
        alu_reg_imm(AluOp::Mov, rd, imm),
        alu_reg_imm(AluOp::Movh, rd, imm >> isa::IMM_WIDTH),
    ])
}

fn mov_wide_imm(wreg: WideReg, value: u16, force_wide: bool) -> Vec<u8> {
    let half = |reg: Reg, byte: u8| {
        if force_wide {
            mov_reg_imm_wide(reg, byte)
        } else {
            mov_reg_imm(reg, byte)
        }
    };
    let mut out = half(wreg.low(), value as u8);
    out.extend(half(wreg.high(), (value >> 8) as u8));
    out
}

/// Offset operand for jumps: any 16-bit literal whose value fits signed-6.
fn jump_offset(token: &Token) -> Result<u8, String> {
    let out_of_range = || format!("Immediate {token} is too large for a jump offset.");
    let value = token.as_u16().ok_or_else(out_of_range)?;
    let mask = !0u16 << (isa::IMM_WIDTH - 1);
    let rem = value & mask;
    if rem != 0 && rem != mask {
        return Err(out_of_range());
    }
    Ok(value as u8)
}

fn mem_offset(token: &Token) -> Result<u8, String> {
    let out_of_range = || format!("Immediate {token} is too large for a memory offset.");
    let value = token.as_u8().ok_or_else(out_of_range)?;
    if !fits_signed(value, isa::IMM_WIDTH) {
        return Err(out_of_range());
    }
    Ok(value)
}

/// Peel an optional leading condition off the argument list.
fn condition(args: &[Token]) -> (bool, Cond, &[Token]) {
    match args.first().map(|t| &t.kind) {
        Some(&TokenKind::Cond { cond, negate }) => (negate, cond, &args[1..]),
        _ => (false, Cond::Alw, args),
    }
}

fn rel_jump(
    call: bool,
    address: usize,
    negate: bool,
    cond: Cond,
    target: usize,
) -> Result<Vec<u8>, String> {
    let offset = target as i64 - address as i64 - 2;
    if address % 2 != 0 {
        return Err(format!("Offset {offset} is not aligned to a 2-byte boundary."));
    }
    let offset = offset / 2;
    if !(-32..=31).contains(&offset) {
        return Err(format!("Offset {offset} is too large for a relative jump."));
    }
    Ok(word(jump_word(call, CtlMode::Rel, negate, cond, offset as u8)))
}

pub(crate) fn run(encoder: &Encoder, address: usize, args: &[Token]) -> Result<Vec<u8>, String> {
    match encoder.op {
        EncoderOp::Nop => Ok(word(alu_reg_reg(AluOp::Mov, Reg::Gb, Reg::Gb))),

        EncoderOp::AluRegReg(op) => Ok(word(alu_reg_reg(op, reg_arg(args, 0), reg_arg(args, 1)))),

        EncoderOp::AluRegImm(op) => {
            let imm = args[1]
                .as_u8()
                .filter(|&imm| fits_signed(imm, isa::IMM_WIDTH))
                .ok_or_else(|| format!("Immediate {} is too large for the operand.", args[1]))?;
            Ok(word(alu_reg_imm(op, reg_arg(args, 0), imm)))
        }

        EncoderOp::ShiftRegImm(op) => {
            let imm = args[1]
                .as_u8()
                .filter(|&imm| imm <= 7)
                .ok_or_else(|| format!("Immediate {} is too large for a bitwise shift.", args[1]))?;
            Ok(word(alu_reg_imm(op, reg_arg(args, 0), imm)))
        }

        EncoderOp::MovRegImm => {
            let imm = args[1].as_u8().ok_or_else(|| {
                format!(
                    "Immediate {} is too large for an immediate load to a data register.",
                    args[1]
                )
            })?;
            Ok(mov_reg_imm(reg_arg(args, 0), imm))
        }

        EncoderOp::MovWideImm => {
            let imm = args[1].as_u16().ok_or_else(|| {
                format!(
                    "Immediate {} is too large for an immediate load to a wide register.",
                    args[1]
                )
            })?;
            Ok(mov_wide_imm(wide_arg(args, 0), imm, false))
        }

        EncoderOp::MovWideLabel => {
            let (name, target) = label_arg(args, 1);
            if target > 0x7FFF {
                return Err(format!(
                    "Address {target:#06x} (for label \"{name}\") is too large for an immediate load to a wide register."
                ));
            }
            // The declared size is a commitment: the 4- and 6-byte forms
            // fail when the natural encoding differs, the 8-byte form pads
            // both halves out to MOV+MOVH.
            let declared = encoder.size.unwrap_or(8);
            let bytes = mov_wide_imm(wide_arg(args, 0), target as u16, declared == 8);
            if bytes.len() != declared {
                return Err(format!(
                    "Address {target:#06x} (for label \"{name}\") does not encode in {declared} bytes."
                ));
            }
            Ok(bytes)
        }

        EncoderOp::JumpWide { call } => {
            let (negate, cond, rest) = condition(args);
            let mode = wide_arg(rest, 0).ctl_mode();
            let offset = match rest.get(1) {
                Some(token) => jump_offset(token)?,
                None => 0,
            };
            Ok(word(jump_word(call, mode, negate, cond, offset)))
        }

        EncoderOp::RelJump { call } => {
            let (negate, cond, rest) = condition(args);
            let (_, target) = label_arg(rest, 0);
            rel_jump(call, address, negate, cond, target)
        }

        EncoderOp::BldJump { call, high } => {
            let (negate, cond, rest) = condition(args);
            let offset = jump_offset(&rest[0])?;
            let mode = if high { CtlMode::BldHigh } else { CtlMode::BldLow };
            Ok(word(jump_word(call, mode, negate, cond, offset)))
        }

        EncoderOp::Ret { call } => {
            let (negate, cond, _) = condition(args);
            Ok(word(jump_word(call, CtlMode::Ret, negate, cond, 0)))
        }

        EncoderOp::MemWide { store } => {
            let mode = wide_arg(args, 1).mem_mode();
            let offset = match args.get(2) {
                Some(token) => mem_offset(token)?,
                None => 0,
            };
            Ok(word(mem_word(store, mode, reg_arg(args, 0), offset)))
        }

        EncoderOp::MemFixed { store, mode } => {
            let offset = match args.get(1) {
                Some(token) => mem_offset(token)?,
                None => 0,
            };
            Ok(word(mem_word(store, mode, reg_arg(args, 0), offset)))
        }
    }
}
