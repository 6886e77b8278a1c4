//! The Mica-16 instruction encoding contract, shared by the assembler and
//! the CPU core.
//!
//! Every instruction is one 16-bit word stored big-endian in memory. The top
//! two bits select the format; the remaining fields are laid out as follows:
//!
//! ```text
//! A  (reg-reg ALU)  00 OOOO ..   XXXX YYYY
//! IA (reg-imm ALU)  01 OOOO HH   XXXX LLLL
//! M  (memory)       10 S MMM HH  XXXX LLLL
//! C  (control)      11 S MMM HH  N CCC LLLL
//! ```
//!
//! The 6-bit immediate is `HH << 4 | LLLL`, sign-extended.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

pub const FMT_SHIFT: u16 = 14;
pub const FMT_MASK: u16 = 0xC000;

pub const O_SHIFT: u16 = 10;
pub const O_MASK: u16 = 0x3C00;

pub const X_SHIFT: u16 = 4;
pub const X_MASK: u16 = 0x00F0;

pub const Y_SHIFT: u16 = 0;
pub const Y_MASK: u16 = 0x000F;

pub const IL_SHIFT: u16 = 0;
pub const IL_MASK: u16 = 0x000F;

pub const IH_SHIFT: u16 = 4;
pub const IH_MASK: u16 = 0x0300;

pub const M_SHIFT: u16 = 10;
pub const M_MASK: u16 = 0x1C00;

pub const S_SHIFT: u16 = 13;
pub const S_MASK: u16 = 0x2000;

pub const C_SHIFT: u16 = 4;
pub const C_MASK: u16 = 0x0070;

pub const N_SHIFT: u16 = 7;
pub const N_MASK: u16 = 0x0080;

/// Width of the signed immediate field (IH | IL).
pub const IMM_WIDTH: u32 = 6;

/// Instruction format, from bits 15:14.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Fmt {
    A = 0,
    Ia = 1,
    M = 2,
    C = 3,
}

impl Fmt {
    pub fn of(word: u16) -> Fmt {
        match (word & FMT_MASK) >> FMT_SHIFT {
            0 => Fmt::A,
            1 => Fmt::Ia,
            2 => Fmt::M,
            _ => Fmt::C,
        }
    }
}

/// ALU operation, from the 4-bit O field. Value 0xB is reserved and decodes
/// as an illegal instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AluOp {
    Add = 0x0,
    Adc = 0x1,
    Sub = 0x2,
    Sbc = 0x3,
    Cmp = 0x4,
    Cmc = 0x5,
    And = 0x6,
    Or = 0x7,
    Xor = 0x8,
    Shl = 0x9,
    Shr = 0xA,
    Mov = 0xC,
    Movh = 0xD,
    Tsb = 0xE,
    Seb = 0xF,
}

impl AluOp {
    pub fn from_field(field: u16) -> Option<AluOp> {
        Some(match field {
            0x0 => AluOp::Add,
            0x1 => AluOp::Adc,
            0x2 => AluOp::Sub,
            0x3 => AluOp::Sbc,
            0x4 => AluOp::Cmp,
            0x5 => AluOp::Cmc,
            0x6 => AluOp::And,
            0x7 => AluOp::Or,
            0x8 => AluOp::Xor,
            0x9 => AluOp::Shl,
            0xA => AluOp::Shr,
            0xC => AluOp::Mov,
            0xD => AluOp::Movh,
            0xE => AluOp::Tsb,
            0xF => AluOp::Seb,
            _ => return None,
        })
    }
}

/// Register file indices. The wide pairs GE..GH occupy two consecutive
/// slots, low half first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reg {
    RaL = 0,
    RaH = 1,
    Sr = 2,
    Sp = 3,
    Ga = 4,
    Gb = 5,
    Gc = 6,
    Gd = 7,
    GeL = 8,
    GeH = 9,
    GfL = 10,
    GfH = 11,
    GgL = 12,
    GgH = 13,
    GhL = 14,
    GhH = 15,
}

impl Reg {
    /// Frame pointer, an alias of GA.
    pub const FP: Reg = Reg::Ga;
}

/// A logical 16-bit register pair, little-endian within the register file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WideReg {
    Ge = 0,
    Gf = 1,
    Gg = 2,
    Gh = 3,
}

impl WideReg {
    pub fn low(self) -> Reg {
        match self {
            WideReg::Ge => Reg::GeL,
            WideReg::Gf => Reg::GfL,
            WideReg::Gg => Reg::GgL,
            WideReg::Gh => Reg::GhL,
        }
    }

    pub fn high(self) -> Reg {
        match self {
            WideReg::Ge => Reg::GeH,
            WideReg::Gf => Reg::GfH,
            WideReg::Gg => Reg::GgH,
            WideReg::Gh => Reg::GhH,
        }
    }

    pub fn mem_mode(self) -> MemMode {
        match self {
            WideReg::Ge => MemMode::Ge,
            WideReg::Gf => MemMode::Gf,
            WideReg::Gg => MemMode::Gg,
            WideReg::Gh => MemMode::Gh,
        }
    }

    pub fn ctl_mode(self) -> CtlMode {
        match self {
            WideReg::Ge => CtlMode::Ge,
            WideReg::Gf => CtlMode::Gf,
            WideReg::Gg => CtlMode::Gg,
            WideReg::Gh => CtlMode::Gh,
        }
    }
}

/// M-format addressing mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemMode {
    Stack = 0,
    Frame = 1,
    Rel = 2,
    Zpg = 3,
    Ge = 4,
    Gf = 5,
    Gg = 6,
    Gh = 7,
}

/// Fixed base applied by the STACK and FRAME addressing modes.
pub const STACK_BASE: u16 = 0x0100;
/// Fixed base applied by the ZPG addressing mode.
pub const ZPG_BASE: u16 = 0x0200;

/// C-format addressing mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CtlMode {
    BldLow = 0,
    BldHigh = 1,
    Rel = 2,
    Ret = 3,
    Ge = 4,
    Gf = 5,
    Gg = 6,
    Gh = 7,
}

pub const BLD_LOW_BASE: u16 = 0x0040;
pub const BLD_HIGH_BASE: u16 = 0x00C0;

/// Jump condition, from the 3-bit C field. Bit 7 of a C-format word inverts
/// the selected condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cond {
    C = 0,
    V = 1,
    N = 2,
    Z = 3,
    G = 4,
    Ge = 5,
    Gu = 6,
    Alw = 7,
}

bitflags! {
    /// Status register bits, as held in the SR register.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Status: u8 {
        const C = 0x08;
        const V = 0x04;
        const N = 0x02;
        const Z = 0x01;
    }
}

/// Sign-extend a 6-bit value to 8 bits.
pub fn sign_extend6(x: u8) -> u8 {
    if x & 0x20 != 0 {
        x | 0xC0
    } else {
        x
    }
}
