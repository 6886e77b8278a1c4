//! Tokens and the lexer.
//!
//! The lexer turns the character stream into statements of tokens.
//! Statements have no terminator of their own: encountering an opcode,
//! directive or label declaration while a statement is open finalizes it.

use std::fmt;

use mica16::isa::{Cond, Reg, WideReg};

use crate::error::AsmError;
use crate::program::Program;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Nop,
    Add,
    Adc,
    Sub,
    Sbc,
    Cmp,
    Cmc,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Mov,
    Mvh,
    Tsb,
    Seb,
    Jmp,
    Rjmp,
    Jbl,
    Jbh,
    Call,
    Rcall,
    Cbl,
    Cbh,
    Ret,
    Retcall,
    Ld,
    Ldr,
    Lds,
    Ldf,
    St,
    Sts,
    Stf,
}

impl Opcode {
    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Nop => "nop",
            Opcode::Add => "add",
            Opcode::Adc => "adc",
            Opcode::Sub => "sub",
            Opcode::Sbc => "sbc",
            Opcode::Cmp => "cmp",
            Opcode::Cmc => "cmc",
            Opcode::And => "and",
            Opcode::Or => "or",
            Opcode::Xor => "xor",
            Opcode::Shl => "shl",
            Opcode::Shr => "shr",
            Opcode::Mov => "mov",
            Opcode::Mvh => "mvh",
            Opcode::Tsb => "tsb",
            Opcode::Seb => "seb",
            Opcode::Jmp => "jmp",
            Opcode::Rjmp => "rjmp",
            Opcode::Jbl => "jbl",
            Opcode::Jbh => "jbh",
            Opcode::Call => "call",
            Opcode::Rcall => "rcall",
            Opcode::Cbl => "cbl",
            Opcode::Cbh => "cbh",
            Opcode::Ret => "ret",
            Opcode::Retcall => "retcall",
            Opcode::Ld => "ld",
            Opcode::Ldr => "ldr",
            Opcode::Lds => "lds",
            Opcode::Ldf => "ldf",
            Opcode::St => "st",
            Opcode::Sts => "sts",
            Opcode::Stf => "stf",
        }
    }
}

/// Token categories as they appear in instruction signatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgKind {
    Integer,
    Opcode,
    Condition,
    DataRegister,
    WideRegister,
    Directive,
    Label,
    LabelDecl,
}

impl fmt::Display for ArgKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ArgKind::Integer => "<integer>",
            ArgKind::Opcode => "<opcode>",
            ArgKind::Condition => "<condition>",
            ArgKind::DataRegister => "<data register>",
            ArgKind::WideRegister => "<wide register>",
            ArgKind::Directive => "<directive>",
            ArgKind::Label => "<label>",
            ArgKind::LabelDecl => "<label declaration>",
        })
    }
}

#[derive(Debug, Clone)]
pub enum TokenKind {
    Int {
        digits: String,
        base: u8,
        negative: bool,
    },
    Op(Opcode),
    Cond {
        cond: Cond,
        negate: bool,
    },
    Reg(Reg),
    Wide(WideReg),
    Directive,
    /// A label reference; `address` is rewritten by the resolver on every
    /// pass.
    Label {
        name: String,
        address: usize,
    },
    LabelDecl(String),
}

impl TokenKind {
    pub fn arg_kind(&self) -> ArgKind {
        match self {
            TokenKind::Int { .. } => ArgKind::Integer,
            TokenKind::Op(_) => ArgKind::Opcode,
            TokenKind::Cond { .. } => ArgKind::Condition,
            TokenKind::Reg(_) => ArgKind::DataRegister,
            TokenKind::Wide(_) => ArgKind::WideRegister,
            TokenKind::Directive => ArgKind::Directive,
            TokenKind::Label { .. } => ArgKind::Label,
            TokenKind::LabelDecl(_) => ArgKind::LabelDecl,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Token {
    pub line: usize,
    pub kind: TokenKind,
}

impl Token {
    pub fn as_u8(&self) -> Option<u8> {
        match &self.kind {
            TokenKind::Int {
                digits,
                base,
                negative,
            } => integer_value(digits, *base, *negative, 8).map(|v| v as u8),
            _ => None,
        }
    }

    pub fn as_u16(&self) -> Option<u16> {
        match &self.kind {
            TokenKind::Int {
                digits,
                base,
                negative,
            } => integer_value(digits, *base, *negative, 16).map(|v| v as u16),
            _ => None,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            TokenKind::Int {
                digits,
                base,
                negative,
            } => {
                let prefix = match base {
                    2 => "0b",
                    8 => "0",
                    16 => "0x",
                    _ => "",
                };
                write!(f, "{}{prefix}{digits}", if *negative { "-" } else { "" })
            }
            TokenKind::Label { name, .. } => f.write_str(name),
            other => write!(f, "{}", other.arg_kind()),
        }
    }
}

/// Fold a digit string (most significant digit first) into an unsigned value
/// of the given bit width. Negative literals of magnitude up to 2^(w-1)
/// two's-complement wrap; anything else out of range is rejected.
pub fn integer_value(digits: &str, base: u8, negative: bool, bits: u32) -> Option<u64> {
    let mut value: u64 = 0;
    for c in digits.chars() {
        let digit = u64::from(digit_value(c, base)?);
        value = value
            .checked_mul(u64::from(base))?
            .checked_add(digit)?;
    }

    let msb = 1u64 << (bits - 1);
    let mask = (1u64 << bits) - 1;
    if negative {
        if value > msb {
            return None;
        }
        Some(value.wrapping_neg() & mask)
    } else if value > mask {
        None
    } else {
        Some(value)
    }
}

fn digit_value(c: char, base: u8) -> Option<u8> {
    let value = match c {
        '0'..='9' => c as u8 - b'0',
        'a'..='f' => 10 + c as u8 - b'a',
        'A'..='F' => 10 + c as u8 - b'A',
        _ => return None,
    };
    (value < base).then_some(value)
}

fn is_first_name_char(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    is_first_name_char(c) || c.is_ascii_digit() || c == '.'
}

/// The reserved keyword table. A name that resolves here can never be a
/// label.
fn keyword(name: &str) -> Option<TokenKind> {
    use Opcode::*;
    Some(match name {
        "nop" => TokenKind::Op(Nop),
        "add" => TokenKind::Op(Add),
        "adc" => TokenKind::Op(Adc),
        "sub" => TokenKind::Op(Sub),
        "sbc" => TokenKind::Op(Sbc),
        "cmp" => TokenKind::Op(Cmp),
        "cmc" => TokenKind::Op(Cmc),
        "and" => TokenKind::Op(And),
        "or" => TokenKind::Op(Or),
        "xor" => TokenKind::Op(Xor),
        "shl" => TokenKind::Op(Shl),
        "shr" => TokenKind::Op(Shr),
        "mov" => TokenKind::Op(Mov),
        "mvh" => TokenKind::Op(Mvh),
        "tsb" => TokenKind::Op(Tsb),
        "seb" => TokenKind::Op(Seb),
        "jmp" => TokenKind::Op(Jmp),
        "rjmp" => TokenKind::Op(Rjmp),
        "jbl" => TokenKind::Op(Jbl),
        "jbh" => TokenKind::Op(Jbh),
        "call" => TokenKind::Op(Call),
        "rcall" => TokenKind::Op(Rcall),
        "cbl" => TokenKind::Op(Cbl),
        "cbh" => TokenKind::Op(Cbh),
        "ret" => TokenKind::Op(Ret),
        "retcall" => TokenKind::Op(Retcall),
        "ld" => TokenKind::Op(Ld),
        "ldr" => TokenKind::Op(Ldr),
        "lds" => TokenKind::Op(Lds),
        "ldf" => TokenKind::Op(Ldf),
        "st" => TokenKind::Op(St),
        "sts" => TokenKind::Op(Sts),
        "stf" => TokenKind::Op(Stf),

        "c" | "gteu" => cond(Cond::C, false),
        "v" => cond(Cond::V, false),
        "n" => cond(Cond::N, false),
        "z" | "eq" => cond(Cond::Z, false),
        "gt" => cond(Cond::G, false),
        "gte" => cond(Cond::Ge, false),
        "gtu" => cond(Cond::Gu, false),
        "nc" | "ltu" => cond(Cond::C, true),
        "nv" => cond(Cond::V, true),
        "nn" => cond(Cond::N, true),
        "nz" | "ne" => cond(Cond::Z, true),
        "lte" => cond(Cond::G, true),
        "lt" => cond(Cond::Ge, true),
        "lteu" => cond(Cond::Gu, true),

        "ra.l" => TokenKind::Reg(Reg::RaL),
        "ra.h" => TokenKind::Reg(Reg::RaH),
        "sr" => TokenKind::Reg(Reg::Sr),
        "sp" => TokenKind::Reg(Reg::Sp),
        "ga" | "fp" => TokenKind::Reg(Reg::Ga),
        "gb" => TokenKind::Reg(Reg::Gb),
        "gc" => TokenKind::Reg(Reg::Gc),
        "gd" => TokenKind::Reg(Reg::Gd),
        "ge.l" => TokenKind::Reg(Reg::GeL),
        "ge.h" => TokenKind::Reg(Reg::GeH),
        "gf.l" => TokenKind::Reg(Reg::GfL),
        "gf.h" => TokenKind::Reg(Reg::GfH),
        "gg.l" => TokenKind::Reg(Reg::GgL),
        "gg.h" => TokenKind::Reg(Reg::GgH),
        "gh.l" => TokenKind::Reg(Reg::GhL),
        "gh.h" => TokenKind::Reg(Reg::GhH),

        "ge" => TokenKind::Wide(WideReg::Ge),
        "gf" => TokenKind::Wide(WideReg::Gf),
        "gg" => TokenKind::Wide(WideReg::Gg),
        "gh" => TokenKind::Wide(WideReg::Gh),

        _ => return None,
    })
}

fn cond(cond: Cond, negate: bool) -> TokenKind {
    TokenKind::Cond { cond, negate }
}

fn read_name(chars: &[char], i: &mut usize, line: usize) -> Result<Token, AsmError> {
    let start = *i;
    while *i < chars.len() && is_name_char(chars[*i]) {
        *i += 1;
    }
    let name: String = chars[start..*i].iter().collect();
    let lower = name.to_lowercase();

    if chars.get(*i) == Some(&':') {
        if keyword(&lower).is_some() {
            return Err(AsmError::ReservedLabel { name, line });
        }
        *i += 1;
        return Ok(Token {
            line,
            kind: TokenKind::LabelDecl(name),
        });
    }

    Ok(Token {
        line,
        kind: keyword(&lower).unwrap_or(TokenKind::Label { name, address: 0 }),
    })
}

fn read_number(chars: &[char], i: &mut usize, line: usize) -> Token {
    let negative = chars[*i] == '-';
    if negative {
        *i += 1;
    }

    let mut base = 10u8;
    if chars.get(*i) == Some(&'0') {
        match chars.get(*i + 1) {
            Some('x') => {
                base = 16;
                *i += 2;
            }
            Some('b') => {
                base = 2;
                *i += 2;
            }
            Some(&c) if digit_value(c, 8).is_some() => {
                base = 8;
                *i += 1;
            }
            _ => {}
        }
    }

    let start = *i;
    while *i < chars.len() && digit_value(chars[*i], base).is_some() {
        *i += 1;
    }
    let digits: String = chars[start..*i].iter().collect();
    Token {
        line,
        kind: TokenKind::Int {
            digits,
            base,
            negative,
        },
    }
}

/// Lex `source` and build the program it describes.
pub fn parse(source: &str) -> Result<Program, AsmError> {
    let chars: Vec<char> = source.chars().collect();
    let mut program = Program::new();
    let mut statement: Vec<Token> = Vec::new();

    let mut i = 0;
    let mut line = 1;
    let mut in_comment = false;
    let mut in_comment_block = false;

    while i < chars.len() {
        let c = chars[i];

        if c.is_ascii_whitespace() {
            if c == '\n' {
                line += 1;
                if in_comment && !in_comment_block {
                    in_comment = false;
                }
            }
            i += 1;
            continue;
        }
        if c == '#' {
            if chars.get(i + 1) == Some(&'#') {
                if in_comment_block {
                    in_comment = false;
                    in_comment_block = false;
                } else if !in_comment {
                    in_comment = true;
                    in_comment_block = true;
                }
                i += 2;
            } else {
                in_comment = true;
                i += 1;
            }
            continue;
        }
        if in_comment {
            i += 1;
            continue;
        }

        let token = if is_first_name_char(c) {
            read_name(&chars, &mut i, line)?
        } else if digit_value(c, 10).is_some()
            || (c == '-'
                && chars
                    .get(i + 1)
                    .is_some_and(|&next| digit_value(next, 10).is_some()))
        {
            read_number(&chars, &mut i, line)
        } else {
            return Err(AsmError::UnexpectedChar { ch: c, line });
        };

        if !statement.is_empty()
            && matches!(
                token.kind,
                TokenKind::Op(_) | TokenKind::Directive | TokenKind::LabelDecl(_)
            )
        {
            program.add_instruction(std::mem::take(&mut statement))?;
        }

        match token.kind {
            TokenKind::LabelDecl(name) => program.add_label(name)?,
            TokenKind::Directive => {}
            _ => statement.push(token),
        }
    }

    if !statement.is_empty() {
        program.add_instruction(statement)?;
    }

    Ok(program)
}
