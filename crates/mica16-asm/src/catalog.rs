//! The instruction catalog: every accepted (opcode, argument-type tuple),
//! with its encoder list.

use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

use mica16::isa::{AluOp, MemMode};

use crate::encode;
use crate::lexer::{ArgKind, Opcode, Token};

/// Catalog lookup key: an opcode plus the ordered argument token types.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    pub opcode: Opcode,
    pub args: Vec<ArgKind>,
}

impl Signature {
    pub fn of(opcode: Opcode, args: &[Token]) -> Self {
        Self {
            opcode,
            args: args.iter().map(|token| token.kind.arg_kind()).collect(),
        }
    }

    fn new(opcode: Opcode, args: &[ArgKind]) -> Self {
        Self {
            opcode,
            args: args.to_vec(),
        }
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.opcode.mnemonic())?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// What an encoder emits; dispatched by `encode::run`.
#[derive(Debug, Clone, Copy)]
pub enum EncoderOp {
    Nop,
    AluRegReg(AluOp),
    AluRegImm(AluOp),
    ShiftRegImm(AluOp),
    MovRegImm,
    MovWideImm,
    MovWideLabel,
    JumpWide { call: bool },
    RelJump { call: bool },
    BldJump { call: bool, high: bool },
    Ret { call: bool },
    MemWide { store: bool },
    MemFixed { store: bool, mode: MemMode },
}

/// An encoding candidate. `size` is the declared output size the resolver
/// lays out with; `None` marks a variable-size encoder whose size is only
/// discoverable by encoding it.
#[derive(Debug, Clone, Copy)]
pub struct Encoder {
    pub size: Option<usize>,
    pub op: EncoderOp,
}

impl Encoder {
    pub fn encode(&self, address: usize, args: &[Token]) -> Result<Vec<u8>, String> {
        encode::run(self, address, args)
    }
}

/// A catalog entry. `independent` marks instructions whose encoding cannot
/// depend on any address; the resolver commits those up front. The encoder
/// list is sorted by non-decreasing declared size, variable last, and once
/// an encoder fails for given arguments no earlier one can succeed.
pub struct Instruction {
    pub signature: Signature,
    pub independent: bool,
    pub encoders: Vec<Encoder>,
}

pub fn lookup(signature: &Signature) -> Option<&'static Instruction> {
    CATALOG.get(signature)
}

static CATALOG: LazyLock<HashMap<Signature, Instruction>> = LazyLock::new(build);

fn fixed(op: EncoderOp) -> Vec<Encoder> {
    vec![Encoder { size: Some(2), op }]
}

fn variable(op: EncoderOp) -> Vec<Encoder> {
    vec![Encoder { size: None, op }]
}

fn build() -> HashMap<Signature, Instruction> {
    use ArgKind::{Condition, DataRegister, Integer, Label, WideRegister};

    let mut table = HashMap::new();
    let mut def = |opcode: Opcode, args: &[ArgKind], independent: bool, encoders: Vec<Encoder>| {
        let signature = Signature::new(opcode, args);
        table.insert(
            signature.clone(),
            Instruction {
                signature,
                independent,
                encoders,
            },
        );
    };

    def(Opcode::Nop, &[], true, fixed(EncoderOp::Nop));

    const REG_REG: &[(Opcode, AluOp)] = &[
        (Opcode::Add, AluOp::Add),
        (Opcode::Adc, AluOp::Adc),
        (Opcode::Sub, AluOp::Sub),
        (Opcode::Sbc, AluOp::Sbc),
        (Opcode::Cmp, AluOp::Cmp),
        (Opcode::Cmc, AluOp::Cmc),
        (Opcode::And, AluOp::And),
        (Opcode::Or, AluOp::Or),
        (Opcode::Xor, AluOp::Xor),
        (Opcode::Shl, AluOp::Shl),
        (Opcode::Shr, AluOp::Shr),
        (Opcode::Mov, AluOp::Mov),
        (Opcode::Mvh, AluOp::Movh),
        (Opcode::Tsb, AluOp::Tsb),
        (Opcode::Seb, AluOp::Seb),
    ];
    for &(opcode, op) in REG_REG {
        def(
            opcode,
            &[DataRegister, DataRegister],
            true,
            fixed(EncoderOp::AluRegReg(op)),
        );
    }

    const REG_IMM: &[(Opcode, AluOp)] = &[
        (Opcode::Add, AluOp::Add),
        (Opcode::Adc, AluOp::Adc),
        (Opcode::Sub, AluOp::Sub),
        (Opcode::Sbc, AluOp::Sbc),
        (Opcode::Cmp, AluOp::Cmp),
        (Opcode::Cmc, AluOp::Cmc),
        (Opcode::And, AluOp::And),
        (Opcode::Or, AluOp::Or),
        (Opcode::Xor, AluOp::Xor),
        (Opcode::Mvh, AluOp::Movh),
    ];
    for &(opcode, op) in REG_IMM {
        def(
            opcode,
            &[DataRegister, Integer],
            true,
            fixed(EncoderOp::AluRegImm(op)),
        );
    }
    for &(opcode, op) in &[(Opcode::Shl, AluOp::Shl), (Opcode::Shr, AluOp::Shr)] {
        def(
            opcode,
            &[DataRegister, Integer],
            true,
            fixed(EncoderOp::ShiftRegImm(op)),
        );
    }

    def(
        Opcode::Mov,
        &[DataRegister, Integer],
        true,
        variable(EncoderOp::MovRegImm),
    );
    def(
        Opcode::Mov,
        &[WideRegister, Integer],
        true,
        variable(EncoderOp::MovWideImm),
    );
    // The label form is laid out through its declared sizes: the resolver
    // walks 4 -> 6 -> 8 until the label address encodes exactly.
    def(
        Opcode::Mov,
        &[WideRegister, Label],
        false,
        vec![
            Encoder {
                size: Some(4),
                op: EncoderOp::MovWideLabel,
            },
            Encoder {
                size: Some(6),
                op: EncoderOp::MovWideLabel,
            },
            Encoder {
                size: Some(8),
                op: EncoderOp::MovWideLabel,
            },
        ],
    );

    for &(opcode, call) in &[(Opcode::Jmp, false), (Opcode::Call, true)] {
        for args in [
            &[WideRegister][..],
            &[WideRegister, Integer][..],
            &[Condition, WideRegister][..],
            &[Condition, WideRegister, Integer][..],
        ] {
            def(opcode, args, true, fixed(EncoderOp::JumpWide { call }));
        }
    }

    for &(opcode, call) in &[(Opcode::Rjmp, false), (Opcode::Rcall, true)] {
        def(opcode, &[Label], false, fixed(EncoderOp::RelJump { call }));
        def(
            opcode,
            &[Condition, Label],
            false,
            fixed(EncoderOp::RelJump { call }),
        );
    }

    for &(opcode, call, high) in &[
        (Opcode::Jbl, false, false),
        (Opcode::Jbh, false, true),
        (Opcode::Cbl, true, false),
        (Opcode::Cbh, true, true),
    ] {
        def(opcode, &[Integer], true, fixed(EncoderOp::BldJump { call, high }));
        def(
            opcode,
            &[Condition, Integer],
            true,
            fixed(EncoderOp::BldJump { call, high }),
        );
    }

    for &(opcode, call) in &[(Opcode::Ret, false), (Opcode::Retcall, true)] {
        def(opcode, &[], true, fixed(EncoderOp::Ret { call }));
        def(opcode, &[Condition], true, fixed(EncoderOp::Ret { call }));
    }

    for &(opcode, store) in &[(Opcode::Ld, false), (Opcode::St, true)] {
        def(
            opcode,
            &[DataRegister, WideRegister],
            true,
            fixed(EncoderOp::MemWide { store }),
        );
        def(
            opcode,
            &[DataRegister, WideRegister, Integer],
            true,
            fixed(EncoderOp::MemWide { store }),
        );
    }

    for &(opcode, store, mode) in &[
        (Opcode::Lds, false, MemMode::Stack),
        (Opcode::Ldf, false, MemMode::Frame),
        (Opcode::Ldr, false, MemMode::Rel),
        (Opcode::Sts, true, MemMode::Stack),
        (Opcode::Stf, true, MemMode::Frame),
    ] {
        def(
            opcode,
            &[DataRegister],
            true,
            fixed(EncoderOp::MemFixed { store, mode }),
        );
        def(
            opcode,
            &[DataRegister, Integer],
            true,
            fixed(EncoderOp::MemFixed { store, mode }),
        );
    }

    table
}
