//! Placeholders, the label map, and the address/encoding resolver.
//!
//! Label resolution and encoding selection are mutually recursive: an
//! instruction's size can depend on a label address, which depends on the
//! sizes of the instructions before the label. The resolver iterates layout
//! sweeps until a pass encodes every site; each failed attempt permanently
//! advances that site's encoder index, so the total index sum strictly
//! increases and the loop is bounded by the number of encoders in the
//! program.

use std::collections::HashMap;

use crate::catalog::{self, Instruction, Signature};
use crate::error::AsmError;
use crate::lexer::{Token, TokenKind};

/// A pending instruction site.
struct Placeholder {
    fixed_address: Option<usize>,
    tentative_address: usize,
    tentative_encoding: usize,
    instruction: &'static Instruction,
    args: Vec<Token>,
    failures: Vec<String>,
    last_output: Vec<u8>,
    committed: bool,
}

impl Placeholder {
    fn new(
        fixed_address: Option<usize>,
        instruction: &'static Instruction,
        args: Vec<Token>,
    ) -> Result<Self, AsmError> {
        let mut this = Self {
            fixed_address,
            tentative_address: fixed_address.unwrap_or(0),
            tentative_encoding: 0,
            instruction,
            args,
            failures: Vec::new(),
            last_output: Vec::new(),
            committed: false,
        };
        if !instruction.independent {
            return Ok(this);
        }

        // Address-independent sites are committed up front.
        while this.tentative_encoding < instruction.encoders.len() {
            match instruction.encoders[this.tentative_encoding].encode(0, &this.args) {
                Ok(bytes) => {
                    this.last_output = bytes;
                    this.committed = true;
                    return Ok(this);
                }
                Err(message) => {
                    this.failures.push(message);
                    this.tentative_encoding += 1;
                }
            }
        }
        Err(this.exhausted())
    }

    fn exhausted(&self) -> AsmError {
        let details = self
            .failures
            .iter()
            .enumerate()
            .map(|(i, failure)| format!("  encoding {i}: {failure}"))
            .collect::<Vec<_>>()
            .join("\n");
        AsmError::EncodersExhausted {
            signature: self.instruction.signature.to_string(),
            details,
        }
    }

    /// Attempt the current encoder at the tentative address. A failure
    /// advances to the next encoder; running out is fatal.
    fn try_encode(&mut self) -> Result<bool, AsmError> {
        match self.instruction.encoders[self.tentative_encoding]
            .encode(self.tentative_address, &self.args)
        {
            Ok(bytes) => {
                self.last_output = bytes;
                Ok(true)
            }
            Err(message) => {
                self.failures.push(message);
                self.tentative_encoding += 1;
                if self.tentative_encoding == self.instruction.encoders.len() {
                    return Err(self.exhausted());
                }
                Ok(false)
            }
        }
    }

    fn tentative_size(&self) -> Result<usize, AsmError> {
        if self.committed {
            return Ok(self.last_output.len());
        }
        self.instruction.encoders[self.tentative_encoding]
            .size
            .ok_or_else(|| AsmError::UnsizedEncoding {
                signature: self.instruction.signature.to_string(),
            })
    }
}

/// An ordered list of instruction sites plus the label map. A label maps to
/// the index of the next instruction; a trailing label points one past the
/// end.
pub struct Program {
    labels: HashMap<String, usize>,
    items: Vec<Placeholder>,
    next_fixed_address: Option<usize>,
}

impl Program {
    pub fn new() -> Self {
        Self {
            labels: HashMap::new(),
            items: Vec::new(),
            // The first instruction is pinned at the start of the image.
            next_fixed_address: Some(0),
        }
    }

    pub fn add_instruction(&mut self, mut statement: Vec<Token>) -> Result<(), AsmError> {
        let first = statement.remove(0);
        let opcode = match first.kind {
            TokenKind::Op(opcode) => opcode,
            _ => return Err(AsmError::ExpectedOpcode { line: first.line }),
        };

        let signature = Signature::of(opcode, &statement);
        let instruction =
            catalog::lookup(&signature).ok_or_else(|| AsmError::UnknownInstruction {
                signature: signature.to_string(),
            })?;

        self.items.push(Placeholder::new(
            self.next_fixed_address.take(),
            instruction,
            statement,
        )?);
        Ok(())
    }

    pub fn add_label(&mut self, name: String) -> Result<(), AsmError> {
        if self.labels.contains_key(&name) {
            return Err(AsmError::DuplicateLabel { name });
        }
        self.labels.insert(name, self.items.len());
        Ok(())
    }

    /// One resolver pass: lay out addresses, refresh label references, and
    /// re-encode every uncommitted site. Returns `Ok(false)` when a site
    /// failed and moved to its next encoder, invalidating the layout.
    fn try_assemble_pass(&mut self) -> Result<bool, AsmError> {
        let mut address = 0usize;
        for item in &mut self.items {
            if let Some(fixed) = item.fixed_address {
                item.tentative_address = fixed;
                address = fixed + item.tentative_size()?;
                continue;
            }
            item.tentative_address = address;
            address += item.tentative_size()?;
        }
        let end = address;

        for i in 0..self.items.len() {
            if self.items[i].committed {
                continue;
            }

            for j in 0..self.items[i].args.len() {
                let name = match &self.items[i].args[j].kind {
                    TokenKind::Label { name, .. } => name.clone(),
                    _ => continue,
                };
                let target = *self
                    .labels
                    .get(&name)
                    .ok_or(AsmError::UnknownLabel { name })?;
                let resolved = if target == self.items.len() {
                    end
                } else {
                    self.items[target].tentative_address
                };
                if let TokenKind::Label { address, .. } = &mut self.items[i].args[j].kind {
                    *address = resolved;
                }
            }

            if !self.items[i].try_encode()? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Run passes to the fixpoint and emit the byte image.
    pub fn assemble(mut self) -> Result<Vec<u8>, AsmError> {
        // Every failed pass advances some encoder index, so the index sum
        // bounds the number of passes.
        let bound = self
            .items
            .iter()
            .map(|item| item.instruction.encoders.len())
            .sum::<usize>()
            + 1;

        let mut converged = false;
        for _ in 0..bound {
            if self.try_assemble_pass()? {
                converged = true;
                break;
            }
        }
        if !converged {
            return Err(AsmError::NoConvergence { passes: bound });
        }

        let mut image = Vec::new();
        for item in &self.items {
            let end = item.tentative_address + item.last_output.len();
            if image.len() < end {
                image.resize(end, 0);
            }
            image[item.tentative_address..end].copy_from_slice(&item.last_output);
        }
        Ok(image)
    }
}
