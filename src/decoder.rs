use crate::opcodes::{Opcode, get_opcode};

#[derive(Debug, Clone)]
pub struct Instruction {
    pub opcode: Opcode,
    /// Byte offset of the opcode within the code.
    pub offset: usize,
    pub argument: Option<Vec<u8>>,
}

/// Code split into instructions, with `JUMPDEST` byte offsets resolved to instruction indices.
#[derive(Debug, Clone, Default)]
pub struct Bytecode {
    pub instructions: Vec<Instruction>,
    pub jumptable: Vec<(usize, usize)>,
}

impl Bytecode {
    pub fn resolve_jump(&self, offset: usize) -> Option<usize> {
        let index = self
            .jumptable
            .binary_search_by_key(&offset, |(key, _)| *key)
            .ok()?;
        Some(self.jumptable[index].1)
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}

pub struct Decoder;

impl Decoder {
    /// Never fails: bytes past the end of code read as zero, so a truncated
    /// PUSH argument is padded on the right.
    pub fn decode(code: &[u8]) -> Bytecode {
        let mut instructions = Vec::new();
        let mut jumptable = Vec::new();

        let mut pos = 0;
        while pos < code.len() {
            let opcode = get_opcode(code[pos]);
            let mut instruction = Instruction {
                opcode,
                offset: pos,
                argument: None,
            };

            if opcode.code == 0x5b {
                jumptable.push((pos, instructions.len()));
            }

            pos += 1;

            let width = opcode.push_width();
            if width > 0 {
                let end = (pos + width).min(code.len());
                let mut argument = code[pos..end].to_vec();
                argument.resize(width, 0);
                instruction.argument = Some(argument);
                pos += width;
            }

            instructions.push(instruction);
        }

        Bytecode {
            instructions,
            jumptable,
        }
    }
}
