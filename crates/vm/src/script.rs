//! Immutable script containers.

use std::fmt;

use crate::instruction::Instruction;
use crate::VmResult;

/// An immutable byte-code script.
///
/// Scripts are shared between contexts via `Rc`, so cloning a `Script`
/// handle never copies the bytes.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Script {
    bytes: Vec<u8>,
}

impl Script {
    /// Wraps raw bytecode.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Length of the script in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// True for a zero-length script.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// The raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Decodes the instruction starting at `position`.
    pub fn instruction_at(&self, position: usize) -> VmResult<Instruction> {
        Instruction::decode(&self.bytes, position)
    }
}

impl fmt::Debug for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Script({} bytes)", self.bytes.len())
    }
}

impl From<Vec<u8>> for Script {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::op_code::OpCode;

    #[test]
    fn test_instruction_iteration() {
        let script = Script::new(vec![
            OpCode::PUSH1.as_byte(),
            OpCode::PUSH2.as_byte(),
            OpCode::ADD.as_byte(),
            OpCode::RET.as_byte(),
        ]);
        let mut position = 0;
        let mut opcodes = Vec::new();
        while position < script.len() {
            let instr = script.instruction_at(position).unwrap();
            position += instr.encoded_len;
            opcodes.push(instr.opcode);
        }
        assert_eq!(
            opcodes,
            vec![OpCode::PUSH1, OpCode::PUSH2, OpCode::ADD, OpCode::RET]
        );
    }
}
