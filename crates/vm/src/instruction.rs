//! Decoded instructions.

use crate::op_code::OpCode;
use crate::{VmError, VmResult};

/// One decoded instruction: an opcode plus its immediate operand bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    /// The opcode.
    pub opcode: OpCode,
    /// Immediate bytes following the opcode (excluding any length prefix).
    pub operand: Vec<u8>,
    /// Total encoded width: opcode + prefix + operand.
    pub encoded_len: usize,
}

impl Instruction {
    /// Decodes the instruction at `position` within `script`.
    pub fn decode(script: &[u8], position: usize) -> VmResult<Self> {
        let byte = *script
            .get(position)
            .ok_or_else(|| VmError::InvalidScript("instruction pointer out of bounds".into()))?;
        let opcode = OpCode::from_byte(byte)?;
        let shape = opcode.operand_size();
        let mut cursor = position + 1;

        let operand_len = if shape.size_prefix > 0 {
            let prefix = script
                .get(cursor..cursor + shape.size_prefix)
                .ok_or_else(|| VmError::InvalidScript("truncated operand prefix".into()))?;
            cursor += shape.size_prefix;
            let mut len: u64 = 0;
            for (i, &b) in prefix.iter().enumerate() {
                len |= (b as u64) << (8 * i);
            }
            usize::try_from(len)
                .map_err(|_| VmError::InvalidOperand("operand length overflow".into()))?
        } else {
            shape.size
        };

        let operand = script
            .get(cursor..cursor + operand_len)
            .ok_or_else(|| VmError::InvalidScript("truncated operand".into()))?
            .to_vec();
        cursor += operand_len;

        Ok(Self {
            opcode,
            operand,
            encoded_len: cursor - position,
        })
    }

    /// Operand interpreted as a signed 8-bit jump offset.
    pub fn operand_i8(&self) -> VmResult<i8> {
        match self.operand.as_slice() {
            [b] => Ok(*b as i8),
            _ => Err(VmError::InvalidOperand("expected 1-byte operand".into())),
        }
    }

    /// Operand interpreted as a signed 32-bit jump offset.
    pub fn operand_i32(&self) -> VmResult<i32> {
        let bytes: [u8; 4] = self
            .operand
            .as_slice()
            .try_into()
            .map_err(|_| VmError::InvalidOperand("expected 4-byte operand".into()))?;
        Ok(i32::from_le_bytes(bytes))
    }

    /// Operand interpreted as an unsigned 32-bit value (syscall ids, PUSHA).
    pub fn operand_u32(&self) -> VmResult<u32> {
        let bytes: [u8; 4] = self
            .operand
            .as_slice()
            .try_into()
            .map_err(|_| VmError::InvalidOperand("expected 4-byte operand".into()))?;
        Ok(u32::from_le_bytes(bytes))
    }

    /// First operand byte (slot indexes, type codes).
    pub fn operand_u8(&self) -> VmResult<u8> {
        self.operand
            .first()
            .copied()
            .ok_or_else(|| VmError::InvalidOperand("expected 1-byte operand".into()))
    }

    /// Two paired offsets for TRY (i8 each) as (catch, finally).
    pub fn try_offsets_short(&self) -> VmResult<(i32, i32)> {
        match self.operand.as_slice() {
            [catch, finally] => Ok((*catch as i8 as i32, *finally as i8 as i32)),
            _ => Err(VmError::InvalidOperand("expected 2-byte operand".into())),
        }
    }

    /// Two paired offsets for TRY_L (i32 each) as (catch, finally).
    pub fn try_offsets_long(&self) -> VmResult<(i32, i32)> {
        if self.operand.len() != 8 {
            return Err(VmError::InvalidOperand("expected 8-byte operand".into()));
        }
        let catch = i32::from_le_bytes(self.operand[0..4].try_into().expect("checked length"));
        let finally = i32::from_le_bytes(self.operand[4..8].try_into().expect("checked length"));
        Ok((catch, finally))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_no_operand() {
        let instr = Instruction::decode(&[OpCode::ADD.as_byte()], 0).unwrap();
        assert_eq!(instr.opcode, OpCode::ADD);
        assert_eq!(instr.encoded_len, 1);
    }

    #[test]
    fn test_decode_fixed_operand() {
        let script = [OpCode::PUSHINT16.as_byte(), 0x39, 0x05];
        let instr = Instruction::decode(&script, 0).unwrap();
        assert_eq!(instr.operand, vec![0x39, 0x05]);
        assert_eq!(instr.encoded_len, 3);
    }

    #[test]
    fn test_decode_prefixed_operand() {
        let script = [OpCode::PUSHDATA1.as_byte(), 0x03, b'a', b'b', b'c'];
        let instr = Instruction::decode(&script, 0).unwrap();
        assert_eq!(instr.operand, b"abc");
        assert_eq!(instr.encoded_len, 5);
    }

    #[test]
    fn test_truncated_operand_faults() {
        let script = [OpCode::PUSHINT32.as_byte(), 0x01];
        assert!(Instruction::decode(&script, 0).is_err());
    }

    #[test]
    fn test_try_offsets() {
        let script = [OpCode::TRY.as_byte(), 0x05, 0x00];
        let instr = Instruction::decode(&script, 0).unwrap();
        assert_eq!(instr.try_offsets_short().unwrap(), (5, 0));
    }
}
