//! Programmatic script construction.

use num_bigint::BigInt;
use num_traits::ToPrimitive;

use crate::op_code::OpCode;
use crate::stack_item::StackItem;
use crate::{VmError, VmResult};

/// Builds bytecode by appending opcodes and push instructions.
#[derive(Debug, Default)]
pub struct ScriptBuilder {
    bytes: Vec<u8>,
}

impl ScriptBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current script length.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// True when nothing has been emitted.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Appends a bare opcode.
    pub fn emit(&mut self, opcode: OpCode) -> &mut Self {
        self.bytes.push(opcode.as_byte());
        self
    }

    /// Appends raw bytes verbatim.
    pub fn emit_raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.bytes.extend_from_slice(bytes);
        self
    }

    /// Appends an opcode with a fixed operand.
    pub fn emit_with_operand(&mut self, opcode: OpCode, operand: &[u8]) -> &mut Self {
        self.bytes.push(opcode.as_byte());
        self.bytes.extend_from_slice(operand);
        self
    }

    /// Pushes an integer using the narrowest encoding.
    pub fn emit_push_int(&mut self, value: impl Into<BigInt>) -> &mut Self {
        let value: BigInt = value.into();
        if let Some(small) = value.to_i64() {
            if small == -1 {
                return self.emit(OpCode::PUSHM1);
            }
            if (0..=16).contains(&small) {
                let byte = OpCode::PUSH0.as_byte() + small as u8;
                self.bytes.push(byte);
                return self;
            }
            if let Ok(v) = i8::try_from(small) {
                return self.emit_with_operand(OpCode::PUSHINT8, &v.to_le_bytes());
            }
            if let Ok(v) = i16::try_from(small) {
                return self.emit_with_operand(OpCode::PUSHINT16, &v.to_le_bytes());
            }
            if let Ok(v) = i32::try_from(small) {
                return self.emit_with_operand(OpCode::PUSHINT32, &v.to_le_bytes());
            }
            return self.emit_with_operand(OpCode::PUSHINT64, &small.to_le_bytes());
        }
        // Wide integers: sign-extended little-endian, 16 or 32 bytes.
        let bytes = value.to_signed_bytes_le();
        let (opcode, width) = if bytes.len() <= 16 {
            (OpCode::PUSHINT128, 16)
        } else {
            (OpCode::PUSHINT256, 32)
        };
        let fill = if bytes.last().is_some_and(|b| b & 0x80 != 0) {
            0xFF
        } else {
            0x00
        };
        let mut padded = bytes;
        padded.resize(width, fill);
        self.emit_with_operand(opcode, &padded)
    }

    /// Pushes a boolean.
    pub fn emit_push_bool(&mut self, value: bool) -> &mut Self {
        self.emit(if value { OpCode::PUSHT } else { OpCode::PUSHF })
    }

    /// Pushes Null.
    pub fn emit_push_null(&mut self) -> &mut Self {
        self.emit(OpCode::PUSHNULL)
    }

    /// Pushes a byte string with the narrowest PUSHDATA form.
    pub fn emit_push_bytes(&mut self, data: &[u8]) -> &mut Self {
        if data.len() <= u8::MAX as usize {
            self.bytes.push(OpCode::PUSHDATA1.as_byte());
            self.bytes.push(data.len() as u8);
        } else if data.len() <= u16::MAX as usize {
            self.bytes.push(OpCode::PUSHDATA2.as_byte());
            self.bytes.extend_from_slice(&(data.len() as u16).to_le_bytes());
        } else {
            self.bytes.push(OpCode::PUSHDATA4.as_byte());
            self.bytes.extend_from_slice(&(data.len() as u32).to_le_bytes());
        }
        self.bytes.extend_from_slice(data);
        self
    }

    /// Pushes a UTF-8 string.
    pub fn emit_push_string(&mut self, value: &str) -> &mut Self {
        self.emit_push_bytes(value.as_bytes())
    }

    /// Emits a SYSCALL with the given id.
    pub fn emit_syscall(&mut self, id: u32) -> &mut Self {
        self.emit_with_operand(OpCode::SYSCALL, &id.to_le_bytes())
    }

    /// Pushes a best-effort encoding of a stack item (used for arguments).
    pub fn emit_push_item(&mut self, item: &StackItem) -> VmResult<&mut Self> {
        match item {
            StackItem::Null => Ok(self.emit_push_null()),
            StackItem::Boolean(b) => Ok(self.emit_push_bool(*b)),
            StackItem::Integer(i) => Ok(self.emit_push_int(i.clone())),
            StackItem::ByteString(b) => Ok(self.emit_push_bytes(b)),
            StackItem::Buffer(b) => Ok(self.emit_push_bytes(&b.borrow())),
            StackItem::Array(items) => {
                let items = items.borrow();
                for item in items.iter().rev() {
                    self.emit_push_item(item)?;
                }
                self.emit_push_int(items.len() as i64);
                Ok(self.emit(OpCode::PACK))
            }
            other => Err(VmError::invalid_operation(format!(
                "cannot encode {} into a script",
                other.type_name()
            ))),
        }
    }

    /// Consumes the builder, returning the script bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_int_encodings() {
        let mut b = ScriptBuilder::new();
        b.emit_push_int(-1);
        b.emit_push_int(0);
        b.emit_push_int(16);
        b.emit_push_int(17);
        let bytes = b.into_bytes();
        assert_eq!(bytes[0], OpCode::PUSHM1.as_byte());
        assert_eq!(bytes[1], OpCode::PUSH0.as_byte());
        assert_eq!(bytes[2], OpCode::PUSH16.as_byte());
        assert_eq!(bytes[3], OpCode::PUSHINT8.as_byte());
        assert_eq!(bytes[4], 17);
    }

    #[test]
    fn test_push_data_width_selection() {
        let mut b = ScriptBuilder::new();
        b.emit_push_bytes(&[0xAA; 300]);
        let bytes = b.into_bytes();
        assert_eq!(bytes[0], OpCode::PUSHDATA2.as_byte());
        assert_eq!(u16::from_le_bytes([bytes[1], bytes[2]]), 300);
    }

    #[test]
    fn test_syscall_encoding() {
        let mut b = ScriptBuilder::new();
        b.emit_syscall(0xDEAD_BEEF);
        let bytes = b.into_bytes();
        assert_eq!(bytes[0], OpCode::SYSCALL.as_byte());
        assert_eq!(
            u32::from_le_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]),
            0xDEAD_BEEF
        );
    }
}
