//! The instruction set of the Helios VM.
//!
//! One table drives everything: byte value, operand shape and base gas
//! price. Prices are in fee units and are multiplied by the execution fee
//! factor by the hosting application engine.

use crate::{VmError, VmResult};

/// Operand shape of an opcode: a fixed number of immediate bytes, or a
/// length prefix followed by that many bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperandSize {
    /// Fixed operand width in bytes.
    pub size: usize,
    /// Width of the length prefix for variable operands.
    pub size_prefix: usize,
}

impl OperandSize {
    const fn none() -> Self {
        Self {
            size: 0,
            size_prefix: 0,
        }
    }

    const fn fixed(size: usize) -> Self {
        Self {
            size,
            size_prefix: 0,
        }
    }

    const fn prefix(size_prefix: usize) -> Self {
        Self {
            size: 0,
            size_prefix,
        }
    }
}

macro_rules! op_codes {
    ($(($name:ident, $value:expr, $operand:expr, $price:expr)),* $(,)?) => {
        /// An opcode of the Helios VM.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum OpCode {
            $($name = $value),*
        }

        impl OpCode {
            /// Decodes an opcode byte.
            pub fn from_byte(value: u8) -> VmResult<Self> {
                match value {
                    $($value => Ok(OpCode::$name),)*
                    other => Err(VmError::InvalidOpcode(other)),
                }
            }

            /// The operand shape of this opcode.
            pub fn operand_size(&self) -> OperandSize {
                match self {
                    $(OpCode::$name => $operand,)*
                }
            }

            /// Base gas price in fee units.
            pub fn price(&self) -> i64 {
                match self {
                    $(OpCode::$name => $price,)*
                }
            }
        }
    };
}

op_codes! {
    // Constants
    (PUSHINT8, 0x00, OperandSize::fixed(1), 1),
    (PUSHINT16, 0x01, OperandSize::fixed(2), 1),
    (PUSHINT32, 0x02, OperandSize::fixed(4), 1),
    (PUSHINT64, 0x03, OperandSize::fixed(8), 1),
    (PUSHINT128, 0x04, OperandSize::fixed(16), 1 << 2),
    (PUSHINT256, 0x05, OperandSize::fixed(32), 1 << 2),
    (PUSHT, 0x08, OperandSize::none(), 1),
    (PUSHF, 0x09, OperandSize::none(), 1),
    (PUSHA, 0x0A, OperandSize::fixed(4), 1 << 2),
    (PUSHNULL, 0x0B, OperandSize::none(), 1),
    (PUSHDATA1, 0x0C, OperandSize::prefix(1), 1 << 3),
    (PUSHDATA2, 0x0D, OperandSize::prefix(2), 1 << 9),
    (PUSHDATA4, 0x0E, OperandSize::prefix(4), 1 << 12),
    (PUSHM1, 0x0F, OperandSize::none(), 1),
    (PUSH0, 0x10, OperandSize::none(), 1),
    (PUSH1, 0x11, OperandSize::none(), 1),
    (PUSH2, 0x12, OperandSize::none(), 1),
    (PUSH3, 0x13, OperandSize::none(), 1),
    (PUSH4, 0x14, OperandSize::none(), 1),
    (PUSH5, 0x15, OperandSize::none(), 1),
    (PUSH6, 0x16, OperandSize::none(), 1),
    (PUSH7, 0x17, OperandSize::none(), 1),
    (PUSH8, 0x18, OperandSize::none(), 1),
    (PUSH9, 0x19, OperandSize::none(), 1),
    (PUSH10, 0x1A, OperandSize::none(), 1),
    (PUSH11, 0x1B, OperandSize::none(), 1),
    (PUSH12, 0x1C, OperandSize::none(), 1),
    (PUSH13, 0x1D, OperandSize::none(), 1),
    (PUSH14, 0x1E, OperandSize::none(), 1),
    (PUSH15, 0x1F, OperandSize::none(), 1),
    (PUSH16, 0x20, OperandSize::none(), 1),

    // Flow control
    (NOP, 0x21, OperandSize::none(), 1),
    (JMP, 0x22, OperandSize::fixed(1), 1 << 1),
    (JMPL, 0x23, OperandSize::fixed(4), 1 << 1),
    (JMPIF, 0x24, OperandSize::fixed(1), 1 << 1),
    (JMPIFL, 0x25, OperandSize::fixed(4), 1 << 1),
    (JMPIFNOT, 0x26, OperandSize::fixed(1), 1 << 1),
    (JMPIFNOTL, 0x27, OperandSize::fixed(4), 1 << 1),
    (JMPEQ, 0x28, OperandSize::fixed(1), 1 << 1),
    (JMPEQL, 0x29, OperandSize::fixed(4), 1 << 1),
    (JMPNE, 0x2A, OperandSize::fixed(1), 1 << 1),
    (JMPNEL, 0x2B, OperandSize::fixed(4), 1 << 1),
    (JMPGT, 0x2C, OperandSize::fixed(1), 1 << 1),
    (JMPGTL, 0x2D, OperandSize::fixed(4), 1 << 1),
    (JMPGE, 0x2E, OperandSize::fixed(1), 1 << 1),
    (JMPGEL, 0x2F, OperandSize::fixed(4), 1 << 1),
    (JMPLT, 0x30, OperandSize::fixed(1), 1 << 1),
    (JMPLTL, 0x31, OperandSize::fixed(4), 1 << 1),
    (JMPLE, 0x32, OperandSize::fixed(1), 1 << 1),
    (JMPLEL, 0x33, OperandSize::fixed(4), 1 << 1),
    (CALL, 0x34, OperandSize::fixed(1), 1 << 9),
    (CALLL, 0x35, OperandSize::fixed(4), 1 << 9),
    (CALLA, 0x36, OperandSize::none(), 1 << 9),
    (ABORT, 0x38, OperandSize::none(), 0),
    (ASSERT, 0x39, OperandSize::none(), 1),
    (THROW, 0x3A, OperandSize::none(), 1 << 9),
    (TRY, 0x3B, OperandSize::fixed(2), 1 << 2),
    (TRYL, 0x3C, OperandSize::fixed(8), 1 << 2),
    (ENDTRY, 0x3D, OperandSize::fixed(1), 1 << 2),
    (ENDTRYL, 0x3E, OperandSize::fixed(4), 1 << 2),
    (ENDFINALLY, 0x3F, OperandSize::none(), 1 << 2),
    (RET, 0x40, OperandSize::none(), 0),
    (SYSCALL, 0x41, OperandSize::fixed(4), 0),

    // Stack
    (DEPTH, 0x43, OperandSize::none(), 1 << 1),
    (DROP, 0x45, OperandSize::none(), 1 << 1),
    (NIP, 0x46, OperandSize::none(), 1 << 1),
    (XDROP, 0x48, OperandSize::none(), 1 << 4),
    (CLEAR, 0x49, OperandSize::none(), 1 << 4),
    (DUP, 0x4A, OperandSize::none(), 1 << 1),
    (OVER, 0x4B, OperandSize::none(), 1 << 1),
    (PICK, 0x4D, OperandSize::none(), 1 << 1),
    (TUCK, 0x4E, OperandSize::none(), 1 << 1),
    (SWAP, 0x50, OperandSize::none(), 1 << 1),
    (ROT, 0x51, OperandSize::none(), 1 << 1),
    (ROLL, 0x52, OperandSize::none(), 1 << 4),
    (REVERSE3, 0x53, OperandSize::none(), 1 << 1),
    (REVERSE4, 0x54, OperandSize::none(), 1 << 1),
    (REVERSEN, 0x55, OperandSize::none(), 1 << 4),

    // Slots
    (INITSSLOT, 0x56, OperandSize::fixed(1), 1 << 4),
    (INITSLOT, 0x57, OperandSize::fixed(2), 1 << 6),
    (LDSFLD0, 0x58, OperandSize::none(), 1 << 1),
    (LDSFLD1, 0x59, OperandSize::none(), 1 << 1),
    (LDSFLD2, 0x5A, OperandSize::none(), 1 << 1),
    (LDSFLD3, 0x5B, OperandSize::none(), 1 << 1),
    (LDSFLD4, 0x5C, OperandSize::none(), 1 << 1),
    (LDSFLD5, 0x5D, OperandSize::none(), 1 << 1),
    (LDSFLD6, 0x5E, OperandSize::none(), 1 << 1),
    (LDSFLD, 0x5F, OperandSize::fixed(1), 1 << 1),
    (STSFLD0, 0x60, OperandSize::none(), 1 << 1),
    (STSFLD1, 0x61, OperandSize::none(), 1 << 1),
    (STSFLD2, 0x62, OperandSize::none(), 1 << 1),
    (STSFLD3, 0x63, OperandSize::none(), 1 << 1),
    (STSFLD4, 0x64, OperandSize::none(), 1 << 1),
    (STSFLD5, 0x65, OperandSize::none(), 1 << 1),
    (STSFLD6, 0x66, OperandSize::none(), 1 << 1),
    (STSFLD, 0x67, OperandSize::fixed(1), 1 << 1),
    (LDLOC0, 0x68, OperandSize::none(), 1 << 1),
    (LDLOC1, 0x69, OperandSize::none(), 1 << 1),
    (LDLOC2, 0x6A, OperandSize::none(), 1 << 1),
    (LDLOC3, 0x6B, OperandSize::none(), 1 << 1),
    (LDLOC4, 0x6C, OperandSize::none(), 1 << 1),
    (LDLOC5, 0x6D, OperandSize::none(), 1 << 1),
    (LDLOC6, 0x6E, OperandSize::none(), 1 << 1),
    (LDLOC, 0x6F, OperandSize::fixed(1), 1 << 1),
    (STLOC0, 0x70, OperandSize::none(), 1 << 1),
    (STLOC1, 0x71, OperandSize::none(), 1 << 1),
    (STLOC2, 0x72, OperandSize::none(), 1 << 1),
    (STLOC3, 0x73, OperandSize::none(), 1 << 1),
    (STLOC4, 0x74, OperandSize::none(), 1 << 1),
    (STLOC5, 0x75, OperandSize::none(), 1 << 1),
    (STLOC6, 0x76, OperandSize::none(), 1 << 1),
    (STLOC, 0x77, OperandSize::fixed(1), 1 << 1),
    (LDARG0, 0x78, OperandSize::none(), 1 << 1),
    (LDARG1, 0x79, OperandSize::none(), 1 << 1),
    (LDARG2, 0x7A, OperandSize::none(), 1 << 1),
    (LDARG3, 0x7B, OperandSize::none(), 1 << 1),
    (LDARG4, 0x7C, OperandSize::none(), 1 << 1),
    (LDARG5, 0x7D, OperandSize::none(), 1 << 1),
    (LDARG6, 0x7E, OperandSize::none(), 1 << 1),
    (LDARG, 0x7F, OperandSize::fixed(1), 1 << 1),
    (STARG0, 0x80, OperandSize::none(), 1 << 1),
    (STARG1, 0x81, OperandSize::none(), 1 << 1),
    (STARG2, 0x82, OperandSize::none(), 1 << 1),
    (STARG3, 0x83, OperandSize::none(), 1 << 1),
    (STARG4, 0x84, OperandSize::none(), 1 << 1),
    (STARG5, 0x85, OperandSize::none(), 1 << 1),
    (STARG6, 0x86, OperandSize::none(), 1 << 1),
    (STARG, 0x87, OperandSize::fixed(1), 1 << 1),

    // Splice
    (NEWBUFFER, 0x88, OperandSize::none(), 1 << 8),
    (MEMCPY, 0x89, OperandSize::none(), 1 << 11),
    (CAT, 0x8B, OperandSize::none(), 1 << 11),
    (SUBSTR, 0x8C, OperandSize::none(), 1 << 11),
    (LEFT, 0x8D, OperandSize::none(), 1 << 11),
    (RIGHT, 0x8E, OperandSize::none(), 1 << 11),

    // Bitwise
    (INVERT, 0x90, OperandSize::none(), 1 << 2),
    (AND, 0x91, OperandSize::none(), 1 << 3),
    (OR, 0x92, OperandSize::none(), 1 << 3),
    (XOR, 0x93, OperandSize::none(), 1 << 3),
    (EQUAL, 0x97, OperandSize::none(), 1 << 5),
    (NOTEQUAL, 0x98, OperandSize::none(), 1 << 5),

    // Arithmetic
    (SIGN, 0x99, OperandSize::none(), 1 << 2),
    (ABS, 0x9A, OperandSize::none(), 1 << 2),
    (NEGATE, 0x9B, OperandSize::none(), 1 << 2),
    (INC, 0x9C, OperandSize::none(), 1 << 2),
    (DEC, 0x9D, OperandSize::none(), 1 << 2),
    (ADD, 0x9E, OperandSize::none(), 1 << 3),
    (SUB, 0x9F, OperandSize::none(), 1 << 3),
    (MUL, 0xA0, OperandSize::none(), 1 << 3),
    (DIV, 0xA1, OperandSize::none(), 1 << 3),
    (MOD, 0xA2, OperandSize::none(), 1 << 3),
    (POW, 0xA3, OperandSize::none(), 1 << 6),
    (SQRT, 0xA4, OperandSize::none(), 1 << 6),
    (MODMUL, 0xA5, OperandSize::none(), 1 << 5),
    (MODPOW, 0xA6, OperandSize::none(), 1 << 11),
    (SHL, 0xA8, OperandSize::none(), 1 << 3),
    (SHR, 0xA9, OperandSize::none(), 1 << 3),
    (NOT, 0xAA, OperandSize::none(), 1 << 2),
    (BOOLAND, 0xAB, OperandSize::none(), 1 << 3),
    (BOOLOR, 0xAC, OperandSize::none(), 1 << 3),
    (NZ, 0xB1, OperandSize::none(), 1 << 2),
    (NUMEQUAL, 0xB3, OperandSize::none(), 1 << 3),
    (NUMNOTEQUAL, 0xB4, OperandSize::none(), 1 << 3),
    (LT, 0xB5, OperandSize::none(), 1 << 3),
    (LE, 0xB6, OperandSize::none(), 1 << 3),
    (GT, 0xB7, OperandSize::none(), 1 << 3),
    (GE, 0xB8, OperandSize::none(), 1 << 3),
    (MIN, 0xB9, OperandSize::none(), 1 << 3),
    (MAX, 0xBA, OperandSize::none(), 1 << 3),
    (WITHIN, 0xBB, OperandSize::none(), 1 << 3),

    // Compound types
    (PACKMAP, 0xBE, OperandSize::none(), 1 << 11),
    (PACKSTRUCT, 0xBF, OperandSize::none(), 1 << 11),
    (PACK, 0xC0, OperandSize::none(), 1 << 11),
    (UNPACK, 0xC1, OperandSize::none(), 1 << 11),
    (NEWARRAY0, 0xC2, OperandSize::none(), 1 << 4),
    (NEWARRAY, 0xC3, OperandSize::none(), 1 << 9),
    (NEWARRAYT, 0xC4, OperandSize::fixed(1), 1 << 9),
    (NEWSTRUCT0, 0xC5, OperandSize::none(), 1 << 4),
    (NEWSTRUCT, 0xC6, OperandSize::none(), 1 << 9),
    (NEWMAP, 0xC8, OperandSize::none(), 1 << 3),
    (SIZE, 0xCA, OperandSize::none(), 1 << 2),
    (HASKEY, 0xCB, OperandSize::none(), 1 << 6),
    (KEYS, 0xCC, OperandSize::none(), 1 << 4),
    (VALUES, 0xCD, OperandSize::none(), 1 << 13),
    (PICKITEM, 0xCE, OperandSize::none(), 1 << 6),
    (APPEND, 0xCF, OperandSize::none(), 1 << 13),
    (SETITEM, 0xD0, OperandSize::none(), 1 << 13),
    (REVERSEITEMS, 0xD1, OperandSize::none(), 1 << 13),
    (REMOVE, 0xD2, OperandSize::none(), 1 << 4),
    (CLEARITEMS, 0xD3, OperandSize::none(), 1 << 4),
    (POPITEM, 0xD4, OperandSize::none(), 1 << 4),

    // Types
    (ISNULL, 0xD8, OperandSize::none(), 1 << 1),
    (ISTYPE, 0xD9, OperandSize::fixed(1), 1 << 1),
    (CONVERT, 0xDB, OperandSize::fixed(1), 1 << 13),

    // Extensions
    (ABORTMSG, 0xE0, OperandSize::none(), 0),
    (ASSERTMSG, 0xE1, OperandSize::none(), 1),
}

impl OpCode {
    /// The raw byte value.
    pub fn as_byte(&self) -> u8 {
        *self as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_all_known_bytes() {
        for value in 0u8..=0xE1 {
            if let Ok(op) = OpCode::from_byte(value) {
                assert_eq!(op.as_byte(), value);
            }
        }
    }

    #[test]
    fn test_unassigned_bytes_rejected() {
        assert!(OpCode::from_byte(0x06).is_err());
        assert!(OpCode::from_byte(0x42).is_err());
        assert!(OpCode::from_byte(0xFF).is_err());
    }

    #[test]
    fn test_operand_shapes() {
        assert_eq!(OpCode::PUSHINT64.operand_size(), OperandSize::fixed(8));
        assert_eq!(OpCode::PUSHDATA2.operand_size(), OperandSize::prefix(2));
        assert_eq!(OpCode::ADD.operand_size(), OperandSize::none());
        assert_eq!(OpCode::TRYL.operand_size(), OperandSize::fixed(8));
    }

    #[test]
    fn test_push_data_price_scales_with_width() {
        assert!(OpCode::PUSHDATA1.price() < OpCode::PUSHDATA2.price());
        assert!(OpCode::PUSHDATA2.price() < OpCode::PUSHDATA4.price());
    }
}
