//! Arithmetic, bitwise and comparison handlers.
//!
//! Every integer result is checked against the 32-byte two's-complement
//! ceiling before it lands on the stack.

use num_bigint::BigInt;
use num_traits::{Signed, ToPrimitive, Zero};

use crate::execution_engine::ExecutionEngine;
use crate::instruction::Instruction;
use crate::limits::ExecutionEngineLimits;
use crate::op_code::OpCode;
use crate::stack_item::StackItem;
use crate::{VmError, VmResult};

/// Rejects integers wider than the configured ceiling.
fn check_int(value: BigInt) -> VmResult<BigInt> {
    if StackItem::int_to_bytes(&value).len() > ExecutionEngineLimits::MAX_INTEGER_SIZE {
        return Err(VmError::IntegerOverflow(
            ExecutionEngineLimits::MAX_INTEGER_SIZE,
        ));
    }
    Ok(value)
}

fn push_int(engine: &mut ExecutionEngine, value: BigInt) -> VmResult<()> {
    engine.push(StackItem::Integer(check_int(value)?))
}

pub fn invert(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let value = engine.pop()?.to_int()?;
    push_int(engine, !value)
}

pub fn bit_and(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let b = engine.pop()?.to_int()?;
    let a = engine.pop()?.to_int()?;
    push_int(engine, a & b)
}

pub fn bit_or(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let b = engine.pop()?.to_int()?;
    let a = engine.pop()?.to_int()?;
    push_int(engine, a | b)
}

pub fn bit_xor(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let b = engine.pop()?.to_int()?;
    let a = engine.pop()?.to_int()?;
    push_int(engine, a ^ b)
}

pub fn equal(
    engine: &mut ExecutionEngine,
    _instruction: &Instruction,
    expect_equal: bool,
) -> VmResult<()> {
    let b = engine.pop()?;
    let a = engine.pop()?;
    let limits = engine.limits().clone();
    let result = a.equals(&b, &limits)?;
    engine.push(StackItem::Boolean(result == expect_equal))
}

pub fn not(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let value = engine.pop()?.to_bool()?;
    engine.push(StackItem::Boolean(!value))
}

pub fn bool_and(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let b = engine.pop()?.to_bool()?;
    let a = engine.pop()?.to_bool()?;
    engine.push(StackItem::Boolean(a && b))
}

pub fn bool_or(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let b = engine.pop()?.to_bool()?;
    let a = engine.pop()?.to_bool()?;
    engine.push(StackItem::Boolean(a || b))
}

pub fn nonzero(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let value = engine.pop()?.to_int()?;
    engine.push(StackItem::Boolean(!value.is_zero()))
}

pub fn sign(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let value = engine.pop()?.to_int()?;
    let sign = if value.is_zero() {
        0
    } else if value.is_negative() {
        -1
    } else {
        1
    };
    engine.push(StackItem::from_int(sign))
}

pub fn abs(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let value = engine.pop()?.to_int()?;
    push_int(engine, value.abs())
}

pub fn negate(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let value = engine.pop()?.to_int()?;
    push_int(engine, -value)
}

pub fn increment(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let value = engine.pop()?.to_int()?;
    push_int(engine, value + 1)
}

pub fn decrement(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let value = engine.pop()?.to_int()?;
    push_int(engine, value - 1)
}

pub fn binary_op(engine: &mut ExecutionEngine, instruction: &Instruction) -> VmResult<()> {
    let b = engine.pop()?.to_int()?;
    let a = engine.pop()?.to_int()?;
    let result = match instruction.opcode {
        OpCode::ADD => a + b,
        OpCode::SUB => a - b,
        OpCode::MUL => a * b,
        OpCode::DIV => {
            if b.is_zero() {
                return Err(VmError::DivisionByZero);
            }
            a / b
        }
        OpCode::MOD => {
            if b.is_zero() {
                return Err(VmError::DivisionByZero);
            }
            a % b
        }
        OpCode::POW => {
            let exponent = b
                .to_u32()
                .ok_or_else(|| VmError::OutOfRange("exponent out of range".into()))?;
            a.pow(exponent)
        }
        OpCode::SHL => shift(engine, a, &b, true)?,
        OpCode::SHR => shift(engine, a, &b, false)?,
        OpCode::MIN => a.min(b),
        OpCode::MAX => a.max(b),
        _ => {
            return Err(VmError::invalid_operation(format!(
                "{:?} is not a binary numeric opcode",
                instruction.opcode
            )))
        }
    };
    push_int(engine, result)
}

fn shift(
    engine: &ExecutionEngine,
    value: BigInt,
    amount: &BigInt,
    left: bool,
) -> VmResult<BigInt> {
    let amount = amount
        .to_u32()
        .filter(|&n| n <= engine.limits().max_shift)
        .ok_or_else(|| VmError::OutOfRange("shift amount out of range".into()))?;
    Ok(if left {
        value << amount
    } else {
        value >> amount
    })
}

pub fn sqrt(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let value = engine.pop()?.to_int()?;
    if value.is_negative() {
        return Err(VmError::OutOfRange("sqrt of a negative value".into()));
    }
    push_int(engine, value.sqrt())
}

pub fn mod_mul(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let modulus = engine.pop()?.to_int()?;
    let b = engine.pop()?.to_int()?;
    let a = engine.pop()?.to_int()?;
    if modulus.is_zero() {
        return Err(VmError::DivisionByZero);
    }
    push_int(engine, (a * b) % modulus)
}

pub fn mod_pow(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let modulus = engine.pop()?.to_int()?;
    let exponent = engine.pop()?.to_int()?;
    let base = engine.pop()?.to_int()?;
    if modulus.is_zero() {
        return Err(VmError::DivisionByZero);
    }
    if exponent.is_negative() {
        return Err(VmError::OutOfRange("negative modpow exponent".into()));
    }
    push_int(engine, base.modpow(&exponent, &modulus))
}

pub fn compare(engine: &mut ExecutionEngine, instruction: &Instruction) -> VmResult<()> {
    let b_item = engine.pop()?;
    let a_item = engine.pop()?;
    // LT/LE/GT/GE treat Null as incomparable: any comparison is false,
    // except inequality, which is true.
    if matches!(instruction.opcode, OpCode::LT | OpCode::LE | OpCode::GT | OpCode::GE)
        && (a_item.is_null() || b_item.is_null())
    {
        engine.push(StackItem::Boolean(false))?;
        return Ok(());
    }
    if matches!(instruction.opcode, OpCode::NUMEQUAL | OpCode::NUMNOTEQUAL)
        && (a_item.is_null() || b_item.is_null())
    {
        let equal = a_item.is_null() && b_item.is_null();
        let result = if instruction.opcode == OpCode::NUMEQUAL {
            equal
        } else {
            !equal
        };
        engine.push(StackItem::Boolean(result))?;
        return Ok(());
    }
    let a = a_item.to_int()?;
    let b = b_item.to_int()?;
    let result = match instruction.opcode {
        OpCode::NUMEQUAL => a == b,
        OpCode::NUMNOTEQUAL => a != b,
        OpCode::LT => a < b,
        OpCode::LE => a <= b,
        OpCode::GT => a > b,
        OpCode::GE => a >= b,
        _ => {
            return Err(VmError::invalid_operation(format!(
                "{:?} is not a comparison opcode",
                instruction.opcode
            )))
        }
    };
    engine.push(StackItem::Boolean(result))
}

pub fn within(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let upper = engine.pop()?.to_int()?;
    let lower = engine.pop()?.to_int()?;
    let value = engine.pop()?.to_int()?;
    engine.push(StackItem::Boolean(lower <= value && value < upper))
}
