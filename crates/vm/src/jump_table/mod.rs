//! Instruction dispatch, organized by opcode category.

pub mod compound;
pub mod control;
pub mod numeric;
pub mod slots;
pub mod splice;
pub mod stack_ops;
pub mod types;

use crate::execution_engine::ExecutionEngine;
use crate::instruction::Instruction;
use crate::op_code::OpCode;
use crate::VmResult;

/// Executes one decoded instruction against the engine.
pub fn execute(engine: &mut ExecutionEngine, instruction: &Instruction) -> VmResult<()> {
    use OpCode::*;
    match instruction.opcode {
        // Constants
        PUSHINT8 | PUSHINT16 | PUSHINT32 | PUSHINT64 | PUSHINT128 | PUSHINT256 => {
            stack_ops::push_int(engine, instruction)
        }
        PUSHT | PUSHF => stack_ops::push_bool(engine, instruction),
        PUSHA => control::push_address(engine, instruction),
        PUSHNULL => stack_ops::push_null(engine, instruction),
        PUSHDATA1 | PUSHDATA2 | PUSHDATA4 => stack_ops::push_data(engine, instruction),
        PUSHM1 | PUSH0 | PUSH1 | PUSH2 | PUSH3 | PUSH4 | PUSH5 | PUSH6 | PUSH7 | PUSH8
        | PUSH9 | PUSH10 | PUSH11 | PUSH12 | PUSH13 | PUSH14 | PUSH15 | PUSH16 => {
            stack_ops::push_small_int(engine, instruction)
        }

        // Flow control
        NOP => Ok(()),
        JMP | JMPL | JMPIF | JMPIFL | JMPIFNOT | JMPIFNOTL | JMPEQ | JMPEQL | JMPNE | JMPNEL
        | JMPGT | JMPGTL | JMPGE | JMPGEL | JMPLT | JMPLTL | JMPLE | JMPLEL => {
            control::jump(engine, instruction)
        }
        CALL | CALLL => control::call(engine, instruction),
        CALLA => control::call_address(engine, instruction),
        ABORT => control::abort(engine, instruction),
        ASSERT => control::assert_op(engine, instruction),
        THROW => control::throw(engine, instruction),
        TRY | TRYL => control::try_op(engine, instruction),
        ENDTRY | ENDTRYL => control::end_try(engine, instruction),
        ENDFINALLY => control::end_finally(engine, instruction),
        RET => control::ret(engine, instruction),
        SYSCALL => control::syscall(engine, instruction),

        // Stack manipulation
        DEPTH => stack_ops::depth(engine, instruction),
        DROP => stack_ops::drop_top(engine, instruction),
        NIP => stack_ops::nip(engine, instruction),
        XDROP => stack_ops::xdrop(engine, instruction),
        CLEAR => stack_ops::clear(engine, instruction),
        DUP => stack_ops::dup(engine, instruction),
        OVER => stack_ops::over(engine, instruction),
        PICK => stack_ops::pick(engine, instruction),
        TUCK => stack_ops::tuck(engine, instruction),
        SWAP => stack_ops::swap(engine, instruction),
        ROT => stack_ops::rot(engine, instruction),
        ROLL => stack_ops::roll(engine, instruction),
        REVERSE3 => stack_ops::reverse_n(engine, 3),
        REVERSE4 => stack_ops::reverse_n(engine, 4),
        REVERSEN => stack_ops::reverse_top(engine, instruction),

        // Slots
        INITSSLOT => slots::init_static_slot(engine, instruction),
        INITSLOT => slots::init_slot(engine, instruction),
        LDSFLD0 | LDSFLD1 | LDSFLD2 | LDSFLD3 | LDSFLD4 | LDSFLD5 | LDSFLD6 | LDSFLD => {
            slots::load_static(engine, instruction)
        }
        STSFLD0 | STSFLD1 | STSFLD2 | STSFLD3 | STSFLD4 | STSFLD5 | STSFLD6 | STSFLD => {
            slots::store_static(engine, instruction)
        }
        LDLOC0 | LDLOC1 | LDLOC2 | LDLOC3 | LDLOC4 | LDLOC5 | LDLOC6 | LDLOC => {
            slots::load_local(engine, instruction)
        }
        STLOC0 | STLOC1 | STLOC2 | STLOC3 | STLOC4 | STLOC5 | STLOC6 | STLOC => {
            slots::store_local(engine, instruction)
        }
        LDARG0 | LDARG1 | LDARG2 | LDARG3 | LDARG4 | LDARG5 | LDARG6 | LDARG => {
            slots::load_argument(engine, instruction)
        }
        STARG0 | STARG1 | STARG2 | STARG3 | STARG4 | STARG5 | STARG6 | STARG => {
            slots::store_argument(engine, instruction)
        }

        // Splice
        NEWBUFFER => splice::new_buffer(engine, instruction),
        MEMCPY => splice::memcpy(engine, instruction),
        CAT => splice::cat(engine, instruction),
        SUBSTR => splice::substr(engine, instruction),
        LEFT => splice::left(engine, instruction),
        RIGHT => splice::right(engine, instruction),

        // Bitwise and logic
        INVERT => numeric::invert(engine, instruction),
        AND => numeric::bit_and(engine, instruction),
        OR => numeric::bit_or(engine, instruction),
        XOR => numeric::bit_xor(engine, instruction),
        EQUAL => numeric::equal(engine, instruction, true),
        NOTEQUAL => numeric::equal(engine, instruction, false),
        NOT => numeric::not(engine, instruction),
        BOOLAND => numeric::bool_and(engine, instruction),
        BOOLOR => numeric::bool_or(engine, instruction),
        NZ => numeric::nonzero(engine, instruction),

        // Arithmetic and comparison
        SIGN => numeric::sign(engine, instruction),
        ABS => numeric::abs(engine, instruction),
        NEGATE => numeric::negate(engine, instruction),
        INC => numeric::increment(engine, instruction),
        DEC => numeric::decrement(engine, instruction),
        ADD | SUB | MUL | DIV | MOD | POW | SHL | SHR | MIN | MAX => {
            numeric::binary_op(engine, instruction)
        }
        SQRT => numeric::sqrt(engine, instruction),
        MODMUL => numeric::mod_mul(engine, instruction),
        MODPOW => numeric::mod_pow(engine, instruction),
        NUMEQUAL | NUMNOTEQUAL | LT | LE | GT | GE => numeric::compare(engine, instruction),
        WITHIN => numeric::within(engine, instruction),

        // Compound types
        PACKMAP => compound::pack_map(engine, instruction),
        PACKSTRUCT => compound::pack_struct(engine, instruction),
        PACK => compound::pack(engine, instruction),
        UNPACK => compound::unpack(engine, instruction),
        NEWARRAY0 => compound::new_array0(engine, instruction),
        NEWARRAY | NEWARRAYT => compound::new_array(engine, instruction),
        NEWSTRUCT0 => compound::new_struct0(engine, instruction),
        NEWSTRUCT => compound::new_struct(engine, instruction),
        NEWMAP => compound::new_map(engine, instruction),
        SIZE => compound::size(engine, instruction),
        HASKEY => compound::has_key(engine, instruction),
        KEYS => compound::keys(engine, instruction),
        VALUES => compound::values(engine, instruction),
        PICKITEM => compound::pick_item(engine, instruction),
        APPEND => compound::append(engine, instruction),
        SETITEM => compound::set_item(engine, instruction),
        REVERSEITEMS => compound::reverse_items(engine, instruction),
        REMOVE => compound::remove(engine, instruction),
        CLEARITEMS => compound::clear_items(engine, instruction),
        POPITEM => compound::pop_item(engine, instruction),

        // Types
        ISNULL => types::is_null(engine, instruction),
        ISTYPE => types::is_type(engine, instruction),
        CONVERT => types::convert(engine, instruction),

        // Extensions
        ABORTMSG => control::abort_msg(engine, instruction),
        ASSERTMSG => control::assert_msg(engine, instruction),
    }
}
