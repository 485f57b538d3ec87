//! The typed value universe of the VM.
//!
//! Compound items (Array, Struct, Map, Buffer) live behind `Rc<RefCell<…>>`
//! handles: cloning a `StackItem` clones the handle, so mutation through one
//! holder is visible through all of them. Equality on reference types is
//! identity; Struct adds bounded structural equality.

pub mod ordered_map;
pub mod serializer;

pub use ordered_map::OrderedMap;
pub use serializer::{deserialize_item, serialize_item};

use num_bigint::BigInt;
use num_traits::{Signed, ToPrimitive, Zero};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::limits::ExecutionEngineLimits;
use crate::script::Script;
use crate::{VmError, VmResult};

/// Type tags, matching the canonical serialization format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StackItemType {
    /// The absent value.
    Any = 0x00,
    /// A (script, offset) code pointer.
    Pointer = 0x10,
    /// A boolean.
    Boolean = 0x20,
    /// An arbitrary-precision integer.
    Integer = 0x21,
    /// An immutable byte sequence.
    ByteString = 0x28,
    /// A mutable byte sequence.
    Buffer = 0x30,
    /// A reference-shared ordered sequence.
    Array = 0x40,
    /// Like Array, but with value semantics on equality.
    Struct = 0x41,
    /// An insertion-ordered map with primitive keys.
    Map = 0x48,
    /// An opaque host object.
    InteropInterface = 0x60,
}

impl StackItemType {
    /// Parses a type tag byte.
    pub fn from_byte(value: u8) -> VmResult<Self> {
        match value {
            0x00 => Ok(Self::Any),
            0x10 => Ok(Self::Pointer),
            0x20 => Ok(Self::Boolean),
            0x21 => Ok(Self::Integer),
            0x28 => Ok(Self::ByteString),
            0x30 => Ok(Self::Buffer),
            0x40 => Ok(Self::Array),
            0x41 => Ok(Self::Struct),
            0x48 => Ok(Self::Map),
            0x60 => Ok(Self::InteropInterface),
            other => Err(VmError::InvalidOperand(format!(
                "unknown stack item type 0x{other:02x}"
            ))),
        }
    }
}

/// A host object exposed to scripts as an opaque handle.
pub trait InteropObject: fmt::Debug {
    /// A short type tag, used in diagnostics and ISTYPE-style checks.
    fn interface_type(&self) -> &'static str;

    /// Downcasting support for hosts.
    fn as_any(&self) -> &dyn std::any::Any;
}

/// A value on the evaluation stack.
#[derive(Clone)]
pub enum StackItem {
    /// The singleton absent value.
    Null,
    /// A boolean.
    Boolean(bool),
    /// An arbitrary-precision signed integer.
    Integer(BigInt),
    /// An immutable byte string.
    ByteString(Vec<u8>),
    /// A mutable byte buffer.
    Buffer(Rc<RefCell<Vec<u8>>>),
    /// A reference-shared array.
    Array(Rc<RefCell<Vec<StackItem>>>),
    /// A struct: array layout, value equality.
    Struct(Rc<RefCell<Vec<StackItem>>>),
    /// An insertion-ordered map.
    Map(Rc<RefCell<OrderedMap>>),
    /// A code pointer into a specific script.
    Pointer {
        /// The script the pointer refers into.
        script: Rc<Script>,
        /// Byte offset within the script.
        position: usize,
    },
    /// An opaque host object.
    Interop(Rc<dyn InteropObject>),
}

impl StackItem {
    /// Creates an integer item.
    pub fn from_int<T: Into<BigInt>>(value: T) -> Self {
        Self::Integer(value.into())
    }

    /// Creates a byte string item.
    pub fn from_bytes(value: impl Into<Vec<u8>>) -> Self {
        Self::ByteString(value.into())
    }

    /// Creates a fresh buffer item.
    pub fn new_buffer(value: Vec<u8>) -> Self {
        Self::Buffer(Rc::new(RefCell::new(value)))
    }

    /// Creates a fresh array item.
    pub fn new_array(items: Vec<StackItem>) -> Self {
        Self::Array(Rc::new(RefCell::new(items)))
    }

    /// Creates a fresh struct item.
    pub fn new_struct(items: Vec<StackItem>) -> Self {
        Self::Struct(Rc::new(RefCell::new(items)))
    }

    /// Creates a fresh empty map item.
    pub fn new_map() -> Self {
        Self::Map(Rc::new(RefCell::new(OrderedMap::new())))
    }

    /// Wraps a host object.
    pub fn from_interop(object: Rc<dyn InteropObject>) -> Self {
        Self::Interop(object)
    }

    /// The type tag of this item.
    pub fn item_type(&self) -> StackItemType {
        match self {
            Self::Null => StackItemType::Any,
            Self::Boolean(_) => StackItemType::Boolean,
            Self::Integer(_) => StackItemType::Integer,
            Self::ByteString(_) => StackItemType::ByteString,
            Self::Buffer(_) => StackItemType::Buffer,
            Self::Array(_) => StackItemType::Array,
            Self::Struct(_) => StackItemType::Struct,
            Self::Map(_) => StackItemType::Map,
            Self::Pointer { .. } => StackItemType::Pointer,
            Self::Interop(_) => StackItemType::InteropInterface,
        }
    }

    /// A human-readable type name for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "Null",
            Self::Boolean(_) => "Boolean",
            Self::Integer(_) => "Integer",
            Self::ByteString(_) => "ByteString",
            Self::Buffer(_) => "Buffer",
            Self::Array(_) => "Array",
            Self::Struct(_) => "Struct",
            Self::Map(_) => "Map",
            Self::Pointer { .. } => "Pointer",
            Self::Interop(_) => "InteropInterface",
        }
    }

    /// True for the Null singleton.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// True for Boolean, Integer and ByteString.
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            Self::Boolean(_) | Self::Integer(_) | Self::ByteString(_)
        )
    }

    /// Canonical little-endian bytes of an integer; zero is empty.
    pub fn int_to_bytes(value: &BigInt) -> Vec<u8> {
        if value.is_zero() {
            Vec::new()
        } else {
            value.to_signed_bytes_le()
        }
    }

    /// Parses a canonical little-endian integer; empty is zero.
    pub fn bytes_to_int(bytes: &[u8]) -> BigInt {
        if bytes.is_empty() {
            BigInt::zero()
        } else {
            BigInt::from_signed_bytes_le(bytes)
        }
    }

    /// Converts to a boolean. Total except for oversized byte strings.
    pub fn to_bool(&self) -> VmResult<bool> {
        match self {
            Self::Null => Ok(false),
            Self::Boolean(b) => Ok(*b),
            Self::Integer(i) => Ok(!i.is_zero()),
            Self::ByteString(b) => {
                if b.len() > ExecutionEngineLimits::MAX_INTEGER_SIZE {
                    return Err(VmError::IntegerOverflow(
                        ExecutionEngineLimits::MAX_INTEGER_SIZE,
                    ));
                }
                Ok(b.iter().any(|&byte| byte != 0))
            }
            _ => Ok(true),
        }
    }

    /// Converts to an integer; faults for non-primitive types.
    pub fn to_int(&self) -> VmResult<BigInt> {
        match self {
            Self::Boolean(b) => Ok(BigInt::from(i32::from(*b))),
            Self::Integer(i) => Ok(i.clone()),
            Self::ByteString(b) => {
                if b.len() > ExecutionEngineLimits::MAX_INTEGER_SIZE {
                    return Err(VmError::IntegerOverflow(
                        ExecutionEngineLimits::MAX_INTEGER_SIZE,
                    ));
                }
                Ok(Self::bytes_to_int(b))
            }
            other => Err(VmError::invalid_type("Integer", other.type_name())),
        }
    }

    /// Converts to an integer and narrows to usize (indexes and counts).
    pub fn to_usize(&self) -> VmResult<usize> {
        let value = self.to_int()?;
        if value.is_negative() {
            return Err(VmError::OutOfRange(format!("negative index {value}")));
        }
        value
            .to_usize()
            .ok_or_else(|| VmError::OutOfRange(format!("index {value} too large")))
    }

    /// Converts to bytes; faults for compound types.
    pub fn to_bytes(&self) -> VmResult<Vec<u8>> {
        match self {
            Self::Boolean(b) => Ok(vec![u8::from(*b)]),
            Self::Integer(i) => Ok(Self::int_to_bytes(i)),
            Self::ByteString(b) => Ok(b.clone()),
            Self::Buffer(b) => Ok(b.borrow().clone()),
            other => Err(VmError::invalid_type("ByteString", other.type_name())),
        }
    }

    /// Canonical memory of a primitive, used for keys and EQUAL.
    fn primitive_bytes(&self) -> Option<Vec<u8>> {
        match self {
            Self::Boolean(b) => Some(vec![u8::from(*b)]),
            Self::Integer(i) => Some(Self::int_to_bytes(i)),
            Self::ByteString(b) => Some(b.clone()),
            _ => None,
        }
    }

    /// Value equality over primitives: canonical byte memory comparison.
    pub fn primitive_equals(&self, other: &StackItem) -> bool {
        match (self.primitive_bytes(), other.primitive_bytes()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    /// Identity of a reference-typed item, for cycle tracking.
    pub fn reference_id(&self) -> Option<usize> {
        match self {
            Self::Buffer(rc) => Some(Rc::as_ptr(rc) as usize),
            Self::Array(rc) | Self::Struct(rc) => Some(Rc::as_ptr(rc) as usize),
            Self::Map(rc) => Some(Rc::as_ptr(rc) as *const u8 as usize),
            Self::Interop(rc) => Some(Rc::as_ptr(rc) as *const u8 as usize),
            _ => None,
        }
    }

    /// Full equality: primitives by value, reference types by identity,
    /// Struct structurally with a comparison budget.
    pub fn equals(&self, other: &StackItem, limits: &ExecutionEngineLimits) -> VmResult<bool> {
        let mut budget = limits.max_comparable_size;
        self.equals_bounded(other, &mut budget)
    }

    fn equals_bounded(&self, other: &StackItem, budget: &mut usize) -> VmResult<bool> {
        if *budget == 0 {
            return Err(VmError::invalid_operation("comparison budget exhausted"));
        }
        *budget -= 1;
        match (self, other) {
            (Self::Null, Self::Null) => Ok(true),
            (Self::Null, _) | (_, Self::Null) => Ok(false),
            (Self::Struct(a), Self::Struct(b)) => {
                if Rc::ptr_eq(a, b) {
                    return Ok(true);
                }
                let left = a.borrow();
                let right = b.borrow();
                if left.len() != right.len() {
                    return Ok(false);
                }
                for (x, y) in left.iter().zip(right.iter()) {
                    if !x.equals_bounded(y, budget)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            (Self::Buffer(a), Self::Buffer(b)) => Ok(Rc::ptr_eq(a, b)),
            (Self::Array(a), Self::Array(b)) => Ok(Rc::ptr_eq(a, b)),
            (Self::Map(a), Self::Map(b)) => Ok(Rc::ptr_eq(a, b)),
            (Self::Interop(a), Self::Interop(b)) => Ok(Rc::ptr_eq(a, b)),
            (
                Self::Pointer {
                    script: sa,
                    position: pa,
                },
                Self::Pointer {
                    script: sb,
                    position: pb,
                },
            ) => Ok(Rc::ptr_eq(sa, sb) && pa == pb),
            _ => Ok(self.primitive_equals(other)),
        }
    }

    /// Deep-copies the item, faulting beyond the nesting budget.
    ///
    /// Arrays, structs and maps get fresh handles; buffers get fresh
    /// storage; primitives are cloned as-is.
    pub fn deep_copy(&self, limits: &ExecutionEngineLimits) -> VmResult<StackItem> {
        self.deep_copy_depth(limits.max_nesting_depth)
    }

    fn deep_copy_depth(&self, depth: usize) -> VmResult<StackItem> {
        if depth == 0 {
            return Err(VmError::NestingTooDeep);
        }
        match self {
            Self::Buffer(b) => Ok(Self::new_buffer(b.borrow().clone())),
            Self::Array(items) => {
                let copied = items
                    .borrow()
                    .iter()
                    .map(|i| i.deep_copy_depth(depth - 1))
                    .collect::<VmResult<Vec<_>>>()?;
                Ok(Self::new_array(copied))
            }
            Self::Struct(items) => {
                let copied = items
                    .borrow()
                    .iter()
                    .map(|i| i.deep_copy_depth(depth - 1))
                    .collect::<VmResult<Vec<_>>>()?;
                Ok(Self::new_struct(copied))
            }
            Self::Map(map) => {
                let mut copied = OrderedMap::new();
                for (key, value) in map.borrow().iter() {
                    copied.insert(key.clone(), value.deep_copy_depth(depth - 1)?)?;
                }
                Ok(Self::Map(Rc::new(RefCell::new(copied))))
            }
            other => Ok(other.clone()),
        }
    }

    /// Converts this item to `target`, faulting where disallowed.
    pub fn convert(&self, target: StackItemType) -> VmResult<StackItem> {
        if self.item_type() == target {
            return Ok(self.clone());
        }
        match target {
            StackItemType::Boolean => Ok(Self::Boolean(self.to_bool()?)),
            StackItemType::Integer => Ok(Self::Integer(self.to_int()?)),
            StackItemType::ByteString => Ok(Self::ByteString(self.to_bytes()?)),
            StackItemType::Buffer => Ok(Self::new_buffer(self.to_bytes()?)),
            StackItemType::Array => match self {
                Self::Struct(items) => Ok(Self::new_array(items.borrow().clone())),
                _ => Err(VmError::invalid_type("Struct", self.type_name())),
            },
            StackItemType::Struct => match self {
                Self::Array(items) => Ok(Self::new_struct(items.borrow().clone())),
                _ => Err(VmError::invalid_type("Array", self.type_name())),
            },
            StackItemType::Any if self.is_null() => Ok(Self::Null),
            _ => Err(VmError::invalid_operation(format!(
                "cannot convert {} to {:?}",
                self.type_name(),
                target
            ))),
        }
    }

    /// Approximate in-memory weight, used by item-size limit checks.
    pub fn byte_len(&self) -> usize {
        match self {
            Self::ByteString(b) => b.len(),
            Self::Buffer(b) => b.borrow().len(),
            Self::Integer(i) => Self::int_to_bytes(i).len(),
            _ => 1,
        }
    }
}

impl PartialEq for StackItem {
    /// Structural-enough equality for tests and assertions. Execution paths
    /// go through [`StackItem::equals`], which enforces budgets.
    fn eq(&self, other: &Self) -> bool {
        let mut budget = ExecutionEngineLimits::default().max_comparable_size;
        match (self, other) {
            (Self::Array(a), Self::Array(b)) => {
                Rc::ptr_eq(a, b) || a.borrow().as_slice() == b.borrow().as_slice()
            }
            _ => self.equals_bounded(other, &mut budget).unwrap_or(false),
        }
    }
}

impl fmt::Debug for StackItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "Null"),
            Self::Boolean(b) => write!(f, "Boolean({b})"),
            Self::Integer(i) => write!(f, "Integer({i})"),
            Self::ByteString(b) => write!(f, "ByteString(0x{})", hex_bytes(b)),
            Self::Buffer(b) => write!(f, "Buffer(0x{})", hex_bytes(&b.borrow())),
            Self::Array(items) => write!(f, "Array(len={})", items.borrow().len()),
            Self::Struct(items) => write!(f, "Struct(len={})", items.borrow().len()),
            Self::Map(map) => write!(f, "Map(len={})", map.borrow().len()),
            Self::Pointer { position, .. } => write!(f, "Pointer({position})"),
            Self::Interop(obj) => write!(f, "Interop({})", obj.interface_type()),
        }
    }
}

fn hex_bytes(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_never_equals_bytestring() {
        let limits = ExecutionEngineLimits::default();
        let bytes = StackItem::from_bytes(b"same");
        let buffer = StackItem::new_buffer(b"same".to_vec());
        assert!(!bytes.equals(&buffer, &limits).unwrap());
        assert!(!buffer.equals(&bytes, &limits).unwrap());
    }

    #[test]
    fn test_integer_bytestring_cross_equality() {
        let limits = ExecutionEngineLimits::default();
        let int = StackItem::from_int(256);
        let bytes = StackItem::from_bytes(vec![0x00, 0x01]);
        assert!(int.equals(&bytes, &limits).unwrap());
    }

    #[test]
    fn test_zero_integer_equals_empty_bytes() {
        let limits = ExecutionEngineLimits::default();
        assert!(StackItem::from_int(0)
            .equals(&StackItem::from_bytes(Vec::new()), &limits)
            .unwrap());
    }

    #[test]
    fn test_array_equality_is_identity() {
        let limits = ExecutionEngineLimits::default();
        let a = StackItem::new_array(vec![StackItem::from_int(1)]);
        let b = StackItem::new_array(vec![StackItem::from_int(1)]);
        assert!(!a.equals(&b, &limits).unwrap());
        assert!(a.equals(&a.clone(), &limits).unwrap());
    }

    #[test]
    fn test_struct_equality_is_structural() {
        let limits = ExecutionEngineLimits::default();
        let a = StackItem::new_struct(vec![StackItem::from_int(1), StackItem::from_bytes(b"x")]);
        let b = StackItem::new_struct(vec![StackItem::from_int(1), StackItem::from_bytes(b"x")]);
        assert!(a.equals(&b, &limits).unwrap());
    }

    #[test]
    fn test_mutation_visible_through_all_handles() {
        let a = StackItem::new_array(vec![]);
        let b = a.clone();
        if let StackItem::Array(items) = &a {
            items.borrow_mut().push(StackItem::from_int(7));
        }
        if let StackItem::Array(items) = &b {
            assert_eq!(items.borrow().len(), 1);
        }
    }

    #[test]
    fn test_deep_copy_detaches() {
        let limits = ExecutionEngineLimits::default();
        let original = StackItem::new_struct(vec![StackItem::new_array(vec![])]);
        let copy = original.deep_copy(&limits).unwrap();
        if let StackItem::Struct(items) = &original {
            if let StackItem::Array(inner) = &items.borrow()[0] {
                inner.borrow_mut().push(StackItem::Null);
            }
        }
        if let StackItem::Struct(items) = &copy {
            if let StackItem::Array(inner) = &items.borrow()[0] {
                assert!(inner.borrow().is_empty());
            }
        }
    }

    #[test]
    fn test_deep_copy_of_cycle_faults() {
        let limits = ExecutionEngineLimits::default();
        let outer = StackItem::new_array(vec![]);
        if let StackItem::Array(items) = &outer {
            items.borrow_mut().push(outer.clone());
        }
        assert!(outer.deep_copy(&limits).is_err());
    }

    #[test]
    fn test_convert_array_struct() {
        let array = StackItem::new_array(vec![StackItem::from_int(5)]);
        let converted = array.convert(StackItemType::Struct).unwrap();
        assert_eq!(converted.item_type(), StackItemType::Struct);
        assert!(array.convert(StackItemType::ByteString).is_err());
    }

    #[test]
    fn test_conversion_zero_false_rules() {
        assert!(!StackItem::from_int(0).to_bool().unwrap());
        assert!(StackItem::from_int(-1).to_bool().unwrap());
        assert_eq!(
            StackItem::Boolean(false).to_int().unwrap(),
            BigInt::zero()
        );
    }
}
