use alloc::borrow::Cow;
use alloc::vec::Vec;
use core::fmt;

/// Type of a value.
///
/// Wasm code manipulates values of seven types: 32- and 64-bit integers,
/// 32- and 64-bit IEEE 754-2008 floating point numbers, 128-bit packed
/// vectors, and the two reference types.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ValueType {
    /// 32-bit signed or unsigned integer.
    I32,
    /// 64-bit signed or unsigned integer.
    I64,
    /// 32-bit IEEE 754-2008 floating point number.
    F32,
    /// 64-bit IEEE 754-2008 floating point number.
    F64,
    /// 128-bit packed vector, interpreted per-instruction as integer or
    /// floating point lanes.
    V128,
    /// Nullable reference to a function.
    FuncRef,
    /// Nullable opaque host reference.
    ExternRef,
}

impl ValueType {
    /// Whether this is `funcref` or `externref`.
    pub fn is_ref(&self) -> bool {
        matches!(self, ValueType::FuncRef | ValueType::ExternRef)
    }

    pub(crate) fn from_byte(byte: u8) -> Option<ValueType> {
        match byte {
            0x7f => Some(ValueType::I32),
            0x7e => Some(ValueType::I64),
            0x7d => Some(ValueType::F32),
            0x7c => Some(ValueType::F64),
            0x7b => Some(ValueType::V128),
            0x70 => Some(ValueType::FuncRef),
            0x6f => Some(ValueType::ExternRef),
            _ => None,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match *self {
            ValueType::I32 => "i32",
            ValueType::I64 => "i64",
            ValueType::F32 => "f32",
            ValueType::F64 => "f64",
            ValueType::V128 => "v128",
            ValueType::FuncRef => "funcref",
            ValueType::ExternRef => "externref",
        };
        write!(f, "{}", name)
    }
}

/// Type of a structured control instruction: either inline or a reference
/// into the module's function types.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BlockType {
    /// `[] -> []`
    Empty,
    /// `[] -> [T]`
    Value(ValueType),
    /// Params and results given by a function type index.
    TypeIndex(u32),
}

/// Address width of a memory or table.
///
/// 64-bit memories and tables index with `i64` and carry a larger
/// implementation page cap.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AddressType {
    /// 32-bit addressing (the default).
    I32,
    /// 64-bit addressing (`memory64`).
    I64,
}

impl AddressType {
    /// The value type indices of this address width have on the stack.
    pub fn value_type(&self) -> ValueType {
        match *self {
            AddressType::I32 => ValueType::I32,
            AddressType::I64 => ValueType::I64,
        }
    }
}

/// Size bounds of a memory or table, in pages or elements.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Limits {
    /// Initial size.
    pub min: u64,
    /// Optional upper bound.
    pub max: Option<u64>,
}

impl Limits {
    pub(crate) fn new(min: u64, max: Option<u64>) -> Limits {
        Limits { min, max }
    }

    /// Whether these limits are a subset of `other`, as required when an
    /// import is matched against the importer's declaration.
    pub(crate) fn fits_within(&self, other: &Limits) -> bool {
        self.min >= other.min
            && match other.max {
                None => true,
                Some(other_max) => match self.max {
                    Some(own_max) => own_max <= other_max,
                    None => false,
                },
            }
    }
}

/// Signature of a [function].
///
/// A signature consists of zero or more parameter [types][type] and zero or
/// more result [types][type].
///
/// Two signatures are considered equal if they have equal lists of parameters
/// and equal lists of results.
///
/// [type]: enum.ValueType.html
/// [function]: struct.FuncInstance.html
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    params: Cow<'static, [ValueType]>,
    results: Cow<'static, [ValueType]>,
}

impl Signature {
    /// Creates a new signature with given parameter and result types.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use wasmite::{Signature, ValueType};
    ///
    /// // s1: (i32) -> ()
    /// let s1 = Signature::new(&[ValueType::I32][..], &[][..]);
    ///
    /// // s2: () -> (i32, i32)
    /// let s2 = Signature::new(&[][..], &[ValueType::I32, ValueType::I32][..]);
    /// ```
    pub fn new<P, R>(params: P, results: R) -> Signature
    where
        P: Into<Cow<'static, [ValueType]>>,
        R: Into<Cow<'static, [ValueType]>>,
    {
        Signature {
            params: params.into(),
            results: results.into(),
        }
    }

    /// Returns parameter types of this signature.
    pub fn params(&self) -> &[ValueType] {
        self.params.as_ref()
    }

    /// Returns result types of this signature.
    pub fn results(&self) -> &[ValueType] {
        self.results.as_ref()
    }

    pub(crate) fn from_parts(params: Vec<ValueType>, results: Vec<ValueType>) -> Signature {
        Signature {
            params: params.into(),
            results: results.into(),
        }
    }
}

/// Description of a global variable.
///
/// Primarily used to describe imports of global variables.
/// See [`ImportResolver`] for details.
///
/// [`ImportResolver`]: trait.ImportResolver.html
pub struct GlobalDescriptor {
    value_type: ValueType,
    mutable: bool,
}

impl GlobalDescriptor {
    pub(crate) fn new(value_type: ValueType, mutable: bool) -> GlobalDescriptor {
        GlobalDescriptor {
            value_type,
            mutable,
        }
    }

    /// Returns [`ValueType`] of the requested global.
    ///
    /// [`ValueType`]: enum.ValueType.html
    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    /// Returns whether the requested global is mutable.
    pub fn is_mutable(&self) -> bool {
        self.mutable
    }
}

/// Description of a table.
///
/// Primarily used to describe imports of tables.
/// See [`ImportResolver`] for details.
///
/// [`ImportResolver`]: trait.ImportResolver.html
pub struct TableDescriptor {
    elem_type: ValueType,
    limits: Limits,
    address_type: AddressType,
}

impl TableDescriptor {
    pub(crate) fn new(
        elem_type: ValueType,
        limits: Limits,
        address_type: AddressType,
    ) -> TableDescriptor {
        TableDescriptor {
            elem_type,
            limits,
            address_type,
        }
    }

    /// Returns the element reference type of the requested table.
    pub fn elem_type(&self) -> ValueType {
        self.elem_type
    }

    /// Returns initial size of the requested table.
    pub fn initial(&self) -> u64 {
        self.limits.min
    }

    /// Returns maximum size the requested table may grow to.
    pub fn maximum(&self) -> Option<u64> {
        self.limits.max
    }

    /// Returns the address width of the requested table.
    pub fn address_type(&self) -> AddressType {
        self.address_type
    }

    pub(crate) fn limits(&self) -> &Limits {
        &self.limits
    }
}

/// Description of a linear memory.
///
/// Primarily used to describe imports of linear memories.
/// See [`ImportResolver`] for details.
///
/// [`ImportResolver`]: trait.ImportResolver.html
pub struct MemoryDescriptor {
    limits: Limits,
    address_type: AddressType,
}

impl MemoryDescriptor {
    pub(crate) fn new(limits: Limits, address_type: AddressType) -> MemoryDescriptor {
        MemoryDescriptor {
            limits,
            address_type,
        }
    }

    /// Returns initial size (in pages) of the requested memory.
    pub fn initial(&self) -> u64 {
        self.limits.min
    }

    /// Returns maximum size (in pages) of the requested memory.
    pub fn maximum(&self) -> Option<u64> {
        self.limits.max
    }

    /// Returns the address width of the requested memory.
    pub fn address_type(&self) -> AddressType {
        self.address_type
    }

    pub(crate) fn limits(&self) -> &Limits {
        &self.limits
    }
}
