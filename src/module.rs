use crate::decode;
use crate::isa;
use crate::types::{AddressType, Limits, Signature, ValueType};
use crate::validation;
use crate::Error;
use alloc::string::String;
use alloc::vec::Vec;

/// Kind of an imported or exported entity.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum ExternalKind {
    Function,
    Table,
    Memory,
    Global,
}

/// Mutability of a global.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Mutability {
    Constant,
    Variable,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct TableType {
    pub elem_type: ValueType,
    pub limits: Limits,
    pub address_type: AddressType,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct MemoryType {
    pub limits: Limits,
    pub address_type: AddressType,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct GlobalType {
    pub content_type: ValueType,
    pub mutability: Mutability,
}

/// Import descriptor, per entity kind.
#[derive(Clone, Debug)]
pub(crate) enum ImportDescriptor {
    Function(u32),
    Table(TableType),
    Memory(MemoryType),
    Global(GlobalType),
}

impl ImportDescriptor {
    pub fn kind(&self) -> ExternalKind {
        match *self {
            ImportDescriptor::Function(_) => ExternalKind::Function,
            ImportDescriptor::Table(_) => ExternalKind::Table,
            ImportDescriptor::Memory(_) => ExternalKind::Memory,
            ImportDescriptor::Global(_) => ExternalKind::Global,
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) struct ImportEntry {
    pub module: String,
    pub field: String,
    pub descriptor: ImportDescriptor,
}

#[derive(Clone, Debug)]
pub(crate) struct ExportEntry {
    pub field: String,
    pub kind: ExternalKind,
    pub index: u32,
}

/// A constant expression: the restricted instruction subset used by global
/// initializers and segment offsets, including the terminating `end`.
#[derive(Clone, Debug)]
pub(crate) struct InitExpr(pub Vec<isa::Instruction>);

impl InitExpr {
    pub fn code(&self) -> &[isa::Instruction] {
        &self.0
    }
}

#[derive(Clone, Debug)]
pub(crate) struct GlobalEntry {
    pub global_type: GlobalType,
    pub init_expr: InitExpr,
}

/// Mode of a data or element segment.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum SegmentMode {
    /// Materialized into its memory/table during instantiation, then dropped.
    Active,
    /// Kept on the instance for `memory.init` / `table.init`.
    Passive,
    /// Only makes its members forward-declared for `ref.func`; dropped at
    /// instantiation.
    Declarative,
}

/// Payload of an element segment: plain function indices or general
/// reference-producing constant expressions.
#[derive(Clone, Debug)]
pub(crate) enum ElementItems {
    Functions(Vec<u32>),
    Expressions(Vec<InitExpr>),
}

impl ElementItems {
    pub fn len(&self) -> usize {
        match self {
            ElementItems::Functions(indices) => indices.len(),
            ElementItems::Expressions(exprs) => exprs.len(),
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) struct ElementSegment {
    pub mode: SegmentMode,
    pub table_index: u32,
    /// Present iff the segment is active.
    pub offset: Option<InitExpr>,
    pub elem_type: ValueType,
    pub items: ElementItems,
}

#[derive(Clone, Debug)]
pub(crate) struct DataSegment {
    pub mode: SegmentMode,
    pub memory_index: u32,
    /// Present iff the segment is active.
    pub offset: Option<InitExpr>,
    pub data: Vec<u8>,
}

/// An internal function body: declared locals as `(count, type)` runs plus
/// the flattened instruction list.
#[derive(Clone, Debug)]
pub(crate) struct FuncBody {
    pub locals: Vec<(u32, ValueType)>,
    pub code: isa::Instructions,
}

/// A deserialized and validated module, ready for instantiation.
///
/// # Examples
///
/// ```rust
/// // Minimal module:
/// //   \0asm - magic
/// //    0x01 - version (in little-endian)
/// let module = wasmite::Module::from_buffer(
///     &[0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00]
/// ).expect("failed to load minimal module");
///
/// // Instantiate `module`, etc...
/// ```
#[derive(Debug)]
pub struct Module {
    pub(crate) types: Vec<Signature>,
    pub(crate) imports: Vec<ImportEntry>,
    /// Type indices of internally defined functions.
    pub(crate) functions: Vec<u32>,
    pub(crate) tables: Vec<TableType>,
    pub(crate) memories: Vec<MemoryType>,
    pub(crate) globals: Vec<GlobalEntry>,
    pub(crate) exports: Vec<ExportEntry>,
    pub(crate) start: Option<u32>,
    pub(crate) elements: Vec<ElementSegment>,
    pub(crate) code: Vec<FuncBody>,
    pub(crate) data: Vec<DataSegment>,
    pub(crate) data_count: Option<u32>,
}

impl Module {
    /// Create a `Module` from a given buffer.
    ///
    /// Deserializes the wasm binary in `buffer`, validates it and prepares
    /// it for instantiation: all structured control flow is flattened and
    /// every branch target is pre-resolved.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the binary is malformed or the module is invalid.
    pub fn from_buffer<B: AsRef<[u8]>>(buffer: B) -> Result<Module, Error> {
        let mut module = decode::decode_module(buffer.as_ref())?;
        validation::validate_module(&mut module)?;
        Ok(module)
    }

    pub(crate) fn signature(&self, type_index: u32) -> Option<&Signature> {
        self.types.get(type_index as usize)
    }

    /// Whether the module declares a start function.
    pub fn has_start(&self) -> bool {
        self.start.is_some()
    }
}
