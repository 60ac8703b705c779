use crate::{
    func::{FuncInstance, FuncRef},
    global::{GlobalInstance, GlobalRef},
    host::Externals,
    imports::ImportResolver,
    isa::Instruction,
    memory::{MemoryInstance, MemoryRef},
    module::{
        ElementItems, ExternalKind, ImportDescriptor, InitExpr, Module, Mutability, SegmentMode,
    },
    table::{TableInstance, TableRef},
    types::{GlobalDescriptor, MemoryDescriptor, TableDescriptor},
    v128::V128,
    value::Value,
    Error, Signature, Trap,
};
use alloc::{
    collections::BTreeMap,
    format,
    rc::Rc,
    string::{String, ToString},
    vec::Vec,
};
use core::cell::RefCell;
use core::fmt;

/// Reference to a [`ModuleInstance`].
///
/// This reference has a reference-counting semantics.
///
/// A [`ModuleInstance`] has strong references to its components (i.e.
/// globals, memories, funcs, tables), however, these components have
/// weak references to their containing module. This might be a problem
/// at execution time.
///
/// So make sure that all modules which might be needed at execution time
/// are retained.
///
/// [`ModuleInstance`]: struct.ModuleInstance.html
#[derive(Clone, Debug)]
pub struct ModuleRef(pub(crate) Rc<ModuleInstance>);

impl ::core::ops::Deref for ModuleRef {
    type Target = ModuleInstance;
    fn deref(&self) -> &ModuleInstance {
        &self.0
    }
}

/// An external value is the runtime representation of an entity
/// that can be imported or exported.
pub enum ExternVal {
    /// [Function][`FuncInstance`].
    ///
    /// [`FuncInstance`]: struct.FuncInstance.html
    Func(FuncRef),
    /// [Table][`TableInstance`].
    ///
    /// [`TableInstance`]: struct.TableInstance.html
    Table(TableRef),
    /// [Memory][`MemoryInstance`].
    ///
    /// [`MemoryInstance`]: struct.MemoryInstance.html
    Memory(MemoryRef),
    /// [Global][`GlobalInstance`].
    ///
    /// Should be immutable.
    ///
    /// [`GlobalInstance`]: struct.GlobalInstance.html
    Global(GlobalRef),
}

impl Clone for ExternVal {
    fn clone(&self) -> Self {
        match *self {
            ExternVal::Func(ref func) => ExternVal::Func(func.clone()),
            ExternVal::Table(ref table) => ExternVal::Table(table.clone()),
            ExternVal::Memory(ref memory) => ExternVal::Memory(memory.clone()),
            ExternVal::Global(ref global) => ExternVal::Global(global.clone()),
        }
    }
}

impl fmt::Debug for ExternVal {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "ExternVal {{ {} }}",
            match *self {
                ExternVal::Func(_) => "Func",
                ExternVal::Table(_) => "Table",
                ExternVal::Memory(_) => "Memory",
                ExternVal::Global(_) => "Global",
            }
        )
    }
}

impl ExternVal {
    /// Get underlying function reference if this `ExternVal` contains
    /// a function, or `None` if it is some other kind.
    pub fn as_func(&self) -> Option<&FuncRef> {
        match *self {
            ExternVal::Func(ref func) => Some(func),
            _ => None,
        }
    }

    /// Get underlying table reference if this `ExternVal` contains
    /// a table, or `None` if it is some other kind.
    pub fn as_table(&self) -> Option<&TableRef> {
        match *self {
            ExternVal::Table(ref table) => Some(table),
            _ => None,
        }
    }

    /// Get underlying memory reference if this `ExternVal` contains
    /// a memory, or `None` if it is some other kind.
    pub fn as_memory(&self) -> Option<&MemoryRef> {
        match *self {
            ExternVal::Memory(ref memory) => Some(memory),
            _ => None,
        }
    }

    /// Get underlying global variable reference if this `ExternVal` contains
    /// a global, or `None` if it is some other kind.
    pub fn as_global(&self) -> Option<&GlobalRef> {
        match *self {
            ExternVal::Global(ref global) => Some(global),
            _ => None,
        }
    }
}

/// A module instance is the runtime representation of a [module][`Module`].
///
/// It is created by instantiating a [module][`Module`], and collects runtime
/// representations of all entities that are imported or defined by the
/// module, namely:
///
/// - [functions][`FuncInstance`],
/// - [memories][`MemoryInstance`],
/// - [tables][`TableInstance`],
/// - [globals][`GlobalInstance`],
/// - the payloads of passive data and element segments.
///
/// In order to instantiate a module you need to provide entities to satisfy
/// every module's imports (i.e. wasm modules don't have optional imports).
///
/// After a module is instantiated you can start invoking its exported
/// functions with [`invoke_export`].
///
/// [`Module`]: struct.Module.html
/// [`FuncInstance`]: struct.FuncInstance.html
/// [`MemoryInstance`]: struct.MemoryInstance.html
/// [`TableInstance`]: struct.TableInstance.html
/// [`GlobalInstance`]: struct.GlobalInstance.html
/// [`invoke_export`]: #method.invoke_export
#[derive(Debug)]
pub struct ModuleInstance {
    signatures: RefCell<Vec<Rc<Signature>>>,
    tables: RefCell<Vec<TableRef>>,
    funcs: RefCell<Vec<FuncRef>>,
    memories: RefCell<Vec<MemoryRef>>,
    globals: RefCell<Vec<GlobalRef>>,
    exports: RefCell<BTreeMap<String, ExternVal>>,
    /// Passive data segment payloads; `data.drop` empties an entry.
    data_segments: RefCell<Vec<Vec<u8>>>,
    /// Passive element segment payloads; `elem.drop` empties an entry.
    elem_segments: RefCell<Vec<Vec<Value>>>,
}

impl ModuleInstance {
    fn default() -> Self {
        ModuleInstance {
            funcs: RefCell::new(Vec::new()),
            signatures: RefCell::new(Vec::new()),
            tables: RefCell::new(Vec::new()),
            memories: RefCell::new(Vec::new()),
            globals: RefCell::new(Vec::new()),
            exports: RefCell::new(BTreeMap::new()),
            data_segments: RefCell::new(Vec::new()),
            elem_segments: RefCell::new(Vec::new()),
        }
    }

    pub(crate) fn memory_by_index(&self, idx: u32) -> Option<MemoryRef> {
        self.memories.borrow().get(idx as usize).cloned()
    }

    pub(crate) fn table_by_index(&self, idx: u32) -> Option<TableRef> {
        self.tables.borrow().get(idx as usize).cloned()
    }

    pub(crate) fn global_by_index(&self, idx: u32) -> Option<GlobalRef> {
        self.globals.borrow().get(idx as usize).cloned()
    }

    pub(crate) fn func_by_index(&self, idx: u32) -> Option<FuncRef> {
        self.funcs.borrow().get(idx as usize).cloned()
    }

    pub(crate) fn signature_by_index(&self, idx: u32) -> Option<Rc<Signature>> {
        self.signatures.borrow().get(idx as usize).cloned()
    }

    /// Read a slice out of a passive data segment. A dropped segment reads
    /// as length zero.
    pub(crate) fn data_segment_bytes(&self, idx: u32, offset: u64, len: u64) -> Option<Vec<u8>> {
        let segments = self.data_segments.borrow();
        let segment = segments.get(idx as usize)?;
        let offset = usize::try_from(offset).ok()?;
        let end = offset.checked_add(usize::try_from(len).ok()?)?;
        segment.get(offset..end).map(|bytes| bytes.to_vec())
    }

    /// Read a slice out of a passive element segment. A dropped segment
    /// reads as length zero.
    pub(crate) fn elem_segment_items(&self, idx: u32, offset: u64, len: u64) -> Option<Vec<Value>> {
        let segments = self.elem_segments.borrow();
        let segment = segments.get(idx as usize)?;
        let offset = usize::try_from(offset).ok()?;
        let end = offset.checked_add(usize::try_from(len).ok()?)?;
        segment.get(offset..end).map(|items| items.to_vec())
    }

    pub(crate) fn drop_data_segment(&self, idx: u32) {
        if let Some(segment) = self.data_segments.borrow_mut().get_mut(idx as usize) {
            segment.clear();
            segment.shrink_to_fit();
        }
    }

    pub(crate) fn drop_elem_segment(&self, idx: u32) {
        if let Some(segment) = self.elem_segments.borrow_mut().get_mut(idx as usize) {
            segment.clear();
            segment.shrink_to_fit();
        }
    }

    fn push_func(&self, func: FuncRef) {
        self.funcs.borrow_mut().push(func);
    }

    fn push_signature(&self, signature: Rc<Signature>) {
        self.signatures.borrow_mut().push(signature)
    }

    fn push_memory(&self, memory: MemoryRef) {
        self.memories.borrow_mut().push(memory)
    }

    fn push_table(&self, table: TableRef) {
        self.tables.borrow_mut().push(table)
    }

    fn push_global(&self, global: GlobalRef) {
        self.globals.borrow_mut().push(global)
    }

    fn insert_export<N: Into<String>>(&self, name: N, extern_val: ExternVal) {
        self.exports.borrow_mut().insert(name.into(), extern_val);
    }

    fn alloc_module<'i, I: Iterator<Item = &'i ExternVal>>(
        loaded_module: &Module,
        extern_vals: I,
    ) -> Result<ModuleRef, Error> {
        let instance = ModuleRef(Rc::new(ModuleInstance::default()));

        for signature in &loaded_module.types {
            instance.push_signature(Rc::new(signature.clone()));
        }

        {
            let mut imports = loaded_module.imports.iter();
            let mut extern_vals = extern_vals;
            loop {
                // Iterate on imports and extern_vals in lockstep, a-la
                // `Iterator::zip`. We can't use `Iterator::zip` since we
                // want to check if the lengths of both iterators are equal,
                // and `Iterator::zip` just returns `None` if either of the
                // iterators returns `None`.
                let (import, extern_val) = match (imports.next(), extern_vals.next()) {
                    (Some(import), Some(extern_val)) => (import, extern_val),
                    (None, None) => break,
                    (Some(_), None) | (None, Some(_)) => {
                        return Err(Error::Instantiation(
                            "extern_vals length is not equal to import section entries".to_string(),
                        ));
                    }
                };

                match (&import.descriptor, extern_val) {
                    (&ImportDescriptor::Function(fn_type_idx), &ExternVal::Func(ref func)) => {
                        let expected_fn_type = instance
                            .signature_by_index(fn_type_idx)
                            .expect("Due to validation function type should exist");
                        let actual_fn_type = func.signature();
                        if &*expected_fn_type != actual_fn_type {
                            return Err(Error::Instantiation(format!(
                                "Expected function with type {:?}, but actual type is {:?} for entry {}",
                                expected_fn_type, actual_fn_type, import.field,
                            )));
                        }
                        instance.push_func(func.clone())
                    }
                    (&ImportDescriptor::Table(ref tt), &ExternVal::Table(ref table)) => {
                        if tt.elem_type != table.elem_type() {
                            return Err(Error::Instantiation(format!(
                                "Expected table with element type {}, but imported table holds {}",
                                tt.elem_type,
                                table.elem_type(),
                            )));
                        }
                        if tt.address_type != table.address_type() {
                            return Err(Error::Instantiation(
                                "address type mismatch on table import".to_string(),
                            ));
                        }
                        if !table.limits().fits_within(&tt.limits) {
                            return Err(Error::Instantiation(format!(
                                "imported table limits {:?} do not fit declared {:?}",
                                table.limits(),
                                tt.limits,
                            )));
                        }
                        instance.push_table(table.clone());
                    }
                    (&ImportDescriptor::Memory(ref mt), &ExternVal::Memory(ref memory)) => {
                        if mt.address_type != memory.address_type() {
                            return Err(Error::Instantiation(
                                "address type mismatch on memory import".to_string(),
                            ));
                        }
                        if !memory.limits().fits_within(&mt.limits) {
                            return Err(Error::Instantiation(format!(
                                "imported memory limits {:?} do not fit declared {:?}",
                                memory.limits(),
                                mt.limits,
                            )));
                        }
                        instance.push_memory(memory.clone());
                    }
                    (&ImportDescriptor::Global(ref gt), &ExternVal::Global(ref global)) => {
                        if gt.content_type != global.value_type() {
                            return Err(Error::Instantiation(format!(
                                "Expect global with {} type, but provided global with {} type",
                                gt.content_type,
                                global.value_type(),
                            )));
                        }
                        let expected_mutable = gt.mutability == Mutability::Variable;
                        if expected_mutable != global.is_mutable() {
                            return Err(Error::Instantiation(format!(
                                "mutability mismatch on global import {}",
                                import.field,
                            )));
                        }
                        instance.push_global(global.clone());
                    }
                    (expected_import, actual_extern_val) => {
                        return Err(Error::Instantiation(format!(
                            "Expected {:?} kind, but provided {:?} extern_val",
                            expected_import.kind(),
                            actual_extern_val
                        )));
                    }
                }
            }
        }

        for (index, &type_index) in loaded_module.functions.iter().enumerate() {
            let signature = instance
                .signature_by_index(type_index)
                .expect("Due to validation type should exist");
            let body = loaded_module
                .code
                .get(index)
                .expect("Due to validation code and function sections should match")
                .clone();
            let func_instance =
                FuncInstance::alloc_internal(Rc::downgrade(&instance.0), signature, body);
            instance.push_func(func_instance);
        }

        for table_type in &loaded_module.tables {
            let table = TableInstance::alloc(
                table_type.elem_type,
                table_type.limits.min,
                table_type.limits.max,
                table_type.address_type,
                Value::default(table_type.elem_type),
            )?;
            instance.push_table(table);
        }

        for memory_type in &loaded_module.memories {
            let memory = MemoryInstance::alloc_with_type(memory_type.limits, memory_type.address_type)
                .expect("Due to validation `initial` and `maximum` should be valid");
            instance.push_memory(memory);
        }

        for global_entry in &loaded_module.globals {
            let init_val = eval_init_expr(&global_entry.init_expr, &instance);
            let global = GlobalInstance::alloc(
                init_val,
                global_entry.global_type.mutability == Mutability::Variable,
            );
            instance.push_global(global);
        }

        for export in &loaded_module.exports {
            let field = export.field.clone();
            let extern_val: ExternVal = match export.kind {
                ExternalKind::Function => {
                    let func = instance
                        .func_by_index(export.index)
                        .expect("Due to validation func should exist");
                    ExternVal::Func(func)
                }
                ExternalKind::Global => {
                    let global = instance
                        .global_by_index(export.index)
                        .expect("Due to validation global should exist");
                    ExternVal::Global(global)
                }
                ExternalKind::Memory => {
                    let memory = instance
                        .memory_by_index(export.index)
                        .expect("Due to validation memory should exist");
                    ExternVal::Memory(memory)
                }
                ExternalKind::Table => {
                    let table = instance
                        .table_by_index(export.index)
                        .expect("Due to validation table should exist");
                    ExternVal::Table(table)
                }
            };
            instance.insert_export(field, extern_val);
        }

        Ok(instance)
    }

    /// Instantiate a module with given [external values][ExternVal] as
    /// imports.
    ///
    /// See [new] for details.
    ///
    /// [new]: #method.new
    /// [ExternVal]: https://webassembly.github.io/spec/core/exec/runtime.html#syntax-externval
    pub fn with_externvals<'a, 'i, I: Iterator<Item = &'i ExternVal>>(
        loaded_module: &'a Module,
        extern_vals: I,
    ) -> Result<NotStartedModuleRef<'a>, Error> {
        let module_ref = ModuleInstance::alloc_module(loaded_module, extern_vals)?;

        for element_segment in &loaded_module.elements {
            let items: Vec<Value> = match &element_segment.items {
                ElementItems::Functions(indices) => indices
                    .iter()
                    .map(|&func_idx| {
                        let func = module_ref
                            .func_by_index(func_idx)
                            .expect("Due to validation funcs from element segments should exist");
                        Value::FuncRef(Some(func))
                    })
                    .collect(),
                ElementItems::Expressions(exprs) => exprs
                    .iter()
                    .map(|expr| eval_init_expr(expr, &module_ref))
                    .collect(),
            };

            match element_segment.mode {
                SegmentMode::Active => {
                    let offset_expr = element_segment
                        .offset
                        .as_ref()
                        .expect("active segments carry an offset due to decoding");
                    let offset = eval_offset(offset_expr, &module_ref);

                    let table_inst = module_ref
                        .table_by_index(element_segment.table_index)
                        .expect("Due to validation table should exist");
                    table_inst.init(offset, &items).map_err(|_| {
                        Error::Instantiation("elements segment does not fit".to_string())
                    })?;

                    // Active segments are dropped after being written out.
                    module_ref.elem_segments.borrow_mut().push(Vec::new());
                }
                SegmentMode::Passive => {
                    module_ref.elem_segments.borrow_mut().push(items);
                }
                SegmentMode::Declarative => {
                    module_ref.elem_segments.borrow_mut().push(Vec::new());
                }
            }
        }

        for data_segment in &loaded_module.data {
            match data_segment.mode {
                SegmentMode::Active => {
                    let offset_expr = data_segment
                        .offset
                        .as_ref()
                        .expect("active segments carry an offset due to decoding");
                    let offset = eval_offset(offset_expr, &module_ref);

                    let memory_inst = module_ref
                        .memory_by_index(data_segment.memory_index)
                        .expect("Due to validation memory should exist");
                    memory_inst.set(offset, &data_segment.data).map_err(|_| {
                        Error::Instantiation("data segment does not fit".to_string())
                    })?;

                    module_ref.data_segments.borrow_mut().push(Vec::new());
                }
                SegmentMode::Passive => {
                    module_ref
                        .data_segments
                        .borrow_mut()
                        .push(data_segment.data.clone());
                }
                SegmentMode::Declarative => {
                    unreachable!("data segments are active or passive due to decoding")
                }
            }
        }

        Ok(NotStartedModuleRef {
            loaded_module,
            instance: module_ref,
        })
    }

    /// Instantiate a [module][`Module`].
    ///
    /// Note that in case of successful instantiation this function returns a
    /// reference to a module which `start` function is not called.
    /// In order to complete instantiation the `start` function must be
    /// called. However, there are situations where you might need to do
    /// additional setup before calling the `start` function. For such
    /// situations this separation might be useful.
    ///
    /// See [`NotStartedModuleRef`] for details.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the module cannot be instantiated.
    ///
    /// This can happen if one of the imports can't be satisfied (e.g. the
    /// module isn't registered in the `imports` [resolver][`ImportResolver`])
    /// or there is a mismatch between the requested import and the provided
    /// one (e.g. the module requested a memory without a maximum size limit,
    /// however, a memory with a maximum size limit was provided).
    ///
    /// # Examples
    ///
    /// ```rust
    /// use wasmite::{ModuleInstance, ImportsBuilder, NopExternals};
    /// # fn func() -> Result<(), ::wasmite::Error> {
    /// # let module = wasmite::Module::from_buffer(&[0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00]).unwrap();
    ///
    /// // ModuleInstance::new returns an instance which `start` function
    /// // isn't called.
    /// let not_started = ModuleInstance::new(
    ///     &module,
    ///     &ImportsBuilder::default()
    /// )?;
    /// // Call `start` function if any.
    /// let instance = not_started.run_start(&mut NopExternals)?;
    ///
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// If you are sure that the module doesn't have a `start` function you
    /// can use [`assert_no_start`] to get the instantiated module without
    /// calling the `start` function.
    ///
    /// ```rust
    /// use wasmite::{ModuleInstance, ImportsBuilder, NopExternals};
    /// # fn func() -> Result<(), ::wasmite::Error> {
    /// # let module = wasmite::Module::from_buffer(&[0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00]).unwrap();
    ///
    /// // This will panic if the module actually contains a `start` function.
    /// let not_started = ModuleInstance::new(
    ///     &module,
    ///     &ImportsBuilder::default()
    /// )?.assert_no_start();
    ///
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// [`Module`]: struct.Module.html
    /// [`NotStartedModuleRef`]: struct.NotStartedModuleRef.html
    /// [`ImportResolver`]: trait.ImportResolver.html
    /// [`assert_no_start`]: struct.NotStartedModuleRef.html#method.assert_no_start
    #[allow(clippy::new_ret_no_self)]
    pub fn new<'m, I: ImportResolver>(
        loaded_module: &'m Module,
        imports: &I,
    ) -> Result<NotStartedModuleRef<'m>, Error> {
        let mut extern_vals = Vec::new();
        for import_entry in &loaded_module.imports {
            let module_name = &import_entry.module;
            let field_name = &import_entry.field;
            let extern_val = match import_entry.descriptor {
                ImportDescriptor::Function(fn_ty_idx) => {
                    let signature = loaded_module
                        .signature(fn_ty_idx)
                        .expect("Due to validation functions should have valid types");
                    let func = imports.resolve_func(module_name, field_name, signature)?;
                    ExternVal::Func(func)
                }
                ImportDescriptor::Table(ref table_type) => {
                    let descriptor = TableDescriptor::new(
                        table_type.elem_type,
                        table_type.limits,
                        table_type.address_type,
                    );
                    let table = imports.resolve_table(module_name, field_name, &descriptor)?;
                    ExternVal::Table(table)
                }
                ImportDescriptor::Memory(ref memory_type) => {
                    let descriptor =
                        MemoryDescriptor::new(memory_type.limits, memory_type.address_type);
                    let memory = imports.resolve_memory(module_name, field_name, &descriptor)?;
                    ExternVal::Memory(memory)
                }
                ImportDescriptor::Global(ref global_type) => {
                    let descriptor = GlobalDescriptor::new(
                        global_type.content_type,
                        global_type.mutability == Mutability::Variable,
                    );
                    let global = imports.resolve_global(module_name, field_name, &descriptor)?;
                    ExternVal::Global(global)
                }
            };
            extern_vals.push(extern_val);
        }

        Self::with_externvals(loaded_module, extern_vals.iter())
    }

    /// Invoke exported function by a name.
    ///
    /// This function finds an exported function by a name, and calls it with
    /// the provided arguments and external state.
    ///
    /// # Errors
    ///
    /// Returns `Err` if:
    ///
    /// - there is no export with a given name or this export is not a
    ///   function,
    /// - given arguments doesn't match to function signature,
    /// - a trap occurred at the execution time,
    ///
    /// # Examples
    ///
    /// Invoke a function that takes two numbers and returns their sum.
    ///
    /// ```rust
    /// # use wasmite::{ModuleInstance, ImportsBuilder, NopExternals, Value};
    /// # let wasm_binary: Vec<u8> = wat::parse_str(
    /// #   r#"
    /// #   (module
    /// #       (func (export "add") (param i32 i32) (result i32)
    /// #           local.get 0
    /// #           local.get 1
    /// #           i32.add
    /// #       )
    /// #   )
    /// #   "#,
    /// # ).expect("failed to parse wat");
    /// # let module = wasmite::Module::from_buffer(&wasm_binary).expect("failed to load wasm");
    /// # let instance = ModuleInstance::new(
    /// # &module,
    /// # &ImportsBuilder::default()
    /// # ).expect("failed to instantiate wasm module").assert_no_start();
    /// assert_eq!(
    ///     instance.invoke_export(
    ///         "add",
    ///         &[Value::I32(5), Value::I32(3)],
    ///         &mut NopExternals,
    ///     ).expect("failed to execute export"),
    ///     vec![Value::I32(8)],
    /// );
    /// ```
    pub fn invoke_export<E: Externals>(
        &self,
        func_name: &str,
        args: &[Value],
        externals: &mut E,
    ) -> Result<Vec<Value>, Error> {
        let func_instance = self.func_by_name(func_name)?;

        FuncInstance::invoke(&func_instance, args, externals).map_err(Error::Trap)
    }

    fn func_by_name(&self, func_name: &str) -> Result<FuncRef, Error> {
        let extern_val = self
            .export_by_name(func_name)
            .ok_or_else(|| Error::Function(format!("Module doesn't have export {}", func_name)))?;

        match extern_val {
            ExternVal::Func(func_instance) => Ok(func_instance),
            unexpected => Err(Error::Function(format!(
                "Export {} is not a function, but {:?}",
                func_name, unexpected
            ))),
        }
    }

    /// Find export by a name.
    ///
    /// Returns `None` if there is no export with such name.
    pub fn export_by_name(&self, name: &str) -> Option<ExternVal> {
        self.exports.borrow().get(name).cloned()
    }
}

/// Mostly instantiated [`ModuleRef`].
///
/// At this point memory and table segments are copied, however the `start`
/// function (if any) is not called. To get a
/// [fully instantiated module instance][`ModuleRef`],
/// [running the `start` function][`run_start`] is required.
///
/// You can still access a not fully initialized instance by calling
/// [`not_started_instance`], but keep in mind, that this is sort of an
/// escape hatch: a module may really depend on initialization done in its
/// `start` function. It's definitely not recommended to call any exports on
/// the [`ModuleRef`] returned by this function.
///
/// If you are sure that there is no `start` function (e.g. because you
/// created the module without one), you can call [`assert_no_start`] which
/// returns a [`ModuleRef`] without calling the `start` function. However, it
/// will panic if the module contains a `start` function.
///
/// [`ModuleRef`]: struct.ModuleRef.html
/// [`run_start`]: #method.run_start
/// [`assert_no_start`]: #method.assert_no_start
/// [`not_started_instance`]: #method.not_started_instance
#[derive(Debug)]
pub struct NotStartedModuleRef<'a> {
    loaded_module: &'a Module,
    instance: ModuleRef,
}

impl<'a> NotStartedModuleRef<'a> {
    /// Returns not fully initialized instance.
    ///
    /// To fully initialize the instance you need to call either [`run_start`]
    /// or [`assert_no_start`]. See the struct documentation for details.
    ///
    /// [`run_start`]: #method.run_start
    /// [`assert_no_start`]: #method.assert_no_start
    pub fn not_started_instance(&self) -> &ModuleRef {
        &self.instance
    }

    /// Executes the `start` function (if any) and returns the fully
    /// instantiated module.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the start function traps.
    pub fn run_start<E: Externals>(self, state: &mut E) -> Result<ModuleRef, Trap> {
        if let Some(start_fn_idx) = self.loaded_module.start {
            let start_func = self
                .instance
                .func_by_index(start_fn_idx)
                .expect("Due to validation start function should exist");
            FuncInstance::invoke(&start_func, &[], state)?;
        }
        Ok(self.instance)
    }

    /// Returns the fully instantiated module without running the `start`
    /// function.
    ///
    /// # Panics
    ///
    /// This function panics if the original module contains a `start`
    /// function.
    pub fn assert_no_start(self) -> ModuleRef {
        assert!(
            self.loaded_module.start.is_none(),
            "assert_no_start called on module with `start` function"
        );
        self.instance
    }

    /// Whether or not the module has a `start` function.
    ///
    /// Returns `true` if it has a `start` function.
    pub fn has_start(&self) -> bool {
        self.loaded_module.start.is_some()
    }
}

/// Evaluate an active segment offset to an address of the target's width.
fn eval_offset(init_expr: &InitExpr, module: &ModuleInstance) -> u64 {
    match eval_init_expr(init_expr, module) {
        Value::I32(value) => value as u32 as u64,
        Value::I64(value) => value as u64,
        _ => panic!("Due to validation segment offsets evaluate to an integer"),
    }
}

/// Evaluate a constant expression against an instance.
///
/// Only the restricted constant subset can occur here; everything else was
/// rejected by validation.
pub(crate) fn eval_init_expr(init_expr: &InitExpr, module: &ModuleInstance) -> Value {
    let mut stack: Vec<Value> = Vec::new();
    for instruction in init_expr.code() {
        match *instruction {
            Instruction::I32Const(value) => stack.push(Value::I32(value)),
            Instruction::I64Const(value) => stack.push(Value::I64(value)),
            Instruction::F32Const(bits) => stack.push(Value::decode_f32(bits)),
            Instruction::F64Const(bits) => stack.push(Value::decode_f64(bits)),
            Instruction::V128Const(bytes) => stack.push(Value::V128(V128::from_bytes(bytes))),
            Instruction::RefNull(ref_type) => stack.push(Value::default(ref_type)),
            Instruction::RefFunc(func_idx) => {
                let func = module
                    .func_by_index(func_idx)
                    .expect("Due to validation func should exist in module");
                stack.push(Value::FuncRef(Some(func)));
            }
            Instruction::GlobalGet(global_idx) => {
                let global = module
                    .global_by_index(global_idx)
                    .expect("Due to validation global should exist in module");
                stack.push(global.get());
            }
            Instruction::I32Add | Instruction::I32Sub | Instruction::I32Mul => {
                let (lhs, rhs) = pop_pair_i32(&mut stack);
                let result = match *instruction {
                    Instruction::I32Add => lhs.wrapping_add(rhs),
                    Instruction::I32Sub => lhs.wrapping_sub(rhs),
                    _ => lhs.wrapping_mul(rhs),
                };
                stack.push(Value::I32(result));
            }
            Instruction::I64Add | Instruction::I64Sub | Instruction::I64Mul => {
                let (lhs, rhs) = pop_pair_i64(&mut stack);
                let result = match *instruction {
                    Instruction::I64Add => lhs.wrapping_add(rhs),
                    Instruction::I64Sub => lhs.wrapping_sub(rhs),
                    _ => lhs.wrapping_mul(rhs),
                };
                stack.push(Value::I64(result));
            }
            Instruction::End => break,
            _ => panic!("Due to validation init should be a const expr"),
        }
    }
    stack
        .pop()
        .expect("Due to validation a const expr produces a value")
}

fn pop_pair_i32(stack: &mut Vec<Value>) -> (i32, i32) {
    let rhs = match stack.pop() {
        Some(Value::I32(value)) => value,
        _ => panic!("Due to validation const operands are i32"),
    };
    let lhs = match stack.pop() {
        Some(Value::I32(value)) => value,
        _ => panic!("Due to validation const operands are i32"),
    };
    (lhs, rhs)
}

fn pop_pair_i64(stack: &mut Vec<Value>) -> (i64, i64) {
    let rhs = match stack.pop() {
        Some(Value::I64(value)) => value,
        _ => panic!("Due to validation const operands are i64"),
    };
    let lhs = match stack.pop() {
        Some(Value::I64(value)) => value,
        _ => panic!("Due to validation const operands are i64"),
    };
    (lhs, rhs)
}

#[cfg(test)]
mod tests {
    use super::{ExternVal, ModuleInstance};
    use crate::{func::FuncInstance, imports::ImportsBuilder, types::Signature, Module, ValueType};

    fn parse_wat(source: &str) -> Module {
        let wasm_binary = wat::parse_str(source).expect("Failed to parse wat source");
        Module::from_buffer(wasm_binary).expect("Failed to load parsed module")
    }

    #[should_panic]
    #[test]
    fn assert_no_start_panics_on_module_with_start() {
        let module_with_start = parse_wat(
            r#"
            (module
                (func $f)
                (start $f))
            "#,
        );
        let module = ModuleInstance::new(&module_with_start, &ImportsBuilder::default()).unwrap();
        assert!(module.has_start());
        module.assert_no_start();
    }

    #[test]
    fn imports_provided_by_externvals() {
        let module_with_single_import = parse_wat(
            r#"
            (module
                (import "foo" "bar" (func))
                )
            "#,
        );

        assert!(ModuleInstance::with_externvals(
            &module_with_single_import,
            [ExternVal::Func(FuncInstance::alloc_host(
                Signature::new(&[][..], &[][..]),
                0
            ),)]
            .iter(),
        )
        .is_ok());

        // externval vector is longer than import count.
        assert!(ModuleInstance::with_externvals(
            &module_with_single_import,
            [
                ExternVal::Func(FuncInstance::alloc_host(Signature::new(&[][..], &[][..]), 0)),
                ExternVal::Func(FuncInstance::alloc_host(Signature::new(&[][..], &[][..]), 1)),
            ]
            .iter(),
        )
        .is_err());

        // externval vector is shorter than import count.
        assert!(ModuleInstance::with_externvals(&module_with_single_import, [].iter(),).is_err());

        // externval vector has an unexpected type.
        assert!(ModuleInstance::with_externvals(
            &module_with_single_import,
            [ExternVal::Func(FuncInstance::alloc_host(
                Signature::new(&[][..], &[ValueType::I32][..]),
                0
            ),)]
            .iter(),
        )
        .is_err());
    }

    #[test]
    fn active_element_segment_out_of_bounds_fails() {
        let wasm = wat::parse_str(
            r#"
            (module
                (table 1 funcref)
                (func $f)
                (elem (i32.const 1) $f $f))
            "#,
        )
        .unwrap();
        let module = Module::from_buffer(wasm).unwrap();
        assert!(ModuleInstance::new(&module, &ImportsBuilder::default()).is_err());
    }
}
