use crate::types::{AddressType, Limits, ValueType};
use crate::{Error, Value};
use alloc::format;
use alloc::rc::Rc;
use alloc::vec;
use alloc::vec::Vec;
use core::cell::RefCell;
use core::fmt;

/// Reference to a table (See [`TableInstance`] for details).
///
/// This reference has a reference-counting semantics.
///
/// [`TableInstance`]: struct.TableInstance.html
#[derive(Clone, Debug)]
pub struct TableRef(Rc<TableInstance>);

impl ::core::ops::Deref for TableRef {
    type Target = TableInstance;
    fn deref(&self) -> &TableInstance {
        &self.0
    }
}

/// Runtime representation of a table.
///
/// A table is an array of references of one reference type. It allows wasm
/// code to call functions indirectly through a dynamic index into a table.
/// For example, this allows emulating function pointers by way of table
/// indices.
///
/// A table is created with an initial size but can be grown dynamically via
/// the [`grow`] method. Growth can be limited by an optional maximum size.
///
/// [`grow`]: #method.grow
pub struct TableInstance {
    elem_type: ValueType,
    limits: Limits,
    address_type: AddressType,
    /// Table elements; every entry is a reference value of `elem_type`.
    buffer: RefCell<Vec<Value>>,
}

impl fmt::Debug for TableInstance {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("TableInstance")
            .field("elem_type", &self.elem_type)
            .field("limits", &self.limits)
            .field("buffer.len", &self.buffer.borrow().len())
            .finish()
    }
}

impl TableInstance {
    /// Allocate a table instance.
    ///
    /// The table is allocated with an `initial` number of elements, each set
    /// to `init` (usually the null reference of the element type). A maximum
    /// size can be specified by `maximum`.
    ///
    /// # Errors
    ///
    /// Returns `Err` if `initial` is greater than `maximum`, or if `init` is
    /// not of the element type.
    pub fn alloc(
        elem_type: ValueType,
        initial: u64,
        maximum: Option<u64>,
        address_type: AddressType,
        init: Value,
    ) -> Result<TableRef, Error> {
        if let Some(maximum) = maximum {
            if initial > maximum {
                return Err(Error::Table(format!(
                    "maximum limit {} is less than minimum {}",
                    maximum, initial
                )));
            }
        }
        if init.value_type() != elem_type {
            return Err(Error::Table(format!(
                "initializer of type {} does not match element type {}",
                init.value_type(),
                elem_type
            )));
        }
        let initial_len = usize::try_from(initial)
            .map_err(|_| Error::Table(format!("initial table size {} is too large", initial)))?;
        Ok(TableRef(Rc::new(TableInstance {
            elem_type,
            limits: Limits::new(initial, maximum),
            address_type,
            buffer: RefCell::new(vec![init; initial_len]),
        })))
    }

    /// Returns the element reference type of this table.
    pub fn elem_type(&self) -> ValueType {
        self.elem_type
    }

    /// Returns the address width of this table.
    pub fn address_type(&self) -> AddressType {
        self.address_type
    }

    pub(crate) fn limits(&self) -> Limits {
        Limits::new(self.current_size(), self.limits.max)
    }

    /// Returns maximum size `TableInstance` can grow to.
    pub fn maximum_size(&self) -> Option<u64> {
        self.limits.max
    }

    /// Returns current size of the table.
    pub fn current_size(&self) -> u64 {
        self.buffer.borrow().len() as u64
    }

    /// Increases the size of the table by `by` elements, initializing the
    /// added slots with `init`. Returns the previous size.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the new size would exceed the table's limit.
    pub fn grow(&self, by: u64, init: Value) -> Result<u64, Error> {
        let mut buffer = self.buffer.borrow_mut();
        let current = buffer.len() as u64;
        let cap = self.maximum_size().unwrap_or(match self.address_type {
            AddressType::I32 => u64::from(u32::MAX),
            AddressType::I64 => u64::MAX,
        });
        let new_size = current
            .checked_add(by)
            .filter(|&new_size| new_size <= cap)
            .ok_or_else(|| {
                Error::Table(format!(
                    "Trying to grow table by {} items when there are already {} items",
                    by, current,
                ))
            })?;
        let new_len = usize::try_from(new_size)
            .map_err(|_| Error::Table(format!("table size {} is too large", new_size)))?;
        buffer.resize(new_len, init);
        Ok(current)
    }

    /// Get the value at the given index.
    pub fn get(&self, offset: u64) -> Result<Value, Error> {
        let buffer = self.buffer.borrow();
        let buffer_len = buffer.len();
        usize::try_from(offset)
            .ok()
            .and_then(|offset| buffer.get(offset).cloned())
            .ok_or_else(|| {
                Error::Table(format!(
                    "trying to read table item with index {} when there are only {} items",
                    offset, buffer_len
                ))
            })
    }

    /// Set the value at the given index.
    pub fn set(&self, offset: u64, value: Value) -> Result<(), Error> {
        let mut buffer = self.buffer.borrow_mut();
        let buffer_len = buffer.len();
        let slot = usize::try_from(offset)
            .ok()
            .and_then(|offset| buffer.get_mut(offset))
            .ok_or_else(|| {
                Error::Table(format!(
                    "trying to update table item with index {} when there are only {} items",
                    offset, buffer_len
                ))
            })?;
        *slot = value;
        Ok(())
    }

    /// Fill the range `[offset, offset + len)` with `value`.
    ///
    /// Bounds are checked before any slot is written.
    pub fn fill(&self, offset: u64, len: u64, value: Value) -> Result<(), Error> {
        let mut buffer = self.buffer.borrow_mut();
        let range = checked_range(offset, len, buffer.len())?;
        for slot in &mut buffer[range] {
            *slot = value.clone();
        }
        Ok(())
    }

    /// Write `items` into the table starting at `offset`.
    ///
    /// Bounds are checked before any slot is written.
    pub(crate) fn init(&self, offset: u64, items: &[Value]) -> Result<(), Error> {
        let mut buffer = self.buffer.borrow_mut();
        let range = checked_range(offset, items.len() as u64, buffer.len())?;
        buffer[range].clone_from_slice(items);
        Ok(())
    }

    /// Copy elements between two (possibly identical) tables.
    ///
    /// Overlapping ranges within one table behave as if the source range had
    /// been copied out first.
    pub fn transfer(
        src: &TableRef,
        src_offset: u64,
        dst: &TableRef,
        dst_offset: u64,
        len: u64,
    ) -> Result<(), Error> {
        if Rc::ptr_eq(&src.0, &dst.0) {
            let mut buffer = src.buffer.borrow_mut();
            let buffer_len = buffer.len();
            let src_range = checked_range(src_offset, len, buffer_len)?;
            let dst_range = checked_range(dst_offset, len, buffer_len)?;
            let snapshot: Vec<Value> = buffer[src_range].to_vec();
            buffer[dst_range].clone_from_slice(&snapshot);
            return Ok(());
        }

        let src_buffer = src.buffer.borrow();
        let mut dst_buffer = dst.buffer.borrow_mut();
        let src_range = checked_range(src_offset, len, src_buffer.len())?;
        let dst_range = checked_range(dst_offset, len, dst_buffer.len())?;
        dst_buffer[dst_range].clone_from_slice(&src_buffer[src_range]);
        Ok(())
    }
}

fn checked_range(offset: u64, len: u64, buffer_len: usize) -> Result<core::ops::Range<usize>, Error> {
    let end = offset.checked_add(len).ok_or_else(|| {
        Error::Table(format!(
            "trying to access table range of length {} from index {}",
            len, offset
        ))
    })?;
    if end > buffer_len as u64 {
        return Err(Error::Table(format!(
            "trying to access table range [{}..{}] with only {} items",
            offset, end, buffer_len
        )));
    }
    Ok(offset as usize..end as usize)
}

#[cfg(test)]
mod tests {
    use super::TableInstance;
    use crate::types::{AddressType, ValueType};
    use crate::Value;

    fn alloc_table(initial: u64, maximum: Option<u64>) -> crate::TableRef {
        TableInstance::alloc(
            ValueType::FuncRef,
            initial,
            maximum,
            AddressType::I32,
            Value::FuncRef(None),
        )
        .unwrap()
    }

    #[test]
    fn alloc_rejects_inverted_limits() {
        assert!(TableInstance::alloc(
            ValueType::FuncRef,
            2,
            Some(1),
            AddressType::I32,
            Value::FuncRef(None),
        )
        .is_err());
    }

    #[test]
    fn grow_respects_maximum() {
        let table = alloc_table(1, Some(3));
        assert_eq!(table.grow(2, Value::FuncRef(None)).unwrap(), 1);
        assert_eq!(table.current_size(), 3);
        assert!(table.grow(1, Value::FuncRef(None)).is_err());
    }

    #[test]
    fn out_of_bounds_access_fails() {
        let table = alloc_table(2, None);
        assert!(table.get(2).is_err());
        assert!(table.set(2, Value::FuncRef(None)).is_err());
        assert!(table.fill(1, 2, Value::FuncRef(None)).is_err());
    }

    #[test]
    fn fill_checks_bounds_before_writing() {
        let table = alloc_table(4, None);
        assert!(table.fill(2, 3, Value::FuncRef(None)).is_err());
    }

    #[test]
    fn overlapping_copy_uses_snapshot() {
        let table = TableInstance::alloc(
            ValueType::ExternRef,
            4,
            None,
            AddressType::I32,
            Value::ExternRef(None),
        )
        .unwrap();
        table.set(0, Value::ExternRef(Some(0))).unwrap();
        table.set(1, Value::ExternRef(Some(1))).unwrap();
        table.set(2, Value::ExternRef(Some(2))).unwrap();
        table.set(3, Value::ExternRef(Some(3))).unwrap();
        // This would lose element 0 with a naive forward copy.
        let table_ref = table.clone();
        TableInstance::transfer(&table_ref, 0, &table_ref, 1, 3).unwrap();
        assert_eq!(table.get(1).unwrap(), Value::ExternRef(Some(0)));
        assert_eq!(table.get(2).unwrap(), Value::ExternRef(Some(1)));
        assert_eq!(table.get(3).unwrap(), Value::ExternRef(Some(2)));
    }
}
