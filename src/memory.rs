use crate::types::{AddressType, Limits};
use crate::value::LittleEndianConvert;
use crate::Error;
use alloc::format;
use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;
use core::cell::{Cell, RefCell};
use core::fmt;
use core::ops::Range;
use memory_units::wasm32::Pages;
use memory_units::{Bytes, RoundUpTo};

/// Size of a page of [linear memory][`MemoryInstance`] - 64KiB.
///
/// The size of a memory is always an integer multiple of a page size.
///
/// [`MemoryInstance`]: struct.MemoryInstance.html
pub const LINEAR_MEMORY_PAGE_SIZE: Bytes = Bytes(65536);

/// Maximal number of pages of a memory with the given address width.
fn max_pages(address_type: AddressType) -> u64 {
    match address_type {
        AddressType::I32 => 1 << 16,
        AddressType::I64 => 1 << 48,
    }
}

/// Reference to a memory (See [`MemoryInstance`] for details).
///
/// This reference has a reference-counting semantics.
///
/// [`MemoryInstance`]: struct.MemoryInstance.html
#[derive(Clone, Debug)]
pub struct MemoryRef(pub(crate) Rc<MemoryInstance>);

impl ::core::ops::Deref for MemoryRef {
    type Target = MemoryInstance;
    fn deref(&self) -> &MemoryInstance {
        &self.0
    }
}

/// Runtime representation of a linear memory (or `memory` for short).
///
/// A memory is a contiguous, mutable array of raw bytes. Wasm code can load
/// and store values from/to a linear memory at any byte address.
/// A trap occurs if an access is not within the bounds of the current memory
/// size.
///
/// A memory is created with an initial size but can be grown dynamically.
/// The growth can be limited by specifying a maximum size.
/// The size of a memory is always an integer multiple of a
/// [page size][`LINEAR_MEMORY_PAGE_SIZE`] - 64KiB.
///
/// At the moment, wasm doesn't provide any way to shrink the memory.
///
/// [`LINEAR_MEMORY_PAGE_SIZE`]: constant.LINEAR_MEMORY_PAGE_SIZE.html
pub struct MemoryInstance {
    limits: Limits,
    address_type: AddressType,
    /// Linear memory buffer with lazy allocation.
    buffer: RefCell<Vec<u8>>,
    /// Logical size in bytes; the buffer only grows to an address that has
    /// actually been touched.
    current_size: Cell<usize>,
}

impl fmt::Debug for MemoryInstance {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("MemoryInstance")
            .field("limits", &self.limits)
            .field("address_type", &self.address_type)
            .field("buffer.len", &self.buffer.borrow().len())
            .finish()
    }
}

struct CheckedRegion {
    offset: usize,
    size: usize,
}

impl CheckedRegion {
    fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.size
    }
}

impl MemoryInstance {
    /// Allocate a memory instance with 32-bit addressing.
    ///
    /// The memory is allocated with the initial number of pages specified by
    /// `initial`. The minimal possible value for `initial` is 0 and the
    /// maximum possible is `65536` (since the maximum addressable memory is
    /// 2<sup>32</sup> = 4GiB = 65536 * [64KiB][`LINEAR_MEMORY_PAGE_SIZE`]).
    ///
    /// It is possible to limit the maximum number of pages this memory
    /// instance can have by specifying `maximum`.
    ///
    /// Allocated memory is always zeroed.
    ///
    /// # Errors
    ///
    /// Returns `Err` if:
    ///
    /// - `initial` is greater than `maximum`
    /// - either `initial` or `maximum` is greater than `65536`.
    ///
    /// [`LINEAR_MEMORY_PAGE_SIZE`]: constant.LINEAR_MEMORY_PAGE_SIZE.html
    pub fn alloc(initial: Pages, maximum: Option<Pages>) -> Result<MemoryRef, Error> {
        let limits = Limits::new(initial.0 as u64, maximum.map(|pages| pages.0 as u64));
        Self::alloc_with_type(limits, AddressType::I32)
    }

    pub(crate) fn alloc_with_type(
        limits: Limits,
        address_type: AddressType,
    ) -> Result<MemoryRef, Error> {
        validate_memory(&limits, address_type).map_err(Error::Memory)?;

        let initial_bytes = (limits.min as usize) * LINEAR_MEMORY_PAGE_SIZE.0;
        let memory = MemoryInstance {
            limits,
            address_type,
            buffer: RefCell::new(Vec::with_capacity(4096)),
            current_size: Cell::new(initial_bytes),
        };
        Ok(MemoryRef(Rc::new(memory)))
    }

    /// Returns the address width of this memory.
    pub fn address_type(&self) -> AddressType {
        self.address_type
    }

    pub(crate) fn limits(&self) -> Limits {
        Limits::new(self.current_pages(), self.limits.max)
    }

    /// Returns the number of pages this `MemoryInstance` was created with.
    pub fn initial(&self) -> u64 {
        self.limits.min
    }

    /// Returns the maximum number of pages this `MemoryInstance` can grow
    /// to, or `None` if there is no limit set.
    pub fn maximum(&self) -> Option<u64> {
        self.limits.max
    }

    /// Returns the current size, in pages.
    pub fn current_pages(&self) -> u64 {
        let pages: Pages = Bytes(self.current_size.get()).round_up_to();
        pages.0 as u64
    }

    /// Returns the current size, in bytes.
    pub fn current_bytes(&self) -> u64 {
        self.current_size.get() as u64
    }

    /// Get a value from memory at the given offset.
    pub fn get_value<T: LittleEndianConvert>(&self, offset: u64) -> Result<T, Error> {
        let mut buffer = self.buffer.borrow_mut();
        let region = self.checked_region(&mut buffer, offset, core::mem::size_of::<T>() as u64)?;
        Ok(T::from_little_endian(&buffer[region.range()]).expect("Slice size is checked"))
    }

    /// Copy data from memory at the given offset.
    ///
    /// This will allocate a vector for you.
    /// If you can provide a mutable slice you can use [`get_into`].
    ///
    /// [`get_into`]: #method.get_into
    pub fn get(&self, offset: u64, size: usize) -> Result<Vec<u8>, Error> {
        let mut buffer = self.buffer.borrow_mut();
        let region = self.checked_region(&mut buffer, offset, size as u64)?;
        Ok(buffer[region.range()].to_vec())
    }

    /// Copy data from the given offset in the memory into the `target` slice.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the specified region is out of bounds.
    pub fn get_into(&self, offset: u64, target: &mut [u8]) -> Result<(), Error> {
        let mut buffer = self.buffer.borrow_mut();
        let region = self.checked_region(&mut buffer, offset, target.len() as u64)?;
        target.copy_from_slice(&buffer[region.range()]);
        Ok(())
    }

    /// Copy data into the memory at the given offset.
    pub fn set(&self, offset: u64, value: &[u8]) -> Result<(), Error> {
        let mut buffer = self.buffer.borrow_mut();
        let range = self
            .checked_region(&mut buffer, offset, value.len() as u64)?
            .range();
        buffer[range].copy_from_slice(value);
        Ok(())
    }

    /// Copy a value into the memory at the given offset.
    pub fn set_value<T: LittleEndianConvert>(&self, offset: u64, value: T) -> Result<(), Error> {
        let mut buffer = self.buffer.borrow_mut();
        let range = self
            .checked_region(&mut buffer, offset, core::mem::size_of::<T>() as u64)?
            .range();
        value.into_little_endian(&mut buffer[range]);
        Ok(())
    }

    /// Increases the size of the linear memory by the given number of pages.
    /// Returns the previous memory size in pages if it succeeds.
    ///
    /// # Errors
    ///
    /// Returns `Err` if attempted to allocate more memory than permitted by
    /// the declared maximum or the address-type cap.
    pub fn grow(&self, additional: u64) -> Result<u64, Error> {
        let size_before_grow = self.current_pages();

        if additional == 0 {
            return Ok(size_before_grow);
        }

        let cap = self
            .limits
            .max
            .unwrap_or_else(|| max_pages(self.address_type));
        let new_size = size_before_grow
            .checked_add(additional)
            .filter(|&new_size| new_size <= cap)
            .ok_or_else(|| {
                Error::Memory(format!(
                    "Trying to grow memory by {} pages when already have {}",
                    additional, size_before_grow,
                ))
            })?;

        let new_bytes = usize::try_from(new_size)
            .ok()
            .and_then(|pages| pages.checked_mul(LINEAR_MEMORY_PAGE_SIZE.0))
            .ok_or_else(|| {
                Error::Memory(format!("memory size of {} pages is unrepresentable", new_size))
            })?;
        self.current_size.set(new_bytes);
        Ok(size_before_grow)
    }

    fn checked_region<B>(
        &self,
        buffer: &mut B,
        offset: u64,
        size: u64,
    ) -> Result<CheckedRegion, Error>
    where
        B: ::core::ops::DerefMut<Target = Vec<u8>>,
    {
        let end = offset.checked_add(size).ok_or_else(|| {
            Error::Memory(format!(
                "trying to access memory block of size {} from offset {}",
                size, offset
            ))
        })?;

        if end > self.current_size.get() as u64 {
            return Err(Error::Memory(format!(
                "trying to access region [{}..{}] in memory [0..{}]",
                offset,
                end,
                self.current_size.get()
            )));
        }

        // In bounds of the logical size, hence representable as usize.
        let offset = offset as usize;
        let end = end as usize;
        if buffer.len() < end {
            buffer.resize(end, 0);
        }

        Ok(CheckedRegion {
            offset,
            size: size as usize,
        })
    }

    /// Copy contents of one memory region to another.
    ///
    /// Overlapping regions produce the same bytes as a copy through a
    /// snapshot of the source range.
    ///
    /// # Errors
    ///
    /// Returns `Err` if either of the specified regions is out of bounds.
    pub fn copy(&self, src_offset: u64, dst_offset: u64, len: u64) -> Result<(), Error> {
        let mut buffer = self.buffer.borrow_mut();

        let read_region = self.checked_region(&mut buffer, src_offset, len)?;
        let write_region = self.checked_region(&mut buffer, dst_offset, len)?;

        buffer.copy_within(read_region.range(), write_region.offset);
        Ok(())
    }

    /// Copy memory between two (possibly distinct) memory instances.
    ///
    /// If the same memory instance is passed as both `src` and `dst`, the
    /// overlap-safe [`copy`] is used.
    ///
    /// [`copy`]: #method.copy
    pub fn transfer(
        src: &MemoryRef,
        src_offset: u64,
        dst: &MemoryRef,
        dst_offset: u64,
        len: u64,
    ) -> Result<(), Error> {
        if Rc::ptr_eq(&src.0, &dst.0) {
            return src.copy(src_offset, dst_offset, len);
        }

        // Distinct memory instances, so borrowing both buffers at once is
        // fine.
        let mut src_buffer = src.buffer.borrow_mut();
        let mut dst_buffer = dst.buffer.borrow_mut();

        let src_range = src
            .checked_region(&mut src_buffer, src_offset, len)?
            .range();
        let dst_range = dst
            .checked_region(&mut dst_buffer, dst_offset, len)?
            .range();
        dst_buffer[dst_range].copy_from_slice(&src_buffer[src_range]);
        Ok(())
    }

    /// Fill the memory region with the specified value.
    ///
    /// Semantically equivalent to `memset`.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the specified region is out of bounds.
    pub fn clear(&self, offset: u64, new_val: u8, len: u64) -> Result<(), Error> {
        let mut buffer = self.buffer.borrow_mut();
        let range = self.checked_region(&mut buffer, offset, len)?.range();
        for val in &mut buffer[range] {
            *val = new_val
        }
        Ok(())
    }

    /// Fill the specified memory region with zeroes.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the specified region is out of bounds.
    pub fn zero(&self, offset: u64, len: u64) -> Result<(), Error> {
        self.clear(offset, 0, len)
    }

    /// Provides direct access to the underlying memory buffer.
    ///
    /// # Panics
    ///
    /// Any call that requires write access to memory (such as [`set`],
    /// [`clear`], etc) made within the closure will panic. Note that the
    /// buffer size may be arbitrary.
    ///
    /// [`set`]: #method.set
    /// [`clear`]: #method.clear
    pub fn with_direct_access<R, F: FnOnce(&[u8]) -> R>(&self, f: F) -> R {
        let buf = self.buffer.borrow();
        f(&buf)
    }
}

pub(crate) fn validate_memory(limits: &Limits, address_type: AddressType) -> Result<(), String> {
    let cap = max_pages(address_type);
    if limits.min > cap {
        return Err(format!(
            "initial memory size must be at most {} pages",
            cap
        ));
    }
    if let Some(maximum) = limits.max {
        if limits.min > maximum {
            return Err(format!(
                "maximum limit {} is less than minimum {}",
                maximum, limits.min,
            ));
        }

        if maximum > cap {
            return Err(format!("maximum memory size must be at most {} pages", cap));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{MemoryInstance, LINEAR_MEMORY_PAGE_SIZE};
    use crate::Error;
    use assert_matches::assert_matches;
    use memory_units::wasm32::Pages;

    fn create_memory(initial_content: &[u8]) -> crate::MemoryRef {
        let mem = MemoryInstance::alloc(Pages(1), Some(Pages(1))).unwrap();
        mem.set(0, initial_content)
            .expect("Successful initialize the memory");
        mem
    }

    #[test]
    fn alloc() {
        let fixtures = &[
            (0, None, true),
            (0, Some(0), true),
            (1, None, true),
            (1, Some(1), true),
            (0, Some(1), true),
            (1, Some(0), false),
            (0, Some(65536), true),
            (65536, Some(65536), true),
            (65536, Some(0), false),
            (65536, None, true),
            (65537, None, false),
        ];

        for (index, &(initial, maybe_max, expected_ok)) in fixtures.iter().enumerate() {
            let result = MemoryInstance::alloc(Pages(initial), maybe_max.map(Pages));
            if result.is_ok() != expected_ok {
                panic!(
                    "unexpected error at {}, initial={:?}, max={:?}, expected={}, result={:?}",
                    index, initial, maybe_max, expected_ok, result,
                );
            }
        }
    }

    #[test]
    fn ensure_page_size() {
        use memory_units::ByteSize;
        assert_eq!(LINEAR_MEMORY_PAGE_SIZE, Pages::BYTE_SIZE);
    }

    #[test]
    fn grow_returns_previous_size() {
        let mem = MemoryInstance::alloc(Pages(1), Some(Pages(3))).unwrap();
        assert_eq!(mem.grow(1).unwrap(), 1);
        assert_eq!(mem.current_pages(), 2);
        assert!(mem.grow(2).is_err());
        // A failed grow leaves the size untouched.
        assert_eq!(mem.current_pages(), 2);
    }

    #[test]
    fn copy_overlaps_forward() {
        let mem = create_memory(&[0, 1, 2, 3, 4, 5, 6, 7, 8, 9]);
        mem.copy(0, 4, 6).expect("Successfully copy the elements");
        let result = mem.get(0, 10).expect("Successfully retrieve the result");
        assert_eq!(result, &[0, 1, 2, 3, 0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn copy_overlaps_backward() {
        let mem = create_memory(&[0, 1, 2, 3, 4, 5, 6, 7, 8, 9]);
        mem.copy(4, 0, 6).expect("Successfully copy the elements");
        let result = mem.get(0, 10).expect("Successfully retrieve the result");
        assert_eq!(result, &[4, 5, 6, 7, 8, 9, 6, 7, 8, 9]);
    }

    #[test]
    fn copy_to_self_is_identity() {
        let mem = create_memory(&[0, 1, 2, 3, 4, 5, 6, 7, 8, 9]);
        mem.copy(0, 0, 10).unwrap();
        assert_eq!(mem.get(0, 10).unwrap(), &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9]);
    }

    #[test]
    fn transfer_works() {
        let src = create_memory(&[0, 1, 2, 3, 4, 5, 6, 7, 8, 9]);
        let dst = create_memory(&[10, 11, 12, 13, 14, 15, 16, 17, 18, 19]);

        MemoryInstance::transfer(&src, 4, &dst, 0, 3).unwrap();

        assert_eq!(src.get(0, 10).unwrap(), &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9]);
        assert_eq!(
            dst.get(0, 10).unwrap(),
            &[4, 5, 6, 13, 14, 15, 16, 17, 18, 19]
        );
    }

    #[test]
    fn transfer_oob_errors_without_side_effect() {
        let src = create_memory(&[0, 1, 2, 3, 4, 5, 6, 7, 8, 9]);
        let dst = create_memory(&[10, 11, 12, 13, 14, 15, 16, 17, 18, 19]);

        assert_matches!(
            MemoryInstance::transfer(&src, 65535, &dst, 0, 3),
            Err(Error::Memory(_))
        );

        assert_eq!(src.get(0, 10).unwrap(), &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9]);
        assert_eq!(
            dst.get(0, 10).unwrap(),
            &[10, 11, 12, 13, 14, 15, 16, 17, 18, 19]
        );
    }

    #[test]
    fn clear() {
        let mem = create_memory(&[0, 1, 2, 3, 4, 5, 6, 7, 8, 9]);
        mem.clear(0, 0x4A, 10)
            .expect("To successfully clear the memory");
        let result = mem.get(0, 10).expect("To successfully retrieve the result");
        assert_eq!(result, &[0x4A; 10]);
    }

    #[test]
    fn get_into() {
        let mem = MemoryInstance::alloc(Pages(1), None).unwrap();
        mem.set(6, &[13, 17, 129])
            .expect("memory set should not fail");

        let mut data = [0u8; 2];
        mem.get_into(7, &mut data[..])
            .expect("get_into should not fail");

        assert_eq!(data, [17, 129]);
    }

    #[test]
    fn oob_access_fails() {
        let mem = MemoryInstance::alloc(Pages(1), None).unwrap();
        assert!(mem.get_value::<i32>(65533).is_err());
        assert!(mem.get_value::<i32>(65532).is_ok());
        assert!(mem.set_value::<i32>(u64::MAX - 1, 0).is_err());
    }
}
