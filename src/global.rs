use crate::{Error, Value, ValueType};
use alloc::rc::Rc;
use core::cell::RefCell;

/// Reference to a global variable (See [`GlobalInstance`] for details).
///
/// This reference has a reference-counting semantics.
///
/// [`GlobalInstance`]: struct.GlobalInstance.html
#[derive(Clone, Debug)]
pub struct GlobalRef(Rc<GlobalInstance>);

impl ::core::ops::Deref for GlobalRef {
    type Target = GlobalInstance;
    fn deref(&self) -> &GlobalInstance {
        &self.0
    }
}

/// Runtime representation of a global variable (or `global` for short).
///
/// A global contains a value of a specified type and a flag which specifies
/// whether this global is mutable or immutable. Neither the type of the
/// value nor the mutability can be changed after creation.
///
/// Attempts to change the value of an immutable global or to change the type
/// of the value (e.g. assign an [`I32`] value to a global that was created
/// with [`I64`] type) lead to an error.
///
/// [`I32`]: enum.Value.html#variant.I32
/// [`I64`]: enum.Value.html#variant.I64
#[derive(Debug)]
pub struct GlobalInstance {
    val: RefCell<Value>,
    value_type: ValueType,
    mutable: bool,
}

impl GlobalInstance {
    /// Allocate a global variable instance.
    pub fn alloc(val: Value, mutable: bool) -> GlobalRef {
        let value_type = val.value_type();
        GlobalRef(Rc::new(GlobalInstance {
            val: RefCell::new(val),
            value_type,
            mutable,
        }))
    }

    /// Change the value of this global variable.
    ///
    /// # Errors
    ///
    /// Returns `Err` if this global isn't mutable or if
    /// type of `val` doesn't match global's type.
    pub fn set(&self, val: Value) -> Result<(), Error> {
        if !self.mutable {
            return Err(Error::Global(
                "Attempt to change an immutable variable".into(),
            ));
        }
        if self.value_type() != val.value_type() {
            return Err(Error::Global("Attempt to change variable type".into()));
        }
        *self.val.borrow_mut() = val;
        Ok(())
    }

    /// Get the value of this global variable.
    pub fn get(&self) -> Value {
        self.val.borrow().clone()
    }

    /// Returns if this global variable is mutable.
    pub fn is_mutable(&self) -> bool {
        self.mutable
    }

    /// Returns value type of this global variable.
    pub fn value_type(&self) -> ValueType {
        self.value_type
    }
}
