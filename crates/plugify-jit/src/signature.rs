//! Lowering abstract method signatures to native call interfaces.
//!
//! [`CifStorage`] owns a prepared libffi call interface together with the
//! effective (post-rewrite) parameter and return properties the marshalling
//! glue needs at dispatch time. The rewrite rules:
//!
//! - By-reference parameters travel as pointers whatever their element type.
//! - When the hidden-return policy claims the return type, the signature
//!   gains a leading pointer parameter and the native return becomes a
//!   pointer (the classic hidden-return-by-pointer convention).
//! - By-value parameters wider than a machine pointer are rejected.

use std::ptr::addr_of_mut;

use libffi::low::{
    ffi_abi, ffi_abi_FFI_DEFAULT_ABI, ffi_cif, ffi_closure, ffi_type, prep_cif, prep_cif_var,
    types, CodePtr,
};
use plugify_core::{Method, Property, ValueType};

use crate::error::JitError;

/// Maximum number of native parameters a trampoline supports, including a
/// hidden return pointer.
pub const MAX_ARGS: usize = 32;

/// Host policy deciding whether a return type is delivered through a hidden
/// leading pointer parameter.
pub type HiddenReturnPolicy = fn(ValueType) -> bool;

/// Default policy: aggregates wider than a machine pointer (strings, arrays)
/// return through the hidden pointer; everything else returns in registers.
pub fn default_hidden_return(value_type: ValueType) -> bool {
    value_type.is_wider_than_pointer()
}

/// A prepared call interface plus the effective slot layout.
#[derive(Debug)]
pub(crate) struct CifStorage {
    pub cif: ffi_cif,
    /// Keeps the type array alive; `cif.arg_types` points into it.
    arg_types: Vec<*mut ffi_type>,
    /// Effective parameters, in native order (hidden pointer first when
    /// present, by-reference folded to pointers).
    pub arg_props: Vec<Property>,
    /// Effective return property.
    pub ret: Property,
    pub hidden_return: bool,
}

// The raw pointers reference libffi's static type descriptors and the owned
// `arg_types` buffer; the storage is immutable after `build`.
unsafe impl Send for CifStorage {}

impl CifStorage {
    /// Lowers `method` with the given hidden-return policy.
    pub(crate) fn build(method: &Method, hidden: HiddenReturnPolicy) -> Result<Box<Self>, JitError> {
        let abi = resolve_abi(method.call_conv.as_deref())?;

        let declared_ret = effective(method.ret_type);
        let hidden_return = hidden(declared_ret.value_type);
        let ret = if hidden_return {
            Property::new(ValueType::Pointer)
        } else {
            if declared_ret.value_type.is_wider_than_pointer() {
                return Err(JitError::Emit(format!(
                    "return type '{:?}' is wider than a machine pointer and the hidden-return policy declined it",
                    declared_ret.value_type
                )));
            }
            declared_ret
        };

        let mut arg_props = Vec::with_capacity(method.param_types.len() + 1);
        if hidden_return {
            arg_props.push(Property::new(ValueType::Pointer));
        }
        for param in &method.param_types {
            let prop = effective(*param);
            if prop.value_type == ValueType::Void {
                return Err(JitError::Emit("void is not a valid parameter type".into()));
            }
            if prop.value_type.is_wider_than_pointer() {
                return Err(JitError::UnsupportedParameterWidth(param.value_type));
            }
            arg_props.push(prop);
        }
        if arg_props.len() > MAX_ARGS {
            return Err(JitError::Emit(format!(
                "too many parameters ({}, limit {MAX_ARGS})",
                arg_props.len()
            )));
        }

        let var_index = match method.var_index {
            Some(index) => {
                let fixed = usize::from(index) + usize::from(hidden_return);
                if fixed > arg_props.len() {
                    return Err(JitError::Emit(format!(
                        "variadic start index {index} exceeds parameter count"
                    )));
                }
                Some(fixed)
            }
            None => None,
        };

        Self::prepare(abi, arg_props, ret, hidden_return, var_index)
    }

    /// The fixed wrapper shape of a call trampoline:
    /// `fn(*const Parameters, *mut ReturnValue)`.
    pub(crate) fn wrapper() -> Result<Box<Self>, JitError> {
        Self::prepare(
            ffi_abi_FFI_DEFAULT_ABI,
            vec![
                Property::new(ValueType::Pointer),
                Property::new(ValueType::Pointer),
            ],
            Property::new(ValueType::Void),
            false,
            None,
        )
    }

    fn prepare(
        abi: ffi_abi,
        arg_props: Vec<Property>,
        ret: Property,
        hidden_return: bool,
        var_index: Option<usize>,
    ) -> Result<Box<Self>, JitError> {
        let arg_types: Vec<*mut ffi_type> = arg_props
            .iter()
            .map(|p| ffi_type_of(p.value_type))
            .collect();

        let mut storage = Box::new(CifStorage {
            cif: ffi_cif::default(),
            arg_types,
            arg_props,
            ret,
            hidden_return,
        });

        let nargs = storage.arg_types.len();
        let rtype = ffi_type_of(storage.ret.value_type);
        let atypes = storage.arg_types.as_mut_ptr();
        let prepped = unsafe {
            match var_index {
                Some(fixed) => {
                    prep_cif_var(&mut storage.cif, abi, fixed, nargs, rtype, atypes)
                }
                None => prep_cif(&mut storage.cif, abi, nargs, rtype, atypes),
            }
        };
        prepped.map_err(|e| JitError::Emit(format!("libffi rejected the signature: {e:?}")))?;

        Ok(storage)
    }
}

/// Folds a by-reference property into a plain pointer.
fn effective(prop: Property) -> Property {
    if prop.is_reference {
        Property::new(ValueType::Pointer)
    } else {
        Property::new(prop.value_type)
    }
}

fn resolve_abi(call_conv: Option<&str>) -> Result<ffi_abi, JitError> {
    match call_conv {
        None | Some("") | Some("cdecl") | Some("default") => Ok(ffi_abi_FFI_DEFAULT_ABI),
        Some(other) => Err(JitError::Emit(format!(
            "unsupported calling convention '{other}'; only the host-native convention is emitted"
        ))),
    }
}

/// The libffi descriptor for an effective (pointer-or-narrower) value type.
fn ffi_type_of(value_type: ValueType) -> *mut ffi_type {
    unsafe {
        match value_type {
            ValueType::Void => addr_of_mut!(types::void),
            ValueType::Bool | ValueType::UInt8 => addr_of_mut!(types::uint8),
            ValueType::Char8 | ValueType::Int8 => addr_of_mut!(types::sint8),
            ValueType::Char16 | ValueType::UInt16 => addr_of_mut!(types::uint16),
            ValueType::Int16 => addr_of_mut!(types::sint16),
            ValueType::Int32 => addr_of_mut!(types::sint32),
            ValueType::UInt32 => addr_of_mut!(types::uint32),
            ValueType::Int64 => addr_of_mut!(types::sint64),
            ValueType::UInt64 => addr_of_mut!(types::uint64),
            ValueType::Float => addr_of_mut!(types::float),
            ValueType::Double => addr_of_mut!(types::double),
            // Wide types are rejected before lowering; anything else is a
            // pointer-sized value.
            _ => addr_of_mut!(types::pointer),
        }
    }
}

/// Number of meaningful bytes a value of this type occupies in its slot.
pub(crate) fn slot_width(value_type: ValueType) -> usize {
    match value_type {
        ValueType::Bool | ValueType::Char8 | ValueType::Int8 | ValueType::UInt8 => 1,
        ValueType::Char16 | ValueType::Int16 | ValueType::UInt16 => 2,
        ValueType::Int32 | ValueType::UInt32 | ValueType::Float => 4,
        _ => std::mem::size_of::<usize>(),
    }
}

/// An emitted closure: libffi-owned executable pages plus their entry point.
pub(crate) struct EmittedClosure {
    closure: *mut ffi_closure,
    pub code: CodePtr,
}

// Executable pages; the entry point is only invoked through the public
// function-pointer types.
unsafe impl Send for EmittedClosure {}

impl EmittedClosure {
    pub(crate) fn alloc() -> Result<Self, JitError> {
        let (closure, code) = libffi::low::closure_alloc();
        if closure.is_null() {
            return Err(JitError::Emit("closure allocation failed".into()));
        }
        Ok(EmittedClosure { closure, code })
    }

    pub(crate) fn raw(&self) -> *mut ffi_closure {
        self.closure
    }
}

impl Drop for EmittedClosure {
    fn drop(&mut self) {
        unsafe { libffi::low::closure_free(self.closure) };
    }
}
