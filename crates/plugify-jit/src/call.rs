//! Call trampolines: the host calling into guest-provided natives.

use std::ffi::c_void;
use std::sync::{Arc, Weak};

use libffi::low::{ffi_cif, prep_closure};
use plugify_core::{Method, ValueType};

use crate::error::JitError;
use crate::runtime::JitRuntime;
use crate::signature::{CifStorage, EmittedClosure, HiddenReturnPolicy, MAX_ARGS};
use crate::slots::{Parameters, ReturnValue};

/// Shape of every emitted call trampoline: argument slots in, result slot
/// out. The slot layout follows the signature the trampoline was emitted
/// for (hidden return pointer first when the policy applies).
pub type CallFn = unsafe extern "C" fn(params: *const Parameters, ret: *mut ReturnValue);

struct CallData {
    /// Interface of the target native function.
    target_cif: Box<CifStorage>,
    /// Interface of the wrapper itself (`(pointer, pointer) -> void`).
    wrapper_cif: Box<CifStorage>,
    target: *mut c_void,
}

// `target` is an executable address owned by the guest module; the
// trampoline only jumps through it.
unsafe impl Send for CallData {}

/// A call trampoline.
///
/// Mirrors [`JitCallback`](crate::JitCallback) in lifetime rules: one-shot
/// emission with a cached address, weak runtime back-reference, code
/// released on drop.
pub struct JitCall {
    runtime: Weak<JitRuntime>,
    closure: Option<EmittedClosure>,
    data: Option<Box<CallData>>,
    error: Option<JitError>,
}

impl JitCall {
    pub fn new(runtime: &Arc<JitRuntime>) -> Self {
        JitCall {
            runtime: Arc::downgrade(runtime),
            closure: None,
            data: None,
            error: None,
        }
    }

    /// Emits (or returns the cached) trampoline that calls `target` with
    /// the ABI of `method`.
    pub fn get_jit_func(
        &mut self,
        method: &Method,
        target: *const c_void,
        hidden: HiddenReturnPolicy,
    ) -> Result<CallFn, JitError> {
        if let Some(function) = self.function() {
            return Ok(function);
        }

        let Some(runtime) = self.runtime.upgrade() else {
            return Err(self.fail(JitError::RuntimeInvalid));
        };
        if target.is_null() {
            return Err(self.fail(JitError::Emit("null call target".into())));
        }

        let target_cif = match CifStorage::build(method, hidden) {
            Ok(storage) => storage,
            Err(e) => return Err(self.fail(e)),
        };
        let wrapper_cif = match CifStorage::wrapper() {
            Ok(storage) => storage,
            Err(e) => return Err(self.fail(e)),
        };
        let mut data = Box::new(CallData {
            target_cif,
            wrapper_cif,
            target: target as *mut c_void,
        });

        let closure = match EmittedClosure::alloc() {
            Ok(closure) => closure,
            Err(e) => return Err(self.fail(e)),
        };
        let prepped = unsafe {
            prep_closure(
                closure.raw(),
                &mut data.wrapper_cif.cif,
                call_glue,
                &*data,
                closure.code,
            )
        };
        if let Err(e) = prepped {
            return Err(self.fail(JitError::Emit(format!("failed preparing closure: {e:?}"))));
        }

        let function = unsafe { std::mem::transmute::<*const c_void, CallFn>(closure.code.as_ptr()) };
        self.closure = Some(closure);
        self.data = Some(data);
        self.error = None;
        runtime.note_emitted();
        Ok(function)
    }

    /// The emitted trampoline, if emission has succeeded.
    pub fn function(&self) -> Option<CallFn> {
        self.closure
            .as_ref()
            .map(|c| unsafe { std::mem::transmute::<*const c_void, CallFn>(c.code.as_ptr()) })
    }

    /// The last emission error, if any.
    pub fn error(&self) -> Option<&JitError> {
        self.error.as_ref()
    }

    fn fail(&mut self, error: JitError) -> JitError {
        self.error = Some(error.clone());
        error
    }
}

/// Wrapper glue: loads each slot into its ABI position per the target
/// signature, performs the indirect call, and stores the native return into
/// the result slot.
unsafe extern "C" fn call_glue(
    _cif: &ffi_cif,
    _result: &mut c_void,
    args: *const *const c_void,
    data: &CallData,
) {
    let params = *(*args.add(0) as *const *const usize);
    let ret = *(*args.add(1) as *const *mut usize);

    let count = data.target_cif.arg_props.len();
    let mut avalues = [std::ptr::null_mut::<c_void>(); MAX_ARGS];
    for index in 0..count {
        // Slots are little-endian storage; a pointer to the slot start is a
        // valid pointer to the narrower argument value.
        avalues[index] = params.add(index) as *mut c_void;
    }

    let mut result = [0usize; 2];
    libffi::raw::ffi_call(
        &data.target_cif.cif as *const ffi_cif as *mut ffi_cif,
        Some(std::mem::transmute::<*mut c_void, unsafe extern "C" fn()>(
            data.target,
        )),
        result.as_mut_ptr() as *mut c_void,
        avalues.as_mut_ptr(),
    );

    if !ret.is_null() {
        match data.target_cif.ret.value_type {
            ValueType::Void => {}
            ValueType::Float => {
                std::ptr::copy_nonoverlapping(result.as_ptr() as *const u8, ret as *mut u8, 4)
            }
            _ => *ret = result[0],
        }
    }
}
