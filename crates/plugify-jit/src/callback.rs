//! Callback trampolines: native functions exported by the host to guests.

use std::ffi::c_void;
use std::sync::{Arc, Weak};

use libffi::low::{ffi_cif, prep_closure};
use plugify_core::Method;

use crate::error::JitError;
use crate::runtime::JitRuntime;
use crate::signature::{slot_width, CifStorage, EmittedClosure, HiddenReturnPolicy, MAX_ARGS};
use crate::slots::{Parameters, ReturnValue};

/// The uniform dispatch callback every emitted function routes through.
///
/// `method` is the signature the trampoline was emitted for; `user_data` is
/// the opaque pointer supplied at emission; `params` views `count`
/// pointer-sized argument slots; the handler writes its result through
/// `ret` before returning.
pub type MethodHandler = unsafe extern "C" fn(
    method: *const Method,
    user_data: *mut c_void,
    params: *const Parameters,
    count: u8,
    ret: *mut ReturnValue,
);

struct CallbackData {
    storage: Box<CifStorage>,
    method: Arc<Method>,
    handler: MethodHandler,
    user_data: *mut c_void,
}

// `user_data` is an opaque caller-owned pointer; the trampoline never
// dereferences it, it only forwards it to the handler.
unsafe impl Send for CallbackData {}

/// A callback trampoline.
///
/// Emission is one-shot: the first successful [`get_jit_func`] call emits
/// and caches the native address; later calls return it unchanged. The
/// emitted code is released when the trampoline is dropped; the backing
/// [`JitRuntime`] must still be alive at emission time but not afterwards.
///
/// [`get_jit_func`]: JitCallback::get_jit_func
pub struct JitCallback {
    runtime: Weak<JitRuntime>,
    closure: Option<EmittedClosure>,
    data: Option<Box<CallbackData>>,
    error: Option<JitError>,
}

impl JitCallback {
    pub fn new(runtime: &Arc<JitRuntime>) -> Self {
        JitCallback {
            runtime: Arc::downgrade(runtime),
            closure: None,
            data: None,
            error: None,
        }
    }

    /// Emits (or returns the cached) native function matching `method`.
    ///
    /// Every invocation of the returned function marshals its arguments
    /// into slots, calls `handler`, and returns the handler's result slot.
    pub fn get_jit_func(
        &mut self,
        method: Arc<Method>,
        handler: MethodHandler,
        user_data: *mut c_void,
        hidden: HiddenReturnPolicy,
    ) -> Result<*const c_void, JitError> {
        if let Some(closure) = &self.closure {
            return Ok(closure.code.as_ptr());
        }

        let Some(runtime) = self.runtime.upgrade() else {
            return Err(self.fail(JitError::RuntimeInvalid));
        };

        let storage = match CifStorage::build(&method, hidden) {
            Ok(storage) => storage,
            Err(e) => return Err(self.fail(e)),
        };
        let mut data = Box::new(CallbackData {
            storage,
            method,
            handler,
            user_data,
        });

        let closure = match EmittedClosure::alloc() {
            Ok(closure) => closure,
            Err(e) => return Err(self.fail(e)),
        };
        let prepped = unsafe {
            prep_closure(
                closure.raw(),
                &mut data.storage.cif,
                callback_glue,
                &*data,
                closure.code,
            )
        };
        if let Err(e) = prepped {
            return Err(self.fail(JitError::Emit(format!("failed preparing closure: {e:?}"))));
        }

        let code = closure.code.as_ptr();
        self.closure = Some(closure);
        self.data = Some(data);
        self.error = None;
        runtime.note_emitted();
        Ok(code)
    }

    /// The emitted address, if emission has succeeded.
    pub fn function(&self) -> Option<*const c_void> {
        self.closure.as_ref().map(|c| c.code.as_ptr() as *const c_void)
    }

    /// The opaque pointer that will be handed to the handler.
    pub fn user_data(&self) -> Option<*mut c_void> {
        self.data.as_ref().map(|d| d.user_data)
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

/// Marshalling glue invoked by the emitted code.
///
/// Copies each native argument into a pointer-sized slot (integers and
/// pointers zero-extended, floats by bit pattern), dispatches to the
/// handler, then stores the handler's return slot as the native result.
unsafe extern "C" fn callback_glue(
    _cif: &ffi_cif,
    result: &mut c_void,
    args: *const *const c_void,
    data: &CallbackData,
) {
    let props = &data.storage.arg_props;
    let mut slots = [0usize; MAX_ARGS];
    for (index, prop) in props.iter().enumerate() {
        let src = *args.add(index) as *const u8;
        let dst = slots.as_mut_ptr().add(index) as *mut u8;
        std::ptr::copy_nonoverlapping(src, dst, slot_width(prop.value_type));
    }

    let mut ret_slots = [0usize; 2];
    (data.handler)(
        Arc::as_ptr(&data.method),
        data.user_data,
        slots.as_ptr() as *const Parameters,
        props.len() as u8,
        ret_slots.as_mut_ptr() as *mut ReturnValue,
    );

    let out = result as *mut c_void as *mut u8;
    match data.storage.ret.value_type {
        plugify_core::ValueType::Void => {}
        // libffi expects floats unpromoted and integers widened to a full
        // ffi_arg; the slot already holds both shapes correctly.
        plugify_core::ValueType::Float => {
            std::ptr::copy_nonoverlapping(ret_slots.as_ptr() as *const u8, out, 4)
        }
        _ => *(out as *mut usize) = ret_slots[0],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plugify_core::{Property, ValueType};

    use crate::signature::default_hidden_return;

    /// Scratch space the test handlers record their observations into.
    #[derive(Default)]
    struct Observed {
        int_arg: i32,
        double_arg: f64,
        pointer_arg: usize,
        count: u8,
        method_name: String,
    }

    unsafe extern "C" fn roundtrip_handler(
        method: *const Method,
        user_data: *mut c_void,
        params: *const Parameters,
        count: u8,
        ret: *mut ReturnValue,
    ) {
        let observed = &mut *(user_data as *mut Observed);
        let params = &*params;
        observed.int_arg = params.get::<i32>(0);
        observed.double_arg = params.get::<f64>(1);
        observed.pointer_arg = params.get::<usize>(2);
        observed.count = count;
        observed.method_name = (*method).name.clone();
        *(params.get::<*mut i32>(2)) = 5;
        (*ret).set::<i64>(42);
    }

    #[test]
    fn test_callback_round_trip() {
        let runtime = JitRuntime::new();
        let method = Arc::new(Method::new(
            "Roundtrip",
            vec![
                Property::new(ValueType::Int32),
                Property::new(ValueType::Double),
                Property::reference(ValueType::Int32),
            ],
            Property::new(ValueType::Int64),
        ));

        let mut observed = Observed::default();
        let mut trampoline = JitCallback::new(&runtime);
        let code = trampoline
            .get_jit_func(
                method,
                roundtrip_handler,
                &mut observed as *mut Observed as *mut c_void,
                default_hidden_return,
            )
            .unwrap();

        let native: unsafe extern "C" fn(i32, f64, *mut i32) -> i64 =
            unsafe { std::mem::transmute(code) };
        let mut out = 0i32;
        let returned = unsafe { native(7, 0.5, &mut out) };

        assert_eq!(returned, 42);
        assert_eq!(out, 5);
        assert_eq!(observed.int_arg, 7);
        assert_eq!(observed.double_arg, 0.5);
        assert_eq!(observed.pointer_arg, &mut out as *mut i32 as usize);
        assert_eq!(observed.count, 3);
        assert_eq!(observed.method_name, "Roundtrip");
        assert_eq!(runtime.emitted_count(), 1);
    }

    unsafe extern "C" fn double_float_handler(
        _method: *const Method,
        _user_data: *mut c_void,
        params: *const Parameters,
        _count: u8,
        ret: *mut ReturnValue,
    ) {
        let value = (*params).get::<f32>(0);
        (*ret).set::<f32>(value * 2.0);
    }

    #[test]
    fn test_callback_float_marshalling() {
        let runtime = JitRuntime::new();
        let method = Arc::new(Method::new(
            "DoubleIt",
            vec![Property::new(ValueType::Float)],
            Property::new(ValueType::Float),
        ));

        let mut trampoline = JitCallback::new(&runtime);
        let code = trampoline
            .get_jit_func(
                method,
                double_float_handler,
                std::ptr::null_mut(),
                default_hidden_return,
            )
            .unwrap();

        let native: unsafe extern "C" fn(f32) -> f32 = unsafe { std::mem::transmute(code) };
        assert_eq!(unsafe { native(1.25) }, 2.5);
    }

    unsafe extern "C" fn hidden_return_handler(
        _method: *const Method,
        _user_data: *mut c_void,
        params: *const Parameters,
        count: u8,
        ret: *mut ReturnValue,
    ) {
        assert_eq!(count, 2);
        // Slot 0 is the hidden return pointer; fill the aggregate through it
        // and echo the pointer back as the native return value.
        let hidden = (*params).get::<*mut u64>(0);
        *hidden = (*params).get::<u32>(1) as u64;
        (*ret).set::<*mut u64>(hidden);
    }

    #[test]
    fn test_callback_hidden_return_rewrite() {
        let runtime = JitRuntime::new();
        let method = Arc::new(Method::new(
            "MakeAggregate",
            vec![Property::new(ValueType::UInt32)],
            Property::new(ValueType::String),
        ));

        let mut trampoline = JitCallback::new(&runtime);
        let code = trampoline
            .get_jit_func(
                method,
                hidden_return_handler,
                std::ptr::null_mut(),
                default_hidden_return,
            )
            .unwrap();

        let native: unsafe extern "C" fn(*mut u64, u32) -> *mut u64 =
            unsafe { std::mem::transmute(code) };
        let mut aggregate = 0u64;
        let returned = unsafe { native(&mut aggregate, 9) };
        assert_eq!(aggregate, 9);
        assert_eq!(returned, &mut aggregate as *mut u64);
    }

    unsafe extern "C" fn noop_handler(
        _method: *const Method,
        _user_data: *mut c_void,
        _params: *const Parameters,
        _count: u8,
        _ret: *mut ReturnValue,
    ) {
    }

    #[test]
    fn test_emission_is_one_shot() {
        let runtime = JitRuntime::new();
        let method = Arc::new(Method::new(
            "Noop",
            vec![],
            Property::new(ValueType::Void),
        ));

        let mut trampoline = JitCallback::new(&runtime);
        let first = trampoline
            .get_jit_func(
                Arc::clone(&method),
                noop_handler,
                std::ptr::null_mut(),
                default_hidden_return,
            )
            .unwrap();
        let second = trampoline
            .get_jit_func(method, noop_handler, std::ptr::null_mut(), default_hidden_return)
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(runtime.emitted_count(), 1);
    }

    #[test]
    fn test_dead_runtime_fails_emission() {
        let runtime = JitRuntime::new();
        let mut trampoline = JitCallback::new(&runtime);
        drop(runtime);

        let method = Arc::new(Method::new("X", vec![], Property::new(ValueType::Void)));
        let err = trampoline
            .get_jit_func(method, noop_handler, std::ptr::null_mut(), default_hidden_return)
            .unwrap_err();
        assert_eq!(err, JitError::RuntimeInvalid);
        assert_eq!(trampoline.error(), Some(&JitError::RuntimeInvalid));
        assert!(trampoline.function().is_none());
    }

    #[test]
    fn test_width_error_is_retained() {
        let runtime = JitRuntime::new();
        let method = Arc::new(Method::new(
            "TakesArray",
            vec![Property::new(ValueType::ArrayDouble)],
            Property::new(ValueType::Void),
        ));

        let mut trampoline = JitCallback::new(&runtime);
        let err = trampoline
            .get_jit_func(method, noop_handler, std::ptr::null_mut(), default_hidden_return)
            .unwrap_err();
        assert_eq!(err, JitError::UnsupportedParameterWidth(ValueType::ArrayDouble));
        assert!(trampoline.error().is_some());
    }
}
