//! # Plugify JIT
//!
//! Runtime trampoline generation: given an abstract [`Method`] signature,
//! this crate materialises native functions whose ABI matches the signature
//! and which marshal every call through a uniform dispatch callback.
//!
//! Two flavours exist:
//!
//! - [`JitCallback`] — *exported by the host to a guest*. The emitted
//!   function receives ordinary native arguments, stores them into a
//!   contiguous array of machine-pointer-sized slots, invokes the
//!   [`MethodHandler`] with a [`Parameters`] view over that array, and
//!   returns whatever the handler placed in the [`ReturnValue`] slot.
//! - [`JitCall`] — *host calling into a guest*. The emitted function has
//!   the fixed shape `fn(*const Parameters, *mut ReturnValue)`; it loads
//!   each slot into the correct ABI position per the signature, performs
//!   the indirect call to the target, and stores the native return into the
//!   result slot.
//!
//! Emitted code is owned by the trampoline object and released when it is
//! dropped. Emission requires a live [`JitRuntime`]; trampolines keep only
//! a weak back-reference, so dropping the runtime invalidates future emits
//! without revoking code that already exists.
//!
//! [`Method`]: plugify_core::Method

pub mod call;
pub mod callback;
pub mod error;
pub mod runtime;
pub mod signature;
pub mod slots;

pub use call::{CallFn, JitCall};
pub use callback::{JitCallback, MethodHandler};
pub use error::JitError;
pub use runtime::JitRuntime;
pub use signature::{default_hidden_return, HiddenReturnPolicy, MAX_ARGS};
pub use slots::{Parameters, ReturnValue};
