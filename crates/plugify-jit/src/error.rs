//! Trampoline emission errors.

use plugify_core::ValueType;
use thiserror::Error;

/// Errors reported by trampoline emission.
///
/// Errors are also retained on the trampoline object (`error()`); callers
/// that observe a missing address must not invoke.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum JitError {
    /// The backing [`JitRuntime`](crate::JitRuntime) has been released.
    #[error("JIT runtime invalid")]
    RuntimeInvalid,

    /// A by-value parameter does not fit a machine-pointer-sized slot.
    #[error("parameter type '{0:?}' is wider than a machine pointer; pass it by reference")]
    UnsupportedParameterWidth(ValueType),

    /// The signature could not be lowered to a native ABI.
    #[error("failed emitting trampoline: {0}")]
    Emit(String),
}
