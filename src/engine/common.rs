// src/engine/common.rs
//
// Common utilities shared across engine modules.
// Provides the unified Result alias and the panic policy.

use crate::error::IpsError;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Unified Result type for the engine.
pub type EngineResult<T> = std::result::Result<T, IpsError>;

/// Run `f`, turning a panic into `IpsError::InternalPanic` tagged with `label`.
///
/// Decoders and transforms run under this policy so that a panic in third-party
/// code or in one tile never unwinds through a worker thread.
pub fn run_with_panic_policy<T, F>(label: &'static str, f: F) -> EngineResult<T>
where
    F: FnOnce() -> EngineResult<T>,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(IpsError::internal_panic(format!(
            "{label}: {}",
            panic_message(payload.as_ref())
        ))),
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_through_ok_and_err() {
        assert_eq!(run_with_panic_policy("ok", || Ok(7)).unwrap(), 7);
        let err = run_with_panic_policy::<(), _>("err", || Err(IpsError::decode_failed("x")))
            .unwrap_err();
        assert!(matches!(err, IpsError::DecodeFailed { .. }));
    }

    #[test]
    fn converts_panic_into_internal_error() {
        let err = run_with_panic_policy::<(), _>("tile", || panic!("boom")).unwrap_err();
        match err {
            IpsError::InternalPanic { message } => {
                assert!(message.contains("tile"));
                assert!(message.contains("boom"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
