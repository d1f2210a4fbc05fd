//! Per-thread last-error diagnostics.
//!
//! Every public [`crate::bridge::Bridge`] operation clears the calling thread's last error on
//! entry and records a code plus message when it fails. Callers that only see an `Option` (such
//! as lookups) can ask [`last_error`] why.

use std::cell::RefCell;

use strum::{Display, IntoStaticStr};

use crate::Error;

/// Numeric diagnostic codes, stable across releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
#[repr(i32)]
pub enum ErrorCode {
    /// No error
    Success = 0,
    /// The bridge is not initialised
    NotInitialized = 1,
    /// Bring-up failed
    InitFailed = 2,
    /// The runtime module could not be found or read
    ModuleNotFound = 3,
    /// A runtime symbol could not be resolved
    ExportNotFound = 4,
    /// An argument was invalid
    InvalidArgument = 100,
    /// A required handle was null
    NullPointer = 101,
    /// A class handle was invalid
    InvalidClass = 102,
    /// A method handle was invalid
    InvalidMethod = 103,
    /// A field handle was invalid
    InvalidField = 104,
    /// Class lookup failed
    ClassNotFound = 200,
    /// Method or property lookup failed
    MethodNotFound = 201,
    /// Field lookup failed
    FieldNotFound = 202,
    /// Assembly lookup failed
    AssemblyNotFound = 203,
    /// The runtime did not perform the invocation
    InvocationFailed = 300,
    /// The invoked method threw
    ExceptionThrown = 301,
    /// The calling thread is not registered with the runtime
    ThreadNotAttached = 302,
    /// A runtime allocation failed
    AllocationFailed = 400,
    /// A caller buffer was too small
    BufferTooSmall = 401,
    /// Anything else
    Unknown = -1,
}

impl ErrorCode {
    /// The numeric value of the code.
    #[must_use]
    pub fn value(self) -> i32 {
        self as i32
    }
}

/// Code and message of the most recent failure on a thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastError {
    /// Diagnostic code
    pub code: ErrorCode,
    /// Human readable description, empty on success
    pub message: String,
}

impl Default for LastError {
    fn default() -> Self {
        LastError {
            code: ErrorCode::Success,
            message: String::new(),
        }
    }
}

thread_local! {
    static LAST_ERROR: RefCell<LastError> = RefCell::new(LastError::default());
}

/// The calling thread's last error; [`ErrorCode::Success`] if the last operation succeeded.
#[must_use]
pub fn last_error() -> LastError {
    LAST_ERROR.with(|last| last.borrow().clone())
}

/// Resets the calling thread's last error to [`ErrorCode::Success`].
pub fn clear_last_error() {
    LAST_ERROR.with(|last| *last.borrow_mut() = LastError::default());
}

pub(crate) fn set_last_error(code: ErrorCode, message: impl Into<String>) {
    let message = message.into();
    LAST_ERROR.with(|last| *last.borrow_mut() = LastError { code, message });
}

pub(crate) fn record(error: &Error) {
    set_last_error(error.code(), error.to_string());
}

impl Error {
    /// The diagnostic code reported for this error.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::ModuleParse { .. } | Error::GoblinErr(_) | Error::ApiTableIncomplete { .. } => {
                ErrorCode::InitFailed
            }
            Error::FileError(_) => ErrorCode::ModuleNotFound,
            Error::Resolution { .. } => ErrorCode::ExportNotFound,
            Error::NotInitialized => ErrorCode::NotInitialized,
            Error::OutOfBounds
            | Error::Empty
            | Error::Marshal(_)
            | Error::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Error::LookupMiss(_) => ErrorCode::ClassNotFound,
            Error::ForeignException(_) => ErrorCode::ExceptionThrown,
            Error::ThreadNotRegistered => ErrorCode::ThreadNotAttached,
            Error::BufferTooSmall { .. } => ErrorCode::BufferTooSmall,
            Error::Error(_) => ErrorCode::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_match_their_values() {
        assert_eq!(ErrorCode::Success.value(), 0);
        assert_eq!(ErrorCode::ExportNotFound.value(), 4);
        assert_eq!(ErrorCode::InvalidField.value(), 104);
        assert_eq!(ErrorCode::AssemblyNotFound.value(), 203);
        assert_eq!(ErrorCode::ThreadNotAttached.value(), 302);
        assert_eq!(ErrorCode::BufferTooSmall.value(), 401);
        assert_eq!(ErrorCode::Unknown.value(), -1);
    }

    #[test]
    fn errors_map_to_codes() {
        assert_eq!(Error::NotInitialized.code(), ErrorCode::NotInitialized);
        assert_eq!(
            Error::ApiTableIncomplete { missing: vec![] }.code(),
            ErrorCode::InitFailed
        );
        assert_eq!(
            resolution_error!("il2cpp_domain_get", "not found").code(),
            ErrorCode::ExportNotFound
        );
        assert_eq!(Error::ThreadNotRegistered.code(), ErrorCode::ThreadNotAttached);
    }

    #[test]
    fn last_error_is_per_thread() {
        set_last_error(ErrorCode::ClassNotFound, "Game.Player");
        assert_eq!(last_error().code, ErrorCode::ClassNotFound);

        let other = std::thread::spawn(|| last_error().code).join().unwrap();
        assert_eq!(other, ErrorCode::Success);

        clear_last_error();
        assert_eq!(last_error(), LastError::default());
    }
}
