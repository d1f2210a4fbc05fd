use thiserror::Error;

use crate::handles::ObjectHandle;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::ModuleParse {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::ModuleParse {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! resolution_error {
    ($symbol:expr, $fmt:expr $(, $arg:expr)* $(,)?) => {
        crate::Error::Resolution {
            symbol: $symbol.to_string(),
            reason: format!($fmt $(, $arg)*),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// The variants follow the failure taxonomy of the bridge. Fatal categories
/// ([`Error::ModuleParse`], [`Error::ApiTableIncomplete`]) abort bring-up; everything else is a
/// local result the caller can branch on.
///
/// # Error Categories
///
/// ## Module Introspection
/// - [`Error::ModuleParse`] - Malformed PE headers, fatal at bring-up
/// - [`Error::OutOfBounds`] - Read outside of the module image
/// - [`Error::Empty`] - Empty input provided
/// - [`Error::FileError`] - Filesystem I/O errors
/// - [`Error::GoblinErr`] - PE parsing errors from goblin crate
///
/// ## Symbol Resolution
/// - [`Error::Resolution`] - Symbol unresolved by all strategies, or thunk depth exceeded
/// - [`Error::ApiTableIncomplete`] - A required runtime symbol is missing, fatal at bring-up
/// - [`Error::NotInitialized`] - Bridge bring-up failed or has not happened yet
///
/// ## Steady State
/// - [`Error::LookupMiss`] - Class, method, field or generic argument not found
/// - [`Error::Marshal`] - Unsupported value could not be marshaled
/// - [`Error::ForeignException`] - The invoked foreign method raised an exception
/// - [`Error::ThreadNotRegistered`] - Implicit thread registration failed
/// - [`Error::BufferTooSmall`] - Caller buffer too small for a string export
///
/// # Examples
///
/// ```rust,no_run
/// use il2scope::{Error, image::ModuleImage};
///
/// match ModuleImage::from_file("GameAssembly.dll".as_ref()) {
///     Ok(image) => println!("{} exports", image.exports().len()),
///     Err(Error::ModuleParse { message, file, line }) => {
///         eprintln!("Malformed module: {} ({}:{})", message, file, line);
///     }
///     Err(e) => eprintln!("Other error: {}", e),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The module headers are damaged and could not be parsed.
    ///
    /// Raised for bad `MZ` / `PE` magic, unknown optional header magic or a missing executable
    /// section. The error carries the source location where the malformation was detected.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed module - {file}:{line}: {message}")]
    ModuleParse {
        /// The message to be printed for the ModuleParse error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted while reading the module image.
    #[error("Out of Bound read would have occurred!")]
    OutOfBounds,

    /// Provided input was empty.
    #[error("Provided input was empty")]
    Empty,

    /// File I/O error.
    ///
    /// Wraps standard I/O errors from loading module dumps or writing diagnostic reports.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// Error from the goblin crate during PE parsing.
    #[error("{0}")]
    GoblinErr(#[from] goblin::error::Error),

    /// A symbol could not be resolved.
    ///
    /// Either every strategy of the fallback chain failed, or thunk following exceeded its hop
    /// bound or left the module. The resolver never substitutes a guessed address.
    #[error("Failed to resolve '{symbol}': {reason}")]
    Resolution {
        /// Canonical name of the symbol
        symbol: String,
        /// Why the last strategy gave up
        reason: String,
    },

    /// One or more required runtime symbols are missing.
    ///
    /// Fatal during bring-up; the bridge refuses to initialise and every later call fails with
    /// [`Error::NotInitialized`].
    #[error("Runtime API table incomplete, missing: {}", missing.join(", "))]
    ApiTableIncomplete {
        /// Names of the unresolved required symbols
        missing: Vec<String>,
    },

    /// The bridge is not initialised.
    #[error("Bridge is not initialized")]
    NotInitialized,

    /// A class, method, field, property or generic type argument was not found.
    ///
    /// Lookups report misses as `Ok(None)`; this variant is used where a miss has to abort a
    /// composite operation, such as generic instantiation.
    #[error("Lookup miss - {0}")]
    LookupMiss(String),

    /// A value could not be marshaled.
    ///
    /// Outbound marshaling degrades to a zero pointer and keeps going; this variant records
    /// what was dropped.
    #[error("Marshal error - {0}")]
    Marshal(String),

    /// The invoked foreign method raised an exception.
    ///
    /// The exception object is carried as data so the caller can inspect it. The return value
    /// of the failed call is never read.
    #[error("Foreign exception raised - {0:?}")]
    ForeignException(ObjectHandle),

    /// The calling thread could not be registered with the foreign runtime.
    #[error("Failed to register the current thread with the runtime")]
    ThreadNotRegistered,

    /// A caller-provided buffer cannot hold the result.
    ///
    /// The buffer still receives as much as fits, NUL-terminated.
    #[error("Buffer too small, {required} bytes required")]
    BufferTooSmall {
        /// Bytes needed including the terminating NUL
        required: usize,
    },

    /// An argument passed to the bridge was invalid.
    #[error("Invalid argument - {0}")]
    InvalidArgument(String),

    /// Generic error for miscellaneous failures.
    #[error("{0}")]
    Error(String),
}
