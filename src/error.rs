use std::path::PathBuf;

use thiserror::Error;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! out_of_bounds_error {
    () => {
        crate::Error::OutOfBounds {
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// # Error Categories
///
/// ## Source library errors
/// - [`Error::NotFound`] - The type library file does not exist
/// - [`Error::BadFormat`] - The file is not a type library this crate can decode
/// - [`Error::PlatformMismatch`] - The library targets a different platform than requested
/// - [`Error::Malformed`] - Corrupted or invalid structure inside a library or assembly
/// - [`Error::OutOfBounds`] - Attempted to read beyond a buffer boundary
///
/// ## Reference errors
/// - [`Error::RefNotFound`] - An `HREFTYPE` could not be resolved inside its library
/// - [`Error::MissingDependency`] - A referenced library could not be located or imported
/// - [`Error::AliasCycle`] - An alias chain loops back onto itself
///
/// ## Emission errors
/// - [`Error::MultipleModules`] / [`Error::NoModule`] - Module contract violations
/// - [`Error::AlreadySaved`] - An assembly was saved twice
/// - [`Error::InvalidKey`] - The strong-name key material could not be used
///
/// ## I/O and external errors
/// - [`Error::FileError`] - Filesystem I/O errors
/// - [`Error::GoblinErr`] - PE parsing errors from the goblin crate
///
/// # Examples
///
/// ```rust,no_run
/// use tlbscope::{Error, typelib::{OpenFlags, TypeLib}};
///
/// match TypeLib::open("stdole2.tlb", OpenFlags::empty()) {
///     Ok(lib) => println!("{} types", lib.type_count()),
///     Err(Error::BadFormat { path, status }) => eprintln!("{path}: {status:#010x}"),
///     Err(e) => eprintln!("{e}"),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The data is damaged and could not be parsed.
    ///
    /// The error includes the source location where the malformation was detected.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted while parsing.
    #[error("Out of Bound read would have occurred! - {file}:{line}")]
    OutOfBounds {
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// The requested feature or encoding is not supported.
    #[error("Not supported - {0}")]
    NotSupported(String),

    /// File I/O error.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// Error from the goblin crate during PE parsing.
    #[error("{0}")]
    GoblinErr(#[from] goblin::error::Error),

    /// The type library could not be located.
    #[error("Type library not found - {path}")]
    NotFound {
        /// The path or name that was looked up
        path: String,
    },

    /// The file exists but is not a decodable type library.
    ///
    /// `status` carries the typelib status code describing the rejection, see
    /// [`crate::typelib::status`].
    #[error("Bad type library format - {path} (status {status:#010x})")]
    BadFormat {
        /// The path or name of the rejected library
        path: String,
        /// The originating status code
        status: u32,
    },

    /// The library was built for a platform other than the one requested.
    #[error("Platform mismatch - {path}: expected {expected}, found {found}")]
    PlatformMismatch {
        /// The path or name of the library
        path: String,
        /// The platform that was requested
        expected: String,
        /// The platform declared by the library
        found: String,
    },

    /// A reference handle could not be resolved inside its library.
    #[error("Reference {href:#x} not found in {library} (status {status:#010x})")]
    RefNotFound {
        /// The name of the library that was searched
        library: String,
        /// The unresolved `HREFTYPE`
        href: u32,
        /// The originating status code
        status: u32,
    },

    /// A dependent library could neither be found in the references nor be imported.
    #[error("Missing dependency - {library} (needed by {needed_by})")]
    MissingDependency {
        /// The name of the dependency
        library: String,
        /// The library that referenced it
        needed_by: String,
    },

    /// An alias chain refers back to itself.
    #[error("Alias cycle detected at '{0}'")]
    AliasCycle(String),

    /// A second module was defined for an assembly.
    #[error("An assembly can only contain a single module")]
    MultipleModules,

    /// The assembly was serialized before a module was defined.
    #[error("No module has been defined for this assembly")]
    NoModule,

    /// The assembly has already been written once.
    #[error("Assembly has already been saved to {0}")]
    AlreadySaved(PathBuf),

    /// The strong-name key material could not be used.
    #[error("Invalid strong-name key - {0}")]
    InvalidKey(String),

    /// Recursion limit reached.
    ///
    /// The associated value shows the recursion limit that was reached.
    #[error("Reach the maximum recursion level allowed - {0}")]
    RecursionLimit(usize),

    /// Generic error for miscellaneous failures.
    #[error("{0}")]
    Error(String),
}

impl Error {
    /// Process exit code the command line front end reports for this error.
    ///
    /// `1` for I/O and PE-format problems, `2` for unresolvable references, `3` for
    /// malformed source libraries.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::MissingDependency { .. } | Error::RefNotFound { .. } => 2,
            Error::Malformed { .. }
            | Error::OutOfBounds { .. }
            | Error::BadFormat { .. }
            | Error::PlatformMismatch { .. }
            | Error::AliasCycle(_)
            | Error::RecursionLimit(_) => 3,
            _ => 1,
        }
    }
}
