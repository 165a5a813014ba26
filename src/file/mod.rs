//! Low-level byte access shared by the type library reader and the assembly reader/writer.
//!
//! - [`io`] little-endian primitive reads and appending writes
//! - [`parser`] a bounds-checked cursor over a byte slice
//! - [`physical`] memory-mapped input files
//! - [`output`] memory-mapped output files

pub(crate) mod io;
pub(crate) mod output;
pub(crate) mod parser;
pub(crate) mod physical;

pub use output::Output;
pub use parser::Parser;
pub use physical::Physical;
