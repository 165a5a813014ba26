//! Diagnostics reported while importing.
//!
//! Every event the importer wants the user to see is a [`Diagnostic`] carrying a severity and
//! a numeric `TI` code, rendered as `<severity> TI<code>: <message>`. Codes are grouped by
//! policy:
//!
//! - `TI1xxx` fatal for the whole run
//! - `TI2xxx` a member was adjusted, the import continues
//! - `TI3xxx` a type could not be completed and was emitted partially
//! - `TI4xxx` informational, kept only in verbose mode
//!
//! The [`Diagnostics`] sink keeps entries in emission order, mirrors each accepted entry to the
//! `log` facade and drops silenced codes.

use std::{collections::HashSet, fmt};

use crate::Error;

/// Diagnostic codes.
pub mod codes {
    /// The source library cannot be opened or decoded
    pub const LIBRARY_UNREADABLE: u16 = 1001;
    /// A dependency could not be located
    pub const DEPENDENCY_MISSING: u16 = 1002;
    /// An output could not be written
    pub const OUTPUT_FAILED: u16 = 1003;
    /// The signing key is unusable
    pub const KEY_INVALID: u16 = 1004;
    /// A member was renamed to avoid a collision
    pub const NAME_COLLISION: u16 = 2001;
    /// A descriptor flag has no projection and was ignored
    pub const UNSUPPORTED_FLAG: u16 = 2002;
    /// A default value cannot be represented and was omitted
    pub const DEFAULT_OMITTED: u16 = 2003;
    /// A default value is present without `opt` or `hasdefault`
    pub const DEFAULT_AMBIGUOUS: u16 = 2004;
    /// A type has no managed equivalent and was replaced
    pub const TYPE_REPLACED: u16 = 2005;
    /// An enum's underlying type was widened to hold every constant
    pub const ENUM_WIDENED: u16 = 2006;
    /// A type descriptor could not be read
    pub const DESCRIPTOR_UNREADABLE: u16 = 3001;
    /// A type reference could not be resolved
    pub const REFERENCE_UNRESOLVED: u16 = 3002;
    /// An alias chain loops
    pub const ALIAS_CYCLE: u16 = 3003;
    /// A dependent library is imported into its own assembly
    pub const DEPENDENCY_IMPORTED: u16 = 4001;
    /// A pseudo-custom attribute was folded into flags
    pub const PSEUDO_ATTRIBUTE_FOLDED: u16 = 4002;
    /// A type was taken from a reference assembly
    pub const REFERENCE_USED: u16 = 4003;
}

/// How severe a diagnostic is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Severity {
    /// Kept only in verbose mode
    Info,
    /// The import continues with an adjustment
    Warning,
    /// The import, or one type of it, failed
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// A single diagnostic entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Severity
    pub severity: Severity,
    /// `TI` code
    pub code: u16,
    /// Human readable message
    pub message: String,
}

impl Diagnostic {
    /// Create a diagnostic.
    pub fn new(severity: Severity, code: u16, message: impl Into<String>) -> Self {
        Diagnostic {
            severity,
            code,
            message: message.into(),
        }
    }

    /// The fatal-global diagnostic describing `error`, for front ends reporting a failed run.
    #[must_use]
    pub fn from_error(error: &Error) -> Self {
        let code = match error {
            Error::MissingDependency { .. } | Error::RefNotFound { .. } => {
                codes::DEPENDENCY_MISSING
            }
            Error::InvalidKey(_) => codes::KEY_INVALID,
            Error::AlreadySaved(_)
            | Error::NoModule
            | Error::MultipleModules
            | Error::FileError(_)
            | Error::GoblinErr(_) => codes::OUTPUT_FAILED,
            _ => codes::LIBRARY_UNREADABLE,
        };
        Diagnostic::new(Severity::Error, code, error.to_string())
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} TI{}: {}", self.severity, self.code, self.message)
    }
}

/// Ordered collection of the diagnostics of one run.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
    silenced: HashSet<u16>,
    verbose: bool,
}

impl Diagnostics {
    /// A sink that drops `silenced` codes and, unless `verbose`, informational entries.
    #[must_use]
    pub fn new(silenced: HashSet<u16>, verbose: bool) -> Self {
        Diagnostics {
            entries: Vec::new(),
            silenced,
            verbose,
        }
    }

    /// Record `diagnostic` unless it is filtered out or already recorded.
    pub fn push(&mut self, diagnostic: Diagnostic) {
        if self.silenced.contains(&diagnostic.code) || self.entries.contains(&diagnostic) {
            return;
        }
        // front ends print the collected entries, the log only traces them
        log::debug!("{diagnostic}");
        if diagnostic.severity == Severity::Info && !self.verbose {
            return;
        }
        self.entries.push(diagnostic);
    }

    /// Record an informational entry.
    pub fn info(&mut self, code: u16, message: impl Into<String>) {
        self.push(Diagnostic::new(Severity::Info, code, message));
    }

    /// Record a warning.
    pub fn warning(&mut self, code: u16, message: impl Into<String>) {
        self.push(Diagnostic::new(Severity::Warning, code, message));
    }

    /// Record an error.
    pub fn error(&mut self, code: u16, message: impl Into<String>) {
        self.push(Diagnostic::new(Severity::Error, code, message));
    }

    /// Entries in emission order.
    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    /// Number of recorded entries.
    #[must_use]
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    /// `true` if any entry is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.severity == Severity::Error)
    }

    /// Entries with `code`.
    pub fn with_code(&self, code: u16) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter().filter(move |entry| entry.code == code)
    }

    /// Take the recorded entries.
    #[must_use]
    pub fn into_entries(self) -> Vec<Diagnostic> {
        self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_format() {
        let diagnostic = Diagnostic::new(
            Severity::Warning,
            codes::NAME_COLLISION,
            "member name 'Do' duplicated, renamed to 'Do_2'",
        );
        assert_eq!(
            diagnostic.to_string(),
            "warning TI2001: member name 'Do' duplicated, renamed to 'Do_2'"
        );
        assert_eq!(
            Diagnostic::new(Severity::Error, 3001, "type '(unnamed)'").to_string(),
            "error TI3001: type '(unnamed)'"
        );
    }

    #[test]
    fn filtering() {
        let mut quiet = Diagnostics::new(HashSet::from([codes::DEFAULT_OMITTED]), false);
        quiet.warning(codes::DEFAULT_OMITTED, "silenced");
        quiet.info(codes::DEPENDENCY_IMPORTED, "dropped when not verbose");
        quiet.warning(codes::NAME_COLLISION, "kept");
        quiet.warning(codes::NAME_COLLISION, "kept");
        assert_eq!(quiet.count(), 1);
        assert!(!quiet.has_errors());

        let mut verbose = Diagnostics::new(HashSet::new(), true);
        verbose.info(codes::DEPENDENCY_IMPORTED, "kept");
        verbose.error(codes::DESCRIPTOR_UNREADABLE, "bad");
        assert_eq!(verbose.count(), 2);
        assert!(verbose.has_errors());
        assert_eq!(verbose.with_code(codes::DEPENDENCY_IMPORTED).count(), 1);

        let entries = verbose.into_entries();
        assert_eq!(entries[0].severity, Severity::Info);
        assert_eq!(entries[1].severity, Severity::Error);
    }

    #[test]
    fn fatal_codes() {
        let missing = Error::MissingDependency {
            library: "A".into(),
            needed_by: "B".into(),
        };
        assert_eq!(Diagnostic::from_error(&missing).code, codes::DEPENDENCY_MISSING);
        assert_eq!(
            Diagnostic::from_error(&Error::InvalidKey("short".into())).code,
            codes::KEY_INVALID
        );
        assert_eq!(
            Diagnostic::from_error(&malformed_error!("broken")).code,
            codes::LIBRARY_UNREADABLE
        );
    }
}
