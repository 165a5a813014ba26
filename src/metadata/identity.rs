//! Assembly names: simple name, four-part version, culture and strong-name key.
//!
//! [`AssemblyIdentity`] is what the emitter writes into the `Assembly` and `AssemblyRef` rows and
//! what the reader recovers from a reference assembly, so equality follows the binder: the
//! public key and its token are two spellings of the same strong name and compare by token.

use std::{fmt, fmt::Write, str::FromStr};

use crate::{metadata::strongname::public_key_token, Error, Result};

/// Four-part assembly version.
///
/// ```rust
/// use tlbscope::metadata::identity::AssemblyVersion;
///
/// let version = AssemblyVersion::parse("2.1")?;
/// assert_eq!(version, AssemblyVersion::new(2, 1, 0, 0));
/// assert_eq!(version.to_string(), "2.1.0.0");
/// # Ok::<(), tlbscope::Error>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct AssemblyVersion {
    /// Major version
    pub major: u16,
    /// Minor version
    pub minor: u16,
    /// Build number
    pub build: u16,
    /// Revision number
    pub revision: u16,
}

impl AssemblyVersion {
    /// Build a version from its parts.
    #[must_use]
    pub const fn new(major: u16, minor: u16, build: u16, revision: u16) -> Self {
        AssemblyVersion {
            major,
            minor,
            build,
            revision,
        }
    }

    /// Parse one to four dot-separated components; missing ones are zero.
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] for more than four parts or a non-numeric component.
    pub fn parse(version_str: &str) -> Result<Self> {
        let parts: Vec<&str> = version_str.trim().split('.').collect();
        if parts.len() > 4 {
            return Err(malformed_error!("Invalid version format: {}", version_str));
        }

        let mut components = [0_u16; 4];
        for (slot, part) in components.iter_mut().zip(&parts) {
            *slot = part
                .parse::<u16>()
                .map_err(|_| malformed_error!("Invalid version component: {}", part))?;
        }

        Ok(Self::new(
            components[0],
            components[1],
            components[2],
            components[3],
        ))
    }
}

impl fmt::Display for AssemblyVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.build, self.revision
        )
    }
}

impl FromStr for AssemblyVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Strong-name part of an identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StrongName {
    /// The full public key blob
    PublicKey(Vec<u8>),
    /// The 8 byte public key token
    Token([u8; 8]),
}

impl StrongName {
    /// The public key token, computed for full keys.
    #[must_use]
    pub fn token(&self) -> [u8; 8] {
        match self {
            StrongName::PublicKey(key) => public_key_token(key),
            StrongName::Token(token) => *token,
        }
    }
}

/// Name of an assembly.
#[derive(Debug, Clone)]
pub struct AssemblyIdentity {
    /// Simple name
    pub name: String,
    /// Version
    pub version: AssemblyVersion,
    /// Culture, `None` for neutral
    pub culture: Option<String>,
    /// Public key or token of a strong-named assembly
    pub strong_name: Option<StrongName>,
}

impl PartialEq for AssemblyIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.name.eq_ignore_ascii_case(&other.name)
            && self.version == other.version
            && self.culture == other.culture
            && self.token() == other.token()
    }
}

impl Eq for AssemblyIdentity {}

impl std::hash::Hash for AssemblyIdentity {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.name.to_ascii_lowercase().hash(state);
        self.version.hash(state);
        self.culture.hash(state);
        self.token().hash(state);
    }
}

impl AssemblyIdentity {
    /// A culture-neutral, unsigned identity.
    #[must_use]
    pub fn new(name: impl Into<String>, version: AssemblyVersion) -> Self {
        AssemblyIdentity {
            name: name.into(),
            version,
            culture: None,
            strong_name: None,
        }
    }

    /// `mscorlib, Version=4.0.0.0, PublicKeyToken=b77a5c561934e089`, the scope of every
    /// framework type the importer references.
    #[must_use]
    pub fn mscorlib() -> Self {
        AssemblyIdentity::new("mscorlib", AssemblyVersion::new(4, 0, 0, 0))
            .with_token([0xb7, 0x7a, 0x5c, 0x56, 0x19, 0x34, 0xe0, 0x89])
    }

    /// Set the culture; empty and `neutral` mean none.
    #[must_use]
    pub fn with_culture(mut self, culture: &str) -> Self {
        self.culture = match culture {
            "" | "neutral" => None,
            other => Some(other.to_string()),
        };
        self
    }

    /// Attach a full public key.
    #[must_use]
    pub fn with_public_key(mut self, public_key: &[u8]) -> Self {
        self.strong_name = (!public_key.is_empty()).then(|| StrongName::PublicKey(public_key.to_vec()));
        self
    }

    /// Attach a public key token.
    #[must_use]
    pub fn with_token(mut self, token: [u8; 8]) -> Self {
        self.strong_name = Some(StrongName::Token(token));
        self
    }

    /// The public key token, `None` for unsigned assemblies.
    #[must_use]
    pub fn token(&self) -> Option<[u8; 8]> {
        self.strong_name.as_ref().map(StrongName::token)
    }

    /// The full public key, if known.
    #[must_use]
    pub fn public_key(&self) -> Option<&[u8]> {
        match &self.strong_name {
            Some(StrongName::PublicKey(key)) => Some(key),
            _ => None,
        }
    }

    /// `Name, Version=a.b.c.d, Culture=neutral, PublicKeyToken=null`
    #[must_use]
    pub fn display_name(&self) -> String {
        let mut result = String::with_capacity(self.name.len() + 80);
        result.push_str(&self.name);
        let _ = write!(result, ", Version={}", self.version);
        let _ = write!(
            result,
            ", Culture={}",
            self.culture.as_deref().unwrap_or("neutral")
        );

        result.push_str(", PublicKeyToken=");
        match self.token() {
            Some(token) => {
                for byte in token {
                    let _ = write!(result, "{byte:02x}");
                }
            }
            None => result.push_str("null"),
        }
        result
    }
}

impl fmt::Display for AssemblyIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_parsing() {
        assert_eq!(
            AssemblyVersion::parse("1.2.3.4").unwrap(),
            AssemblyVersion::new(1, 2, 3, 4)
        );
        assert_eq!(
            "3".parse::<AssemblyVersion>().unwrap(),
            AssemblyVersion::new(3, 0, 0, 0)
        );
        assert!(AssemblyVersion::parse("1.2.3.4.5").is_err());
        assert!(AssemblyVersion::parse("1.x").is_err());
        assert!(AssemblyVersion::parse("70000").is_err());
    }

    #[test]
    fn display_names() {
        assert_eq!(
            AssemblyIdentity::mscorlib().display_name(),
            "mscorlib, Version=4.0.0.0, Culture=neutral, PublicKeyToken=b77a5c561934e089"
        );
        let local = AssemblyIdentity::new("Interop.Shapes", AssemblyVersion::new(1, 0, 0, 0))
            .with_culture("neutral");
        assert_eq!(
            local.to_string(),
            "Interop.Shapes, Version=1.0.0.0, Culture=neutral, PublicKeyToken=null"
        );
    }

    #[test]
    fn key_and_token_compare_equal() {
        let ecma = [0, 0, 0, 0, 0, 0, 0, 0, 4, 0, 0, 0, 0, 0, 0, 0];
        let by_key = AssemblyIdentity::new("MSCORLIB", AssemblyVersion::new(4, 0, 0, 0))
            .with_public_key(&ecma);
        assert_eq!(by_key, AssemblyIdentity::mscorlib());
        assert_ne!(
            by_key,
            AssemblyIdentity::new("mscorlib", AssemblyVersion::new(4, 0, 0, 0))
        );
    }
}
