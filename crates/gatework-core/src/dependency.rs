//! # Dependency Strings
//!
//! A component scene is referenced by a dependency string:
//!
//! - `author/name/version`: a published component, fetchable remotely
//! - `local/name/version`: a component that only exists in local storage
//! - `@name`: a standard-library component, only ever held in memory
//!
//! Segments are non-empty, limited to `[A-Za-z0-9_.-]` and never made of
//! dots alone, so a key always maps inside the library root. The version
//! is an unsigned integer.

use crate::GateworkError;
use crate::primitives::COMPONENT_EXTENSION;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Author segment reserved for local-only components.
pub const LOCAL_AUTHOR: &str = "local";

/// Prefix of standard-library dependency strings.
pub const STD_PREFIX: char = '@';

/// Where a dependency is allowed to come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DependencySource {
    /// Published component: store first, then a remote source.
    Remote,
    /// Local storage only.
    Local,
    /// In-memory standard library only.
    Std,
}

/// A parsed dependency string.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DependencyKey {
    Std {
        name: String,
    },
    Stored {
        author: String,
        name: String,
        version: u32,
    },
}

fn valid_segment(segment: &str) -> bool {
    !segment.is_empty()
        && !segment.chars().all(|c| c == '.')
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

impl DependencyKey {
    /// Parse and validate a dependency string.
    pub fn parse(key: &str) -> Result<Self, GateworkError> {
        let invalid = || GateworkError::InvalidDependencyFormat(key.to_string());

        if let Some(name) = key.strip_prefix(STD_PREFIX) {
            return if valid_segment(name) {
                Ok(Self::Std {
                    name: name.to_string(),
                })
            } else {
                Err(invalid())
            };
        }

        let mut parts = key.split('/');
        let (Some(author), Some(name), Some(version), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };
        if !valid_segment(author) || !valid_segment(name) {
            return Err(invalid());
        }
        if !version.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let version = version.parse::<u32>().map_err(|_| invalid())?;

        Ok(Self::Stored {
            author: author.to_string(),
            name: name.to_string(),
            version,
        })
    }

    /// Where this dependency may be loaded from.
    #[must_use]
    pub fn source(&self) -> DependencySource {
        match self {
            Self::Std { .. } => DependencySource::Std,
            Self::Stored { author, .. } if author == LOCAL_AUTHOR => DependencySource::Local,
            Self::Stored { .. } => DependencySource::Remote,
        }
    }

    /// Component name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Std { name } | Self::Stored { name, .. } => name,
        }
    }

    /// Path of the component document under a library root.
    ///
    /// Standard-library components and keys built with segments that
    /// [`DependencyKey::parse`] would reject have no path.
    #[must_use]
    pub fn path_in(&self, root: &Path) -> Option<PathBuf> {
        match self {
            Self::Std { .. } => None,
            Self::Stored { author, name, .. }
                if !valid_segment(author) || !valid_segment(name) =>
            {
                None
            }
            Self::Stored {
                author,
                name,
                version,
            } => Some(
                root.join(author)
                    .join(name)
                    .join(format!("{version}.{COMPONENT_EXTENSION}")),
            ),
        }
    }
}

impl FromStr for DependencyKey {
    type Err = GateworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for DependencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Std { name } => write!(f, "{STD_PREFIX}{name}"),
            Self::Stored {
                author,
                name,
                version,
            } => write!(f, "{author}/{name}/{version}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_published_key() {
        let key = DependencyKey::parse("alice/adder-4bit/3").expect("parse");
        assert_eq!(key.source(), DependencySource::Remote);
        assert_eq!(key.name(), "adder-4bit");
        assert_eq!(key.to_string(), "alice/adder-4bit/3");
    }

    #[test]
    fn local_and_std_sources() {
        assert_eq!(
            DependencyKey::parse("local/mux/1").expect("parse").source(),
            DependencySource::Local
        );
        assert_eq!(
            DependencyKey::parse("@half_adder").expect("parse").source(),
            DependencySource::Std
        );
    }

    #[test]
    fn rejects_malformed_keys() {
        for bad in [
            "",
            "@",
            "alice/mux",
            "alice/mux/1/2",
            "alice//1",
            "alice/mux/v1",
            "alice/mux/-1",
            "alice/mux/99999999999",
            "al ice/mux/1",
            "@std/mux",
            "../x/1",
            "a/../1",
            "./mux/1",
            "alice/.../1",
            "@..",
        ] {
            assert!(
                matches!(
                    DependencyKey::parse(bad),
                    Err(GateworkError::InvalidDependencyFormat(_))
                ),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn storage_path_layout() {
        let key = DependencyKey::parse("bob/alu/12").expect("parse");
        let path = key.path_in(Path::new("/lib")).expect("path");
        assert_eq!(path, Path::new("/lib/bob/alu/12.gwc"));
        assert!(DependencyKey::parse("@not").expect("parse").path_in(Path::new("/lib")).is_none());
    }

    #[test]
    fn dotted_names_stay_valid() {
        let key = DependencyKey::parse("alice/mux.v2/1").expect("parse");
        assert_eq!(
            key.path_in(Path::new("/lib")).expect("path"),
            Path::new("/lib/alice/mux.v2/1.gwc")
        );
    }

    #[test]
    fn hand_built_parent_segment_has_no_path() {
        let key = DependencyKey::Stored {
            author: "..".to_string(),
            name: "escaped".to_string(),
            version: 1,
        };
        assert!(key.path_in(Path::new("/lib")).is_none());
    }
}
