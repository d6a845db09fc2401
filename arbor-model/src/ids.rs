use std::fmt;
use std::sync::Arc;

use arbor_errors::{Error, Result};

/// Sentinel denoting the empty pre-history: the implicit parent of a
/// tree's first revision. Never stored, never returned by a
/// `ParentsProvider`, and carries no parents of its own.
pub const NULL_REVISION: &str = "null:";

fn validate_id(s: &str) -> Result<()> {
    if s.is_empty() || s.bytes().any(|b| b.is_ascii_whitespace() || b == 0) {
        return Err(Error::InvalidRevisionId(Some(s.to_owned())));
    }
    Ok(())
}

macro_rules! opaque_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
        pub struct $name(Arc<str>);

        impl $name {
            pub fn new(s: impl Into<String>) -> Result<Self> {
                let s: String = s.into();
                validate_id(&s)?;
                Ok(Self(Arc::from(s)))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({:?})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

opaque_id!(
    RevisionId,
    "An opaque, immutable identifier for a revision. UTF-8, no whitespace, no NUL."
);
opaque_id!(
    FileId,
    "An opaque identifier for a tracked filesystem entry, stable across renames."
);

impl RevisionId {
    /// The distinguished [`NULL_REVISION`] value. Constructed without
    /// validation since `"null:"` itself would otherwise be a perfectly
    /// ordinary (if reserved) identifier.
    pub fn null() -> Self {
        Self(Arc::from(NULL_REVISION))
    }

    pub fn is_null(&self) -> bool {
        &*self.0 == NULL_REVISION
    }
}

impl Default for RevisionId {
    fn default() -> Self {
        Self::null()
    }
}
