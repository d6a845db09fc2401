//! Single access point for the environment variables spec.md §6 names
//! (`BZR_SSH`, `BZR_PROGRESS_BAR`, `BZR_HOME`), the role
//! `eden/scm/lib/config` plays for the teacher's own configuration
//! surface: callers ask this struct, they never call `std::env::var`
//! directly, and an unrecognized value fails loudly rather than being
//! silently ignored.

use arbor_errors::{Error, Result};

const KNOWN_SSH_VENDORS: &[&str] = &["openssh", "putty", "plink", "paramiko", "none"];
const KNOWN_PROGRESS_BARS: &[&str] = &["none", "dummy", "text"];

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Environment {
    pub ssh_vendor: Option<String>,
    pub progress_bar: Option<String>,
    pub home: Option<String>,
}

impl Environment {
    /// Reads `BZR_SSH`/`BZR_PROGRESS_BAR`/`BZR_HOME` from the process
    /// environment, rejecting a recognized-but-invalid value for the
    /// first two rather than letting it surface later as a confusing
    /// transport or UI failure.
    pub fn from_process() -> Result<Self> {
        Self::from_vars(
            std::env::var("BZR_SSH").ok(),
            std::env::var("BZR_PROGRESS_BAR").ok(),
            std::env::var("BZR_HOME").ok(),
        )
    }

    pub fn from_vars(
        ssh_vendor: Option<String>,
        progress_bar: Option<String>,
        home: Option<String>,
    ) -> Result<Self> {
        if let Some(v) = &ssh_vendor {
            if !KNOWN_SSH_VENDORS.contains(&v.as_str()) {
                return Err(Error::Config(format!("unknown BZR_SSH vendor {v:?}")));
            }
        }
        if let Some(v) = &progress_bar {
            if !KNOWN_PROGRESS_BARS.contains(&v.as_str()) {
                return Err(Error::Config(format!("unknown BZR_PROGRESS_BAR kind {v:?}")));
            }
        }
        Ok(Environment {
            ssh_vendor,
            progress_bar,
            home,
        })
    }
}
