//! `ControlDir`: the format-and-layout orchestrator over one [`Transport`]
//! root, the Rust shape of `bzrlib.bzrdir.BzrDir` without the
//! working-tree and plugin-format machinery this workspace has no use
//! for.
//!
//! A control dir's root holds a `branch-format` file (the signature
//! [`Format`] probing reads, spec.md §4.5/§6) and a `branch/` transport
//! subdirectory a [`Branch`] persists its own state under. An optional
//! `branch-reference` file redirects opening to another location
//! entirely — the mechanism [`crate::safe_open::SafeBranchOpener`]
//! walks and polices.

use std::path::PathBuf;

use arbor_errors::{Error, Result};
use arbor_repo::{default_prober_chain, Format, Knit1Format, ProberChain, Repository, RichRootFormat};
use arbor_transport::Transport;

use crate::branch::Branch;

const FORMAT_FILE: &str = "branch-format";
const BRANCH_DIR: &str = "branch";
const BRANCH_REFERENCE_FILE: &str = "branch-reference";

pub struct ControlDir {
    transport: Box<dyn Transport>,
    format: Box<dyn Format>,
}

impl ControlDir {
    /// Lays down a fresh control dir: writes the format signature and
    /// creates the `branch/` subdirectory a later `create_branch` will
    /// use. Does not itself create a branch — callers that want one
    /// immediately call `create_branch` right after.
    pub fn initialize(transport: Box<dyn Transport>, format: Box<dyn Format>) -> Result<Self> {
        transport.put(FORMAT_FILE, format.signature())?;
        transport.mkdir(BRANCH_DIR)?;
        Ok(ControlDir { transport, format })
    }

    pub fn open(transport: Box<dyn Transport>) -> Result<Self> {
        Self::open_with_probers(transport, &default_prober_chain())
    }

    pub fn open_with_probers(transport: Box<dyn Transport>, probers: &ProberChain) -> Result<Self> {
        if !transport.has(FORMAT_FILE) {
            return Err(Error::NotBranch(PathBuf::from(transport.abspath(""))));
        }
        let signature = transport.get(FORMAT_FILE)?;
        let probed = probers.probe(&signature)?;
        Ok(ControlDir {
            transport,
            format: owned_format(probed),
        })
    }

    pub fn format(&self) -> &dyn Format {
        self.format.as_ref()
    }

    pub fn create_branch(&self) -> Result<Branch> {
        Branch::create(self.transport.clone_transport(BRANCH_DIR))
    }

    pub fn open_branch(&self) -> Result<Branch> {
        Branch::open(self.transport.clone_transport(BRANCH_DIR))
    }

    /// A fresh, empty [`Repository`] in this control dir's format. Unlike
    /// `Branch`, `Repository` is never itself persisted through a
    /// transport (spec.md §9's design notes: it is a session object the
    /// caller holds and feeds through `fetch`), so this simply stamps out
    /// a new one using the format this control dir was initialized with.
    pub fn create_repository(&self) -> Repository {
        Repository::new(owned_format(self.format.as_ref()))
    }

    pub fn find_repository(&self) -> Result<Repository> {
        Ok(self.create_repository())
    }

    /// The target URL of this control dir's branch reference, if it has
    /// one — a pointer-only control dir whose branch actually lives
    /// elsewhere.
    pub fn branch_reference(&self) -> Result<Option<String>> {
        if !self.transport.has(BRANCH_REFERENCE_FILE) {
            return Ok(None);
        }
        let bytes = self.transport.get(BRANCH_REFERENCE_FILE)?;
        let text = String::from_utf8_lossy(&bytes).trim().to_string();
        if text.is_empty() {
            Ok(None)
        } else {
            Ok(Some(text))
        }
    }

    pub fn set_branch_reference(&self, target_url: &str) -> Result<()> {
        self.transport.put(BRANCH_REFERENCE_FILE, target_url.as_bytes())
    }
}

/// Maps a probed `&'static dyn Format` back to an owned `Box<dyn
/// Format>` `Repository::new` needs. Both shipped formats are
/// zero-sized marker types, so this is a cheap signature match rather
/// than a real clone.
fn owned_format(format: &dyn Format) -> Box<dyn Format> {
    if format.signature() == Knit1Format.signature() {
        Box::new(Knit1Format)
    } else if format.signature() == RichRootFormat.signature() {
        Box::new(RichRootFormat)
    } else {
        Box::new(Knit1Format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_transport::LocalTransport;

    fn transport_at(dir: &std::path::Path) -> Box<dyn Transport> {
        std::fs::create_dir_all(dir).unwrap();
        Box::new(LocalTransport::new(dir))
    }

    #[test]
    fn initialize_then_open_recovers_format() {
        let dir = tempfile::tempdir().unwrap();
        ControlDir::initialize(transport_at(dir.path()), Box::new(RichRootFormat)).unwrap();

        let reopened = ControlDir::open(transport_at(dir.path())).unwrap();
        assert!(reopened.format().rich_root_data());
    }

    #[test]
    fn open_without_format_file_is_not_a_branch() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path()).unwrap();
        assert!(matches!(
            ControlDir::open(transport_at(dir.path())),
            Err(Error::NotBranch(_))
        ));
    }

    #[test]
    fn create_branch_then_open_branch_round_trips_history() {
        use arbor_model::RevisionId;

        let dir = tempfile::tempdir().unwrap();
        let control_dir = ControlDir::initialize(transport_at(dir.path()), Box::new(Knit1Format)).unwrap();
        let mut branch = control_dir.create_branch().unwrap();
        branch
            .append_revision(RevisionId::new("r1").unwrap())
            .unwrap();

        let reopened_control_dir = ControlDir::open(transport_at(dir.path())).unwrap();
        let reopened_branch = reopened_control_dir.open_branch().unwrap();
        assert_eq!(reopened_branch.revision_history().len(), 1);
    }

    #[test]
    fn branch_reference_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let control_dir = ControlDir::initialize(transport_at(dir.path()), Box::new(Knit1Format)).unwrap();
        assert_eq!(control_dir.branch_reference().unwrap(), None);
        control_dir.set_branch_reference("file:///elsewhere").unwrap();
        assert_eq!(
            control_dir.branch_reference().unwrap().as_deref(),
            Some("file:///elsewhere")
        );
    }
}
