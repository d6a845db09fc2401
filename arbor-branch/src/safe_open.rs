//! `SafeBranchOpener`: walks branch references (a control dir that only
//! points at another URL rather than holding a branch itself) while
//! policing which locations are acceptable and refusing to loop
//! forever, the Rust shape of `bzrlib.bzrdir.BranchOpener`.

use std::collections::HashSet;

use arbor_errors::{Error, Result};

use crate::branch::Branch;
use crate::control_dir::ControlDir;

/// What a [`SafeBranchOpener`] is allowed to do: which URLs it may visit
/// at all, and whether it may follow a branch reference rather than
/// erroring out immediately.
pub trait BranchOpenPolicy {
    /// Whether a branch reference found along the way should be
    /// followed (`true`) or rejected outright (`false`).
    fn should_follow_references(&self) -> bool;

    /// Checked against every URL visited, including the starting one —
    /// `Err` aborts the open.
    fn check_one_url(&self, url: &str) -> Result<()>;
}

/// No restriction at all: every URL is acceptable and references are
/// always followed.
#[derive(Clone, Copy, Debug, Default)]
pub struct AcceptAnythingPolicy;

impl BranchOpenPolicy for AcceptAnythingPolicy {
    fn should_follow_references(&self) -> bool {
        true
    }

    fn check_one_url(&self, _url: &str) -> Result<()> {
        Ok(())
    }
}

/// Only URLs in a fixed allow-list may be visited.
#[derive(Clone, Debug, Default)]
pub struct WhitelistPolicy {
    pub allowed: Vec<String>,
}

impl BranchOpenPolicy for WhitelistPolicy {
    fn should_follow_references(&self) -> bool {
        true
    }

    fn check_one_url(&self, url: &str) -> Result<()> {
        if self.allowed.iter().any(|a| a == url) {
            Ok(())
        } else {
            Err(Error::BadUrl(url.to_string()))
        }
    }
}

/// Only URLs whose scheme matches exactly (e.g. `file://`, never
/// `http://`) may be visited — the policy a server hosting branches over
/// one transport kind applies to stop a reference from redirecting a
/// client somewhere else entirely.
#[derive(Clone, Debug)]
pub struct SingleSchemePolicy {
    pub scheme: String,
}

impl BranchOpenPolicy for SingleSchemePolicy {
    fn should_follow_references(&self) -> bool {
        true
    }

    fn check_one_url(&self, url: &str) -> Result<()> {
        let prefix = format!("{}://", self.scheme);
        if url.starts_with(&prefix) {
            Ok(())
        } else {
            Err(Error::BadUrl(url.to_string()))
        }
    }
}

/// Opens a branch by URL, following branch references according to
/// `policy` and refusing to revisit a URL already seen during this open
/// (a reference loop).
pub struct SafeBranchOpener<P: BranchOpenPolicy> {
    policy: P,
    seen_urls: HashSet<String>,
}

impl<P: BranchOpenPolicy> SafeBranchOpener<P> {
    pub fn new(policy: P) -> Self {
        SafeBranchOpener {
            policy,
            seen_urls: HashSet::new(),
        }
    }

    /// `open_control_dir` is the caller's way of turning a URL into a
    /// [`ControlDir`] — a local path today, potentially a network
    /// transport tomorrow; this type stays agnostic to that.
    pub fn open<F>(&mut self, url: &str, open_control_dir: F) -> Result<Branch>
    where
        F: Fn(&str) -> Result<ControlDir>,
    {
        let mut current = url.to_string();
        loop {
            self.policy.check_one_url(&current)?;
            if !self.seen_urls.insert(current.clone()) {
                return Err(Error::BranchLoopError(current));
            }
            let control_dir = open_control_dir(&current)?;
            match control_dir.branch_reference()? {
                Some(target) => {
                    if !self.policy.should_follow_references() {
                        return Err(Error::BranchReferenceForbidden(target));
                    }
                    current = target;
                }
                None => return control_dir.open_branch(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_repo::Knit1Format;
    use arbor_transport::LocalTransport;
    use std::collections::HashMap;
    use std::path::Path;

    fn control_dir_at(dir: &Path) -> ControlDir {
        std::fs::create_dir_all(dir).unwrap();
        ControlDir::initialize(Box::new(LocalTransport::new(dir)), Box::new(Knit1Format)).unwrap()
    }

    fn opener_for(urls: HashMap<String, std::path::PathBuf>) -> impl Fn(&str) -> Result<ControlDir> {
        move |url: &str| {
            let path = urls
                .get(url)
                .ok_or_else(|| Error::BadUrl(url.to_string()))?;
            ControlDir::open(Box::new(LocalTransport::new(path.clone())))
        }
    }

    #[test]
    fn opens_a_direct_branch_with_no_reference() {
        let dir = tempfile::tempdir().unwrap();
        control_dir_at(dir.path()).create_branch().unwrap();

        let mut urls = HashMap::new();
        urls.insert("a".to_string(), dir.path().to_path_buf());
        let mut opener = SafeBranchOpener::new(AcceptAnythingPolicy);
        assert!(opener.open("a", opener_for(urls)).is_ok());
    }

    #[test]
    fn follows_a_branch_reference_when_policy_allows() {
        let ref_dir = tempfile::tempdir().unwrap();
        let real_dir = tempfile::tempdir().unwrap();
        control_dir_at(real_dir.path()).create_branch().unwrap();
        let ref_control_dir = control_dir_at(ref_dir.path());
        ref_control_dir.set_branch_reference("real").unwrap();

        let mut urls = HashMap::new();
        urls.insert("ref".to_string(), ref_dir.path().to_path_buf());
        urls.insert("real".to_string(), real_dir.path().to_path_buf());
        let mut opener = SafeBranchOpener::new(AcceptAnythingPolicy);
        assert!(opener.open("ref", opener_for(urls)).is_ok());
    }

    #[test]
    fn rejects_reference_when_policy_forbids_following() {
        struct NoReferences;
        impl BranchOpenPolicy for NoReferences {
            fn should_follow_references(&self) -> bool {
                false
            }
            fn check_one_url(&self, _url: &str) -> Result<()> {
                Ok(())
            }
        }

        let ref_dir = tempfile::tempdir().unwrap();
        let ref_control_dir = control_dir_at(ref_dir.path());
        ref_control_dir.set_branch_reference("real").unwrap();

        let mut urls = HashMap::new();
        urls.insert("ref".to_string(), ref_dir.path().to_path_buf());
        let mut opener = SafeBranchOpener::new(NoReferences);
        assert!(matches!(
            opener.open("ref", opener_for(urls)),
            Err(Error::BranchReferenceForbidden(_))
        ));
    }

    #[test]
    fn detects_a_reference_loop() {
        let dir_a = tempfile::tempdir().unwrap();
        let dir_b = tempfile::tempdir().unwrap();
        control_dir_at(dir_a.path())
            .set_branch_reference("b")
            .unwrap();
        control_dir_at(dir_b.path())
            .set_branch_reference("a")
            .unwrap();

        let mut urls = HashMap::new();
        urls.insert("a".to_string(), dir_a.path().to_path_buf());
        urls.insert("b".to_string(), dir_b.path().to_path_buf());
        let mut opener = SafeBranchOpener::new(AcceptAnythingPolicy);
        assert!(matches!(
            opener.open("a", opener_for(urls)),
            Err(Error::BranchLoopError(_))
        ));
    }

    #[test]
    fn whitelist_policy_rejects_unlisted_url() {
        let dir = tempfile::tempdir().unwrap();
        control_dir_at(dir.path()).create_branch().unwrap();
        let mut urls = HashMap::new();
        urls.insert("a".to_string(), dir.path().to_path_buf());
        let mut opener = SafeBranchOpener::new(WhitelistPolicy {
            allowed: vec!["b".to_string()],
        });
        assert!(matches!(opener.open("a", opener_for(urls)), Err(Error::BadUrl(_))));
    }
}
