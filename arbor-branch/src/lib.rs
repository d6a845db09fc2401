//! Branch, ControlDir, environment configuration and the safe branch
//! opener (spec.md §4.5-§4.6).

pub mod branch;
pub mod config;
pub mod control_dir;
pub mod safe_open;

pub use branch::Branch;
pub use config::Environment;
pub use control_dir::ControlDir;
pub use safe_open::{AcceptAnythingPolicy, BranchOpenPolicy, SafeBranchOpener, SingleSchemePolicy, WhitelistPolicy};
