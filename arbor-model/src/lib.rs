//! Data model shared across the arbor engine: opaque revision/file
//! identifiers, the revision record, the inventory tree, and the
//! testament digest used for signing.

pub mod ids;
pub mod inventory;
pub mod revision;
pub mod testament;

pub use ids::{FileId, RevisionId, NULL_REVISION};
pub use inventory::{EntryKind, Inventory, InventoryEntry};
pub use revision::Revision;
pub use testament::Testament;
