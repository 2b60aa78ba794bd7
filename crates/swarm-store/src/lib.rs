//! Record storage for the swarm coordination services.
//!
//! Every coordination service persists its state as small structured records:
//! a record is a JSON document addressed by a [`Namespace`] and an id. The
//! store guarantees that a write is either fully visible or not visible at
//! all, and that one unreadable record never blocks reading the rest.
//!
//! # Usage
//!
//! ```ignore
//! use swarm_store::{FileStore, Namespace, RecordStoreExt};
//!
//! let store = FileStore::open("./.swarm")?;
//! let ns = Namespace::new("consensus/proposals");
//! store.put_record(&ns, &proposal.id, &proposal)?;
//! let open: Vec<Proposal> = store.list_records(&ns)?;
//! ```

pub mod file;
pub mod memory;
pub mod persistence;
pub mod types;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use persistence::{RecordStore, RecordStoreExt};
pub use types::{encode_segment, Namespace, Result, StoreError, MAX_SEGMENT_LEN};
