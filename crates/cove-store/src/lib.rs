//! cove-store — chunk stores and the chunk action authority.
//!
//! The authority decides whether a chunk operation is allowed and computes
//! the post-image when it is; the stores hold bytes and nothing else. The
//! local chunk manager glues the two together for simulation use.

pub mod authority;
pub mod local_manager;
pub mod rules;
pub mod store;

pub use authority::{ChunkActionAuthority, GetOutcome};
pub use local_manager::LocalChunkManager;
pub use store::{ChunkStore, FileChunkStore, MemChunkStore};
