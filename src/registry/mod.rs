// ============================================================================
// Sharded Work Registry
// ============================================================================
//
// Per shard:
//
//   Free ──pick_up──> Claimed(worker, since) ──release/expiry──> Free
//
// An absent record is Free. A claimed shard is never handed to another
// worker directly; it has to become Free first.
//
// ============================================================================

pub mod operation;
pub mod session;
pub mod session_storage;
pub mod work_registry;

pub use operation::{ClaimIfFree, ReleaseExpired, ReleaseWorker, UpdateOperation};
pub use session::ShardProcessingSession;
pub use session_storage::{SessionStorage, UpdateOutcome};
pub use work_registry::ShardedWorkRegistry;
