pub mod clock;
pub mod error;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{RegistryError, Result, StoreError, StoreResult};
pub use types::{NodeId, ShardIndex, ShardSessionRecord, WorkerId};
