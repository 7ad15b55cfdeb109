pub mod error;
pub mod memory;
pub mod redb;
pub mod traits;

pub use error::ZSetError;
pub use memory::MemoryZSet;
pub use redb::RedbZSet;
pub use traits::{system_clock, Clock, ScoredMember, WriteBatch, ZOp, ZSetStore};
