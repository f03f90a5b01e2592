mod file;
mod memory;
mod traits;
pub mod types;

pub use file::{FileIdentityStore, FileMappingStore};
pub use memory::{MemoryIdentityStore, MemoryMappingStore};
pub use traits::{IdentityStore, MappingStore, Subscription};
