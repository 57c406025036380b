// # State Stores
//
// `FileStateStore` keeps reconciliation state across restarts;
// `MemoryStateStore` is for tests and for runs without a state path.

pub mod file;
pub mod memory;

pub use file::FileStateStore;
pub use memory::MemoryStateStore;
