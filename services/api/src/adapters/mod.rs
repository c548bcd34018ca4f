pub mod blob;
pub mod db;
pub mod memory;

pub use blob::{FsBlobStore, MemoryBlobStore};
pub use db::DbAdapter;
pub use memory::InMemoryDatabase;
