pub mod files;
pub mod memstore;
pub mod persistence;
pub mod secure;
pub mod vault;

pub use files::{LocalFileStore, MemFileStore};
pub use memstore::MemKvStore;
pub use persistence::Persistence;
pub use secure::VaultStore;
