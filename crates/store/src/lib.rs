pub mod contact_cache;
pub mod errors;
pub mod sqlite_store;

pub use contact_cache::SqliteContactCache;
pub use errors::StoreError;
pub use sqlite_store::SqliteMappingStore;
