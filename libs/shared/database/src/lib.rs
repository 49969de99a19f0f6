pub mod error;
pub mod filter;
pub mod memory;
pub mod store;
pub mod supabase;

pub use error::{StoreError, StoreResult};
pub use filter::{Condition, Filter, SortOrder};
pub use memory::MemoryStore;
pub use store::{from_document, from_documents, to_document, LockLease, RecordStore};
pub use supabase::SupabaseStore;
