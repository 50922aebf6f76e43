mod digest_store;

pub(crate) use digest_store::{ensure_dir, published_tempfile};
pub use digest_store::{DigestStore, StoreError, StoredFile};
