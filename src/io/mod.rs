mod location;
mod object_cache;
mod object_store;
mod s3_store;

pub use location::{open_store, StoreLocation, StoreOptions};
pub use object_cache::{ObjectCache, DEFAULT_OBJECT_CACHE_CAPACITY};
pub use object_store::{join_key, FsStore, ObjectStore};
pub use s3_store::{create_s3_client, S3Store};
