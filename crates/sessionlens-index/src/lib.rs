mod cache;

pub use cache::MetadataCache;
