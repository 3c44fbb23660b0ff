pub mod dictionary;
pub mod lookup_cache;
