//! ERR-specific pieces: API models, content resolution and season discovery.

pub mod discovery;
pub mod models;
pub mod resolver;

#[cfg(test)]
pub mod testing;

pub use discovery::{Discovery, add_urls_to_config};
pub use resolver::{
    ContentKind, ContentResolver, HttpContentSource, ResolveOutcome, SeriesOutcome,
    extract_reference,
};
