//! Content-addressed render cache for mdfig.
//!
//! This crate provides the two building blocks used to avoid rendering the
//! same diagram twice:
//!
//! - [`Fingerprint`] / [`Fingerprinter`]: Deterministic SHA-256 keys computed
//!   over a canonical, length-prefixed serialization of the inputs
//! - [`RenderCache`]: Shared in-memory store mapping fingerprints to rendered
//!   images, with hit/miss accounting
//!
//! The cache is advisory. Internal faults are logged and degrade to cache
//! misses; they are never surfaced to callers.
//!
//! # Example
//!
//! ```
//! use mdfig_cache::{Fingerprinter, ImageFormat, RenderCache};
//!
//! let cache = RenderCache::new();
//! let key = Fingerprinter::new("example").field("graph TD;A-->B").finish();
//!
//! assert!(cache.lookup(&key).is_none());
//! cache.insert(key, b"<svg/>".to_vec(), ImageFormat::Svg);
//! assert!(cache.lookup(&key).is_some());
//! assert!((cache.stats().hit_rate - 0.5).abs() < f64::EPSILON);
//! ```

mod fingerprint;
mod format;
mod memory;

pub use fingerprint::{Fingerprint, Fingerprinter};
pub use format::ImageFormat;
pub use memory::{CacheEntry, CacheStats, RenderCache};
