//! URL handling module for News Harvest
//!
//! Article identifiers are canonical URLs. This module turns the links found
//! on listing and detail pages into that canonical form.

mod normalize;

pub use normalize::{normalize_url, resolve_identifier};
