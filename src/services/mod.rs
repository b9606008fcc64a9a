// Services module - business logic layer

pub mod aggregator;
pub mod cache;
pub mod rate_limit;
pub mod streaming;

// Title handling
pub mod fuzzy;
pub mod platforms;
pub mod title_extractor;

// External sources
pub mod jikan;
pub mod kitsu;
pub mod watchmode;
