pub mod batch;
pub mod config;
pub mod conversion;
pub mod error;
pub mod format;
pub mod normalize;
pub mod profile;
pub mod scan;
