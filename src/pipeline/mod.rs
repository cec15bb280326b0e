//! The per-card pipeline: extract, enrich, classify, build, resolve.

pub mod builder;
pub mod classify;
pub mod dates;
pub mod enrich;
pub mod extract;
pub mod interaction;
pub mod resolver;
pub mod similarity;
