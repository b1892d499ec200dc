//! CLI command implementations.
//!
//! Every command works on module images read from disk, mapped at fixed
//! virtual bases the way a loader would place them.

pub mod apply;
pub mod check;
pub mod image;
pub mod scan;
