//! Grouping module: folder-level key resolution.
//!
//! A folder's key is decided by the first canonically named item that
//! yields a usable grouping field. Later items never change the decision;
//! with auditing enabled they are still read so disagreeing folders can be
//! reported.

mod error;
mod resolver;

pub use error::ResolveError;
pub use resolver::{GroupKeyResolver, Resolution};
