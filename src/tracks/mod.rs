//! Track catalog module

pub mod catalog;

pub use catalog::{Catalog, Track};
