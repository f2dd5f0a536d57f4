//! Utils Module.

pub mod path;
