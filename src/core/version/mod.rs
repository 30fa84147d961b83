mod compare;
mod identity;

pub use compare::{compare, extract_version, should_replace, VersionOrder};
pub use identity::{base_identity, MOD_EXTENSION};
