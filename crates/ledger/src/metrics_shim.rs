//! No-op metric hooks used when the `metrics` feature is off.

pub fn tree_version_set(_v: i64) {}
