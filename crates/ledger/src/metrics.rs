//! Prometheus gauges and histograms for the state layer. Compiled only with
//! the `metrics` feature; `metrics_shim` provides no-op stand-ins otherwise.

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, register_int_gauge, Histogram, IntCounter, IntGauge,
};

lazy_static! {
    pub static ref ASSET_TREE_CACHE_EVICTIONS: IntCounter = register_int_counter!(
        "keel_asset_tree_cache_evictions_total",
        "Asset trees evicted from the LRU cache"
    )
    .unwrap();
    pub static ref ASSET_TREE_CACHE_LOADS: IntCounter = register_int_counter!(
        "keel_asset_tree_cache_loads_total",
        "Asset trees reconstructed from storage on cache miss"
    )
    .unwrap();
    pub static ref TREE_VERSION_GAUGE: IntGauge = register_int_gauge!(
        "keel_state_tree_version",
        "Latest committed version of the account tree"
    )
    .unwrap();
    pub static ref TREE_UPDATE_SECONDS: Histogram = register_histogram!(
        "keel_tree_update_seconds",
        "Time to write one leaf and its path",
        vec![0.00001, 0.0001, 0.001, 0.01, 0.1]
    )
    .unwrap();
}

pub fn tree_version_set(v: i64) {
    TREE_VERSION_GAUGE.set(v);
}
