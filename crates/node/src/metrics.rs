//! Prometheus metrics for the node. `stage_observe` is callable from both
//! feature configurations; with `metrics` off it compiles to nothing.

#[cfg(feature = "metrics")]
mod real {
    use lazy_static::lazy_static;
    use prometheus::{
        register_histogram_vec, register_int_counter, register_int_gauge, HistogramVec,
        IntCounter, IntGauge,
    };

    lazy_static! {
        pub static ref EXECUTOR_STAGE_SECONDS: HistogramVec = register_histogram_vec!(
            "keel_executor_stage_seconds",
            "Executor state-machine stage latency",
            &["stage"],
            vec![0.00001, 0.0001, 0.001, 0.01, 0.1, 1.0]
        )
        .unwrap();
        pub static ref PIPELINE_STAGE_SECONDS: HistogramVec = register_histogram_vec!(
            "keel_pipeline_stage_seconds",
            "Block pipeline worker stage latency",
            &["stage"],
            vec![0.0001, 0.001, 0.01, 0.1, 1.0, 10.0]
        )
        .unwrap();
        pub static ref BLOCK_HEIGHT: IntGauge = register_int_gauge!(
            "keel_block_height",
            "Height of the last sealed block"
        )
        .unwrap();
        pub static ref TXS_EXECUTED: IntCounter = register_int_counter!(
            "keel_txs_executed_total",
            "Transactions executed by the commit processor"
        )
        .unwrap();
        pub static ref TXS_REJECTED: IntCounter = register_int_counter!(
            "keel_txs_rejected_total",
            "Transactions rejected during prepare or validation"
        )
        .unwrap();
    }
}

#[cfg(feature = "metrics")]
pub fn stage_observe(stage: &str, elapsed: std::time::Duration) {
    real::EXECUTOR_STAGE_SECONDS
        .with_label_values(&[stage])
        .observe(elapsed.as_secs_f64());
}

#[cfg(feature = "metrics")]
pub fn pipeline_stage_observe(stage: &str, elapsed: std::time::Duration) {
    real::PIPELINE_STAGE_SECONDS
        .with_label_values(&[stage])
        .observe(elapsed.as_secs_f64());
}

#[cfg(feature = "metrics")]
pub fn block_height_set(height: i64) {
    real::BLOCK_HEIGHT.set(height);
}

#[cfg(feature = "metrics")]
pub fn tx_executed_inc() {
    real::TXS_EXECUTED.inc();
}

#[cfg(feature = "metrics")]
pub fn tx_rejected_inc() {
    real::TXS_REJECTED.inc();
}

#[cfg(not(feature = "metrics"))]
pub fn stage_observe(_stage: &str, _elapsed: std::time::Duration) {}

#[cfg(not(feature = "metrics"))]
pub fn pipeline_stage_observe(_stage: &str, _elapsed: std::time::Duration) {}

#[cfg(not(feature = "metrics"))]
pub fn block_height_set(_height: i64) {}

#[cfg(not(feature = "metrics"))]
pub fn tx_executed_inc() {}

#[cfg(not(feature = "metrics"))]
pub fn tx_rejected_inc() {}
