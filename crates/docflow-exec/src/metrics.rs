//! Metrics/tracing hooks.
//!
//! Everything here is a no-op unless the `tracing` feature is on; the binary
//! decides where events go by installing a subscriber.

#[cfg(feature = "tracing")]
pub fn emit_span(event: &str, key_values: &[(&str, String)]) {
    let span = tracing::span!(tracing::Level::TRACE, "docflow", event);
    let _entered = span.enter();
    for (k, v) in key_values {
        tracing::trace!(%event, %k, %v, "metric");
    }
}

#[cfg(not(feature = "tracing"))]
pub fn emit_span(_event: &str, _key_values: &[(&str, String)]) { /* no-op */
}

/// One stage wired into a run.
#[cfg(feature = "tracing")]
pub fn record_stage(index: usize, stage: &str, blocking: bool) {
    tracing::debug!(index, stage, blocking, "stage");
}

#[cfg(not(feature = "tracing"))]
pub fn record_stage(_index: usize, _stage: &str, _blocking: bool) {}

/// A finished run.
#[cfg(feature = "tracing")]
pub fn record_run(collection: &str, output_documents: u64, elapsed_ms: u64) {
    tracing::info!(collection, output_documents, elapsed_ms, "pipeline finished");
}

#[cfg(not(feature = "tracing"))]
pub fn record_run(_collection: &str, _output_documents: u64, _elapsed_ms: u64) {}
