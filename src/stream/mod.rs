//! Event-stream pipeline
//!
//! Raw bytes from a channel become display text in three stages:
//!
//! - [`decoder`]: splits fragments into whole event records
//! - [`extractor`]: turns one record into zero or one text fragment
//! - [`session`]: drives both for a full exchange and reports callbacks
//!
//! [`payload`] isolates the tolerant structural parse used by the
//! extractor, and [`metrics`] records per-exchange telemetry.

pub mod decoder;
pub mod extractor;
pub mod metrics;
pub mod payload;
pub mod session;

pub use decoder::{BufferOverflow, ChunkDecoder};
pub use extractor::{
    classify_record, ControlEvent, EventShape, EventTextExtractor, TOOL_USE_NOTICE,
};
pub use session::{
    ExchangeSummary, RecordingHandler, StreamEvent, StreamHandler, StreamSession,
};

/// Extract every fragment from a complete payload.
///
/// Runs the decoder and extractor over `payload` in one pass; useful for
/// replaying captured streams.
pub fn extract_all(payload: &[u8]) -> Result<Vec<String>, BufferOverflow> {
    let mut decoder = ChunkDecoder::new();
    let mut extractor = EventTextExtractor::new();
    let mut records = decoder.push(payload)?;
    records.extend(decoder.finish());
    Ok(records
        .iter()
        .filter_map(|record| extractor.extract(record))
        .collect())
}
