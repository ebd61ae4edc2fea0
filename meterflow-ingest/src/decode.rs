//! Payload decoding. Decode failures are classified [`ErrorKind::Validation`]
//! (never retriable) rather than by matching substrings in the error text —
//! a downstream serde version bump rewording a message must never flip
//! retry behavior.

use meterflow_core::error::{Error, Result};
use meterflow_core::model::event::Event;

pub fn decode_event(payload: &[u8]) -> Result<Event> {
    serde_json::from_slice(payload)
        .map_err(|e| Error::validation(format!("could not decode event payload: {e}")).with_source(e))
}
