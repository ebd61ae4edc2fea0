//! Event Ingestor: the broker-facing entry point of the billing pipeline.

pub mod decode;
pub mod ingestor;
pub mod throttle;

pub use decode::decode_event;
pub use ingestor::{
    DeadLetterSink, EventIngestor, PlatformBillingConfig, PostProcessingEnrollment, ThrottleConfig,
    Topic, POST_PROCESSING_TOPIC,
};
pub use throttle::RateLimiter;
