//! Event Ingestor: decode, bulk-insert, optional platform-billing synthesis,
//! optional post-processing forward — one unit of work per broker message.

use crate::decode::decode_event;
use crate::throttle::RateLimiter;
use async_trait::async_trait;
use meterflow_core::error::Result;
use meterflow_core::ids::{EnvironmentId, TenantId};
use meterflow_core::model::event::{Event, PropertyValue};
use meterflow_core::ports::{AnalyticalStore, BrokerMessage, BrokerPublisher};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

pub const POST_PROCESSING_TOPIC: &str = "post-processing";

/// Which topic a message arrived on. Both are handled identically except
/// for which throttle bucket gates them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topic {
    Live,
    Lazy,
}

#[derive(Debug, Clone, Copy)]
pub struct ThrottleConfig {
    pub live_per_second: u32,
    pub lazy_per_second: u32,
}

#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    async fn send(&self, message: BrokerMessage, reason: &str) -> Result<()>;
}

#[async_trait]
pub trait PostProcessingEnrollment: Send + Sync {
    async fn is_enrolled(&self, tenant_id: &TenantId, environment_id: &EnvironmentId) -> Result<bool>;
}

#[derive(Debug, Clone)]
pub struct PlatformBillingConfig {
    pub platform_tenant_id: TenantId,
}

pub struct EventIngestor {
    analytical_store: Arc<dyn AnalyticalStore>,
    post_processing: Arc<dyn BrokerPublisher>,
    dead_letter: Arc<dyn DeadLetterSink>,
    enrollment: Arc<dyn PostProcessingEnrollment>,
    platform_billing: Option<PlatformBillingConfig>,
    live_throttle: RateLimiter,
    lazy_throttle: RateLimiter,
}

impl EventIngestor {
    pub fn new(
        analytical_store: Arc<dyn AnalyticalStore>,
        post_processing: Arc<dyn BrokerPublisher>,
        dead_letter: Arc<dyn DeadLetterSink>,
        enrollment: Arc<dyn PostProcessingEnrollment>,
        platform_billing: Option<PlatformBillingConfig>,
        throttle: ThrottleConfig,
    ) -> Self {
        EventIngestor {
            analytical_store,
            post_processing,
            dead_letter,
            enrollment,
            platform_billing,
            live_throttle: RateLimiter::new(throttle.live_per_second),
            lazy_throttle: RateLimiter::new(throttle.lazy_per_second),
        }
    }

    pub async fn handle_message(&self, topic: Topic, message: BrokerMessage) -> Result<()> {
        match topic {
            Topic::Live => self.live_throttle.acquire().await,
            Topic::Lazy => self.lazy_throttle.acquire().await,
        }

        let event = match decode_event(&message.payload) {
            Ok(event) => event,
            Err(e) => {
                if e.is_retriable() {
                    return Err(e);
                }
                warn!(error = %e, message_id = %message.id, "routing undecodable event to dead-letter sink");
                self.dead_letter.send(message, &e.message).await?;
                return Ok(());
            }
        };

        let mut batch = vec![event.clone()];
        if let Some(cfg) = &self.platform_billing {
            batch.push(synthesize_tenant_event(&event, &cfg.platform_tenant_id));
        }
        self.analytical_store.bulk_insert_events(&batch).await?;

        if self
            .enrollment
            .is_enrolled(&event.tenant_id, &event.environment_id)
            .await?
        {
            self.post_processing
                .publish(
                    POST_PROCESSING_TOPIC,
                    BrokerMessage {
                        id: message.id,
                        partition_key: message.partition_key,
                        tenant_id: event.tenant_id,
                        environment_id: event.environment_id,
                        payload: message.payload,
                    },
                )
                .await?;
        }

        Ok(())
    }
}

fn synthesize_tenant_event(original: &Event, platform_tenant: &TenantId) -> Event {
    let mut properties = BTreeMap::new();
    properties.insert(
        "original_event_id".to_string(),
        PropertyValue::String(original.id.0.clone()),
    );
    properties.insert(
        "original_event_name".to_string(),
        PropertyValue::String(original.event_name.clone()),
    );
    properties.insert(
        "original_timestamp".to_string(),
        PropertyValue::String(original.timestamp.to_rfc3339()),
    );
    properties.insert(
        "source".to_string(),
        PropertyValue::String(original.source.clone()),
    );
    properties.insert(
        "tenant_id".to_string(),
        PropertyValue::String(original.tenant_id.0.clone()),
    );

    Event {
        id: meterflow_core::ids::EventId(uuid::Uuid::new_v4().to_string()),
        tenant_id: platform_tenant.clone(),
        environment_id: original.environment_id.clone(),
        external_customer_id: meterflow_core::ids::CustomerId(original.tenant_id.0.clone()),
        event_name: "tenant_event".to_string(),
        timestamp: original.timestamp,
        source: original.source.clone(),
        properties,
    }
}
