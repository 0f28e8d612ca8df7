//! Outcome telemetry
//!
//! Sinks are best effort. The engine hands events to [`emit`], which spawns
//! the delivery and never waits for it; a failing sink is logged at debug
//! level and otherwise ignored.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;

use crate::error::FailureCategory;
use crate::types::{SyncDirection, Trigger};

/// Named event with scalar attributes. Never carries tokens, document ids or paths.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryEvent {
    pub name: &'static str,
    pub attributes: BTreeMap<&'static str, Value>,
}

impl TelemetryEvent {
    pub fn completed(
        direction: SyncDirection,
        file_count: usize,
        trigger: Trigger,
        is_new_document: bool,
    ) -> Self {
        let mut attributes = BTreeMap::new();
        attributes.insert("direction", Value::from(direction.to_string()));
        attributes.insert("file_count", Value::from(file_count));
        attributes.insert("trigger", Value::from(trigger.as_str()));
        attributes.insert("is_new_document", Value::from(is_new_document));
        Self {
            name: "sync_completed",
            attributes,
        }
    }

    pub fn failed(
        direction: SyncDirection,
        reason: FailureCategory,
        trigger: Trigger,
        status_code: Option<u16>,
    ) -> Self {
        let mut attributes = BTreeMap::new();
        attributes.insert("direction", Value::from(direction.to_string()));
        attributes.insert("reason", Value::from(reason.as_str()));
        attributes.insert("trigger", Value::from(trigger.as_str()));
        if let Some(code) = status_code {
            attributes.insert("status_code", Value::from(code));
        }
        Self {
            name: "sync_failed",
            attributes,
        }
    }
}

#[async_trait]
pub trait TelemetrySink: Send + Sync {
    async fn record(&self, event: TelemetryEvent) -> anyhow::Result<()>;
}

/// Discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTelemetry;

#[async_trait]
impl TelemetrySink for NoopTelemetry {
    async fn record(&self, _event: TelemetryEvent) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Writes events to the `telemetry` tracing target
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingTelemetry;

#[async_trait]
impl TelemetrySink for TracingTelemetry {
    async fn record(&self, event: TelemetryEvent) -> anyhow::Result<()> {
        let attributes = serde_json::to_string(&event.attributes)?;
        tracing::info!(target: "telemetry", "{} {}", event.name, attributes);
        Ok(())
    }
}

/// Keeps events in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryTelemetry {
    events: Arc<Mutex<Vec<TelemetryEvent>>>,
}

impl MemoryTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.events.lock().clone()
    }
}

#[async_trait]
impl TelemetrySink for MemoryTelemetry {
    async fn record(&self, event: TelemetryEvent) -> anyhow::Result<()> {
        self.events.lock().push(event);
        Ok(())
    }
}

/// Deliver `event` in the background
pub fn emit(sink: &Arc<dyn TelemetrySink>, event: TelemetryEvent) {
    let sink = Arc::clone(sink);
    tokio::spawn(async move {
        let name = event.name;
        if let Err(e) = sink.record(event).await {
            tracing::debug!("Telemetry event {} dropped: {}", name, e);
        }
    });
}
