// intent-gate-runtime/src/notify.rs
// ============================================================================
// Module: Intent Gate Notification Sinks
// Description: Delivery-record sinks for the notification fan-out seam.
// Purpose: Hand structured delivery records to the external fan-out layer,
//          or to logs and files where no fan-out is deployed.
// Dependencies: intent-gate-core, serde_json, tracing
// ============================================================================

//! ## Overview
//! Transports (email, chat, webhooks) live outside the core; these sinks
//! only hand records over. The tracing sink is the development default; the
//! JSONL sink feeds file-based integrations; the no-op sink serves tests.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use intent_gate_core::DeliveryRecord;
use intent_gate_core::NotificationSink;
use intent_gate_core::NotifyError;
use tracing::info;

// ============================================================================
// SECTION: Sinks
// ============================================================================

/// Sink that logs delivery records through tracing.
pub struct TracingNotificationSink;

#[async_trait]
impl NotificationSink for TracingNotificationSink {
    async fn deliver(&self, record: &DeliveryRecord) -> Result<(), NotifyError> {
        info!(
            kind = record.kind.as_str(),
            tenant = %record.tenant_id,
            intent = %record.intent_id,
            recipient = %record.recipient,
            subject = %record.subject,
            "notification delivery record"
        );
        Ok(())
    }
}

/// Sink that appends delivery records as JSON lines to a file.
pub struct JsonlNotificationSink {
    /// File handle used for append-only writes.
    file: Mutex<std::fs::File>,
}

impl JsonlNotificationSink {
    /// Opens the delivery file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

#[async_trait]
impl NotificationSink for JsonlNotificationSink {
    async fn deliver(&self, record: &DeliveryRecord) -> Result<(), NotifyError> {
        let payload = serde_json::to_string(record)
            .map_err(|err| NotifyError::Delivery(err.to_string()))?;
        let mut file =
            self.file.lock().map_err(|_| NotifyError::Delivery("file lock poisoned".to_string()))?;
        writeln!(file, "{payload}").map_err(|err| NotifyError::Delivery(err.to_string()))?;
        file.flush().map_err(|err| NotifyError::Delivery(err.to_string()))?;
        Ok(())
    }
}

/// No-op sink for tests.
pub struct NoopNotificationSink;

#[async_trait]
impl NotificationSink for NoopNotificationSink {
    async fn deliver(&self, _record: &DeliveryRecord) -> Result<(), NotifyError> {
        Ok(())
    }
}
