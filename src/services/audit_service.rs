use std::sync::Arc;

use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::database::store::Store;
use crate::models::audit_log::NewAuditLog;

/// Writes audit entries next to core operations. A failed write is logged and
/// swallowed; it never fails the operation being audited.
#[derive(Clone)]
pub struct AuditService {
    store: Arc<dyn Store>,
}

impl AuditService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn log(
        &self,
        actor_id: Option<Uuid>,
        action: &str,
        entity_type: &str,
        entity_id: Uuid,
        changes: Option<JsonValue>,
    ) {
        let entry = NewAuditLog {
            actor_id,
            action: action.to_string(),
            entity_type: entity_type.to_string(),
            entity_id,
            changes,
        };
        if let Err(e) = self.store.insert_audit_log(entry).await {
            tracing::warn!(
                error = ?e,
                action,
                entity_type,
                %entity_id,
                "Failed to write audit log entry"
            );
        }
    }
}
