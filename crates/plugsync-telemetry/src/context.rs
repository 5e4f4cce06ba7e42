//! Per-operation tracing context.

use std::fmt;

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Context carried through one reconcile or discovery call.
///
/// The correlation ID ties together every log line emitted while handling
/// a single event.
#[derive(Debug, Clone)]
pub struct OperationContext {
    /// Unique ID for this operation.
    pub correlation_id: Uuid,
    /// Component that started the operation (e.g. `install-reconciler`).
    pub component: &'static str,
    /// Operation name (e.g. `reconcile`).
    pub operation: String,
    /// Plugin the operation concerns, if any.
    pub plugin_id: Option<String>,
    /// Node running the operation, if any.
    pub node: Option<String>,
    /// When the operation started.
    pub started_at: DateTime<Utc>,
}

impl OperationContext {
    /// Start a new operation context.
    #[must_use]
    pub fn new(component: &'static str, operation: impl Into<String>) -> Self {
        Self {
            correlation_id: Uuid::new_v4(),
            component,
            operation: operation.into(),
            plugin_id: None,
            node: None,
            started_at: Utc::now(),
        }
    }

    /// Attach the plugin ID.
    #[must_use]
    pub fn with_plugin(mut self, plugin_id: impl Into<String>) -> Self {
        self.plugin_id = Some(plugin_id.into());
        self
    }

    /// Attach the node name.
    #[must_use]
    pub fn with_node(mut self, node: impl Into<String>) -> Self {
        self.node = Some(node.into());
        self
    }

    /// Milliseconds since the operation started.
    #[must_use]
    pub fn elapsed_ms(&self) -> i64 {
        Utc::now()
            .signed_duration_since(self.started_at)
            .num_milliseconds()
    }

    /// An `info`-level span carrying this context's fields.
    #[must_use]
    pub fn span(&self) -> tracing::Span {
        tracing::info_span!(
            "operation",
            correlation_id = %self.correlation_id,
            component = self.component,
            operation = %self.operation,
            plugin_id = self.plugin_id.as_deref().unwrap_or(""),
            node = self.node.as_deref().unwrap_or(""),
        )
    }
}

impl fmt::Display for OperationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} [{}]",
            self.component, self.operation, self.correlation_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_context_has_unique_ids() {
        let a = OperationContext::new("install-reconciler", "reconcile");
        let b = OperationContext::new("install-reconciler", "reconcile");
        assert_ne!(a.correlation_id, b.correlation_id);
    }

    #[test]
    fn builder_and_display() {
        let ctx = OperationContext::new("child-reconciler", "reconcile")
            .with_plugin("bundle")
            .with_node("node-a");
        assert_eq!(ctx.plugin_id.as_deref(), Some("bundle"));
        assert_eq!(ctx.node.as_deref(), Some("node-a"));
        assert!(ctx.to_string().starts_with("child-reconciler:reconcile ["));
        assert!(ctx.elapsed_ms() >= 0);
    }
}
