//! Per-node and aggregate install status.
//!
//! Each node writes only its own [`NodeStatus`] entry. The
//! [`AggregateStatus`] is always recomputed from the full node map, never
//! patched, so it cannot drift from the entries it summarises.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::plugin::PluginClass;

/// Install phase of a single node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodePhase {
    /// Not yet reconciled.
    #[default]
    Pending,
    /// Install in progress.
    Installing,
    /// Installed at the desired version.
    Ready,
    /// The last install attempt failed.
    Failed,
}

impl fmt::Display for NodePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "Pending",
            Self::Installing => "Installing",
            Self::Ready => "Ready",
            Self::Failed => "Failed",
        };
        f.write_str(s)
    }
}

/// One node's view of an install record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStatus {
    /// Node that wrote this entry.
    pub node_name: String,
    /// Current phase.
    pub phase: NodePhase,
    /// Version installed on the node, once known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installed_version: Option<String>,
    /// Class the plugin was loaded as.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin_class: Option<PluginClass>,
    /// Human-readable detail, usually an error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// When this node last reconciled the record.
    pub last_reconciled: DateTime<Utc>,
}

impl NodeStatus {
    /// Create an entry stamped with the current time.
    #[must_use]
    pub fn new(node_name: impl Into<String>, phase: NodePhase) -> Self {
        Self {
            node_name: node_name.into(),
            phase,
            installed_version: None,
            plugin_class: None,
            message: None,
            last_reconciled: Utc::now(),
        }
    }

    /// Set the installed version.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.installed_version = Some(version.into());
        self
    }

    /// Set the plugin class.
    #[must_use]
    pub fn with_class(mut self, class: PluginClass) -> Self {
        self.plugin_class = Some(class);
        self
    }

    /// Set the message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Aggregate phase across every node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggregatePhase {
    /// No node has finished, none is installing.
    #[default]
    Pending,
    /// At least one node is installing.
    Installing,
    /// Every node is ready.
    Ready,
    /// Some nodes failed while others are ready.
    PartiallyFailed,
    /// Every node failed.
    Failed,
}

/// Summary of all node entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateStatus {
    /// Derived phase.
    pub phase: AggregatePhase,
    /// Nodes in [`NodePhase::Ready`].
    pub ready_nodes: usize,
    /// Nodes in [`NodePhase::Installing`].
    pub installing_nodes: usize,
    /// Nodes in [`NodePhase::Failed`].
    pub failed_nodes: usize,
    /// All nodes that reported.
    pub total_nodes: usize,
    /// Short summary.
    #[serde(default)]
    pub message: String,
}

impl AggregateStatus {
    /// Compute the aggregate from a node map.
    ///
    /// Rules, in order: all ready (and at least one node) is `Ready`; any
    /// installing is `Installing`; failures mixed with ready nodes is
    /// `PartiallyFailed`; all failed is `Failed`; anything else is `Pending`.
    #[must_use]
    pub fn compute(nodes: &BTreeMap<String, NodeStatus>) -> Self {
        let count = |phase: NodePhase| nodes.values().filter(|n| n.phase == phase).count();
        let ready = count(NodePhase::Ready);
        let installing = count(NodePhase::Installing);
        let failed = count(NodePhase::Failed);
        let total = nodes.len();

        let (phase, message) = if total > 0 && ready == total {
            (AggregatePhase::Ready, format!("{ready}/{total} nodes ready"))
        } else if installing > 0 {
            (
                AggregatePhase::Installing,
                format!("{installing}/{total} nodes installing"),
            )
        } else if failed > 0 && ready > 0 {
            let failing: Vec<&str> = nodes
                .values()
                .filter(|n| n.phase == NodePhase::Failed)
                .map(|n| n.node_name.as_str())
                .collect();
            (
                AggregatePhase::PartiallyFailed,
                format!("{failed}/{total} nodes failed: {}", failing.join(", ")),
            )
        } else if total > 0 && failed == total {
            (AggregatePhase::Failed, format!("{failed}/{total} nodes failed"))
        } else if total == 0 {
            (AggregatePhase::Pending, "no nodes reported".to_string())
        } else {
            (AggregatePhase::Pending, format!("{ready}/{total} nodes ready"))
        };

        Self {
            phase,
            ready_nodes: ready,
            installing_nodes: installing,
            failed_nodes: failed,
            total_nodes: total,
            message,
        }
    }
}

/// Status block of an install record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallStatus {
    /// Per-node entries keyed by node name.
    #[serde(default)]
    pub nodes: BTreeMap<String, NodeStatus>,
    /// Summary of `nodes`.
    #[serde(default)]
    pub aggregate: AggregateStatus,
}

impl InstallStatus {
    /// Replace this node's entry and recompute the aggregate.
    pub fn set_node(&mut self, entry: NodeStatus) {
        self.nodes.insert(entry.node_name.clone(), entry);
        self.aggregate = AggregateStatus::compute(&self.nodes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nodes(entries: &[(&str, NodePhase)]) -> BTreeMap<String, NodeStatus> {
        entries
            .iter()
            .map(|(name, phase)| ((*name).to_string(), NodeStatus::new(*name, *phase)))
            .collect()
    }

    #[test]
    fn all_ready() {
        let agg = AggregateStatus::compute(&nodes(&[
            ("n1", NodePhase::Ready),
            ("n2", NodePhase::Ready),
        ]));
        assert_eq!(agg.phase, AggregatePhase::Ready);
        assert_eq!(agg.ready_nodes, 2);
        assert_eq!(agg.total_nodes, 2);
    }

    #[test]
    fn ready_and_failed_is_partial() {
        let agg = AggregateStatus::compute(&nodes(&[
            ("n1", NodePhase::Ready),
            ("n2", NodePhase::Failed),
        ]));
        assert_eq!(agg.phase, AggregatePhase::PartiallyFailed);
        assert_eq!(agg.failed_nodes, 1);
        assert!(agg.message.contains("n2"));
    }

    #[test]
    fn all_failed() {
        let agg = AggregateStatus::compute(&nodes(&[
            ("n1", NodePhase::Failed),
            ("n2", NodePhase::Failed),
        ]));
        assert_eq!(agg.phase, AggregatePhase::Failed);
    }

    #[test]
    fn empty_is_pending() {
        let agg = AggregateStatus::compute(&BTreeMap::new());
        assert_eq!(agg.phase, AggregatePhase::Pending);
        assert_eq!(agg.total_nodes, 0);
    }

    #[test]
    fn installing_wins_over_failures() {
        let agg = AggregateStatus::compute(&nodes(&[
            ("n1", NodePhase::Installing),
            ("n2", NodePhase::Failed),
            ("n3", NodePhase::Ready),
        ]));
        assert_eq!(agg.phase, AggregatePhase::Installing);
        assert_eq!(agg.installing_nodes, 1);
    }

    #[test]
    fn pending_mixed_with_failed_is_pending() {
        let agg = AggregateStatus::compute(&nodes(&[
            ("n1", NodePhase::Pending),
            ("n2", NodePhase::Failed),
        ]));
        assert_eq!(agg.phase, AggregatePhase::Pending);
    }

    #[test]
    fn set_node_recomputes_from_scratch() {
        let mut status = InstallStatus::default();
        status.set_node(NodeStatus::new("n1", NodePhase::Failed));
        assert_eq!(status.aggregate.phase, AggregatePhase::Failed);

        status.set_node(NodeStatus::new("n1", NodePhase::Ready));
        assert_eq!(status.aggregate.phase, AggregatePhase::Ready);
        assert_eq!(status.aggregate.failed_nodes, 0);
        assert_eq!(status.nodes.len(), 1);
    }
}
