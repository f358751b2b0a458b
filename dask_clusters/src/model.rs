//! Cluster models returned by the cluster manager server extension.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The unique ID of a cluster, stable for the cluster's lifetime.
#[derive(Clone, Eq, Hash, Ord, PartialEq, PartialOrd, Deserialize, Serialize)]
#[serde(transparent)]
pub struct ClusterId(String);

impl ClusterId {
    /// Get this ID as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The path of this cluster's dashboard, relative to the server's base
    /// URL. This is what gets handed to the dashboard collaborator when the
    /// cluster becomes active.
    pub fn dashboard_path(&self) -> String {
        format!("dask/dashboard/{}", self.0)
    }
}

impl From<&str> for ClusterId {
    fn from(id: &str) -> Self {
        ClusterId(id.to_owned())
    }
}

impl From<String> for ClusterId {
    fn from(id: String) -> Self {
        ClusterId(id)
    }
}

impl fmt::Debug for ClusterId {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "{}", &self.0)
    }
}

impl fmt::Display for ClusterId {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "{}", &self.0)
    }
}

/// A running cluster, as described by the server.
///
/// We treat this as an opaque value: it is never patched locally, only
/// replaced by whatever the server reports next.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ClusterModel {
    /// The ID of this cluster.
    pub id: ClusterId,

    /// A human-readable label.
    pub name: String,

    /// Where clients should connect to reach the scheduler.
    pub scheduler_address: String,

    /// The cluster's own monitoring dashboard.
    pub dashboard_link: String,

    /// The total number of cores across workers.
    pub cores: u32,

    /// The number of workers currently running.
    pub workers: u32,

    /// Total worker memory, already formatted by the server.
    pub memory: String,

    /// Adaptive scaling bounds, if adaptive scaling is turned on.
    #[serde(default)]
    pub adapt: Option<AdaptBounds>,
}

impl ClusterModel {
    /// Is adaptive scaling enabled for this cluster?
    pub fn is_adaptive(&self) -> bool {
        self.adapt.is_some()
    }
}

/// Bounds on the number of workers an adaptive cluster may run.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct AdaptBounds {
    /// The fewest workers to keep around.
    pub minimum: u32,

    /// The most workers to scale up to.
    pub maximum: u32,
}

#[test]
fn deserializes_server_model() {
    let json = r#"{
        "id": "a1b2",
        "name": "Cluster 1",
        "scheduler_address": "tcp://127.0.0.1:8786",
        "dashboard_link": "http://127.0.0.1:8787/status",
        "cores": 8,
        "workers": 4,
        "memory": "16.00 GiB",
        "adapt": null
    }"#;
    let model: ClusterModel = serde_json::from_str(json).unwrap();
    assert_eq!(model.id.as_str(), "a1b2");
    assert_eq!(model.workers, 4);
    assert!(!model.is_adaptive());
    assert_eq!(model.id.dashboard_path(), "dask/dashboard/a1b2");
}

#[test]
fn missing_adapt_means_manual_scaling() {
    let json = r#"{
        "id": "x",
        "name": "x",
        "scheduler_address": "tcp://x:1",
        "dashboard_link": "http://x:2",
        "cores": 1,
        "workers": 1,
        "memory": "1 GiB",
        "adapt": {"minimum": 0, "maximum": 3}
    }"#;
    let adaptive: ClusterModel = serde_json::from_str(json).unwrap();
    assert_eq!(
        adaptive.adapt,
        Some(AdaptBounds {
            minimum: 0,
            maximum: 3
        })
    );

    let mut value: serde_json::Value = serde_json::from_str(json).unwrap();
    value.as_object_mut().unwrap().remove("adapt");
    let manual: ClusterModel = serde_json::from_value(value).unwrap();
    assert_eq!(manual.adapt, None);
}
