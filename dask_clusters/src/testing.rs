//! Test doubles shared by the unit tests in this crate.

use futures::{future::BoxFuture, FutureExt};
use reqwest::StatusCode;
use std::sync::Mutex;
use url::Url;

use crate::client::ClusterApi;
use crate::dialog::ScalingDialog;
use crate::errors::*;
use crate::model::{ClusterId, ClusterModel};

/// A plain, manually-scaled cluster named after its ID.
pub(crate) fn cluster(id: &str) -> ClusterModel {
    ClusterModel {
        id: ClusterId::from(id),
        name: format!("Cluster {}", id),
        scheduler_address: "tcp://10.0.0.1:8786".to_owned(),
        dashboard_link: format!("http://10.0.0.1:8787/{}/status", id),
        cores: 4,
        workers: 2,
        memory: "8.00 GiB".to_owned(),
        adapt: None,
    }
}

/// An in-memory cluster manager server that records every request it gets.
#[derive(Default)]
pub(crate) struct FakeApi {
    clusters: Mutex<Vec<ClusterModel>>,
    requests: Mutex<Vec<String>>,
    next_id: Mutex<u32>,
    fail_with: Mutex<Option<StatusCode>>,
}

impl FakeApi {
    pub(crate) fn with_clusters(ids: &[&str]) -> FakeApi {
        let api = FakeApi::default();
        *api.clusters.lock().unwrap() = ids.iter().map(|id| cluster(id)).collect();
        api
    }

    /// Replace the server-side cluster list.
    pub(crate) fn set_clusters(&self, ids: &[&str]) {
        *self.clusters.lock().unwrap() = ids.iter().map(|id| cluster(id)).collect();
    }

    /// Answer the next mutating request with `status`.
    pub(crate) fn fail_next(&self, status: StatusCode) {
        *self.fail_with.lock().unwrap() = Some(status);
    }

    pub(crate) fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn count(&self, prefix: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.starts_with(prefix))
            .count()
    }

    fn record(&self, request: String) {
        self.requests.lock().unwrap().push(request);
    }

    fn failure(&self, operation: Operation, id: Option<&ClusterId>) -> Result<()> {
        match self.fail_with.lock().unwrap().take() {
            Some(status) => Err(Error::UnexpectedHttpStatus {
                operation,
                id: id.cloned(),
                url: Url::parse("http://localhost:8888/dask/clusters").unwrap(),
                status,
                body: String::new(),
            }),
            None => Ok(()),
        }
    }
}

impl ClusterApi for FakeApi {
    fn list_clusters(&self) -> BoxFuture<'_, Result<Vec<ClusterModel>>> {
        self.record("GET".to_owned());
        let result = self
            .failure(Operation::List, None)
            .map(|()| self.clusters.lock().unwrap().clone());
        futures::future::ready(result).boxed()
    }

    fn start_cluster(&self) -> BoxFuture<'_, Result<ClusterModel>> {
        self.record("PUT".to_owned());
        let result = self.failure(Operation::Start, None).map(|()| {
            let mut next_id = self.next_id.lock().unwrap();
            *next_id += 1;
            let model = cluster(&format!("new-{}", next_id));
            self.clusters.lock().unwrap().push(model.clone());
            model
        });
        futures::future::ready(result).boxed()
    }

    fn stop_cluster<'a>(&'a self, id: &'a ClusterId) -> BoxFuture<'a, Result<()>> {
        self.record(format!("DELETE {}", id));
        let result = self.failure(Operation::Stop, Some(id)).map(|()| {
            self.clusters.lock().unwrap().retain(|c| &c.id != id);
        });
        futures::future::ready(result).boxed()
    }

    fn scale_cluster<'a>(
        &'a self,
        id: &'a ClusterId,
        model: &'a ClusterModel,
    ) -> BoxFuture<'a, Result<ClusterModel>> {
        self.record(format!("PATCH {}", id));
        let result = self.failure(Operation::Scale, Some(id)).map(|()| {
            let mut clusters = self.clusters.lock().unwrap();
            for existing in clusters.iter_mut().filter(|c| &c.id == id) {
                *existing = model.clone();
            }
            model.clone()
        });
        futures::future::ready(result).boxed()
    }
}

/// A scaling dialog that hands back whatever it was told to.
pub(crate) enum ScriptedDialog {
    /// The user pressed cancel.
    Cancel,
    /// The user pressed OK without touching anything.
    Unchanged,
    /// The user set the worker count.
    Workers(u32),
}

impl ScalingDialog for ScriptedDialog {
    fn show(&self, model: ClusterModel) -> BoxFuture<'_, Option<ClusterModel>> {
        let result = match self {
            ScriptedDialog::Cancel => None,
            ScriptedDialog::Unchanged => Some(model),
            ScriptedDialog::Workers(workers) => {
                let mut edited = model;
                edited.workers = *workers;
                Some(edited)
            }
        };
        futures::future::ready(result).boxed()
    }
}
