//! The cluster manager: the sidebar's single source of truth.
//!
//! A [`ClusterManager`] owns the list of known clusters and a pointer to the
//! active one. It never edits a cluster locally. Every mutation is sent to the
//! server and followed by a full re-fetch of the list, which then replaces
//! ours wholesale.
//!
//! Requests are not cancelled or sequenced. If two refreshes overlap (say, a
//! timer tick and the refresh after a `stop`), whichever response arrives last
//! wins. The state lock is only held while swapping values in, never across an
//! `.await`.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use tracing_futures::Instrument;

use crate::client::ClusterApi;
use crate::dialog::ScalingDialog;
use crate::errors::*;
use crate::model::{ClusterId, ClusterModel};
use crate::poll::{poll, PollHandle, PollOptions};
use crate::view::{listing_view, Listing, Render};

/// How many unread change notifications a slow subscriber may fall behind.
const CHANGE_CHANNEL_CAPACITY: usize = 16;

/// Something that displays the active cluster's dashboard.
pub trait DashboardLink: Send + Sync {
    /// Point the dashboard at `path`, relative to the server's base URL.
    fn set_dashboard_url(&self, path: &str);
}

/// Sent to subscribers whenever the active cluster changes.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ActiveClusterChanged {
    /// The previously active cluster.
    pub old: Option<ClusterModel>,
    /// The newly active cluster.
    pub new: Option<ClusterModel>,
}

#[derive(Debug, Default)]
struct State {
    clusters: Vec<ClusterModel>,
    active: Option<ClusterModel>,
    refreshed_at: Option<DateTime<Utc>>,
}

/// Holds the cluster list and the active cluster, and keeps both in sync
/// with the server.
pub struct ClusterManager<A: ClusterApi> {
    api: A,
    dialog: Box<dyn ScalingDialog>,
    dashboard: Option<Box<dyn DashboardLink>>,
    renderer: Option<Box<dyn Render>>,
    state: Mutex<State>,
    visible: AtomicBool,
    changes: broadcast::Sender<ActiveClusterChanged>,
}

/// Collects a manager's collaborators before it is connected.
pub struct ClusterManagerBuilder<A: ClusterApi> {
    api: A,
    dialog: Box<dyn ScalingDialog>,
    dashboard: Option<Box<dyn DashboardLink>>,
    renderer: Option<Box<dyn Render>>,
}

impl<A: ClusterApi> ClusterManagerBuilder<A> {
    /// Tell `dashboard` about the active cluster's dashboard path.
    pub fn dashboard_link<D>(mut self, dashboard: D) -> Self
    where
        D: DashboardLink + 'static,
    {
        self.dashboard = Some(Box::new(dashboard));
        self
    }

    /// Draw listings with `renderer` while the manager is visible.
    pub fn renderer<R>(mut self, renderer: R) -> Self
    where
        R: Render + 'static,
    {
        self.renderer = Some(Box::new(renderer));
        self
    }

    /// Build the manager without contacting the server.
    pub fn build(self) -> Arc<ClusterManager<A>> {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Arc::new(ClusterManager {
            api: self.api,
            dialog: self.dialog,
            dashboard: self.dashboard,
            renderer: self.renderer,
            state: Mutex::new(State::default()),
            visible: AtomicBool::new(false),
            changes,
        })
    }

    /// Build the manager and fetch the initial cluster list.
    pub async fn connect(self) -> Result<Arc<ClusterManager<A>>> {
        let manager = self.build();
        manager.refresh().await?;
        Ok(manager)
    }
}

impl<A: ClusterApi> ClusterManager<A> {
    /// Start building a manager that talks to `api` and asks `dialog` about
    /// scaling.
    pub fn builder<D>(api: A, dialog: D) -> ClusterManagerBuilder<A>
    where
        D: ScalingDialog + 'static,
    {
        ClusterManagerBuilder {
            api,
            dialog: Box::new(dialog),
            dashboard: None,
            renderer: None,
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A panic while holding the lock can't leave `State` half-written:
        // every update is a plain field assignment.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The clusters we currently know about, in server order.
    pub fn clusters(&self) -> Vec<ClusterModel> {
        self.lock().clusters.clone()
    }

    /// The active cluster, if any.
    pub fn active_cluster(&self) -> Option<ClusterModel> {
        self.lock().active.clone()
    }

    /// The listing for our current state.
    pub fn listing(&self) -> Listing {
        let state = self.lock();
        listing_view(
            &state.clusters,
            state.active.as_ref().map(|c| &c.id),
            state.refreshed_at,
        )
    }

    /// Listen for changes to the active cluster.
    pub fn subscribe(&self) -> broadcast::Receiver<ActiveClusterChanged> {
        self.changes.subscribe()
    }

    /// Is the panel showing?
    pub fn is_visible(&self) -> bool {
        self.visible.load(Ordering::SeqCst)
    }

    /// Show or hide the panel. Becoming visible re-renders immediately, since
    /// nothing was drawn while we were hidden.
    pub fn set_visible(&self, visible: bool) {
        let was_visible = self.visible.swap(visible, Ordering::SeqCst);
        if visible && !was_visible {
            if let Some(renderer) = &self.renderer {
                renderer.invalidate();
            }
            self.update();
        }
    }

    /// Hide the panel until the returned guard is dropped, then restore
    /// whatever visibility it had before.
    pub fn hidden(&self) -> Hidden<'_, A> {
        let was_visible = self.visible.load(Ordering::SeqCst);
        self.set_visible(false);
        Hidden {
            manager: self,
            was_visible,
        }
    }

    /// Re-render, if anyone is looking.
    fn update(&self) {
        if !self.is_visible() {
            trace!("hidden, skipping render");
            return;
        }
        if let Some(renderer) = &self.renderer {
            renderer.render(&self.listing());
        }
    }

    /// Tell everyone who cares that the active cluster changed.
    fn announce(&self, change: ActiveClusterChanged) {
        if let (Some(dashboard), Some(new)) = (&self.dashboard, &change.new) {
            dashboard.set_dashboard_url(&new.id.dashboard_path());
        }
        debug!(
            "active cluster {:?} -> {:?}",
            change.old.as_ref().map(|c| &c.id),
            change.new.as_ref().map(|c| &c.id),
        );
        // Having no subscribers is fine.
        let _ = self.changes.send(change);
    }

    /// Fetch the full cluster list and replace ours with it.
    ///
    /// If the active cluster is gone (or nothing was active), the first
    /// cluster in the new list becomes active, or none if the list is empty.
    pub async fn refresh(&self) -> Result<Vec<ClusterModel>> {
        let clusters = self.api.list_clusters().await?;
        let change = {
            let mut state = self.lock();
            let still_active = state
                .active
                .as_ref()
                .and_then(|active| clusters.iter().find(|c| c.id == active.id))
                .cloned();
            let old = state.active.clone();
            let change = match still_active {
                Some(fresh) => {
                    state.active = Some(fresh);
                    None
                }
                None => {
                    state.active = clusters.first().cloned();
                    if old.as_ref().map(|c| &c.id) != state.active.as_ref().map(|c| &c.id) {
                        Some(ActiveClusterChanged {
                            old,
                            new: state.active.clone(),
                        })
                    } else {
                        None
                    }
                }
            };
            state.clusters = clusters.clone();
            state.refreshed_at = Some(Utc::now());
            change
        };
        if let Some(change) = change {
            self.announce(change);
        }
        self.update();
        Ok(clusters)
    }

    /// Start a new cluster, then refresh.
    pub async fn start(&self) -> Result<ClusterModel> {
        let model = self.api.start_cluster().await?;
        info!("started cluster {} ({})", model.id, model.name);
        self.refresh().await?;
        Ok(model)
    }

    /// Look up a cluster we know about, or fail without touching the network.
    fn known(&self, operation: Operation, id: &ClusterId) -> Result<ClusterModel> {
        self.lock()
            .clusters
            .iter()
            .find(|c| &c.id == id)
            .cloned()
            .ok_or_else(|| Error::unknown_cluster(operation, id))
    }

    /// Stop a cluster, then refresh.
    pub async fn stop(&self, id: &ClusterId) -> Result<()> {
        self.known(Operation::Stop, id)?;
        self.api.stop_cluster(id).await?;
        info!("stopped cluster {}", id);
        self.refresh().await?;
        Ok(())
    }

    /// Ask the user how to scale a cluster, send the answer, then refresh.
    ///
    /// If the user cancels or changes nothing, no request is sent and the
    /// cluster's current model is returned as-is.
    pub async fn scale(&self, id: &ClusterId) -> Result<ClusterModel> {
        let original = self.known(Operation::Scale, id)?;
        let edited = match self.dialog.show(original.clone()).await {
            Some(edited) if edited != original => edited,
            _ => {
                debug!("scaling {} left unchanged", id);
                return Ok(original);
            }
        };
        let model = self.api.scale_cluster(id, &edited).await?;
        info!("scaled cluster {}", id);
        self.refresh().await?;
        Ok(model)
    }

    /// Make `id` the active cluster.
    ///
    /// Unknown IDs and the already-active cluster are ignored. Returns
    /// whether anything changed.
    pub fn set_active_cluster(&self, id: &ClusterId) -> bool {
        let change = {
            let mut state = self.lock();
            if state.active.as_ref().map(|c| &c.id) == Some(id) {
                return false;
            }
            let new = match state.clusters.iter().find(|c| &c.id == id) {
                Some(cluster) => cluster.clone(),
                None => {
                    debug!("ignoring unknown cluster {}", id);
                    return false;
                }
            };
            let old = state.active.replace(new.clone());
            ActiveClusterChanged {
                old,
                new: Some(new),
            }
        };
        self.announce(change);
        self.update();
        true
    }

    /// Refresh in the background until the returned handle is dropped.
    ///
    /// Polling keeps going while the panel is hidden; only rendering stops.
    pub fn spawn_polling(self: &Arc<Self>, options: PollOptions) -> PollHandle {
        let manager = Arc::clone(self);
        let task = async move {
            poll(options, || manager.refresh()).await;
        }
        .instrument(info_span!("cluster_poll"));
        PollHandle::new(tokio::spawn(task))
    }
}

/// Keeps a [`ClusterManager`] hidden while it lives. See
/// [`ClusterManager::hidden`].
#[must_use = "the panel is shown again as soon as this is dropped"]
pub struct Hidden<'a, A: ClusterApi> {
    manager: &'a ClusterManager<A>,
    was_visible: bool,
}

impl<'a, A: ClusterApi> Drop for Hidden<'a, A> {
    fn drop(&mut self) {
        if self.was_visible {
            self.manager.set_visible(true);
        }
    }
}

#[cfg(test)]
use crate::testing::{cluster, FakeApi, ScriptedDialog};
#[cfg(test)]
use reqwest::StatusCode;
#[cfg(test)]
use std::time::Duration;

#[cfg(test)]
#[derive(Clone, Default)]
struct Recorder {
    paths: Arc<Mutex<Vec<String>>>,
    renders: Arc<Mutex<Vec<Listing>>>,
    invalidations: Arc<Mutex<usize>>,
}

#[cfg(test)]
impl DashboardLink for Recorder {
    fn set_dashboard_url(&self, path: &str) {
        self.paths.lock().unwrap().push(path.to_owned());
    }
}

#[cfg(test)]
impl Render for Recorder {
    fn render(&self, listing: &Listing) {
        self.renders.lock().unwrap().push(listing.clone());
    }

    fn invalidate(&self) {
        *self.invalidations.lock().unwrap() += 1;
    }
}

#[cfg(test)]
async fn connect(
    api: FakeApi,
    dialog: ScriptedDialog,
) -> (Arc<ClusterManager<FakeApi>>, Recorder) {
    let recorder = Recorder::default();
    let manager = ClusterManager::builder(api, dialog)
        .dashboard_link(recorder.clone())
        .renderer(recorder.clone())
        .connect()
        .await
        .unwrap();
    (manager, recorder)
}

#[cfg(test)]
fn id(id: &str) -> ClusterId {
    ClusterId::from(id)
}

#[tokio::test]
async fn first_cluster_becomes_active_then_cleared() {
    let (manager, recorder) =
        connect(FakeApi::with_clusters(&["a"]), ScriptedDialog::Cancel).await;
    assert_eq!(manager.active_cluster().unwrap().id, id("a"));
    assert_eq!(*recorder.paths.lock().unwrap(), vec!["dask/dashboard/a"]);

    let mut changes = manager.subscribe();
    manager.stop(&id("a")).await.unwrap();
    assert!(manager.clusters().is_empty());
    assert_eq!(manager.active_cluster(), None);
    let change = changes.try_recv().unwrap();
    assert_eq!(change.old.unwrap().id, id("a"));
    assert_eq!(change.new, None);
}

#[tokio::test]
async fn refresh_keeps_active_cluster_that_still_exists() {
    let api = FakeApi::with_clusters(&["a", "b"]);
    let (manager, _) = connect(api, ScriptedDialog::Cancel).await;
    assert!(manager.set_active_cluster(&id("b")));

    let mut changes = manager.subscribe();
    manager.refresh().await.unwrap();
    assert_eq!(manager.active_cluster().unwrap().id, id("b"));
    assert!(changes.try_recv().is_err());
}

#[tokio::test]
async fn refresh_falls_back_to_first_cluster() {
    let (manager, recorder) =
        connect(FakeApi::with_clusters(&["a", "b"]), ScriptedDialog::Cancel).await;
    manager.set_active_cluster(&id("b"));
    manager.api.set_clusters(&["c", "a"]);
    manager.refresh().await.unwrap();
    assert_eq!(manager.active_cluster().unwrap().id, id("c"));
    assert_eq!(
        *recorder.paths.lock().unwrap(),
        vec!["dask/dashboard/a", "dask/dashboard/b", "dask/dashboard/c"],
    );
}

#[tokio::test]
async fn selecting_active_cluster_again_is_a_no_op() {
    let (manager, recorder) =
        connect(FakeApi::with_clusters(&["a", "b"]), ScriptedDialog::Cancel).await;
    let mut changes = manager.subscribe();
    assert!(!manager.set_active_cluster(&id("a")));
    assert!(!manager.set_active_cluster(&id("nope")));
    assert!(changes.try_recv().is_err());
    assert_eq!(recorder.paths.lock().unwrap().len(), 1);

    assert!(manager.set_active_cluster(&id("b")));
    let change = changes.try_recv().unwrap();
    assert_eq!(change.old.unwrap().id, id("a"));
    assert_eq!(change.new.unwrap().id, id("b"));
}

#[tokio::test]
async fn start_returns_new_model_and_refreshes() {
    let (manager, _) = connect(FakeApi::default(), ScriptedDialog::Cancel).await;
    let model = manager.start().await.unwrap();
    assert_eq!(model.id, id("new-1"));
    assert_eq!(manager.api.requests(), vec!["GET", "PUT", "GET"]);
    assert_eq!(manager.active_cluster().unwrap().id, id("new-1"));
}

#[tokio::test]
async fn failed_start_leaves_state_alone() {
    let (manager, _) = connect(FakeApi::with_clusters(&["a"]), ScriptedDialog::Cancel).await;
    manager.api.fail_next(StatusCode::INTERNAL_SERVER_ERROR);
    let err = manager.start().await.unwrap_err();
    assert!(matches!(
        err,
        Error::UnexpectedHttpStatus {
            operation: Operation::Start,
            ..
        }
    ));
    assert_eq!(manager.api.count("GET"), 1);
    assert_eq!(manager.clusters().len(), 1);
}

#[tokio::test]
async fn unknown_ids_fail_before_any_request() {
    let (manager, _) = connect(FakeApi::with_clusters(&["a"]), ScriptedDialog::Workers(9)).await;
    let err = manager.stop(&id("zzz")).await.unwrap_err();
    assert!(matches!(
        err,
        Error::UnknownCluster {
            operation: Operation::Stop,
            ..
        }
    ));
    let err = manager.scale(&id("zzz")).await.unwrap_err();
    assert!(matches!(
        err,
        Error::UnknownCluster {
            operation: Operation::Scale,
            ..
        }
    ));
    assert_eq!(manager.api.requests(), vec!["GET"]);
}

#[tokio::test]
async fn failed_stop_does_not_refresh() {
    let (manager, _) = connect(FakeApi::with_clusters(&["a"]), ScriptedDialog::Cancel).await;
    manager.api.fail_next(StatusCode::NOT_FOUND);
    assert!(manager.stop(&id("a")).await.is_err());
    assert_eq!(manager.api.requests(), vec!["GET", "DELETE a"]);
    assert_eq!(manager.active_cluster().unwrap().id, id("a"));
}

#[tokio::test]
async fn unchanged_or_cancelled_scaling_sends_nothing() {
    for dialog in vec![ScriptedDialog::Cancel, ScriptedDialog::Unchanged] {
        let (manager, _) = connect(FakeApi::with_clusters(&["a"]), dialog).await;
        let model = manager.scale(&id("a")).await.unwrap();
        assert_eq!(model, cluster("a"));
        assert_eq!(manager.api.requests(), vec!["GET"]);
    }
}

#[tokio::test]
async fn scaling_sends_edit_and_refreshes() {
    let (manager, _) = connect(FakeApi::with_clusters(&["a"]), ScriptedDialog::Workers(6)).await;
    let model = manager.scale(&id("a")).await.unwrap();
    assert_eq!(model.workers, 6);
    assert_eq!(manager.api.requests(), vec!["GET", "PATCH a", "GET"]);
    assert_eq!(manager.active_cluster().unwrap().workers, 6);
}

#[tokio::test]
async fn renders_only_while_visible() {
    let (manager, recorder) =
        connect(FakeApi::with_clusters(&["a"]), ScriptedDialog::Cancel).await;
    assert!(recorder.renders.lock().unwrap().is_empty());

    manager.set_visible(true);
    assert_eq!(recorder.renders.lock().unwrap().len(), 1);
    manager.refresh().await.unwrap();
    assert_eq!(recorder.renders.lock().unwrap().len(), 2);

    manager.set_visible(false);
    manager.refresh().await.unwrap();
    assert_eq!(recorder.renders.lock().unwrap().len(), 2);
    assert_eq!(manager.api.count("GET"), 3);

    let last = recorder.renders.lock().unwrap().last().cloned().unwrap();
    assert_eq!(last.active_item().unwrap().model.id, id("a"));
}

#[tokio::test(start_paused = true)]
async fn polling_refreshes_on_a_timer() {
    let (manager, _) = connect(FakeApi::with_clusters(&["a"]), ScriptedDialog::Cancel).await;
    let handle = manager.spawn_polling(PollOptions::default());
    tokio::time::sleep(Duration::from_secs(11)).await;
    assert_eq!(manager.api.count("GET"), 3);
    drop(handle);
    tokio::time::sleep(Duration::from_secs(20)).await;
    assert_eq!(manager.api.count("GET"), 3);
}

#[tokio::test]
async fn failed_initial_fetch_is_returned() {
    let api = FakeApi::with_clusters(&["a"]);
    api.fail_next(StatusCode::SERVICE_UNAVAILABLE);
    let result = ClusterManager::builder(api, ScriptedDialog::Cancel)
        .connect()
        .await;
    match result {
        Err(Error::UnexpectedHttpStatus {
            operation: Operation::List,
            status,
            ..
        }) => assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE),
        Err(other) => panic!("unexpected error: {}", other),
        Ok(_) => panic!("connect should have failed"),
    }
}

#[tokio::test]
async fn showing_again_redraws_from_scratch() {
    let (manager, recorder) =
        connect(FakeApi::with_clusters(&["a"]), ScriptedDialog::Cancel).await;
    manager.set_visible(true);
    manager.set_visible(true);
    assert_eq!(*recorder.invalidations.lock().unwrap(), 1);

    manager.set_visible(false);
    manager.set_visible(true);
    assert_eq!(*recorder.invalidations.lock().unwrap(), 2);
    assert_eq!(recorder.renders.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn hidden_guard_restores_visibility() {
    let (manager, recorder) =
        connect(FakeApi::with_clusters(&["a"]), ScriptedDialog::Cancel).await;
    manager.set_visible(true);
    {
        let _hidden = manager.hidden();
        assert!(!manager.is_visible());
        manager.refresh().await.unwrap();
        assert_eq!(recorder.renders.lock().unwrap().len(), 1);
    }
    assert!(manager.is_visible());
    assert_eq!(recorder.renders.lock().unwrap().len(), 2);

    manager.set_visible(false);
    drop(manager.hidden());
    assert!(!manager.is_visible());
}
