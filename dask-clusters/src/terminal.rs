//! Terminal stand-ins for the notebook host's collaborators.

use dask_clusters::{
    snippet::{client_code, ClientCodeInjector},
    view::{Listing, ListingItem, Render},
    ClusterModel, DashboardLink,
};
use std::sync::Mutex;
use tracing::info;
use url::Url;

/// Prints the listing to stdout.
///
/// Background refreshes usually find nothing new, so an unchanged listing is
/// not printed again.
#[derive(Default)]
pub struct TerminalRenderer {
    last: Mutex<Option<Vec<ListingItem>>>,
}

impl TerminalRenderer {
    /// Remember `listing`, and return true if it differs from the last one
    /// we printed.
    fn changed(&self, listing: &Listing) -> bool {
        let mut last = self.last.lock().unwrap_or_else(|p| p.into_inner());
        if last.as_ref() == Some(&listing.items) {
            return false;
        }
        *last = Some(listing.items.clone());
        true
    }
}

impl Render for TerminalRenderer {
    fn render(&self, listing: &Listing) {
        if self.changed(listing) {
            println!("{}", listing);
        }
    }

    fn invalidate(&self) {
        *self.last.lock().unwrap_or_else(|p| p.into_inner()) = None;
    }
}

/// Logs where the active cluster's dashboard lives.
pub struct LogDashboard {
    base_url: Url,
}

impl LogDashboard {
    pub fn new(base_url: &Url) -> LogDashboard {
        LogDashboard {
            base_url: base_url.to_owned(),
        }
    }
}

impl DashboardLink for LogDashboard {
    fn set_dashboard_url(&self, path: &str) {
        match self.base_url.join(path) {
            Ok(url) => info!("dashboard: {}", url),
            Err(_) => info!("dashboard: {}", path),
        }
    }
}

/// "Injects" client code by printing it.
pub struct StdoutInjector;

impl ClientCodeInjector for StdoutInjector {
    fn inject_client_code(&self, model: &ClusterModel) {
        println!("{}", client_code(model));
    }
}

#[test]
fn unchanged_listing_is_printed_again_after_invalidate() {
    use dask_clusters::view::listing_view;

    let renderer = TerminalRenderer::default();
    let listing = listing_view(&[], None, None);
    assert!(renderer.changed(&listing));
    assert!(!renderer.changed(&listing));
    renderer.invalidate();
    assert!(renderer.changed(&listing));
}
