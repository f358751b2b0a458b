//! Client bindings and sidebar state for the Dask cluster manager.
//!
//! A notebook server extension manages Dask clusters and exposes them over a
//! small REST API (`dask/clusters`). This library talks to that API and keeps
//! the state a cluster sidebar needs: the list of running clusters, which one
//! is active, and a listing view of both.
//!
//! ```no_run
//! use dask_clusters::{dialog::FixedScaling, dialog::ScalingRequest, Client, ClusterManager, Config};
//!
//! # async fn example() -> dask_clusters::Result<()> {
//! let config = Config::new("http://localhost:8888/")?;
//! let dialog = FixedScaling(ScalingRequest::Manual { workers: 4 });
//! let manager = ClusterManager::builder(Client::new(&config), dialog)
//!     .connect()
//!     .await?;
//!
//! // Start a cluster, then scale it to four workers.
//! let cluster = manager.start().await?;
//! manager.scale(&cluster.id).await?;
//! println!("{}", manager.listing());
//! #
//! #   Ok(())
//! # }
//! ```
//!
//! Every mutation is followed by a full refresh of the cluster list; the
//! server is always the source of truth.

#![warn(missing_docs)]

#[macro_use]
extern crate tracing;

pub use client::{Client, ClusterApi};
pub use config::Config;
pub use errors::*;
pub use manager::{
    ActiveClusterChanged, ClusterManager, ClusterManagerBuilder, DashboardLink, Hidden,
};
pub use model::{AdaptBounds, ClusterId, ClusterModel};
pub use poll::{PollHandle, PollOptions};

mod client;
pub mod config;
pub mod dialog;
mod errors;
mod manager;
mod model;
pub mod panel;
pub mod poll;
pub mod snippet;
#[cfg(test)]
mod testing;
pub mod view;
