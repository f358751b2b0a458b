//! A client connection to the cluster manager server extension.

use futures::{future::BoxFuture, FutureExt};
use reqwest::{self, StatusCode};
use serde::de::DeserializeOwned;
use serde_json;
use url::Url;

use crate::config::Config;
use crate::errors::*;
use crate::model::{ClusterId, ClusterModel};

/// The requests the cluster manager needs from a server.
///
/// [`Client`] is the real implementation. Each method resolves to `Ok` only
/// for the status code that operation documents as success.
pub trait ClusterApi: Send + Sync + 'static {
    /// Fetch every cluster the server knows about, in server order.
    fn list_clusters(&self) -> BoxFuture<'_, Result<Vec<ClusterModel>>>;

    /// Ask the server to create a new cluster.
    fn start_cluster(&self) -> BoxFuture<'_, Result<ClusterModel>>;

    /// Ask the server to shut a cluster down.
    fn stop_cluster<'a>(&'a self, id: &'a ClusterId) -> BoxFuture<'a, Result<()>>;

    /// Ask the server to apply the scaling settings in `model`.
    fn scale_cluster<'a>(
        &'a self,
        id: &'a ClusterId,
        model: &'a ClusterModel,
    ) -> BoxFuture<'a, Result<ClusterModel>>;
}

/// A client connection to the cluster manager.
#[derive(Clone, Debug)]
pub struct Client {
    base_url: Url,
    http: reqwest::Client,
}

impl Client {
    /// Create a new `Client`.
    pub fn new(config: &Config) -> Client {
        Client {
            base_url: config.base_url().to_owned(),
            http: reqwest::Client::new(),
        }
    }

    /// The URL of the cluster collection.
    fn clusters_url(&self) -> Result<Url> {
        self.base_url
            .join("dask/clusters")
            .map_err(|e| Error::could_not_parse_url(self.base_url.as_str(), e))
    }

    /// The URL of a single cluster. The ID is pushed as one path segment so
    /// that it gets percent-encoded.
    fn cluster_url(&self, id: &ClusterId) -> Result<Url> {
        let mut url = self.clusters_url()?;
        url.path_segments_mut()
            .map_err(|_| {
                Error::could_not_parse_url(
                    self.base_url.as_str(),
                    url::ParseError::RelativeUrlWithCannotBeABaseBase,
                )
            })?
            .push(id.as_str());
        Ok(url)
    }

    /// List all clusters.
    ///
    /// The server answers this one with a JSON array whatever the status, so
    /// we only fail if the body isn't one.
    pub async fn list(&self) -> Result<Vec<ClusterModel>> {
        let url = self.clusters_url()?;
        debug!("GET {}", url);
        let res = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|e| Error::could_not_access_url(&url, e))?;
        if !res.status().is_success() {
            warn!("GET {} returned {}, parsing body anyway", url, res.status());
        }
        self.deserialize_body(&url, res).await
    }

    /// Start a new cluster.
    pub async fn start(&self) -> Result<ClusterModel> {
        let url = self.clusters_url()?;
        debug!("PUT {}", url);
        let res = self
            .http
            .put(url.clone())
            .send()
            .await
            .map_err(|e| Error::could_not_access_url(&url, e))?;
        if res.status() == StatusCode::OK {
            self.deserialize_body(&url, res).await
        } else {
            self.response_to_err(Operation::Start, None, &url, res).await
        }
    }

    /// Stop the specified cluster.
    pub async fn stop(&self, id: &ClusterId) -> Result<()> {
        let url = self.cluster_url(id)?;
        debug!("DELETE {}", url);
        let res = self
            .http
            .delete(url.clone())
            .send()
            .await
            .map_err(|e| Error::could_not_access_url(&url, e))?;
        if res.status() == StatusCode::NO_CONTENT {
            debug!("Stopped {}", id);
            Ok(())
        } else {
            self.response_to_err(Operation::Stop, Some(id), &url, res)
                .await
        }
    }

    /// Send `model` as the new scaling settings for the specified cluster.
    pub async fn scale(&self, id: &ClusterId, model: &ClusterModel) -> Result<ClusterModel> {
        let url = self.cluster_url(id)?;
        debug!("PATCH {} {:?}", url, serde_json::to_string(model));
        let res = self
            .http
            .patch(url.clone())
            .json(model)
            .send()
            .await
            .map_err(|e| Error::could_not_access_url(&url, e))?;
        if res.status() == StatusCode::OK {
            self.deserialize_body(&url, res).await
        } else {
            self.response_to_err(Operation::Scale, Some(id), &url, res)
                .await
        }
    }

    /// Read a response body and parse it as JSON.
    async fn deserialize_body<T>(&self, url: &Url, res: reqwest::Response) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let body = res
            .text()
            .await
            .map_err(|e| Error::could_not_access_url(url, e))?;
        debug!("Response body: {}", &body);
        let value = serde_json::from_str(&body)
            .map_err(|e| Error::could_not_access_url(url, e))?;
        Ok(value)
    }

    async fn response_to_err<T>(
        &self,
        operation: Operation,
        id: Option<&ClusterId>,
        url: &Url,
        res: reqwest::Response,
    ) -> Result<T> {
        let status = res.status();
        let body = res
            .text()
            .await
            .map_err(|e| Error::could_not_access_url(url, e))?;
        debug!("Error status: {} body: {}", status, body);
        Err(Error::UnexpectedHttpStatus {
            operation,
            id: id.cloned(),
            url: url.to_owned(),
            status,
            body,
        })
    }
}

impl ClusterApi for Client {
    fn list_clusters(&self) -> BoxFuture<'_, Result<Vec<ClusterModel>>> {
        self.list().boxed()
    }

    fn start_cluster(&self) -> BoxFuture<'_, Result<ClusterModel>> {
        self.start().boxed()
    }

    fn stop_cluster<'a>(&'a self, id: &'a ClusterId) -> BoxFuture<'a, Result<()>> {
        self.stop(id).boxed()
    }

    fn scale_cluster<'a>(
        &'a self,
        id: &'a ClusterId,
        model: &'a ClusterModel,
    ) -> BoxFuture<'a, Result<ClusterModel>> {
        self.scale(id, model).boxed()
    }
}

#[test]
fn cluster_urls_are_relative_to_base() {
    let config = Config::new("http://localhost:8888/user/me").unwrap();
    let client = Client::new(&config);
    assert_eq!(
        client.clusters_url().unwrap().as_str(),
        "http://localhost:8888/user/me/dask/clusters",
    );
    assert_eq!(
        client.cluster_url(&ClusterId::from("a b/c")).unwrap().as_str(),
        "http://localhost:8888/user/me/dask/clusters/a%20b%2Fc",
    );
}
