//! Where to find the cluster manager, and how often to ask it for news.

use std::env;
use std::time::Duration;
use url::Url;

use crate::errors::*;

/// The environment variable holding the server's base URL.
pub const URL_VAR: &str = "DASK_CLUSTERS_URL";

/// The environment variable holding the refresh interval, in seconds.
pub const REFRESH_SECS_VAR: &str = "DASK_CLUSTERS_REFRESH_SECS";

/// How often we re-fetch the cluster list unless told otherwise.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(5);

/// Settings shared by the client and the manager. This uses a "builder"
/// pattern, so you can write:
///
/// ```
/// use std::time::Duration;
/// use dask_clusters::Config;
///
/// let config = Config::new("http://localhost:8888/")?
///     .refresh_interval(Duration::from_secs(10));
/// # Ok::<(), dask_clusters::Error>(())
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Config {
    /// The URL the server extension is mounted under.
    base_url: Url,

    /// Time between background refreshes.
    refresh_interval: Duration,
}

impl Config {
    /// Create a new `Config` pointing at `base_url`.
    pub fn new(base_url: &str) -> Result<Config> {
        let mut url = Url::parse(base_url)
            .map_err(|e| Error::could_not_parse_url(base_url, e))?;
        if url.cannot_be_a_base() {
            return Err(Error::could_not_parse_url(
                base_url,
                url::ParseError::RelativeUrlWithCannotBeABaseBase,
            ));
        }
        // `Url::join` replaces the last path segment unless the path ends in
        // a slash, and the server is often mounted under a prefix.
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(Config {
            base_url: url,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
        })
    }

    /// Build a `Config` from `DASK_CLUSTERS_URL` and, optionally,
    /// `DASK_CLUSTERS_REFRESH_SECS`.
    pub fn from_env() -> Result<Config> {
        let url = env::var(URL_VAR).map_err(|_| Error::missing_env_var(URL_VAR))?;
        let mut config = Config::new(&url)?;
        if let Ok(secs) = env::var(REFRESH_SECS_VAR) {
            let parsed = secs.trim().parse::<u64>().ok().filter(|&s| s > 0);
            match parsed {
                Some(secs) => config.refresh_interval = Duration::from_secs(secs),
                None => {
                    return Err(Error::InvalidEnvVar {
                        var: REFRESH_SECS_VAR.to_owned(),
                        value: secs,
                    })
                }
            }
        }
        Ok(config)
    }

    /// How long should we wait between background refreshes? Defaults to 5
    /// seconds.
    pub fn refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    /// The base URL, always ending in a slash.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The configured refresh interval.
    pub fn interval(&self) -> Duration {
        self.refresh_interval
    }
}

#[test]
fn base_url_gains_trailing_slash() {
    let config = Config::new("http://localhost:8888/user/me").unwrap();
    assert_eq!(config.base_url().as_str(), "http://localhost:8888/user/me/");
    assert_eq!(config.interval(), DEFAULT_REFRESH_INTERVAL);
}

#[test]
fn bad_base_url_is_reported() {
    let err = Config::new("not a url").unwrap_err();
    assert!(matches!(err, Error::CouldNotParseUrl { .. }));
}
