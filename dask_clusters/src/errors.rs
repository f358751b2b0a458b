//! Declare our error types.

// Variant fields are described by each variant's message.
#![allow(missing_docs)]

use reqwest::StatusCode;
use std::error::Error as StdError;
use std::fmt;
use std::result;
use thiserror::Error;
use url::Url;

use crate::model::ClusterId;

/// A custom `Result`, for convenience.
pub type Result<T, E = Error> = result::Result<T, E>;

/// The cluster operation that produced an error.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Operation {
    /// `GET dask/clusters`.
    List,
    /// `PUT dask/clusters`.
    Start,
    /// `DELETE dask/clusters/{id}`.
    Stop,
    /// `PATCH dask/clusters/{id}`.
    Scale,
}

impl fmt::Display for Operation {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::List => "list",
            Operation::Start => "start",
            Operation::Stop => "stop",
            Operation::Scale => "scale",
        };
        fmt.write_str(name)
    }
}

/// An error talking to the cluster manager, or validating a request
/// locally before we talk to it.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// We could not access the specified URL.
    #[non_exhaustive]
    #[error("error accessing '{url}': {source}")]
    CouldNotAccessUrl { url: Url, source: Box<Error> },

    /// We could not parse the configured base URL.
    #[non_exhaustive]
    #[error("could not parse base URL {url:?}: {source}")]
    CouldNotParseUrl {
        url: String,
        source: url::ParseError,
    },

    /// The scaling form was filled in with adaptive bounds that can't work.
    #[non_exhaustive]
    #[error("adaptive minimum {minimum} is greater than maximum {maximum}")]
    InvalidAdaptBounds { minimum: u32, maximum: u32 },

    /// The user must specify the environment variable `var`.
    #[non_exhaustive]
    #[error("must specify {var}")]
    MissingEnvVar { var: String },

    /// An environment variable was present but could not be used.
    #[non_exhaustive]
    #[error("invalid value for {var}: {value:?}")]
    InvalidEnvVar { var: String, value: String },

    /// We were asked to act on a cluster that isn't in our list. This is
    /// raised before any request is sent.
    #[non_exhaustive]
    #[error("cannot {operation} cluster {id}: no such cluster")]
    UnknownCluster { operation: Operation, id: ClusterId },

    /// We received an HTTP status code other than the one the operation
    /// succeeds with.
    #[non_exhaustive]
    #[error("failed to {operation} cluster{}: {status} for {url} ({body})", fmt_target(.id))]
    UnexpectedHttpStatus {
        operation: Operation,
        id: Option<ClusterId>,
        url: Url,
        status: StatusCode,
        body: String,
    },

    /// Another kind of error occurred.
    #[non_exhaustive]
    #[error("{source}")]
    Other {
        /// The original error.
        ///
        /// We add `Send + Sync` to make it easy to use in the presence of threads, and
        /// `'static` to make sure it depends on no borrowed data.
        #[from]
        source: Box<dyn StdError + Send + Sync + 'static>,
    },
}

fn fmt_target(id: &Option<ClusterId>) -> String {
    match id {
        Some(id) => format!(" {}", id),
        None => String::new(),
    }
}

impl Error {
    /// Construct an `Error::CouldNotAccessUrl` value.
    pub(crate) fn could_not_access_url<E>(url: &Url, error: E) -> Error
    where
        E: Into<Error>,
    {
        Error::CouldNotAccessUrl {
            url: url.to_owned(),
            source: Box::new(error.into()),
        }
    }

    /// Construct an `Error::CouldNotParseUrl` value.
    pub(crate) fn could_not_parse_url<S>(url: S, error: url::ParseError) -> Error
    where
        S: Into<String>,
    {
        Error::CouldNotParseUrl {
            url: url.into(),
            source: error,
        }
    }

    /// Construct an `Error::UnknownCluster` value.
    pub(crate) fn unknown_cluster(operation: Operation, id: &ClusterId) -> Error {
        Error::UnknownCluster {
            operation,
            id: id.to_owned(),
        }
    }

    /// Construct a `MissingEnvVar` value.
    pub(crate) fn missing_env_var<S: Into<String>>(var: S) -> Self {
        Error::MissingEnvVar { var: var.into() }
    }

    /// Is this error likely to be temporary?
    pub fn might_be_temporary(&self) -> bool {
        match self {
            Error::CouldNotAccessUrl { source, .. } => source.might_be_temporary(),
            // Some HTTP status codes also tend to correspond to temporary errors.
            Error::UnexpectedHttpStatus { status, .. } => matches!(
                *status,
                StatusCode::INTERNAL_SERVER_ERROR
                    | StatusCode::SERVICE_UNAVAILABLE
                    | StatusCode::GATEWAY_TIMEOUT
            ),
            Error::Other { source } => source
                .downcast_ref::<reqwest::Error>()
                .map(|e| e.is_connect() || e.is_timeout())
                .unwrap_or(false),
            _ => false,
        }
    }

    /// Return the innermost error, without any `CouldNotAccessUrl` wrappers.
    pub fn original_error(&self) -> &Error {
        match self {
            Error::CouldNotAccessUrl { source, .. } => source.original_error(),
            _ => self,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(error: reqwest::Error) -> Error {
        Error::Other {
            source: error.into(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Error {
        Error::Other {
            source: error.into(),
        }
    }
}

#[test]
fn unexpected_status_names_operation_and_cluster() {
    let err = Error::UnexpectedHttpStatus {
        operation: Operation::Stop,
        id: Some(ClusterId::from("abc")),
        url: Url::parse("http://localhost:8888/dask/clusters/abc").unwrap(),
        status: StatusCode::NOT_FOUND,
        body: "gone".to_owned(),
    };
    assert_eq!(
        err.to_string(),
        "failed to stop cluster abc: 404 Not Found for \
         http://localhost:8888/dask/clusters/abc (gone)",
    );
    assert!(!err.might_be_temporary());
}

#[test]
fn wrapped_server_errors_might_be_temporary() {
    let url = Url::parse("http://localhost:8888/dask/clusters").unwrap();
    let inner = Error::UnexpectedHttpStatus {
        operation: Operation::Start,
        id: None,
        url: url.clone(),
        status: StatusCode::SERVICE_UNAVAILABLE,
        body: String::new(),
    };
    let err = Error::could_not_access_url(&url, inner);
    assert!(err.might_be_temporary());
    assert!(matches!(
        err.original_error(),
        Error::UnexpectedHttpStatus { .. }
    ));
}
