//! The scaling dialog contract, and the form logic behind it.

use futures::future::BoxFuture;

use crate::errors::*;
use crate::model::{AdaptBounds, ClusterModel};

/// Something that can ask the user how a cluster should be scaled.
///
/// The dialog receives a copy of the cluster's current model. It resolves to
/// `None` if the user cancelled, or to the edited model otherwise. Returning
/// a model equal to the one passed in is treated exactly like a cancel.
pub trait ScalingDialog: Send + Sync {
    /// Present the dialog for `model`.
    fn show(&self, model: ClusterModel) -> BoxFuture<'_, Option<ClusterModel>>;
}

/// What the user asked for in the scaling form.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ScalingRequest {
    /// Run exactly this many workers.
    Manual {
        /// The number of workers.
        workers: u32,
    },
    /// Let the cluster scale itself between two bounds.
    Adaptive {
        /// The fewest workers to keep.
        minimum: u32,
        /// The most workers to allow.
        maximum: u32,
    },
}

impl ScalingRequest {
    /// The form's initial state for `model`.
    pub fn from_model(model: &ClusterModel) -> ScalingRequest {
        match model.adapt {
            Some(AdaptBounds { minimum, maximum }) => {
                ScalingRequest::Adaptive { minimum, maximum }
            }
            None => ScalingRequest::Manual {
                workers: model.workers,
            },
        }
    }

    /// Return a copy of `model` edited to reflect this request.
    ///
    /// Manual scaling turns adaptive scaling off. Adaptive scaling leaves the
    /// worker count alone, since the server decides it from then on.
    pub fn apply(&self, model: &ClusterModel) -> Result<ClusterModel> {
        let mut edited = model.clone();
        match *self {
            ScalingRequest::Manual { workers } => {
                edited.workers = workers;
                edited.adapt = None;
            }
            ScalingRequest::Adaptive { minimum, maximum } => {
                if minimum > maximum {
                    return Err(Error::InvalidAdaptBounds { minimum, maximum });
                }
                edited.adapt = Some(AdaptBounds { minimum, maximum });
            }
        }
        Ok(edited)
    }
}

/// A dialog that answers every request with the same, pre-decided edit.
///
/// Useful for non-interactive front ends, where the scaling settings come
/// from the command line.
#[derive(Clone, Copy, Debug)]
pub struct FixedScaling(pub ScalingRequest);

impl ScalingDialog for FixedScaling {
    fn show(&self, model: ClusterModel) -> BoxFuture<'_, Option<ClusterModel>> {
        let edited = match self.0.apply(&model) {
            Ok(edited) => Some(edited),
            Err(err) => {
                warn!("ignoring scaling request for {}: {}", model.id, err);
                None
            }
        };
        Box::pin(futures::future::ready(edited))
    }
}

#[cfg(test)]
use crate::testing::cluster;

#[test]
fn form_starts_from_current_settings() {
    let mut model = cluster("a");
    assert_eq!(
        ScalingRequest::from_model(&model),
        ScalingRequest::Manual { workers: 2 }
    );
    model.adapt = Some(AdaptBounds {
        minimum: 1,
        maximum: 4,
    });
    assert_eq!(
        ScalingRequest::from_model(&model),
        ScalingRequest::Adaptive {
            minimum: 1,
            maximum: 4
        }
    );
}

#[test]
fn manual_scaling_clears_adapt() {
    let mut model = cluster("a");
    model.adapt = Some(AdaptBounds {
        minimum: 1,
        maximum: 4,
    });
    let edited = ScalingRequest::Manual { workers: 7 }.apply(&model).unwrap();
    assert_eq!(edited.workers, 7);
    assert_eq!(edited.adapt, None);
    assert_eq!(edited.id, model.id);
}

#[test]
fn adaptive_bounds_must_be_ordered() {
    let model = cluster("a");
    let err = ScalingRequest::Adaptive {
        minimum: 5,
        maximum: 2,
    }
    .apply(&model)
    .unwrap_err();
    assert!(matches!(
        err,
        Error::InvalidAdaptBounds {
            minimum: 5,
            maximum: 2
        }
    ));
}

#[tokio::test]
async fn fixed_scaling_cancels_invalid_requests() {
    let dialog = FixedScaling(ScalingRequest::Adaptive {
        minimum: 3,
        maximum: 1,
    });
    assert_eq!(dialog.show(cluster("a")).await, None);

    let dialog = FixedScaling(ScalingRequest::Manual { workers: 4 });
    let edited = dialog.show(cluster("a")).await.unwrap();
    assert_eq!(edited.workers, 4);
}
