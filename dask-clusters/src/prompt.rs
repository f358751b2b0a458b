//! Scaling dialogs for the terminal.

use anyhow::Result;
use dask_clusters::{
    dialog::{FixedScaling, ScalingDialog, ScalingRequest},
    ClusterModel,
};
use futures::{future::BoxFuture, FutureExt};
use inquire::{Confirm, CustomType};
use tracing::warn;

/// The dialog used by the command line: either settings given up front as
/// flags, or an interactive form.
pub enum CliDialog {
    /// Use the settings from the command line.
    Fixed(FixedScaling),
    /// Ask on the terminal.
    Prompt,
}

impl CliDialog {
    /// Pick a dialog based on the `scale` flags.
    pub fn from_flags(workers: Option<u32>, adapt: Option<Vec<u32>>) -> CliDialog {
        match (workers, adapt.as_deref()) {
            (Some(workers), _) => CliDialog::Fixed(FixedScaling(ScalingRequest::Manual { workers })),
            (None, Some(&[minimum, maximum])) => {
                CliDialog::Fixed(FixedScaling(ScalingRequest::Adaptive { minimum, maximum }))
            }
            _ => CliDialog::Prompt,
        }
    }
}

impl ScalingDialog for CliDialog {
    fn show(&self, model: ClusterModel) -> BoxFuture<'_, Option<ClusterModel>> {
        match self {
            CliDialog::Fixed(fixed) => fixed.show(model),
            CliDialog::Prompt => async move {
                // `inquire` blocks on the terminal, so keep it off the event loop.
                match tokio::task::spawn_blocking(move || prompt(&model)).await {
                    Ok(Ok(edited)) => edited,
                    Ok(Err(err)) => {
                        warn!("scaling cancelled: {}", err);
                        None
                    }
                    Err(err) => {
                        warn!("scaling dialog failed: {}", err);
                        None
                    }
                }
            }
            .boxed(),
        }
    }
}

/// Ask how to scale `model`. Returns `None` if the user backs out with Esc.
fn prompt(model: &ClusterModel) -> Result<Option<ClusterModel>> {
    println!("Scale {} ({})", model.name, model.id);
    let adaptive = match Confirm::new("Use adaptive scaling?")
        .with_default(model.is_adaptive())
        .prompt_skippable()?
    {
        Some(adaptive) => adaptive,
        None => return Ok(None),
    };

    let request = if adaptive {
        let (min_default, max_default) = match ScalingRequest::from_model(model) {
            ScalingRequest::Adaptive { minimum, maximum } => (minimum, maximum),
            ScalingRequest::Manual { workers } => (workers, workers),
        };
        let minimum = match ask_count("Minimum workers", min_default)? {
            Some(n) => n,
            None => return Ok(None),
        };
        let maximum = match ask_count("Maximum workers", max_default.max(minimum))? {
            Some(n) => n,
            None => return Ok(None),
        };
        ScalingRequest::Adaptive { minimum, maximum }
    } else {
        match ask_count("Workers", model.workers)? {
            Some(workers) => ScalingRequest::Manual { workers },
            None => return Ok(None),
        }
    };
    Ok(Some(request.apply(model)?))
}

fn ask_count(message: &str, default: u32) -> Result<Option<u32>> {
    Ok(CustomType::<u32>::new(message)
        .with_default(default)
        .with_error_message("Please type a whole number")
        .prompt_skippable()?)
}

#[test]
fn flags_pick_fixed_scaling() {
    assert!(matches!(
        CliDialog::from_flags(Some(3), None),
        CliDialog::Fixed(FixedScaling(ScalingRequest::Manual { workers: 3 }))
    ));
    assert!(matches!(
        CliDialog::from_flags(None, Some(vec![1, 4])),
        CliDialog::Fixed(FixedScaling(ScalingRequest::Adaptive {
            minimum: 1,
            maximum: 4
        }))
    ));
    assert!(matches!(CliDialog::from_flags(None, None), CliDialog::Prompt));
}
