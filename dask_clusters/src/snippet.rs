//! Connection code for a cluster, ready to be dropped into an editor.

use crate::model::ClusterModel;

/// Something that can insert client code for a cluster wherever the user is
/// currently editing.
pub trait ClientCodeInjector: Send + Sync {
    /// Insert connection code for `model`.
    fn inject_client_code(&self, model: &ClusterModel);
}

/// Python code connecting a `dask.distributed` client to `model`'s scheduler.
pub fn client_code(model: &ClusterModel) -> String {
    format!(
        "from dask.distributed import Client\n\nclient = Client(\"{}\")\nclient",
        escape(&model.scheduler_address),
    )
}

/// Escape a value for use inside a double-quoted Python string literal.
fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
use crate::testing::cluster;

#[test]
fn snippet_connects_to_scheduler() {
    let model = cluster("a");
    assert_eq!(
        client_code(&model),
        "from dask.distributed import Client\n\n\
         client = Client(\"tcp://10.0.0.1:8786\")\n\
         client",
    );
}

#[test]
fn snippet_escapes_quotes() {
    let mut model = cluster("a");
    model.scheduler_address = r#"tcp://"odd"\host:1"#.to_owned();
    assert!(client_code(&model).contains(r#"Client("tcp://\"odd\"\\host:1")"#));
}
