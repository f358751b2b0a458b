//! Drive the real HTTP client against a tiny canned-response server.

use dask_clusters::{Client, ClusterId, Config, Error};
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Accept a single connection, answer it with `status` and `body`, and
/// return the raw request we received.
async fn serve_once(status: &'static str, body: String) -> (Config, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            request.extend_from_slice(&buf[..n]);
            if request_complete(&request) {
                break;
            }
        }
        let response = format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\n\
             Content-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body,
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.unwrap();
        String::from_utf8_lossy(&request).into_owned()
    });
    let config = Config::new(&format!("http://{}/base", addr)).unwrap();
    (config, server)
}

/// Have we seen the end of the headers, and as much body as they promised?
fn request_complete(request: &[u8]) -> bool {
    let text = String::from_utf8_lossy(request);
    let header_end = match text.find("\r\n\r\n") {
        Some(pos) => pos + 4,
        None => return false,
    };
    let content_length = text[..header_end]
        .lines()
        .filter_map(|line| {
            let (name, value) = line.split_once(':')?;
            if name.trim().eq_ignore_ascii_case("content-length") {
                value.trim().parse::<usize>().ok()
            } else {
                None
            }
        })
        .next()
        .unwrap_or(0);
    request.len() >= header_end + content_length
}

fn cluster_json(id: &str, workers: u32) -> serde_json::Value {
    json!({
        "id": id,
        "name": format!("Cluster {}", id),
        "scheduler_address": "tcp://127.0.0.1:8786",
        "dashboard_link": "http://127.0.0.1:8787/status",
        "cores": 4,
        "workers": workers,
        "memory": "8.00 GiB",
        "adapt": null,
    })
}

#[tokio::test]
async fn list_parses_cluster_array() {
    let body = json!([cluster_json("a", 2), cluster_json("b", 3)]).to_string();
    let (config, server) = serve_once("200 OK", body).await;
    let clusters = Client::new(&config).list().await.unwrap();
    let request = server.await.unwrap();

    assert!(request.starts_with("GET /base/dask/clusters HTTP/1.1\r\n"));
    let ids = clusters.iter().map(|c| c.id.as_str()).collect::<Vec<_>>();
    assert_eq!(ids, vec!["a", "b"]);
}

#[tokio::test]
async fn list_accepts_any_status_with_array_body() {
    let body = json!([cluster_json("a", 2)]).to_string();
    let (config, server) = serve_once("500 Internal Server Error", body).await;
    let clusters = Client::new(&config).list().await.unwrap();
    server.await.unwrap();
    assert_eq!(clusters.len(), 1);
    assert_eq!(clusters[0].id, ClusterId::from("a"));
    assert_eq!(clusters[0].workers, 2);
}

#[tokio::test]
async fn list_rejects_non_array_body() {
    let (config, server) = serve_once("200 OK", json!({"oops": 1}).to_string()).await;
    let err = Client::new(&config).list().await.unwrap_err();
    server.await.unwrap();
    assert!(matches!(err, Error::CouldNotAccessUrl { .. }));
}

#[tokio::test]
async fn start_uses_put_and_requires_200() {
    let (config, server) = serve_once("200 OK", cluster_json("b", 0).to_string()).await;
    let model = Client::new(&config).start().await.unwrap();
    let request = server.await.unwrap();
    assert!(request.starts_with("PUT /base/dask/clusters HTTP/1.1\r\n"));
    assert_eq!(model.id, ClusterId::from("b"));

    let (config, server) = serve_once("201 Created", cluster_json("b", 0).to_string()).await;
    let err = Client::new(&config).start().await.unwrap_err();
    server.await.unwrap();
    match err {
        Error::UnexpectedHttpStatus { status, id, .. } => {
            assert_eq!(status.as_u16(), 201);
            assert_eq!(id, None);
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[tokio::test]
async fn stop_uses_delete_and_requires_204() {
    let (config, server) = serve_once("204 No Content", String::new()).await;
    Client::new(&config).stop(&ClusterId::from("a")).await.unwrap();
    let request = server.await.unwrap();
    assert!(request.starts_with("DELETE /base/dask/clusters/a HTTP/1.1\r\n"));

    let (config, server) = serve_once("200 OK", "{}".to_owned()).await;
    let err = Client::new(&config)
        .stop(&ClusterId::from("a"))
        .await
        .unwrap_err();
    server.await.unwrap();
    assert!(err.to_string().starts_with("failed to stop cluster a: 200 OK"));
}

#[tokio::test]
async fn scale_patches_with_edited_model() {
    let (config, server) = serve_once("200 OK", cluster_json("a", 5).to_string()).await;
    let mut edited: dask_clusters::ClusterModel =
        serde_json::from_value(cluster_json("a", 5)).unwrap();
    edited.adapt = None;
    let model = Client::new(&config)
        .scale(&ClusterId::from("a"), &edited)
        .await
        .unwrap();
    let request = server.await.unwrap();

    assert!(request.starts_with("PATCH /base/dask/clusters/a HTTP/1.1\r\n"));
    let body = &request[request.find("\r\n\r\n").unwrap() + 4..];
    let sent: serde_json::Value = serde_json::from_str(body).unwrap();
    assert_eq!(sent["workers"], 5);
    assert_eq!(model.workers, 5);
}

#[tokio::test]
async fn scale_failure_is_possibly_temporary() {
    let (config, server) = serve_once("503 Service Unavailable", "busy".to_owned()).await;
    let edited = serde_json::from_value(cluster_json("a", 1)).unwrap();
    let err = Client::new(&config)
        .scale(&ClusterId::from("a"), &edited)
        .await
        .unwrap_err();
    server.await.unwrap();
    assert!(err.might_be_temporary());
    assert!(err.to_string().contains("(busy)"));
}
