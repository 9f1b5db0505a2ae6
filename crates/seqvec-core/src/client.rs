//! HTTP client for a remote embedding server.
//!
//! The server exposes:
//!
//! - `GET /health` → any 2xx when ready
//! - `POST /embed` with `{"sequence": "MKV..."}` → `{"embedding": [[[f64]]]}`,
//!   the per-layer hidden states as `layers × length × hidden` nested arrays.
//!
//! [`HttpEmbedder`] is async internally and implements the synchronous
//! [`EmbeddingModel`] capability by blocking on a captured runtime handle, so
//! it can be called from rayon workers. It must not be called from inside an
//! async task; run the embedding pass under `spawn_blocking`.

use std::time::Duration;

use burn::tensor::TensorData;
use embedding::EmbeddingModel;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::EmbedderConfig;

#[derive(Serialize)]
struct EmbedRequest<'a> {
    sequence: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: Vec<Vec<Vec<f64>>>,
}

/// Embedding capability backed by an HTTP server.
#[derive(Clone)]
pub struct HttpEmbedder {
    client: Client,
    base_url: Url,
    runtime: tokio::runtime::Handle,
}

impl HttpEmbedder {
    /// Build a client for `server_url`. Does not contact the server.
    pub fn new(
        server_url: &str,
        config: &EmbedderConfig,
        runtime: tokio::runtime::Handle,
    ) -> anyhow::Result<Self> {
        let base_url = Url::parse(server_url)
            .map_err(|e| anyhow::anyhow!("Invalid server URL '{server_url}': {e}"))?;

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url,
            runtime,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub async fn health_check(&self) -> anyhow::Result<()> {
        let url = self.base_url.join("/health")?;
        let resp = self
            .client
            .get(url)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Embedding server unreachable at {}: {e}", self.base_url))?;

        if !resp.status().is_success() {
            anyhow::bail!(
                "Embedding server at {} is not ready: /health returned {}",
                self.base_url,
                resp.status()
            );
        }
        tracing::info!(url = %self.base_url, "Embedding server is reachable");
        Ok(())
    }

    /// Fetch the raw `[layers, length, hidden]` hidden states for one sequence.
    pub async fn embed_async(&self, sequence: &str) -> anyhow::Result<TensorData> {
        let url = self.base_url.join("/embed")?;
        let resp = self
            .client
            .post(url)
            .json(&EmbedRequest { sequence })
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Embedding request failed: {e}"))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let preview: String = body.chars().take(200).collect();
            anyhow::bail!("Embedding server returned {status}: {preview}");
        }

        let body: EmbedResponse = resp
            .json()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to decode /embed response: {e}"))?;
        nested_to_tensor_data(body.embedding)
    }
}

impl EmbeddingModel for HttpEmbedder {
    fn embed(&self, sequence: &str) -> anyhow::Result<TensorData> {
        self.runtime.block_on(self.embed_async(sequence))
    }
}

/// Flatten `layers × length × hidden` nested arrays, rejecting ragged input.
pub fn nested_to_tensor_data(layers: Vec<Vec<Vec<f64>>>) -> anyhow::Result<TensorData> {
    let num_layers = layers.len();
    let length = layers.first().map_or(0, Vec::len);
    let hidden = layers
        .first()
        .and_then(|layer| layer.first())
        .map_or(0, Vec::len);

    let mut values = Vec::with_capacity(num_layers * length * hidden);
    for (l, layer) in layers.into_iter().enumerate() {
        if layer.len() != length {
            anyhow::bail!("layer {l} has {} positions, expected {length}", layer.len());
        }
        for (p, position) in layer.into_iter().enumerate() {
            if position.len() != hidden {
                anyhow::bail!(
                    "layer {l} position {p} has {} features, expected {hidden}",
                    position.len()
                );
            }
            values.extend(position);
        }
    }
    Ok(TensorData::new(values, [num_layers, length, hidden]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve `responses` in order, one per connection, then stop.
    async fn canned_server(responses: Vec<(u16, String)>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            for (status, body) in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut buf = vec![0u8; 8192];
                let _ = socket.read(&mut buf).await;
                let reply = format!(
                    "HTTP/1.1 {status} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                socket.write_all(reply.as_bytes()).await.unwrap();
                let _ = socket.shutdown().await;
            }
        });
        format!("http://{addr}")
    }

    fn client(url: &str) -> HttpEmbedder {
        HttpEmbedder::new(url, &EmbedderConfig::default(), tokio::runtime::Handle::current()).unwrap()
    }

    #[test]
    fn test_nested_to_tensor_data() {
        let data = nested_to_tensor_data(vec![
            vec![vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]],
            vec![vec![0.5, 0.5], vec![0.5, 0.5], vec![0.5, 0.5]],
        ])
        .unwrap();
        assert_eq!(data.shape, vec![2, 3, 2]);
        let values = data.to_vec::<f64>().unwrap();
        assert_eq!(values[..6], [1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_nested_rejects_ragged() {
        assert!(nested_to_tensor_data(vec![vec![vec![1.0, 2.0], vec![3.0]]]).is_err());
        assert!(nested_to_tensor_data(vec![vec![vec![1.0]], vec![]]).is_err());
    }

    #[test]
    fn test_invalid_url() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let result = HttpEmbedder::new("not a url", &EmbedderConfig::default(), rt.handle().clone());
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_embed_async_parses_response() {
        let url = canned_server(vec![(200, r#"{"embedding": [[[1.0, 2.0]], [[3.0, 4.0]]]}"#.to_string())]).await;
        let data = client(&url).embed_async("M").await.unwrap();
        assert_eq!(data.shape, vec![2, 1, 2]);
    }

    #[tokio::test]
    async fn test_server_error_is_reported() {
        let url = canned_server(vec![(503, r#"{"error": "overloaded"}"#.to_string())]).await;
        let err = client(&url).embed_async("M").await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("503"), "got {msg}");
        assert!(msg.contains("overloaded"), "got {msg}");
    }

    #[tokio::test]
    async fn test_health_check() {
        let url = canned_server(vec![(200, "{}".to_string()), (500, "{}".to_string())]).await;
        let c = client(&url);
        c.health_check().await.unwrap();
        assert!(c.health_check().await.is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_blocking_embed_from_worker_thread() {
        let url = canned_server(vec![(200, r#"{"embedding": [[[1.0], [2.0]]]}"#.to_string())]).await;
        let c = client(&url);
        let data = tokio::task::spawn_blocking(move || c.embed("MK"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(data.shape, vec![1, 2, 1]);
    }
}
