//! # Remote API Adapter
//!
//! Forwards every operation to another gateway's admin API. Watching polls
//! `GET /config/snapshot` and emits only when the snapshot changed.

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::admin::endpoints::DocumentListResponse;
use crate::configman::adapter::{check_document_key, missing, ConfigAdapter, WATCH_CHANNEL_CAPACITY};
use crate::core::error::{GatewayError, GatewayResult};
use crate::resource::codec::ResourceTypeKey;
use crate::resource::document::{ConfigSnapshot, Document, DocumentFilter};

#[derive(Debug, Clone)]
pub struct RemoteAdapter {
    client: Client,
    base_url: Url,
    poll_interval: Duration,
}

impl RemoteAdapter {
    pub fn new(base_url: Url, poll_interval: Duration, timeout: Duration) -> GatewayResult<Self> {
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(GatewayError::config(format!(
                "remote config URL must be http(s), got {}",
                base_url
            )));
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url,
            poll_interval,
        })
    }

    fn url(&self, segments: &[&str]) -> GatewayResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| GatewayError::config(format!("{} cannot be a base URL", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn resource_url(&self, key: &ResourceTypeKey, name: Option<&str>) -> GatewayResult<Url> {
        let mut segments = vec!["config", key.group.as_str(), key.version.as_str(), key.kind.as_str()];
        if let Some(name) = name {
            segments.push(name);
        }
        self.url(&segments)
    }

    async fn fetch_snapshot(client: &Client, url: Url) -> GatewayResult<ConfigSnapshot> {
        let response = client.get(url).send().await.map_err(remote_error)?;
        decode(check_status(response).await?).await
    }
}

fn remote_error(err: reqwest::Error) -> GatewayError {
    GatewayError::adapter("remote", err.to_string())
}

async fn check_status(response: Response) -> GatewayResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let url = response.url().to_string();
    let body = response.text().await.unwrap_or_default();
    if status == StatusCode::NOT_FOUND {
        return Err(GatewayError::not_found(url));
    }
    Err(GatewayError::adapter(
        "remote",
        format!("{} returned {}: {}", url, status, body),
    ))
}

async fn decode<T: DeserializeOwned>(response: Response) -> GatewayResult<T> {
    response.json::<T>().await.map_err(remote_error)
}

#[async_trait]
impl ConfigAdapter for RemoteAdapter {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn get_snapshot(&self) -> GatewayResult<ConfigSnapshot> {
        Self::fetch_snapshot(&self.client, self.url(&["config", "snapshot"])?).await
    }

    async fn watch(&self, cancel: CancellationToken) -> GatewayResult<mpsc::Receiver<ConfigSnapshot>> {
        let url = self.url(&["config", "snapshot"])?;
        let client = self.client.clone();
        let poll_interval = self.poll_interval;
        let mut last = Self::fetch_snapshot(&client, url.clone()).await.ok();
        let (tx, rx) = mpsc::channel(WATCH_CHANNEL_CAPACITY);

        tokio::spawn(async move {
            info!(url = %url, ?poll_interval, "Polling remote configuration");
            let mut ticker = tokio::time::interval(poll_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                match Self::fetch_snapshot(&client, url.clone()).await {
                    Ok(snapshot) => {
                        if last.as_ref() == Some(&snapshot) {
                            continue;
                        }
                        last = Some(snapshot.clone());
                        if tx.send(snapshot).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(url = %url, error = %e, "Remote configuration poll failed"),
                }
            }
            debug!(url = %url, "Remote configuration polling stopped");
        });

        Ok(rx)
    }

    async fn list(&self, key: &ResourceTypeKey, filter: &DocumentFilter) -> GatewayResult<Vec<Document>> {
        let response = self
            .client
            .get(self.resource_url(key, None)?)
            .query(filter)
            .send()
            .await
            .map_err(remote_error)?;
        let list: DocumentListResponse = decode(check_status(response).await?).await?;
        Ok(list.documents)
    }

    async fn get(&self, key: &ResourceTypeKey, name: &str) -> GatewayResult<Document> {
        let response = self
            .client
            .get(self.resource_url(key, Some(name))?)
            .send()
            .await
            .map_err(remote_error)?;
        match check_status(response).await {
            Err(GatewayError::NotFound { .. }) => Err(missing(key, name)),
            other => decode(other?).await,
        }
    }

    async fn apply(&self, key: &ResourceTypeKey, document: Document) -> GatewayResult<()> {
        check_document_key(key, &document)?;
        let response = self
            .client
            .put(self.resource_url(key, Some(document.name()))?)
            .json(&document)
            .send()
            .await
            .map_err(remote_error)?;
        check_status(response).await?;
        Ok(())
    }

    async fn delete(&self, key: &ResourceTypeKey, name: &str) -> GatewayResult<()> {
        let response = self
            .client
            .delete(self.resource_url(key, Some(name))?)
            .send()
            .await
            .map_err(remote_error)?;
        match check_status(response).await {
            Err(GatewayError::NotFound { .. }) => Err(missing(key, name)),
            other => other.map(|_| ()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn key() -> ResourceTypeKey {
        ResourceTypeKey::new("core.example.io", "v1alpha1", "redissources")
    }

    fn adapter(server: &MockServer) -> RemoteAdapter {
        RemoteAdapter::new(
            Url::parse(&server.uri()).unwrap(),
            Duration::from_millis(50),
            Duration::from_secs(2),
        )
        .unwrap()
    }

    fn redis_json(name: &str) -> serde_json::Value {
        json!({
            "apiVersion": "core.example.io/v1alpha1",
            "kind": "RedisSource",
            "metadata": { "name": name },
            "spec": { "url": "redis://cache" }
        })
    }

    #[tokio::test]
    async fn test_get_snapshot() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/config/snapshot"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                key().token().as_str(): [redis_json("cache")]
            })))
            .mount(&server)
            .await;

        let snapshot = adapter(&server).get_snapshot().await.unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.documents(&key().token())[0].name(), "cache");
    }

    #[tokio::test]
    async fn test_list_forwards_workspace_filter() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/config/core.example.io/v1alpha1/redissources"))
            .and(query_param("package", "shop"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "documents": [redis_json("cache")]
            })))
            .mount(&server)
            .await;

        let docs = adapter(&server)
            .list(&key(), &DocumentFilter::workspace("shop"))
            .await
            .unwrap();
        assert_eq!(docs.len(), 1);
    }

    #[tokio::test]
    async fn test_apply_puts_document() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/config/core.example.io/v1alpha1/redissources/cache"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "applied": true })))
            .expect(1)
            .mount(&server)
            .await;

        adapter(&server)
            .apply(&key(), Document::new(&key(), "RedisSource", "cache"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_missing_document_maps_to_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = adapter(&server).delete(&key(), "ghost").await.unwrap_err();
        assert!(matches!(err, GatewayError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_server_error_is_adapter_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("down"))
            .mount(&server)
            .await;

        let err = adapter(&server).get_snapshot().await.unwrap_err();
        assert!(matches!(err, GatewayError::Adapter { .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_watch_emits_only_changes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/config/snapshot"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .up_to_n_times(3)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/config/snapshot"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                key().token().as_str(): [redis_json("cache")]
            })))
            .mount(&server)
            .await;

        let cancel = CancellationToken::new();
        let mut rx = adapter(&server).watch(cancel.clone()).await.unwrap();
        let snapshot = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(snapshot.len(), 1);
        cancel.cancel();
    }

    #[test]
    fn test_rejects_non_http_url() {
        let result = RemoteAdapter::new(
            Url::parse("ftp://example.com").unwrap(),
            Duration::from_secs(1),
            Duration::from_secs(1),
        );
        assert!(result.is_err());
    }
}
