//! # Admin Endpoints
//!
//! HTTP surface for reading and editing declarative documents at runtime.
//! Every document route maps straight onto the configured adapter; the
//! change reaches the running configuration through the adapter's watch.
//!
//! - `GET    /config/snapshot`
//! - `GET    /config/:group/:version/:resource?package=<workspace>`
//! - `GET    /config/:group/:version/:resource/:name`
//! - `PUT    /config/:group/:version/:resource/:name`
//! - `DELETE /config/:group/:version/:resource/:name`
//! - `POST   /config/reload`
//! - `GET    /sources/:workspace/:provider`
//! - `GET    /status`
//!
//! ## Security Note
//! These endpoints can change what the gateway serves and should only be
//! reachable from trusted networks.

use axum::{
    extract::{Path, Query, State},
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::configman::loader::ConfigLoader;
use crate::core::error::{GatewayError, GatewayResult};
use crate::resource::codec::{ModuleToken, ResourceTypeKey};
use crate::resource::document::{ConfigSnapshot, Document, DocumentFilter};

/// Admin router state
#[derive(Clone)]
pub struct AdminState {
    pub loader: Arc<ConfigLoader>,
}

impl AdminState {
    pub fn new(loader: Arc<ConfigLoader>) -> Self {
        Self { loader }
    }
}

/// Admin router for configuration management endpoints
pub struct AdminRouter;

impl AdminRouter {
    pub fn create_router(state: AdminState) -> Router {
        Router::new()
            // Document endpoints
            .route("/config/snapshot", get(get_snapshot))
            .route("/config/reload", post(reload_config))
            .route("/config/:group/:version/:resource", get(list_documents))
            .route(
                "/config/:group/:version/:resource/:name",
                get(get_document).put(apply_document).delete(delete_document),
            )
            // Installed configuration
            .route("/sources/:workspace/:provider", get(get_sources))
            .route("/status", get(get_status))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }
}

#[derive(Debug, Deserialize)]
struct ResourcePath {
    group: String,
    version: String,
    resource: String,
}

impl ResourcePath {
    fn type_key(&self) -> GatewayResult<ResourceTypeKey> {
        let key = ResourceTypeKey::new(&self.group, &self.version, &self.resource);
        key.validate().map_err(|e| GatewayError::invalid_request(e.to_string()))?;
        Ok(key)
    }
}

#[derive(Debug, Deserialize)]
struct DocumentPath {
    group: String,
    version: String,
    resource: String,
    name: String,
}

impl DocumentPath {
    fn type_key(&self) -> GatewayResult<ResourceTypeKey> {
        ResourcePath {
            group: self.group.clone(),
            version: self.version.clone(),
            resource: self.resource.clone(),
        }
        .type_key()
    }
}

// ============================================================================
// Document Endpoints
// ============================================================================

async fn get_snapshot(State(state): State<AdminState>) -> GatewayResult<Json<ConfigSnapshot>> {
    Ok(Json(state.loader.adapter().get_snapshot().await?))
}

async fn list_documents(
    State(state): State<AdminState>,
    Path(path): Path<ResourcePath>,
    Query(filter): Query<DocumentFilter>,
) -> GatewayResult<Json<DocumentListResponse>> {
    let key = path.type_key()?;
    let documents = state.loader.adapter().list(&key, &filter).await?;
    Ok(Json(DocumentListResponse { documents }))
}

async fn get_document(
    State(state): State<AdminState>,
    Path(path): Path<DocumentPath>,
) -> GatewayResult<Json<Document>> {
    let key = path.type_key()?;
    Ok(Json(state.loader.adapter().get(&key, &path.name).await?))
}

async fn apply_document(
    State(state): State<AdminState>,
    Path(path): Path<DocumentPath>,
    Json(document): Json<Document>,
) -> GatewayResult<Json<ApplyResponse>> {
    let key = path.type_key()?;
    if document.name() != path.name {
        return Err(GatewayError::invalid_request(format!(
            "document name '{}' does not match path name '{}'",
            document.name(),
            path.name
        )));
    }

    let token = key.token();
    state.loader.adapter().apply(&key, document).await?;
    info!(token = %token, name = %path.name, "Document applied");

    Ok(Json(ApplyResponse {
        applied: true,
        token,
        name: path.name,
    }))
}

async fn delete_document(
    State(state): State<AdminState>,
    Path(path): Path<DocumentPath>,
) -> GatewayResult<Json<DeleteResponse>> {
    let key = path.type_key()?;
    state.loader.adapter().delete(&key, &path.name).await?;
    info!(token = %key.token(), name = %path.name, "Document deleted");

    Ok(Json(DeleteResponse {
        deleted: true,
        name: path.name,
    }))
}

async fn reload_config(State(state): State<AdminState>) -> GatewayResult<Json<ReloadResponse>> {
    let config = state.loader.reload_from_adapter().await?;
    Ok(Json(ReloadResponse {
        generation: config.generation,
        documents: config.snapshot.len(),
        warnings: config.warnings.iter().map(ToString::to_string).collect(),
    }))
}

// ============================================================================
// Installed Configuration Endpoints
// ============================================================================

async fn get_sources(
    State(state): State<AdminState>,
    Path((workspace, provider)): Path<(String, String)>,
) -> Json<SourcesResponse> {
    let sources = state
        .loader
        .get_sources(&workspace, &provider)
        .iter()
        .map(|source| SourceSummary {
            name: source.name().to_string(),
            token: source.type_key().token(),
            priority: source.priority(),
        })
        .collect();

    Json(SourcesResponse {
        workspace,
        provider,
        sources,
    })
}

async fn get_status(State(state): State<AdminState>) -> Json<StatusResponse> {
    let current = state.loader.current();
    Json(StatusResponse {
        status: "healthy".to_string(),
        adapter: state.loader.adapter().name().to_string(),
        generation: current.generation,
        applied_at: current.applied_at,
        documents: current.snapshot.len(),
        sources: current.sources.len(),
        warnings: current.warnings.len(),
        last_error: state.loader.last_error(),
    })
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Body of the list route, shared with the remote adapter
#[derive(Debug, Serialize, Deserialize)]
pub struct DocumentListResponse {
    pub documents: Vec<Document>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApplyResponse {
    pub applied: bool,
    pub token: ModuleToken,
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub deleted: bool,
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReloadResponse {
    pub generation: u64,
    pub documents: usize,
    pub warnings: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SourceSummary {
    pub name: String,
    pub token: ModuleToken,
    pub priority: i32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SourcesResponse {
    pub workspace: String,
    pub provider: String,
    pub sources: Vec<SourceSummary>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    pub adapter: String,
    pub generation: u64,
    pub applied_at: DateTime<Utc>,
    pub documents: usize,
    pub sources: usize,
    pub warnings: usize,
    pub last_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configman::loader::LoaderSettings;
    use crate::configman::memory::MemoryAdapter;
    use crate::sources::builtin::{builtin_key, builtin_registry};
    use crate::sources::host::LocalHost;
    use axum::http::StatusCode;
    use axum_test::TestServer;
    use serde_json::json;

    async fn server_with(docs: Vec<Document>) -> TestServer {
        let adapter = Arc::new(MemoryAdapter::new(docs.into_iter().collect()));
        let loader = ConfigLoader::start(
            adapter,
            Arc::new(builtin_registry().unwrap()),
            Arc::new(LocalHost::new(["rpc", "tasks"])),
            LoaderSettings::default(),
        )
        .await
        .unwrap();
        TestServer::new(AdminRouter::create_router(AdminState::new(loader))).unwrap()
    }

    fn openapi(name: &str) -> Document {
        Document::new(&builtin_key("openapisources"), "OpenApiSource", name)
    }

    const OPENAPI_PATH: &str = "/config/core.resource-gateway.io/v1alpha1/openapisources";

    #[tokio::test]
    async fn test_list_and_get_documents() {
        let server = server_with(vec![openapi("petstore"), openapi("billing").with_workspace("shop")]).await;

        let all: DocumentListResponse = server.get(OPENAPI_PATH).await.json();
        assert_eq!(all.documents.len(), 2);

        let shop: DocumentListResponse = server
            .get(OPENAPI_PATH)
            .add_query_param("package", "shop")
            .await
            .json();
        assert_eq!(shop.documents.len(), 1);
        assert_eq!(shop.documents[0].name(), "billing");

        let doc: Document = server.get(&format!("{}/petstore", OPENAPI_PATH)).await.json();
        assert_eq!(doc.name(), "petstore");
    }

    #[tokio::test]
    async fn test_get_missing_document_is_404() {
        let server = server_with(vec![]).await;
        let response = server.get(&format!("{}/ghost", OPENAPI_PATH)).await;
        response.assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_put_then_delete() {
        let server = server_with(vec![]).await;
        let body = json!({
            "apiVersion": "core.resource-gateway.io/v1alpha1",
            "kind": "OpenApiSource",
            "metadata": { "name": "petstore" },
            "spec": { "priority": 3 }
        });

        let response = server.put(&format!("{}/petstore", OPENAPI_PATH)).json(&body).await;
        response.assert_status_ok();
        let applied: ApplyResponse = response.json();
        assert!(applied.applied);
        assert_eq!(applied.token, builtin_key("openapisources").token());

        let doc: Document = server.get(&format!("{}/petstore", OPENAPI_PATH)).await.json();
        assert_eq!(doc.spec["priority"].as_i64(), Some(3));

        server
            .delete(&format!("{}/petstore", OPENAPI_PATH))
            .await
            .assert_status_ok();
        server
            .delete(&format!("{}/petstore", OPENAPI_PATH))
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_put_rejects_mismatched_name() {
        let server = server_with(vec![]).await;
        let response = server
            .put(&format!("{}/other", OPENAPI_PATH))
            .json(&openapi("petstore"))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_put_rejects_mismatched_kind() {
        let server = server_with(vec![]).await;
        let wrong = Document::new(&builtin_key("taskqueues"), "TaskQueue", "petstore");
        let response = server
            .put(&format!("{}/petstore", OPENAPI_PATH))
            .json(&wrong)
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_sources_status_and_reload() {
        let server = server_with(vec![openapi("petstore")]).await;

        let sources: SourcesResponse = server.get("/sources/default/rpc").await.json();
        assert_eq!(sources.sources.len(), 1);
        assert_eq!(sources.sources[0].name, "petstore");

        let status: StatusResponse = server.get("/status").await.json();
        assert_eq!(status.generation, 1);
        assert_eq!(status.adapter, "memory");
        assert_eq!(status.documents, 1);

        server
            .put(&format!("{}/billing", OPENAPI_PATH))
            .json(&openapi("billing"))
            .await
            .assert_status_ok();
        let reload: ReloadResponse = server.post("/config/reload").await.json();
        assert_eq!(reload.generation, 2);
        assert_eq!(reload.documents, 2);

        let sources: SourcesResponse = server.get("/sources/default/rpc").await.json();
        assert_eq!(sources.sources.len(), 2);
    }

    #[tokio::test]
    async fn test_snapshot_route() {
        let server = server_with(vec![openapi("petstore")]).await;
        let snapshot: ConfigSnapshot = server.get("/config/snapshot").await.json();
        assert_eq!(snapshot.len(), 1);
    }
}
