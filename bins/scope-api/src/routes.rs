use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::Serialize;
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tracing::warn;

use scope_core::error::ScopeError;
use scope_core::pagination::{PageQuery, PagingResponse};
use scope_core::types::{Block, Transaction};
use scope_node::BlockId;

use crate::AppState;

// ── Error helper ─────────────────────────────────────────────────────────────

struct ApiError(ScopeError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = if self.0.is_bad_request() {
            (StatusCode::BAD_REQUEST, self.0.to_string())
        } else if self.0.is_not_found() {
            (StatusCode::NOT_FOUND, "not found".to_string())
        } else {
            warn!(error = %self.0, "request failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "upstream unavailable".to_string())
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<ScopeError> for ApiError {
    fn from(e: ScopeError) -> Self {
        ApiError(e)
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

// ── Router ───────────────────────────────────────────────────────────────────

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/ping", get(ping))
        .route("/api/blocks", get(latest_blocks))
        .route("/api/blocks/error", get(error_blocks))
        .route("/api/block/:id", get(block_detail))
        .route("/api/block/:id/txs", get(block_txs))
        .route("/api/txs", get(latest_txs))
        .route("/api/tx/:hash", get(tx_detail))
        .route("/api/address/:addr/txs", get(address_txs))
        .layer(cors)
        .with_state(state)
}

async fn ping() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

// ── Blocks ───────────────────────────────────────────────────────────────────

/// A block summary with its proposer's display name.
#[derive(Serialize)]
struct BlockView {
    #[serde(flatten)]
    block: Block,
    proposer_name: String,
}

impl BlockView {
    fn new(block: Block, names: &HashMap<String, String>) -> Self {
        let proposer_name = names
            .get(&block.proposer_address.to_ascii_lowercase())
            .cloned()
            .unwrap_or_default();
        Self { block, proposer_name }
    }
}

async fn latest_blocks(
    State(s): State<AppState>,
    Query(q): Query<PageQuery>,
) -> ApiResult<PagingResponse<BlockView>> {
    let (pagination, page, limit) = q.resolve();
    let (blocks, names) = tokio::join!(
        s.explorer.latest_blocks(&pagination),
        s.explorer.validator_names(),
    );
    let (blocks, total) = blocks?;
    Ok(Json(PagingResponse {
        page,
        limit,
        total,
        data: blocks.into_iter().map(|b| BlockView::new(b, &names)).collect(),
    }))
}

async fn block_detail(
    State(s): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<BlockView> {
    let id = BlockId::parse(&id)?;
    let (block, names) = tokio::join!(s.explorer.block(&id), s.explorer.validator_names());
    Ok(Json(BlockView::new(block?, &names)))
}

async fn error_blocks(State(s): State<AppState>) -> Json<Value> {
    let heights = s.explorer.persistent_error_blocks();
    Json(json!({
        "total": heights.len(),
        "data":  heights,
    }))
}

// ── Transactions ─────────────────────────────────────────────────────────────

async fn block_txs(
    State(s): State<AppState>,
    Path(id): Path<String>,
    Query(q): Query<PageQuery>,
) -> ApiResult<PagingResponse<Transaction>> {
    let id = BlockId::parse(&id)?;
    let (pagination, page, limit) = q.resolve();
    let (data, total) = s.explorer.block_txs(&id, &pagination).await?;
    Ok(Json(PagingResponse { page, limit, total, data }))
}

async fn latest_txs(
    State(s): State<AppState>,
    Query(q): Query<PageQuery>,
) -> ApiResult<PagingResponse<Transaction>> {
    let (pagination, page, limit) = q.resolve();
    let (data, total) = s.explorer.latest_txs(&pagination).await?;
    Ok(Json(PagingResponse { page, limit, total, data }))
}

async fn tx_detail(
    State(s): State<AppState>,
    Path(hash): Path<String>,
) -> ApiResult<Transaction> {
    Ok(Json(s.explorer.tx_by_hash(&hash).await?))
}

async fn address_txs(
    State(s): State<AppState>,
    Path(addr): Path<String>,
    Query(q): Query<PageQuery>,
) -> ApiResult<PagingResponse<Transaction>> {
    let (pagination, page, limit) = q.resolve();
    let (data, total) = s.explorer.txs_by_address(&addr, &pagination).await?;
    Ok(Json(PagingResponse { page, limit, total, data }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::Request;
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;

    use scope_cache::ChainCache;
    use scope_core::traits::BlockStore;
    use scope_node::{Explorer, MemoryStore};
    use scope_tests::helpers::*;

    struct TestApp {
        app: Router,
        cache: Arc<ChainCache>,
        store: Arc<MemoryStore>,
        node: Arc<MockNode>,
    }

    fn test_app(node: MockNode) -> TestApp {
        let cache = Arc::new(ChainCache::new(16));
        let store = Arc::new(MemoryStore::new());
        let node = Arc::new(node);
        let explorer = Explorer::new(
            Arc::clone(&cache),
            store.clone(),
            node.clone(),
            Duration::from_secs(2),
            CancellationToken::new(),
        );
        let app = router(AppState {
            explorer: Arc::new(explorer),
        });
        TestApp {
            app,
            cache,
            store,
            node,
        }
    }

    async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
        let response = app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    // ------------------------------------------------------------------
    // Blocks
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn ping_answers() {
        let t = test_app(MockNode::new());
        let (status, body) = get(&t.app, "/api/ping").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn latest_blocks_page_with_proposer_names() {
        let t = test_app(MockNode::with_chain(1..=3, 1));
        for h in 1..=3 {
            t.cache.import_block(&imported_block(h, 1)).unwrap();
        }

        let (status, body) = get(&t.app, "/api/blocks?page=1&limit=2").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["page"], 1);
        assert_eq!(body["limit"], 2);
        assert_eq!(body["total"], 3);
        assert_eq!(body["data"][0]["height"], 3);
        assert_eq!(body["data"][0]["proposer_name"], "validator-0");
        assert_eq!(body["data"][1]["height"], 2);
        assert_eq!(body["data"][1]["proposer_name"], "validator-2");
    }

    #[tokio::test]
    async fn junk_paging_values_fall_back_to_defaults() {
        let t = test_app(MockNode::with_chain(1..=1, 0));
        t.cache.import_block(&imported_block(1, 0)).unwrap();

        let (status, body) = get(&t.app, "/api/blocks?page=abc&limit=-5").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["page"], 1);
        assert_eq!(body["limit"], 10);
    }

    #[tokio::test]
    async fn block_by_height_and_hash() {
        let t = test_app(MockNode::with_chain(1..=4, 2));
        t.store.upsert_block(&imported_block(2, 2)).await.unwrap();

        let (status, body) = get(&t.app, "/api/block/2").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["hash"], block_hash(2));
        assert_eq!(body["tx_count"], 2);

        let uri = format!("/api/block/{}", block_hash(4));
        let (status, body) = get(&t.app, &uri).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["height"], 4);
        assert_eq!(body["proposer_name"], "validator-1");
    }

    #[tokio::test]
    async fn block_errors_map_to_status_codes() {
        let t = test_app(MockNode::with_chain(1..=2, 0));

        let (status, _) = get(&t.app, "/api/block/latest").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = get(&t.app, "/api/block/0").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = get(&t.app, "/api/block/99").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "not found");
    }

    #[tokio::test]
    async fn node_outage_is_a_server_error_without_details() {
        let t = test_app(MockNode::new());
        t.node.set_down(true);

        let (status, body) = get(&t.app, "/api/tx/0xdead").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "upstream unavailable");
    }

    #[tokio::test]
    async fn error_blocks_lists_persistent_failures() {
        let t = test_app(MockNode::new());
        t.cache.push_persistent_error(7);
        t.cache.push_persistent_error(3);

        let (status, body) = get(&t.app, "/api/blocks/error").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 2);
        assert_eq!(body["data"], json!([7, 3]));
    }

    // ------------------------------------------------------------------
    // Transactions
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn block_txs_are_paged() {
        let t = test_app(MockNode::new());
        t.cache.import_block(&imported_block(5, 12)).unwrap();

        let (status, body) = get(&t.app, "/api/block/5/txs?page=2&limit=5").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 12);
        assert_eq!(body["data"].as_array().unwrap().len(), 5);
        assert_eq!(body["data"][0]["transaction_index"], 5);
    }

    #[tokio::test]
    async fn latest_txs_and_tx_detail() {
        let t = test_app(MockNode::with_chain(1..=2, 3));
        t.store.upsert_block(&imported_block(1, 3)).await.unwrap();
        t.cache.import_block(&imported_block(2, 3)).unwrap();

        let (status, body) = get(&t.app, "/api/txs?limit=3").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 3);
        assert_eq!(body["data"][0]["hash"], tx_hash(2, 0));

        let (status, body) = get(&t.app, &format!("/api/tx/{}", tx_hash(1, 2))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["gas_used"], FIXTURE_GAS);
        assert_eq!(t.node.calls(), 0, "database answered without the node");
    }

    #[tokio::test]
    async fn address_txs_from_database() {
        let t = test_app(MockNode::new());
        t.store.upsert_block(&imported_block(1, 5)).await.unwrap();
        t.store.upsert_block(&imported_block(2, 5)).await.unwrap();

        let uri = format!("/api/address/{}/txs?limit=1", account(1));
        let (status, body) = get(&t.app, &uri).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 2);
        assert_eq!(body["data"][0]["hash"], tx_hash(2, 1));
    }
}
