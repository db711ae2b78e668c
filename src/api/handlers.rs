use actix_web::{web, HttpResponse, Responder};
use log::{info, warn};

use super::schema::{BlockRequest, ErrorResponse, LedgerResponse, SyncResponse};
use crate::blockchain::{Block, StorageError};
use crate::node::{Node, NodeError};

/// Shared node state
pub type NodeData = web::Data<Node>;

/// Maps a node error onto an HTTP response
fn error_response(err: NodeError) -> HttpResponse {
    let body = ErrorResponse {
        error: err.to_string(),
    };

    match err {
        NodeError::Storage(StorageError::NotFound(_)) => HttpResponse::NotFound().json(body),
        NodeError::Storage(StorageError::InvalidBlock(_))
        | NodeError::Storage(StorageError::InvalidPeerId(_)) => HttpResponse::BadRequest().json(body),
        NodeError::NoNodeId => HttpResponse::ServiceUnavailable().json(body),
        _ => HttpResponse::InternalServerError().json(body),
    }
}

/// Get the primary replicated chain
///
/// Returns the block log of the most recently registered node
#[utoipa::path(
    get,
    path = "/chain",
    responses(
        (status = 200, description = "Chain retrieved successfully", body = Vec<Block>),
        (status = 404, description = "No peers registered or no blocks replicated", body = ErrorResponse)
    )
)]
pub async fn get_chain(node: NodeData) -> impl Responder {
    match node.primary_chain() {
        Ok(chain) => HttpResponse::Ok().json(chain),
        Err(err) => error_response(err),
    }
}

/// Get the replicated chain of one peer
#[utoipa::path(
    get,
    path = "/chain/{peer_id}",
    params(
        ("peer_id" = String, Path, description = "Registered node id")
    ),
    responses(
        (status = 200, description = "Chain retrieved successfully", body = Vec<Block>),
        (status = 400, description = "Invalid peer id", body = ErrorResponse),
        (status = 404, description = "No blocks replicated to this peer", body = ErrorResponse)
    )
)]
pub async fn get_peer_chain(node: NodeData, peer_id: web::Path<String>) -> impl Responder {
    match node.store().read_all(&peer_id) {
        Ok(chain) => HttpResponse::Ok().json(chain),
        Err(err) => error_response(err.into()),
    }
}

/// Get the local ledger
///
/// Returns this process's in-memory ledger and its validity status
#[utoipa::path(
    get,
    path = "/ledger",
    responses(
        (status = 200, description = "Ledger retrieved successfully", body = LedgerResponse)
    )
)]
pub async fn get_ledger(node: NodeData) -> impl Responder {
    let ledger = node.ledger();
    let result = ledger
        .get_chain()
        .and_then(|chain| ledger.is_valid().map(|is_valid| (chain, is_valid)));

    match result {
        Ok((chain, is_valid)) => HttpResponse::Ok().json(LedgerResponse {
            length: chain.len(),
            chain,
            is_valid,
        }),
        Err(err) => error_response(err.into()),
    }
}

/// Get the registered nodes
#[utoipa::path(
    get,
    path = "/nodes",
    responses(
        (status = 200, description = "Registered node ids in registration order", body = Vec<String>)
    )
)]
pub async fn get_nodes(node: NodeData) -> impl Responder {
    match node.registry().load() {
        Ok(nodes) => HttpResponse::Ok().json(nodes),
        Err(err) => error_response(err.into()),
    }
}

async fn mine_from(node: &Node, data: &str) -> HttpResponse {
    match node.mine_and_broadcast(data).await {
        Ok((block, report)) => {
            info!(
                "Mined block {} via HTTP, synced to {}/{} peer(s)",
                block.id,
                report.delivered_count(),
                report.outcomes.len()
            );
            HttpResponse::Created().json(block)
        }
        Err(err) => error_response(err),
    }
}

/// Mine a block from submitted data
///
/// Appends a block to the local ledger and broadcasts it to every registered node
#[utoipa::path(
    post,
    path = "/block",
    request_body = BlockRequest,
    responses(
        (status = 201, description = "Block mined successfully", body = Block),
        (status = 400, description = "Missing data field", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn new_block(node: NodeData, block_req: web::Json<BlockRequest>) -> impl Responder {
    match block_req.into_inner().data {
        Some(data) => mine_from(&node, &data).await,
        None => HttpResponse::BadRequest().json(ErrorResponse {
            error: "Missing data field".to_string(),
        }),
    }
}

/// Mine a block
///
/// Same as `/block`; without a body the node's default payload is mined
#[utoipa::path(
    post,
    path = "/mine",
    request_body = BlockRequest,
    responses(
        (status = 201, description = "Block mined successfully", body = Block),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn mine_block(node: NodeData, block_req: Option<web::Json<BlockRequest>>) -> impl Responder {
    let data = block_req
        .and_then(|req| req.into_inner().data)
        .unwrap_or_else(|| node.default_payload());

    mine_from(&node, &data).await
}

/// Accept a block from another node
///
/// The block is verified before it is stored in this node's replicated log
#[utoipa::path(
    post,
    path = "/sync",
    request_body = Block,
    responses(
        (status = 200, description = "Block accepted", body = SyncResponse),
        (status = 400, description = "Block failed verification", body = ErrorResponse),
        (status = 503, description = "Node has no id to store blocks under", body = ErrorResponse)
    )
)]
pub async fn sync_block(node: NodeData, block: web::Json<Block>) -> impl Responder {
    let block = block.into_inner();

    match node.accept_sync(&block) {
        Ok(()) => HttpResponse::Ok().json(SyncResponse { accepted: block.id }),
        Err(err) => {
            warn!("Rejected synced block {}: {}", block.id, err);
            error_response(err)
        }
    }
}
