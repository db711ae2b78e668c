use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::blockchain::Block;

/// Request for the block endpoints
#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct BlockRequest {
    /// Payload of the block to mine
    #[serde(default)]
    pub data: Option<String>,
}

/// Response for the ledger endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LedgerResponse {
    /// The length of the ledger
    pub length: usize,

    /// The blocks in the ledger, genesis first
    pub chain: Vec<Block>,

    /// Whether the ledger is valid
    pub is_valid: bool,
}

/// Response for the sync endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SyncResponse {
    /// Id of the accepted block
    pub accepted: String,
}

/// Error body returned by every endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}
