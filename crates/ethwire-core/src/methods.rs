//! JSON-RPC method names, subscription events and reserved codes.

// parity
pub const PARITY_SUBSCRIBE: &str = "parity_subscribe";
pub const PARITY_PENDING_TRANSACTIONS: &str = "parity_pendingTransactions";

// geth
pub const GETH_TXPOOL_CONTENT: &str = "txpool_content";

// net / web3
pub const NET_PEER_COUNT: &str = "net_peerCount";
pub const WEB3_CLIENT_VERSION: &str = "web3_clientVersion";

// eth
pub const ETH_BLOCK_NUMBER: &str = "eth_blockNumber";
pub const ETH_CALL: &str = "eth_call";
pub const ETH_GET_BALANCE: &str = "eth_getBalance";
pub const ETH_GET_BLOCK_BY_NUMBER: &str = "eth_getBlockByNumber";
pub const ETH_GET_BLOCK_TRANSACTION_COUNT_BY_NUMBER: &str = "eth_getBlockTransactionCountByNumber";
pub const ETH_GET_CODE: &str = "eth_getCode";
pub const ETH_GET_FILTER_CHANGES: &str = "eth_getFilterChanges";
pub const ETH_GET_TRANSACTION_BY_HASH: &str = "eth_getTransactionByHash";
pub const ETH_GET_TRANSACTION_RECEIPT: &str = "eth_getTransactionReceipt";
pub const ETH_GET_UNCLE_BY_BLOCK_HASH_AND_INDEX: &str = "eth_getUncleByBlockHashAndIndex";
pub const ETH_GET_UNCLE_BY_BLOCK_NUMBER_AND_INDEX: &str = "eth_getUncleByBlockNumberAndIndex";
pub const ETH_NEW_PENDING_TRANSACTION_FILTER: &str = "eth_newPendingTransactionFilter";
pub const ETH_SUBSCRIBE: &str = "eth_subscribe";
pub const ETH_UNSUBSCRIBE: &str = "eth_unsubscribe";

// trace
pub const TRACE_BLOCK: &str = "trace_block";
pub const TRACE_REPLAY_BLOCK_TRANSACTIONS: &str = "trace_replayBlockTransactions";

// pubsub events
pub const EVENT_NEW_HEADS: &str = "newHeads";
pub const EVENT_NEW_PENDING_TRANSACTIONS: &str = "newPendingTransactions";

/// Notifications are only routed when their method ends with this.
pub const SUBSCRIPTION_SUFFIX: &str = "_subscription";

/// Error code some nodes use for a failed VM execution.
pub const VM_EXECUTION_ERROR_CODE: i64 = -32015;

/// The unsubscribe method paired with a `<ns>_subscribe` method.
///
/// Returns `None` when `subscribe_method` does not follow that shape.
pub fn unsubscribe_method(subscribe_method: &str) -> Option<String> {
    subscribe_method
        .strip_suffix("_subscribe")
        .filter(|ns| !ns.is_empty())
        .map(|ns| format!("{ns}_unsubscribe"))
}
