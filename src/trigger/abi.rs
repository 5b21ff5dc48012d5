//! Market contract ABI: the creation event we trigger on, the two
//! read-only mappings we resolve metadata from, and the settlement call.

use alloy::primitives::B256;
use alloy::sol;
use alloy::sol_types::{SolCall, SolEvent};

sol! {
    #[allow(missing_docs)]
    #[sol(rpc)]
    contract PnpMarket {
        event PnpTwitterMarketCreated(bytes32 indexed conditionId, address indexed marketCreator);

        function twitterQuestion(bytes32 conditionId) external view returns (string memory);
        function twitterSettlerId(bytes32 conditionId) external view returns (string memory);
        function settleTwitterMarket(bytes32 conditionId, uint256 _winningTokenId) external;
    }
}

// ─── Event topic0 / selectors ───────────────────────────────────────────────

pub const MARKET_CREATED_SIGNATURE: &str = "PnpTwitterMarketCreated(bytes32,address)";

/// keccak256("PnpTwitterMarketCreated(bytes32,address)")
pub const MARKET_CREATED_TOPIC: B256 = PnpMarket::PnpTwitterMarketCreated::SIGNATURE_HASH;

/// First four bytes of keccak256("settleTwitterMarket(bytes32,uint256)")
pub const SETTLE_SELECTOR: [u8; 4] = PnpMarket::settleTwitterMarketCall::SELECTOR;

/// Topic count for the creation event: signature + two indexed fields.
pub const MARKET_CREATED_TOPIC_COUNT: usize = 3;
