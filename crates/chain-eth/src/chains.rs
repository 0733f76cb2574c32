use crate::gas::GWEI;

/// Definition of an account-model chain served by the payment core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvmChain {
    /// EIP-155 chain id bound into every signature.
    pub chain_id: u64,
    pub name: &'static str,
    pub symbol: &'static str,
    /// Decimal places between the base unit (wei) and one coin.
    pub decimals: u8,
    /// Highest gas price, in wei, the service is willing to pay.
    pub gas_price_ceiling: u128,
}

/// Ethereum Mainnet (chain ID 1).
pub const ETHEREUM: EvmChain = EvmChain {
    chain_id: 1,
    name: "Ethereum",
    symbol: "ETH",
    decimals: 18,
    gas_price_ceiling: GWEI,
};

/// Ethereum Classic (chain ID 61).
pub const ETHEREUM_CLASSIC: EvmChain = EvmChain {
    chain_id: 61,
    name: "Ethereum Classic",
    symbol: "ETC",
    decimals: 18,
    gas_price_ceiling: GWEI,
};
