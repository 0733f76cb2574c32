//! Compiled-in per-coin parameters.

use chain_btc::network::{self, NetworkVersions};
use chain_eth::chains::{self, EvmChain};

use crate::types::{CoinTag, Family};

/// Node call used to ask whether the node knows the service address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnershipProbe {
    GetAddressInfo,
    ValidateAddress,
}

impl OwnershipProbe {
    pub fn method(self) -> &'static str {
        match self {
            OwnershipProbe::GetAddressInfo => "getaddressinfo",
            OwnershipProbe::ValidateAddress => "validateaddress",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct UtxoParams {
    /// Fee per distinct output, in whole coins.
    pub fee: &'static str,
    pub confirmations: u32,
    pub network: &'static NetworkVersions,
    pub probe: OwnershipProbe,
}

#[derive(Debug, Clone, Copy)]
pub struct AccountParams {
    pub chain: &'static EvmChain,
}

#[derive(Debug, Clone, Copy)]
pub enum FamilyParams {
    Utxo(UtxoParams),
    Account(AccountParams),
}

#[derive(Debug, Clone, Copy)]
pub struct CoinParams {
    pub tag: CoinTag,
    pub decimals: u8,
    /// Most distinct destinations one transaction may pay.
    pub out_limit: usize,
    pub family: FamilyParams,
}

impl CoinParams {
    pub fn family(&self) -> Family {
        match self.family {
            FamilyParams::Utxo(_) => Family::Utxo,
            FamilyParams::Account(_) => Family::Account,
        }
    }
}

const UTXO_OUT_LIMIT: usize = 500;

const fn utxo(
    tag: CoinTag,
    fee: &'static str,
    confirmations: u32,
    network: &'static NetworkVersions,
    probe: OwnershipProbe,
) -> CoinParams {
    CoinParams {
        tag,
        decimals: 8,
        out_limit: UTXO_OUT_LIMIT,
        family: FamilyParams::Utxo(UtxoParams {
            fee,
            confirmations,
            network,
            probe,
        }),
    }
}

const fn account(tag: CoinTag, chain: &'static EvmChain) -> CoinParams {
    CoinParams {
        tag,
        decimals: chain.decimals,
        out_limit: 1,
        family: FamilyParams::Account(AccountParams { chain }),
    }
}

static BTC: CoinParams = utxo(CoinTag::Btc, "0.00001", 6, &network::BITCOIN, OwnershipProbe::GetAddressInfo);
static BCH: CoinParams = utxo(CoinTag::Bch, "0.00001", 6, &network::BITCOIN_CASH, OwnershipProbe::ValidateAddress);
static ZEC: CoinParams = utxo(CoinTag::Zec, "0.00001", 6, &network::ZCASH, OwnershipProbe::ValidateAddress);
static RVN: CoinParams = utxo(CoinTag::Rvn, "0.00050", 6, &network::RAVENCOIN, OwnershipProbe::ValidateAddress);
static DASH: CoinParams = utxo(CoinTag::Dash, "0.00010", 6, &network::DASH, OwnershipProbe::ValidateAddress);
static MONA: CoinParams = utxo(CoinTag::Mona, "0.00030", 5, &network::MONACOIN, OwnershipProbe::GetAddressInfo);
static ETH: CoinParams = account(CoinTag::Eth, &chains::ETHEREUM);
static ETC: CoinParams = account(CoinTag::Etc, &chains::ETHEREUM_CLASSIC);

pub fn params(tag: CoinTag) -> &'static CoinParams {
    match tag {
        CoinTag::Btc => &BTC,
        CoinTag::Bch => &BCH,
        CoinTag::Zec => &ZEC,
        CoinTag::Rvn => &RVN,
        CoinTag::Dash => &DASH,
        CoinTag::Mona => &MONA,
        CoinTag::Eth => &ETH,
        CoinTag::Etc => &ETC,
    }
}
