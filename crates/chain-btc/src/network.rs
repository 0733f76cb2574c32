use crate::signer::SighashScheme;

/// Base58 version prefixes and signing scheme of a bitcoind-derived network.
///
/// Prefixes are byte slices because some networks (Zcash transparent
/// addresses) use two-byte versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkVersions {
    pub name: &'static str,
    pub pubkey_hash: &'static [u8],
    pub script_hash: &'static [u8],
    pub wif: u8,
    pub sighash: SighashScheme,
}

/// Bitcoin mainnet.
pub const BITCOIN: NetworkVersions = NetworkVersions {
    name: "bitcoin",
    pubkey_hash: &[0x00],
    script_hash: &[0x05],
    wif: 0x80,
    sighash: SighashScheme::All,
};

/// Bitcoin Cash shares Bitcoin's legacy prefixes but signs with SIGHASH_FORKID.
pub const BITCOIN_CASH: NetworkVersions = NetworkVersions {
    name: "bitcoin-cash",
    pubkey_hash: &[0x00],
    script_hash: &[0x05],
    wif: 0x80,
    sighash: SighashScheme::ForkId,
};

/// Zcash transparent addresses ("t1" / "t3"). Signature hashes depend on the
/// consensus branch active at the current block height.
pub const ZCASH: NetworkVersions = NetworkVersions {
    name: "zcash",
    pubkey_hash: &[0x1C, 0xB8],
    script_hash: &[0x1C, 0xBD],
    wif: 0x80,
    sighash: SighashScheme::HeightQualified,
};

/// Ravencoin.
pub const RAVENCOIN: NetworkVersions = NetworkVersions {
    name: "ravencoin",
    pubkey_hash: &[0x3C],
    script_hash: &[0x7A],
    wif: 0x80,
    sighash: SighashScheme::All,
};

/// Dash.
pub const DASH: NetworkVersions = NetworkVersions {
    name: "dash",
    pubkey_hash: &[0x4C],
    script_hash: &[0x10],
    wif: 0xCC,
    sighash: SighashScheme::All,
};

/// Monacoin.
pub const MONACOIN: NetworkVersions = NetworkVersions {
    name: "monacoin",
    pubkey_hash: &[0x32],
    script_hash: &[0x37],
    wif: 0xB0,
    sighash: SighashScheme::All,
};

impl std::fmt::Display for NetworkVersions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name)
    }
}
