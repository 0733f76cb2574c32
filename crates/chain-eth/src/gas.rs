use alloy_primitives::utils::format_units;
use alloy_primitives::U256;

use crate::error::EthError;

/// One gwei in wei.
pub const GWEI: u128 = 1_000_000_000;

/// Gas limit for service transfers, leaving headroom for recipient contracts.
pub const GAS_LIMIT_TRANSFER: u64 = 60_000;

/// Gas limit of a plain value transfer to an externally owned account.
pub const GAS_LIMIT_STRICT: u64 = 21_000;

/// Gas price chosen for a broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasPrice {
    /// Price the node quoted, in wei.
    pub quoted: u128,
    /// Price actually used: `min(quoted, ceiling)`.
    pub price: u128,
}

impl GasPrice {
    pub fn is_capped(&self) -> bool {
        self.price < self.quoted
    }

    /// Total fee in wei for `gas_limit` units at the used price.
    pub fn fee(&self, gas_limit: u64) -> Result<u128, EthError> {
        self.price
            .checked_mul(u128::from(gas_limit))
            .ok_or_else(|| EthError::TransactionBuildError("fee overflow".into()))
    }
}

/// Applies the price ceiling to a node quote.
pub fn cap_gas_price(quoted: u128, ceiling: u128) -> GasPrice {
    GasPrice {
        quoted,
        price: quoted.min(ceiling),
    }
}

/// Parses a JSON-RPC hex quantity such as `"0x3b9aca00"`.
pub fn parse_quantity(value: &str) -> Result<u128, EthError> {
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .ok_or_else(|| EthError::InvalidQuantity(value.to_string()))?;
    if digits.is_empty() {
        return Err(EthError::InvalidQuantity(value.to_string()));
    }
    u128::from_str_radix(digits, 16).map_err(|_| EthError::InvalidQuantity(value.to_string()))
}

/// Formats a wei amount as gwei for logging, e.g. `1.5`.
pub fn wei_to_gwei_string(wei: u128) -> String {
    let Ok(text) = format_units(U256::from(wei), "gwei") else {
        return format!("{wei} wei");
    };
    match text.split_once('.') {
        Some((whole, frac)) if frac.trim_end_matches('0').is_empty() => whole.to_string(),
        Some((whole, frac)) => format!("{whole}.{}", frac.trim_end_matches('0')),
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_below_ceiling_is_used() {
        let gas = cap_gas_price(500_000_000, GWEI);
        assert_eq!(gas.price, 500_000_000);
        assert!(!gas.is_capped());
    }

    #[test]
    fn quote_above_ceiling_is_capped() {
        let gas = cap_gas_price(40 * GWEI, GWEI);
        assert_eq!(gas.price, GWEI);
        assert_eq!(gas.quoted, 40 * GWEI);
        assert!(gas.is_capped());
    }

    #[test]
    fn price_is_min_of_quote_and_ceiling() {
        for quoted in [0, 1, GWEI - 1, GWEI, GWEI + 1, u128::MAX] {
            assert_eq!(cap_gas_price(quoted, GWEI).price, quoted.min(GWEI));
        }
    }

    #[test]
    fn fee_multiplies_limit() {
        let gas = cap_gas_price(GWEI, GWEI);
        assert_eq!(gas.fee(GAS_LIMIT_STRICT).unwrap(), 21_000 * GWEI);
        assert_eq!(gas.fee(GAS_LIMIT_TRANSFER).unwrap(), 60_000 * GWEI);
    }

    #[test]
    fn fee_overflow_is_error() {
        let gas = cap_gas_price(u128::MAX, u128::MAX);
        assert!(gas.fee(2).is_err());
    }

    #[test]
    fn parse_quantities() {
        assert_eq!(parse_quantity("0x0").unwrap(), 0);
        assert_eq!(parse_quantity("0x3b9aca00").unwrap(), GWEI);
        assert!(parse_quantity("3b9aca00").is_err());
        assert!(parse_quantity("0x").is_err());
        assert!(parse_quantity("0xzz").is_err());
    }

    #[test]
    fn gwei_formatting() {
        assert_eq!(wei_to_gwei_string(GWEI), "1");
        assert_eq!(wei_to_gwei_string(1_500_000_000), "1.5");
        assert_eq!(wei_to_gwei_string(1), "0.000000001");
        assert_eq!(wei_to_gwei_string(20 * GWEI), "20");
        assert_eq!(wei_to_gwei_string(GWEI / 10), "0.1");
    }
}
