use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::account::Address;

/// Native amounts and reference values are carried as integer minor units.
pub type Amount = u128;

/// Decimal places of the native value unit (1 native unit = 10^18 minor units).
pub const NATIVE_DECIMALS: u32 = 18;

/// Decimal places of the exchange rate published by the price feed.
pub const RATE_DECIMALS: u32 = 8;

const RATE_SCALE: u128 = 10u128.pow(RATE_DECIMALS);

/// Failures of the external price feed or of the conversion itself.
///
/// None of these leave any caller state modified; the ledger treats every
/// variant as "oracle unavailable, retry later".
#[derive(Debug, Error, PartialEq, Eq)]
pub enum OracleError {
    /// The feed could not be reached at all.
    #[error("price feed unreachable: {reason}")]
    Unreachable { reason: String },

    /// The feed answered with a zero or otherwise unusable rate.
    #[error("price feed returned an invalid rate")]
    InvalidRate,

    /// The feed's latest quote is older than it is willing to serve.
    #[error("price quote is stale: {age_secs}s old, max {max_age_secs}s")]
    StaleQuote { age_secs: u64, max_age_secs: u64 },

    /// `amount * rate` does not fit the working integer width.
    #[error("conversion overflow")]
    Overflow,
}

/// One observation of the exchange rate.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PriceQuote {
    /// Reference units per native unit, scaled by 10^[`RATE_DECIMALS`].
    pub rate: u128,
    /// Unix timestamp at which the feed published this rate.
    pub updated_at: u64,
}

/// Read-only view of the external exchange-rate feed.
///
/// Implementations own their freshness policy: a feed that considers its
/// latest answer too old returns [`OracleError::StaleQuote`] rather than the
/// quote.
pub trait PriceFeed {
    /// Identity of the feed collaborator.
    fn address(&self) -> Address;

    /// Latest published quote, or why it could not be obtained.
    fn latest_quote(&self) -> Result<PriceQuote, OracleError>;
}

/// A feed pinned to one constant rate.
///
/// Backs the CLI simulation and most tests; the quote is always fresh.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct FixedPriceFeed {
    address: Address,
    rate: u128,
}

impl FixedPriceFeed {
    pub fn new(address: Address, rate: u128) -> Self {
        Self { address, rate }
    }

    pub fn rate(&self) -> u128 {
        self.rate
    }
}

impl PriceFeed for FixedPriceFeed {
    fn address(&self) -> Address {
        self.address
    }

    fn latest_quote(&self) -> Result<PriceQuote, OracleError> {
        Ok(PriceQuote {
            rate: self.rate,
            updated_at: 0,
        })
    }
}

/// Converts native amounts into reference-unit values for threshold checks.
///
/// Wraps one [`PriceFeed`] and performs no other side effects. Division
/// truncates toward zero so a borderline contribution is never rounded up
/// past the minimum.
#[derive(Clone, Copy, Debug)]
pub struct PriceOracleAdapter<F> {
    feed: F,
}

impl<F: PriceFeed> PriceOracleAdapter<F> {
    pub fn new(feed: F) -> Self {
        Self { feed }
    }

    pub fn feed(&self) -> &F {
        &self.feed
    }

    pub fn feed_address(&self) -> Address {
        self.feed.address()
    }

    /// Reference-unit value of `amount_native`, truncating toward zero.
    pub fn convert(&self, amount_native: Amount) -> Result<Amount, OracleError> {
        let quote = self.feed.latest_quote()?;
        if quote.rate == 0 {
            return Err(OracleError::InvalidRate);
        }
        let product = amount_native
            .checked_mul(quote.rate)
            .ok_or(OracleError::Overflow)?;
        Ok(product / RATE_SCALE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter(rate: u128) -> PriceOracleAdapter<FixedPriceFeed> {
        PriceOracleAdapter::new(FixedPriceFeed::new(Address::derive("feed"), rate))
    }

    #[test]
    fn converts_at_the_feed_rate() {
        // 2000 reference units per native unit.
        let oracle = adapter(2_000 * 10u128.pow(RATE_DECIMALS));
        let one_native = 10u128.pow(NATIVE_DECIMALS);
        assert_eq!(
            oracle.convert(one_native).unwrap(),
            2_000 * 10u128.pow(NATIVE_DECIMALS)
        );
        // 0.001 native -> 2 reference units.
        assert_eq!(
            oracle.convert(one_native / 1_000).unwrap(),
            2 * 10u128.pow(NATIVE_DECIMALS)
        );
    }

    #[test]
    fn truncates_toward_zero() {
        // Rate of 1.5 reference per native: 1 minor unit converts to 1, not 2.
        let oracle = adapter(RATE_SCALE + RATE_SCALE / 2);
        assert_eq!(oracle.convert(1).unwrap(), 1);
        assert_eq!(oracle.convert(0).unwrap(), 0);
    }

    #[test]
    fn zero_rate_is_invalid() {
        assert_eq!(adapter(0).convert(1), Err(OracleError::InvalidRate));
    }

    #[test]
    fn rejects_overflowing_product() {
        let oracle = adapter(u128::MAX);
        assert_eq!(oracle.convert(2), Err(OracleError::Overflow));
    }

    #[test]
    fn propagates_feed_failure() {
        struct DownFeed;
        impl PriceFeed for DownFeed {
            fn address(&self) -> Address {
                Address::derive("down")
            }
            fn latest_quote(&self) -> Result<PriceQuote, OracleError> {
                Err(OracleError::Unreachable {
                    reason: "connection refused".into(),
                })
            }
        }
        let oracle = PriceOracleAdapter::new(DownFeed);
        assert!(matches!(
            oracle.convert(1),
            Err(OracleError::Unreachable { .. })
        ));
    }
}
