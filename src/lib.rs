//! Funds-custody ledger with oracle-priced minimum contributions.
//!
//! The crate is built from three small modules:
//!
//! * [`account`] — opaque fixed-width identities for contributors, owners,
//!   and price feeds.
//! * [`oracle`] — the external exchange-rate seam and the conversion of
//!   native amounts into reference-unit values for threshold checks.
//! * [`ledger`] — the contribution ledger itself: per-contributor balances,
//!   the ordered funder list, the minimum-contribution check, and the
//!   owner-only withdraw-and-reset transition with its
//!   effects-before-transfer reentrancy discipline.
//!
//! The host environment (transaction atomicity, identity management, the
//! real oracle transport) stays outside the crate; the `fundpool` binary
//! drives the ledger against a JSON state file for simulation and tooling.

pub mod account;
pub mod ledger;
pub mod oracle;

pub use account::Address;
pub use ledger::{ContributionLedger, LedgerError, LedgerSnapshot, Recipient, Wallet};
pub use oracle::{Amount, FixedPriceFeed, OracleError, PriceFeed, PriceOracleAdapter};
