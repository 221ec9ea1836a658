use std::collections::BTreeMap;
use std::mem;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::account::Address;
use crate::oracle::{Amount, FixedPriceFeed, OracleError, PriceFeed, PriceOracleAdapter};

/// Default contribution minimum: 50 reference units, in minor units.
pub const DEFAULT_MINIMUM_REFERENCE_VALUE: Amount = 50 * 10u128.pow(crate::oracle::NATIVE_DECIMALS);

/// Errors surfaced by ledger operations.
///
/// Every failure is all-or-nothing: an operation that returns an error has
/// made no observable change to the ledger.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    /// The contribution's reference-unit value is below the fixed minimum.
    #[error(
        "contribution worth {reference_value} reference minor units is below the minimum {minimum}"
    )]
    InsufficientContribution {
        reference_value: Amount,
        minimum: Amount,
    },

    /// Contributions must carry a positive native amount.
    #[error("contribution amount must be positive")]
    ZeroContribution,

    /// Only the owner fixed at construction may withdraw.
    #[error("caller {caller} is not the ledger owner")]
    NotOwner { caller: Address },

    /// The price oracle could not value the contribution; retry later.
    #[error("price oracle unavailable: {0}")]
    OracleUnavailable(#[from] OracleError),

    /// The payout recipient rejected the transfer; the withdrawal was
    /// rolled back and the pooled funds remain in the ledger.
    #[error("withdrawal payout failed: {0}")]
    TransferFailed(#[from] TransferRejected),

    /// Funder index past the end of the funder list.
    #[error("funder index {index} out of range (len {len})")]
    IndexOutOfRange { index: usize, len: usize },
}

/// Refusal of an outbound payout by its recipient.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("recipient rejected payout: {reason}")]
pub struct TransferRejected {
    pub reason: String,
}

impl TransferRejected {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Target of the withdrawal payout.
///
/// The recipient is handed a mutable reborrow of the ledger, so an
/// implementation may synchronously call back into `fund` or `withdraw`
/// before returning. The ledger commits its reset before issuing the
/// transfer, so such a nested call observes empty bookkeeping and cannot
/// extract additional value.
pub trait Recipient<F: PriceFeed> {
    fn receive(
        &mut self,
        ledger: &mut ContributionLedger<F>,
        amount: Amount,
    ) -> Result<(), TransferRejected>;
}

/// A plain accumulating wallet that accepts every payout.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Wallet {
    pub balance: Amount,
}

impl<F: PriceFeed> Recipient<F> for Wallet {
    fn receive(
        &mut self,
        _ledger: &mut ContributionLedger<F>,
        amount: Amount,
    ) -> Result<(), TransferRejected> {
        self.balance += amount;
        Ok(())
    }
}

/// How the withdrawal reset walks the contributor bookkeeping.
///
/// Both strategies produce identical observable results; they differ only in
/// internal iteration cost.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WithdrawStrategy {
    /// Re-visit the funder list entry by entry, zeroing each balance.
    #[default]
    PerFunder,
    /// Detach the whole balances map and funder list in one move.
    Drain,
}

/// Pooled contribution ledger with a single withdrawal authority.
///
/// Accepts native-value contributions from any identity, values them against
/// a price oracle, enforces a minimum reference-unit contribution, and lets
/// the owner withdraw the entire pool while resetting all contributor
/// bookkeeping. Owner and minimum are fixed at construction.
#[derive(Debug)]
pub struct ContributionLedger<F> {
    owner: Address,
    minimum_reference_value: Amount,
    oracle: PriceOracleAdapter<F>,
    balances: BTreeMap<Address, Amount>,
    funders: Vec<Address>,
    pooled: Amount,
}

impl<F: PriceFeed> ContributionLedger<F> {
    pub fn new(owner: Address, feed: F) -> Self {
        Self::with_minimum(owner, feed, DEFAULT_MINIMUM_REFERENCE_VALUE)
    }

    pub fn with_minimum(owner: Address, feed: F, minimum_reference_value: Amount) -> Self {
        Self {
            owner,
            minimum_reference_value,
            oracle: PriceOracleAdapter::new(feed),
            balances: BTreeMap::new(),
            funders: Vec::new(),
            pooled: 0,
        }
    }

    /// Record a contribution of `amount` native minor units.
    ///
    /// The amount is valued through the oracle and rejected below the
    /// minimum; on success custody of `amount` passes to the pool and the
    /// contributor joins the funder list on first contribution.
    pub fn fund(&mut self, contributor: Address, amount: Amount) -> Result<(), LedgerError> {
        if amount == 0 {
            return Err(LedgerError::ZeroContribution);
        }
        let reference_value = self.oracle.convert(amount)?;
        if reference_value < self.minimum_reference_value {
            return Err(LedgerError::InsufficientContribution {
                reference_value,
                minimum: self.minimum_reference_value,
            });
        }
        let first_contribution = !self.balances.contains_key(&contributor);
        *self.balances.entry(contributor).or_insert(0) += amount;
        if first_contribution {
            self.funders.push(contributor);
        }
        self.pooled += amount;
        Ok(())
    }

    /// Pay the whole pool out to `recipient` and reset all bookkeeping.
    pub fn withdraw(
        &mut self,
        caller: Address,
        recipient: &mut dyn Recipient<F>,
    ) -> Result<Amount, LedgerError> {
        self.withdraw_with(caller, recipient, WithdrawStrategy::PerFunder)
    }

    /// [`withdraw`](Self::withdraw) using the cheaper detach-in-one-move
    /// reset. Observable behavior is identical.
    pub fn cheaper_withdraw(
        &mut self,
        caller: Address,
        recipient: &mut dyn Recipient<F>,
    ) -> Result<Amount, LedgerError> {
        self.withdraw_with(caller, recipient, WithdrawStrategy::Drain)
    }

    /// Shared withdrawal routine.
    ///
    /// The contributor bookkeeping is reset before the payout is issued, so
    /// a recipient that re-enters the ledger during `receive` finds it
    /// already empty. A rejected payout rolls the reset back in full; the
    /// ledger never ends up with cleared balances and undelivered funds.
    pub fn withdraw_with(
        &mut self,
        caller: Address,
        recipient: &mut dyn Recipient<F>,
        strategy: WithdrawStrategy,
    ) -> Result<Amount, LedgerError> {
        if caller != self.owner {
            return Err(LedgerError::NotOwner { caller });
        }
        let total = self.pooled;
        let (saved_balances, saved_funders) = match strategy {
            WithdrawStrategy::PerFunder => {
                let saved = self.balances.clone();
                let funders = mem::take(&mut self.funders);
                for funder in &funders {
                    if let Some(balance) = self.balances.get_mut(funder) {
                        *balance = 0;
                    }
                }
                self.balances.clear();
                (saved, funders)
            }
            WithdrawStrategy::Drain => (
                mem::take(&mut self.balances),
                mem::take(&mut self.funders),
            ),
        };
        self.pooled = 0;

        if let Err(rejected) = recipient.receive(self, total) {
            // Full rollback, including anything a nested call recorded
            // between the reset and the rejection.
            self.balances = saved_balances;
            self.funders = saved_funders;
            self.pooled = total;
            return Err(LedgerError::TransferFailed(rejected));
        }
        Ok(total)
    }

    /// Cumulative contribution of `contributor`, 0 if they never funded.
    pub fn balance_of(&self, contributor: Address) -> Amount {
        self.balances.get(&contributor).copied().unwrap_or(0)
    }

    /// Funder identity at `index` in first-contribution order.
    pub fn funder_at(&self, index: usize) -> Result<Address, LedgerError> {
        self.funders
            .get(index)
            .copied()
            .ok_or(LedgerError::IndexOutOfRange {
                index,
                len: self.funders.len(),
            })
    }

    pub fn funders(&self) -> &[Address] {
        &self.funders
    }

    pub fn funder_count(&self) -> usize {
        self.funders.len()
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn minimum_reference_value(&self) -> Amount {
        self.minimum_reference_value
    }

    pub fn price_feed_address(&self) -> Address {
        self.oracle.feed_address()
    }

    pub fn oracle(&self) -> &PriceOracleAdapter<F> {
        &self.oracle
    }

    /// Total native value currently held by the pool.
    pub fn pooled(&self) -> Amount {
        self.pooled
    }

    /// True when the balances map, funder list, and pooled total agree:
    /// balances sum to the pool, and the funder list holds exactly the
    /// addresses with nonzero balances, without duplicates.
    pub fn is_consistent(&self) -> bool {
        let sum: Amount = self.balances.values().sum();
        if sum != self.pooled {
            return false;
        }
        if self.funders.len() != self.balances.len() {
            return false;
        }
        let mut seen = BTreeMap::new();
        for funder in &self.funders {
            if seen.insert(*funder, ()).is_some() {
                return false;
            }
            if self.balances.get(funder).copied().unwrap_or(0) == 0 {
                return false;
            }
        }
        true
    }
}

/// Serde view of the persistent ledger state, as written by the CLI.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerSnapshot {
    pub owner: Address,
    pub minimum_reference_value: Amount,
    pub feed_address: Address,
    pub rate: u128,
    pub balances: BTreeMap<Address, Amount>,
    pub funders: Vec<Address>,
    pub pooled: Amount,
}

impl ContributionLedger<FixedPriceFeed> {
    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            owner: self.owner,
            minimum_reference_value: self.minimum_reference_value,
            feed_address: self.oracle.feed_address(),
            rate: self.oracle.feed().rate(),
            balances: self.balances.clone(),
            funders: self.funders.clone(),
            pooled: self.pooled,
        }
    }

    pub fn restore(snapshot: LedgerSnapshot) -> Self {
        Self {
            owner: snapshot.owner,
            minimum_reference_value: snapshot.minimum_reference_value,
            oracle: PriceOracleAdapter::new(FixedPriceFeed::new(
                snapshot.feed_address,
                snapshot.rate,
            )),
            balances: snapshot.balances,
            funders: snapshot.funders,
            pooled: snapshot.pooled,
        }
    }
}
