//! Ledger-mutating calls and the operations that carry them.

use eraclaim_types::{AccountId, Balance, EraIndex, PayoutUnit};
use serde::{Deserialize, Serialize};

/// Where staking rewards are paid.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardDestination {
    /// Compound into the bonded stake.
    #[default]
    Staked,
    Stash,
    Controller,
    Account(AccountId),
}

/// A single staking call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "call")]
pub enum Call {
    Bond {
        value: Balance,
        #[serde(default)]
        payee: RewardDestination,
    },
    BondExtra {
        value: Balance,
    },
    Unbond {
        value: Balance,
    },
    Nominate {
        targets: Vec<AccountId>,
    },
    Chill,
    PayoutStakers {
        validator: AccountId,
        era: EraIndex,
    },
}

impl Call {
    /// `pallet.method` name of the call.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Bond { .. } => "staking.bond",
            Self::BondExtra { .. } => "staking.bond_extra",
            Self::Unbond { .. } => "staking.unbond",
            Self::Nominate { .. } => "staking.nominate",
            Self::Chill => "staking.chill",
            Self::PayoutStakers { .. } => "staking.payout_stakers",
        }
    }

    /// The payout unit this call claims, if it is a payout.
    pub fn payout_unit(&self) -> Option<PayoutUnit> {
        match self {
            Self::PayoutStakers { validator, era } => Some(PayoutUnit::new(validator.clone(), *era)),
            _ => None,
        }
    }
}

impl From<&PayoutUnit> for Call {
    fn from(unit: &PayoutUnit) -> Self {
        Self::PayoutStakers {
            validator: unit.validator.clone(),
            era: unit.era,
        }
    }
}

/// What gets signed and submitted: one call, or several applied atomically.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Single(Call),
    /// `utility.batch_all`: every call succeeds or none does.
    BatchAll(Vec<Call>),
}

impl Operation {
    /// Build the operation claiming `units`, in order.
    ///
    /// One unit becomes a plain call; several become an atomic batch.
    /// Returns `None` for an empty slice.
    pub fn payouts(units: &[PayoutUnit]) -> Option<Self> {
        match units {
            [] => None,
            [unit] => Some(Self::Single(Call::from(unit))),
            _ => Some(Self::BatchAll(units.iter().map(Call::from).collect())),
        }
    }

    /// The calls carried by this operation.
    pub fn calls(&self) -> &[Call] {
        match self {
            Self::Single(call) => std::slice::from_ref(call),
            Self::BatchAll(calls) => calls,
        }
    }

    /// Number of calls carried.
    pub fn len(&self) -> usize {
        self.calls().len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls().is_empty()
    }

    /// Payout units claimed by this operation, in call order.
    pub fn payout_units(&self) -> Vec<PayoutUnit> {
        self.calls().iter().filter_map(Call::payout_unit).collect()
    }

    /// Short description for logs and history rows.
    pub fn describe(&self) -> String {
        match self {
            Self::Single(call) => call.name().to_string(),
            Self::BatchAll(calls) => {
                let first = calls.first().map(Call::name).unwrap_or("empty");
                format!("utility.batch_all({first} x{})", calls.len())
            }
        }
    }
}
