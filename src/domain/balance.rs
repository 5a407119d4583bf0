use super::payment::{Amount, ClientId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize, Serializer};
use std::ops::{Add, AddAssign};

/// A running monetary total.
///
/// Wraps `rust_decimal::Decimal` so balances and payment amounts cannot be
/// mixed up by accident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Balance(pub Decimal);

impl Balance {
    pub const ZERO: Self = Self(Decimal::ZERO);

    pub fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl From<Amount> for Balance {
    fn from(amount: Amount) -> Self {
        Self(amount.value())
    }
}

impl Add for Balance {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl AddAssign for Balance {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

/// The per-client running balance row.
///
/// One row exists for every client that has had at least one payment applied.
/// `balance` is the sum of every distinct payment recorded for the client.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct AccountBalance {
    #[serde(rename = "client")]
    pub client_id: ClientId,
    #[serde(serialize_with = "serialize_normalized")]
    pub balance: Balance,
}

fn serialize_normalized<S>(balance: &Balance, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    Serialize::serialize(&balance.0.normalize(), serializer)
}

impl AccountBalance {
    /// A fresh zero-balance row, as created on a client's first payment.
    pub fn new(client_id: ClientId) -> Self {
        Self {
            client_id,
            balance: Balance::ZERO,
        }
    }

    /// Credits a payment to the row.
    pub fn credit(&mut self, amount: Amount) {
        self.balance += amount.into();
    }
}
