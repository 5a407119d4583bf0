use crate::error::ThrottlerError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

pub type ClientId = u64;
pub type PaymentId = u64;

/// A strictly positive payment amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self, ThrottlerError> {
        if value > Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(ThrottlerError::ValidationError(
                "Payment sum must be greater than 0".to_string(),
            ))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = ThrottlerError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A single payment drained from the work queue.
///
/// `payment_id` is the deduplication key; `client_id` selects the balance the
/// payment is credited to. Requests are immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRequest {
    client_id: ClientId,
    payment_id: PaymentId,
    payment_sum: Amount,
}

impl PaymentRequest {
    pub fn new(
        client_id: ClientId,
        payment_id: PaymentId,
        payment_sum: Decimal,
    ) -> Result<Self, ThrottlerError> {
        let request = Self {
            client_id,
            payment_id,
            payment_sum: Amount::new(payment_sum)?,
        };
        request.validate()?;
        Ok(request)
    }

    /// Re-checks field positivity. Deserialized requests skip the constructor,
    /// so decoders call this before handing a request on.
    pub fn validate(&self) -> Result<(), ThrottlerError> {
        if self.client_id == 0 {
            return Err(ThrottlerError::ValidationError(
                "Client ID must be greater than 0".to_string(),
            ));
        }
        if self.payment_id == 0 {
            return Err(ThrottlerError::ValidationError(
                "Payment ID must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    pub fn payment_id(&self) -> PaymentId {
        self.payment_id
    }

    pub fn payment_sum(&self) -> Amount {
        self.payment_sum
    }
}

impl fmt::Display for PaymentRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PaymentRequest(clientId={}, paymentId={}, paymentSum={})",
            self.client_id, self.payment_id, self.payment_sum
        )
    }
}
