use crate::domain::payment::{ClientId, PaymentId, PaymentRequest};
use crate::error::{Result, ThrottlerError};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Deserialize)]
struct PaymentRecord {
    client: ClientId,
    payment: PaymentId,
    amount: Decimal,
}

/// Reads payment requests from a CSV source with a `client, payment, amount` header.
///
/// Each row is validated on the way out, so a zero id or a non-positive
/// amount surfaces as an error for that row only.
pub struct PaymentReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> PaymentReader<R> {
    /// Creates a new `PaymentReader` from any `Read` source (e.g., File, Stdin).
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Returns an iterator that lazily reads, deserializes and validates payments.
    pub fn payments(self) -> impl Iterator<Item = Result<PaymentRequest>> {
        self.reader.into_deserialize().map(|result| {
            let record: PaymentRecord = result.map_err(ThrottlerError::from)?;
            PaymentRequest::new(record.client, record.payment, record.amount)
        })
    }
}
