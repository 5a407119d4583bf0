use crate::domain::balance::AccountBalance;
use crate::error::Result;
use std::io::Write;

/// Writes account balances as CSV with a `client,balance` header.
pub struct BalanceWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> BalanceWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_balances(&mut self, balances: impl IntoIterator<Item = AccountBalance>) -> Result<()> {
        for balance in balances {
            self.writer.serialize(balance)?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
