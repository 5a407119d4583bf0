pub mod balance_writer;
pub mod payment_reader;
