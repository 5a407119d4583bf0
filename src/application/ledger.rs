use crate::domain::balance::AccountBalance;
use crate::domain::payment::{ClientId, PaymentId, PaymentRequest};
use crate::domain::ports::{CommitOutcome, LedgerStoreBox};
use crate::error::PersistenceError;
use tracing::{debug, info};

/// Outcome of recording a payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recorded {
    /// The payment was stored and credited to the client's balance.
    Applied(PaymentRequest),
    /// The payment id was already stored; nothing changed.
    Replayed(PaymentRequest),
}

impl Recorded {
    pub fn request(&self) -> &PaymentRequest {
        match self {
            Recorded::Applied(request) | Recorded::Replayed(request) => request,
        }
    }

    pub fn into_request(self) -> PaymentRequest {
        match self {
            Recorded::Applied(request) | Recorded::Replayed(request) => request,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, Recorded::Applied(_))
    }
}

/// Records payments and keeps per-client running balances.
///
/// Every call runs as one unit of work against the store: the client's row
/// lock is taken first, then the payment id is checked, then the payment row
/// and the new balance are committed together. Callers for the same client
/// serialize on the row lock; callers for different clients do not block
/// each other.
pub struct Ledger {
    store: LedgerStoreBox,
}

impl Ledger {
    pub fn new(store: LedgerStoreBox) -> Self {
        Self { store }
    }

    /// Records `request` exactly once per payment id.
    ///
    /// Replays of a stored payment id return the input unchanged without
    /// touching the balance. On error nothing is written.
    pub async fn record_payment(
        &self,
        request: PaymentRequest,
    ) -> Result<Recorded, PersistenceError> {
        let mut unit = self.store.begin(request.client_id()).await?;

        if unit.find_payment(request.payment_id()).await?.is_some() {
            info!(
                payment_id = request.payment_id(),
                "Payment ID already exists. No action to be taken."
            );
            return Ok(Recorded::Replayed(request));
        }

        unit.insert_payment(request.clone());

        let mut balance = unit.balance().clone();
        debug!(
            payment_id = request.payment_id(),
            client_id = balance.client_id,
            balance = %balance.balance.value(),
            "Current balance"
        );
        balance.credit(request.payment_sum());
        unit.update_balance(balance.clone());

        match unit.commit().await? {
            CommitOutcome::Applied => {
                info!(
                    payment_id = request.payment_id(),
                    client_id = balance.client_id,
                    balance = %balance.balance.value(),
                    "Balance updated"
                );
                Ok(Recorded::Applied(request))
            }
            CommitOutcome::Duplicate => {
                info!(
                    payment_id = request.payment_id(),
                    "Payment ID stored concurrently. No action to be taken."
                );
                Ok(Recorded::Replayed(request))
            }
        }
    }

    pub async fn balance(
        &self,
        client_id: ClientId,
    ) -> Result<Option<AccountBalance>, PersistenceError> {
        self.store.balance(client_id).await
    }

    pub async fn payment(
        &self,
        payment_id: PaymentId,
    ) -> Result<Option<PaymentRequest>, PersistenceError> {
        self.store.payment(payment_id).await
    }

    /// All balance rows, in client order.
    pub async fn balances(&self) -> Result<Vec<AccountBalance>, PersistenceError> {
        self.store.all_balances().await
    }
}
