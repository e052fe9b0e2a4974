use crate::domain::ports::{LedgerEntry, LedgerSinkRef, NotifierRef, PaymentEvent};
use tracing::warn;

/// Fires best-effort side effects after a committed state transition.
///
/// Notifications and ledger writes are advisory: failures are logged and
/// never surface to the caller, and the caller is not blocked beyond
/// spawning the task.
#[derive(Clone)]
pub struct SideEffectDispatcher {
    notifier: NotifierRef,
    ledger: LedgerSinkRef,
}

impl SideEffectDispatcher {
    pub fn new(notifier: NotifierRef, ledger: LedgerSinkRef) -> Self {
        Self { notifier, ledger }
    }

    pub fn dispatch(&self, event: PaymentEvent) {
        let notifier = self.notifier.clone();
        tokio::spawn(async move {
            if let Err(e) = notifier.notify(&event).await {
                warn!(error = %e, ?event, "payment notification failed");
            }
        });
    }

    pub fn record(&self, entry: LedgerEntry) {
        let ledger = self.ledger.clone();
        tokio::spawn(async move {
            if let Err(e) = ledger.record(&entry).await {
                warn!(
                    error = %e,
                    payment_request_id = %entry.payment_request_id,
                    "execution ledger write failed"
                );
            }
        });
    }
}
