use crate::error::{Result, SecomatError};
use crate::types::StateSnapshot;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::TryRecvError};

/// Outcome of a refresh, published to subscribers
#[derive(Debug, Clone)]
pub enum StateUpdate {
    /// A fetch succeeded and replaced the cached snapshot
    Refreshed(Arc<StateSnapshot>),

    /// A fetch failed; the cached snapshot (if any) is still served
    RefreshFailed(String),
}

/// Receiver for refresh events
///
/// A receiver that falls behind gets `SecomatError::Lagged` once and then
/// continues with the oldest event still buffered. The cached snapshot is
/// always available from the coordinator, so missed events lose nothing.
pub struct StateReceiver {
    rx: broadcast::Receiver<StateUpdate>,
}

impl StateReceiver {
    /// Wrap a coordinator's event channel
    pub(crate) fn new(rx: broadcast::Receiver<StateUpdate>) -> Self {
        Self { rx }
    }

    /// Wait for the next refresh event
    ///
    /// Fails with `SubscriptionClosed` once the coordinator is gone.
    pub async fn recv(&mut self) -> Result<StateUpdate> {
        use broadcast::error::RecvError;

        self.rx.recv().await.map_err(|e| match e {
            RecvError::Closed => SecomatError::SubscriptionClosed,
            RecvError::Lagged(missed) => SecomatError::Lagged(missed),
        })
    }

    /// Take a pending refresh event, `None` if there is none yet
    pub fn try_recv(&mut self) -> Result<Option<StateUpdate>> {
        match self.rx.try_recv() {
            Ok(update) => Ok(Some(update)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Closed) => Err(SecomatError::SubscriptionClosed),
            Err(TryRecvError::Lagged(missed)) => Err(SecomatError::Lagged(missed)),
        }
    }
}
