//! Realtime Channel Seam
//!
//! The bidirectional channel primitive the hosted backend exposes,
//! reduced to the contract this crate consumes. The platform owns the
//! presence bookkeeping; subscribers only push their own `track`
//! heartbeat and receive events.

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::events::{ChannelEvent, PresenceMeta};
use crate::error::BackendError;

/// One subscription to the shared realtime channel
///
/// Within a subscription, events arrive in the order the backend sends
/// them; nothing is ordered across independent subscriptions. There is no
/// buffering of missed events across a disconnect.
#[async_trait]
pub trait RealtimeChannel: Send + Sync {
    /// Open the subscription and start delivering events.
    ///
    /// Failures are not retried here; the consumer may create a fresh
    /// channel to try again.
    async fn subscribe(&mut self) -> Result<mpsc::Receiver<ChannelEvent>, BackendError>;

    /// Announce this client's presence into the channel.
    async fn track(&mut self, meta: PresenceMeta) -> Result<(), BackendError>;

    /// Release the subscription. No further events are delivered after
    /// this returns.
    async fn unsubscribe(&mut self) -> Result<(), BackendError>;
}
