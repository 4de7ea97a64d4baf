//! Presence & Change Feed
//!
//! Explicit state machine over a [`RealtimeChannel`] subscription:
//!
//! ```text
//! Disconnected -> Connecting -> Subscribed -> Tracking -> Disconnected
//! ```
//!
//! On entering `Subscribed` the feed immediately tracks its own
//! `{user_id, online_at}` heartbeat. The derived online set is replaced
//! wholesale on every `sync` event (the single authoritative transition)
//! while `join`/`leave` mutate nothing. Profile row changes become
//! [`Notification`]s. Stopping the feed (or channel closure) unsubscribes
//! and emits nothing further.

use chrono::Utc;
use std::collections::BTreeSet;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::channel::RealtimeChannel;
use super::events::{ChannelEvent, Notification, PresenceMeta};

/// Subscription lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedState {
    Disconnected,
    Connecting,
    Subscribed,
    /// Subscribed and own heartbeat accepted
    Tracking,
}

/// Output of one state machine step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedUpdate {
    /// The online set was replaced (authoritative, from `sync`)
    Online(Vec<String>),

    /// A change notification for transient UI feedback
    Notice(Notification),
}

/// Pure state machine; the async task around it does the channel I/O.
#[derive(Debug)]
pub(crate) struct FeedMachine {
    state: FeedState,
    online: BTreeSet<String>,
}

impl FeedMachine {
    pub(crate) fn new() -> Self {
        Self {
            state: FeedState::Disconnected,
            online: BTreeSet::new(),
        }
    }

    pub(crate) fn state(&self) -> FeedState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: FeedState) {
        debug!(from = ?self.state, to = ?state, "presence feed state change");
        self.state = state;
    }

    /// Apply one channel event, producing at most one update.
    pub(crate) fn on_event(&mut self, event: ChannelEvent) -> Option<FeedUpdate> {
        // A torn-down feed emits nothing, whatever still arrives.
        if matches!(self.state, FeedState::Disconnected | FeedState::Connecting) {
            return None;
        }

        match event {
            ChannelEvent::PresenceSync(state) => {
                // Replace, never merge: sync is the full authoritative set.
                self.online = state.into_keys().collect();
                Some(FeedUpdate::Online(self.online.iter().cloned().collect()))
            }
            ChannelEvent::PresenceJoin { key } => {
                // Advisory only; the next sync carries the truth.
                debug!(key, "presence join");
                None
            }
            ChannelEvent::PresenceLeave { key } => {
                debug!(key, "presence leave");
                None
            }
            ChannelEvent::RowInserted { new } => Some(FeedUpdate::Notice(
                Notification::MemberJoined {
                    display_name: new.display_name(),
                },
            )),
            ChannelEvent::RowUpdated { old, new } => {
                let old_role = old.as_ref().and_then(|o| o.role.as_deref());
                match (old_role, new.role.as_deref()) {
                    // Requires full old-row images from the backend; with
                    // changed-columns delivery this arm never fires.
                    (Some(old_role), Some(new_role)) if old_role != new_role => {
                        Some(FeedUpdate::Notice(Notification::RoleChanged {
                            display_name: new.display_name(),
                            new_role: new_role.to_string(),
                        }))
                    }
                    _ => Some(FeedUpdate::Notice(Notification::ProfileUpdated {
                        display_name: new.display_name(),
                    })),
                }
            }
        }
    }

    pub(crate) fn online(&self) -> Vec<String> {
        self.online.iter().cloned().collect()
    }
}

/// Handle to a running presence feed
pub struct FeedHandle {
    online: watch::Receiver<Vec<String>>,
    notices: mpsc::Receiver<Notification>,
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl FeedHandle {
    /// Snapshot of the derived online set.
    pub fn online(&self) -> Vec<String> {
        self.online.borrow().clone()
    }

    /// Watch side of the online set, for embedding into server state.
    pub fn online_watch(&self) -> watch::Receiver<Vec<String>> {
        self.online.clone()
    }

    /// Next change notification; `None` once the feed has stopped.
    pub async fn next_notice(&mut self) -> Option<Notification> {
        self.notices.recv().await
    }

    /// Stop the feed and release the channel subscription.
    pub async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        let _ = self.task.await;
    }
}

/// Spawn a presence feed over a channel subscription.
pub fn spawn_feed(mut channel: Box<dyn RealtimeChannel>, user_id: String) -> FeedHandle {
    let (online_tx, online_rx) = watch::channel(Vec::new());
    let (notice_tx, notice_rx) = mpsc::channel(64);
    let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

    let task = tokio::spawn(async move {
        let mut machine = FeedMachine::new();
        machine.set_state(FeedState::Connecting);

        let mut events = match channel.subscribe().await {
            Ok(events) => events,
            Err(err) => {
                // Not retried here; the consumer re-creates the feed to retry.
                warn!(error = %err, "realtime channel subscription failed");
                return;
            }
        };
        machine.set_state(FeedState::Subscribed);

        // Announce ourselves as soon as the subscription lands.
        let meta = PresenceMeta {
            user_id: user_id.clone(),
            online_at: Utc::now(),
        };
        match channel.track(meta).await {
            Ok(()) => machine.set_state(FeedState::Tracking),
            Err(err) => warn!(error = %err, "presence track failed"),
        }

        loop {
            tokio::select! {
                _ = &mut stop_rx => break,
                event = events.recv() => match event {
                    Some(event) => {
                        match machine.on_event(event) {
                            Some(FeedUpdate::Online(set)) => {
                                let _ = online_tx.send(set);
                            }
                            Some(FeedUpdate::Notice(notice)) => {
                                if notice_tx.send(notice).await.is_err() {
                                    // Consumer dropped the handle.
                                    break;
                                }
                            }
                            None => {}
                        }
                    }
                    None => break,
                },
            }
        }

        if let Err(err) = channel.unsubscribe().await {
            debug!(error = %err, "channel unsubscribe failed");
        }
        machine.set_state(FeedState::Disconnected);
    });

    FeedHandle {
        online: online_rx,
        notices: notice_rx,
        stop: Some(stop_tx),
        task,
    }
}
