//! Realtime Presence & Change Feed
//!
//! Live presence over the backend's shared channel plus row-change
//! notifications for the `profiles` table. The channel itself is an
//! opaque platform primitive behind [`RealtimeChannel`]; this module owns
//! only the derived state: the online user-id set and the notification
//! stream.

pub mod channel;
pub mod events;
pub mod feed;

pub use channel::RealtimeChannel;
pub use events::{ChannelEvent, Notification, PresenceMeta, ProfileChange};
pub use feed::{spawn_feed, FeedHandle, FeedState, FeedUpdate};
