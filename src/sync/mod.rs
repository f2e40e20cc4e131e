//! Room synchronisation: who is in a room, what they said, what is queued and
//! what is playing, and how those change together.

mod code;
mod model;
mod player;
mod policy;
mod store;
mod subscription;

pub use code::RoomCode;
pub use model::{
    Identity, Message, Participant, PlaybackPatch, PlaybackPhase, PlaybackState, QueueEntry,
    ReplySnapshot, Room, VideoRef,
};
pub use player::{Follower, Player, PlayerEvent};
pub use policy::SyncPolicy;
pub use store::RoomStore;
pub use subscription::{Hub, Subscription, Topic};
