//! Seam between the bot shell and the voice-streaming backend

use serenity::model::{
    id::{ChannelId, GuildId, UserId},
    voice::VoiceState,
};

use crate::prelude::*;

mod backend;
pub mod bridge;
mod gateway;
pub mod playback;

pub use backend::SongbirdBackend;
pub use gateway::VoiceGateway;

/// Identifies one enqueued track for the life of the process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrackId(pub u64);

/// Data attached to every track the bot enqueues
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackMeta {
    pub id: TrackId,
    pub title: String,
    pub requested_by: UserId,
    /// Text channel the request came from, used for playback replies
    pub reply_channel: ChannelId,
}

/// A guild's queue and now-playing snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaybackNode {
    pub now_playing: Option<TrackMeta>,
    pub queue: Vec<TrackMeta>,
}

impl PlaybackNode {
    #[inline]
    pub fn is_empty(&self) -> bool { self.now_playing.is_none() && self.queue.is_empty() }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackRequest {
    /// A URL, or free text to search for
    pub query: String,
    pub requested_by: UserId,
    pub reply_channel: ChannelId,
}

#[derive(Debug)]
pub struct Enqueued {
    pub meta: TrackMeta,
    /// Zero if the track started playing immediately
    pub position: usize,
}

#[async_trait]
pub trait VoiceBackend: fmt::Debug + Send + Sync {
    /// Raw relay of a gateway voice-state update
    async fn state_update(&self, guild: GuildId, state: &VoiceState) -> Result;

    /// Raw relay of a gateway voice-server update
    async fn server_update(&self, guild: GuildId, endpoint: Option<&str>, token: &str) -> Result;

    async fn join(&self, guild: GuildId, channel: ChannelId) -> Result;

    /// Returns false if the bot was not connected in `guild`
    async fn leave(&self, guild: GuildId) -> Result<bool>;

    async fn enqueue(&self, guild: GuildId, req: TrackRequest) -> Result<Enqueued>;

    /// Skip the current track, returning false if there was nothing to skip.
    ///
    /// With `failed` set, only that track is skipped.  If the backend has
    /// already dropped it from the queue this still returns true.
    async fn skip(&self, guild: GuildId, failed: Option<TrackId>) -> Result<bool>;

    /// Snapshot the guild's playback state; empty if there is no session
    async fn node(&self, guild: GuildId) -> Result<PlaybackNode>;

    /// Stop playback, clear the queue and release the voice session
    async fn stop(&self, guild: GuildId) -> Result;
}
