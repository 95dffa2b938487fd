use futures::channel::mpsc::UnboundedSender;
use serenity::{
    gateway::{ShardRunnerMessage, VoiceGatewayManager},
    model::{
        id::{GuildId, UserId},
        voice::VoiceState,
    },
};
use songbird::Songbird;

use crate::prelude::*;

/// Gives songbird the shard senders it needs to request voice connections,
/// while leaving the gateway's voice updates to [`bridge`](super::bridge).
///
/// Serenity calls `server_update` and `state_update` for every voice event
/// it sees; those are deliberately no-ops here so the event handler stays the
/// single route into the backend.
#[derive(Debug)]
pub struct VoiceGateway {
    songbird: Arc<Songbird>,
    expected_user: UserId,
}

impl VoiceGateway {
    pub fn new(songbird: Arc<Songbird>, expected_user: UserId) -> Arc<Self> {
        Arc::new(Self {
            songbird,
            expected_user,
        })
    }
}

#[async_trait]
impl VoiceGatewayManager for VoiceGateway {
    async fn initialise(&self, shard_count: u32, user_id: UserId) {
        if user_id != self.expected_user {
            warn!(
                %user_id,
                expected = %self.expected_user,
                "Gateway user ID does not match the one in the bot token",
            );
        }

        debug!(shard_count, %user_id, "Initializing voice gateway");
        self.songbird.initialise(shard_count, user_id).await;
    }

    async fn register_shard(&self, shard_id: u32, sender: UnboundedSender<ShardRunnerMessage>) {
        self.songbird.register_shard(shard_id, sender).await;
    }

    async fn deregister_shard(&self, shard_id: u32) {
        self.songbird.deregister_shard(shard_id).await;
    }

    async fn server_update(&self, _: GuildId, _: &Option<String>, _: &str) {}

    async fn state_update(&self, _: GuildId, _: &VoiceState) {}
}
