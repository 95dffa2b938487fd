use serenity::{gateway::ShardManager, model::id::UserId, prelude::TypeMapKey};

use super::{command::Registry, extensions::ExtensionManifest, lifecycle::OpsNotifier};
use crate::{cache::Cache, prelude::*, voice::VoiceBackend};

/// State shared by every event handler for the life of the process
#[derive(Debug)]
pub struct App {
    pub bot_id: UserId,
    pub manifest: ExtensionManifest,
    pub registry: Registry,
    pub cache: Cache,
    pub voice: Arc<dyn VoiceBackend>,
    pub ops: OpsNotifier,
}

/// Lets command handlers reach the shard manager through the client's type map
pub struct ShardManagerKey;

impl TypeMapKey for ShardManagerKey {
    type Value = Arc<ShardManager>;
}
