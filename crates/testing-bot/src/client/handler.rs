use serenity::{
    client::Context,
    model::{application::Interaction, event::VoiceServerUpdateEvent, gateway::Ready, voice::VoiceState},
};

use super::{
    event::{dispatch, GatewayEvent},
    App,
};
use crate::prelude::*;

#[derive(Debug)]
pub struct Handler {
    app: Arc<App>,
}

impl Handler {
    pub fn new_rc(app: Arc<App>) -> Arc<Self> { Arc::new(Self { app }) }

    async fn run(&self, event: GatewayEvent) {
        let method = event.name();

        if let Err(e) = dispatch(&self.app, event).await {
            error!("Error in {method}: {e:?}");
        }
    }
}

#[async_trait]
impl serenity::client::EventHandler for Handler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        self.run(GatewayEvent::Started(ctx, ready)).await;
    }

    async fn interaction_create(&self, ctx: Context, int: Interaction) {
        self.run(GatewayEvent::Interaction(ctx, int)).await;
    }

    async fn voice_state_update(&self, _: Context, _: Option<VoiceState>, new: VoiceState) {
        self.run(GatewayEvent::VoiceStateUpdate(new)).await;
    }

    async fn voice_server_update(&self, _: Context, evt: VoiceServerUpdateEvent) {
        self.run(GatewayEvent::VoiceServerUpdate(evt)).await;
    }
}
