use serenity::{
    client::Context,
    model::{application::Interaction, event::VoiceServerUpdateEvent, gateway::Ready, voice::VoiceState},
};

use super::{lifecycle, App};
use crate::{prelude::*, voice::bridge};

/// Everything the bot reacts to, from the process and from the gateway
pub enum GatewayEvent {
    Starting,
    Started(Context, Ready),
    Stopping,
    VoiceStateUpdate(VoiceState),
    VoiceServerUpdate(VoiceServerUpdateEvent),
    Interaction(Context, Interaction),
}

impl GatewayEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Started(..) => "started",
            Self::Stopping => "stopping",
            Self::VoiceStateUpdate(_) => "voice_state_update",
            Self::VoiceServerUpdate(_) => "voice_server_update",
            Self::Interaction(..) => "interaction_create",
        }
    }
}

impl fmt::Debug for GatewayEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("GatewayEvent").field(&self.name()).finish()
    }
}

pub async fn dispatch(app: &Arc<App>, event: GatewayEvent) -> Result {
    match event {
        GatewayEvent::Starting => lifecycle::starting(app),
        GatewayEvent::Started(ctx, ready) => lifecycle::started(app, &ctx, &ready).await?,
        GatewayEvent::Stopping => lifecycle::stopping(app).await,
        GatewayEvent::VoiceStateUpdate(state) => {
            bridge::voice_state_update(&*app.voice, &state).await?;
        },
        GatewayEvent::VoiceServerUpdate(evt) => {
            bridge::voice_server_update(&*app.voice, &evt).await?;
        },
        GatewayEvent::Interaction(ctx, Interaction::Command(aci)) => {
            app.registry.handle(&ctx, app, &aci).await;
        },
        GatewayEvent::Interaction(_, int) => {
            debug!(kind = ?int.kind(), "Ignoring unhandled interaction");
        },
    }

    Ok(())
}
