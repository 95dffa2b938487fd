//! Relays gateway voice events to the voice backend.
//!
//! The backend's own gateway hookup is disabled (see [`VoiceGateway`]), so
//! these two functions are the only way voice session information reaches
//! it.  Each event becomes exactly one backend call with the payload passed
//! through untouched.
//!
//! [`VoiceGateway`]: super::VoiceGateway

use serenity::model::{event::VoiceServerUpdateEvent, voice::VoiceState};

use super::VoiceBackend;
use crate::prelude::*;

pub async fn voice_state_update(backend: &dyn VoiceBackend, state: &VoiceState) -> Result {
    let Some(guild) = state.guild_id else {
        debug!(user = %state.user_id, "Ignoring voice state update outside a guild");
        return Ok(());
    };

    trace!(
        %guild,
        user = %state.user_id,
        session = %state.session_id,
        channel = ?state.channel_id,
        "Forwarding voice state update",
    );

    backend
        .state_update(guild, state)
        .await
        .context("Error forwarding voice state update")
}

pub async fn voice_server_update(
    backend: &dyn VoiceBackend,
    event: &VoiceServerUpdateEvent,
) -> Result {
    let Some(guild) = event.guild_id else {
        debug!("Ignoring voice server update outside a guild");
        return Ok(());
    };

    trace!(%guild, endpoint = ?event.endpoint, "Forwarding voice server update");

    backend
        .server_update(guild, event.endpoint.as_deref(), &event.token)
        .await
        .context("Error forwarding voice server update")
}
