use std::sync::atomic::{AtomicU64, Ordering};

use serenity::model::{
    id::{ChannelId, GuildId},
    voice::VoiceState,
};
use songbird::{
    error::JoinError,
    input::{Compose, Input, YoutubeDl},
    tracks::{PlayMode, Track, TrackHandle},
    Call, Event, EventContext, Songbird, TrackEvent,
};
use tokio::sync::Mutex;

use super::{
    playback::{PlaybackEvent, PlaybackHandler},
    Enqueued, PlaybackNode, TrackId, TrackMeta, TrackRequest, VoiceBackend,
};
use crate::prelude::*;

/// [`VoiceBackend`] driving an in-process songbird instance
pub struct SongbirdBackend {
    this: Weak<Self>,
    songbird: Arc<Songbird>,
    http: reqwest::Client,
    playback: PlaybackHandler,
    next_id: AtomicU64,
}

impl fmt::Debug for SongbirdBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SongbirdBackend")
            .field("playback", &self.playback)
            .finish_non_exhaustive()
    }
}

impl SongbirdBackend {
    pub fn new(songbird: Arc<Songbird>, http: reqwest::Client, playback: PlaybackHandler) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: Weak::clone(this),
            songbird,
            http,
            playback,
            next_id: AtomicU64::new(0),
        })
    }

    fn call(&self, guild: GuildId) -> Option<Arc<Mutex<Call>>> { self.songbird.get(guild) }

    fn source(&self, query: &str) -> YoutubeDl<'static> {
        let query = query.trim();

        if Url::parse(query).is_ok() {
            YoutubeDl::new(self.http.clone(), query.to_owned())
        } else {
            YoutubeDl::new(self.http.clone(), format!("ytsearch1:{query}"))
        }
    }

    fn subscribe(&self, call: &mut Call, guild: GuildId) {
        call.remove_all_global_events();

        for kind in [TrackEvent::Play, TrackEvent::End, TrackEvent::Error] {
            call.add_global_event(Event::Track(kind), TrackEvents {
                backend: Weak::clone(&self.this),
                guild,
                kind,
            });
        }
    }
}

fn track_meta(handle: &TrackHandle) -> TrackMeta { TrackMeta::clone(&handle.data::<TrackMeta>()) }

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SkipPlan {
    Nothing,
    /// The failed track already left the queue
    AlreadyGone,
    SkipHead,
}

/// Songbird's queue pops a track as soon as it ends, errors included, so by
/// the time a failure is handled the head may already be the next track
fn plan_skip(head: Option<TrackId>, failed: Option<TrackId>) -> SkipPlan {
    match (head, failed) {
        (None, None) => SkipPlan::Nothing,
        (Some(_), None) => SkipPlan::SkipHead,
        (Some(head), Some(failed)) if head == failed => SkipPlan::SkipHead,
        (_, Some(_)) => SkipPlan::AlreadyGone,
    }
}

/// Translate one songbird track event.  An errored track also fires `End`,
/// which is dropped here so the failure is only reported once.
fn playback_event(
    kind: TrackEvent,
    playing: &PlayMode,
    guild: GuildId,
    track: Option<TrackMeta>,
) -> Option<PlaybackEvent> {
    Some(match kind {
        TrackEvent::Play => PlaybackEvent::TrackStarted { guild, track },
        TrackEvent::End if matches!(playing, PlayMode::Errored(_)) => return None,
        TrackEvent::End => PlaybackEvent::TrackFinished { guild, track },
        TrackEvent::Error => PlaybackEvent::TrackException {
            guild,
            track,
            error: format!("{playing:?}"),
        },
        _ => return None,
    })
}

/// Tracks that are still loaded or playing, skipping ones that have already
/// ended but not yet left the queue
async fn live_tracks(handles: Vec<TrackHandle>) -> Vec<TrackMeta> {
    let mut live = Vec::with_capacity(handles.len());

    for handle in handles {
        let Ok(info) = handle.get_info().await else {
            continue;
        };

        if matches!(
            info.playing,
            PlayMode::Stop | PlayMode::End | PlayMode::Errored(_)
        ) {
            continue;
        }

        live.push(track_meta(&handle));
    }

    live
}

#[async_trait]
impl VoiceBackend for SongbirdBackend {
    async fn state_update(&self, guild: GuildId, state: &VoiceState) -> Result {
        use serenity::gateway::VoiceGatewayManager;

        self.songbird.state_update(guild, state).await;
        Ok(())
    }

    async fn server_update(&self, guild: GuildId, endpoint: Option<&str>, token: &str) -> Result {
        use serenity::gateway::VoiceGatewayManager;

        self.songbird
            .server_update(guild, &endpoint.map(ToOwned::to_owned), token)
            .await;
        Ok(())
    }

    #[instrument(level = "debug", skip(self))]
    async fn join(&self, guild: GuildId, channel: ChannelId) -> Result {
        let call = self
            .songbird
            .join(guild, channel)
            .await
            .with_context(|| format!("Error joining voice channel {channel}"))?;

        self.subscribe(&mut *call.lock().await, guild);
        debug!("Joined voice channel");
        Ok(())
    }

    #[instrument(level = "debug", skip(self))]
    async fn leave(&self, guild: GuildId) -> Result<bool> {
        if let Some(call) = self.call(guild) {
            call.lock().await.queue().stop();
        }

        match self.songbird.remove(guild).await {
            Ok(()) => Ok(true),
            Err(JoinError::NoCall) => Ok(false),
            Err(e) => Err(e).context("Error leaving voice channel"),
        }
    }

    #[instrument(level = "debug", skip(self))]
    async fn enqueue(&self, guild: GuildId, req: TrackRequest) -> Result<Enqueued> {
        let call = self
            .call(guild)
            .ok_or_else(|| anyhow!("Not connected to voice in this guild"))?;

        let mut source = self.source(&req.query);
        let aux = source
            .aux_metadata()
            .await
            .with_context(|| format!("Error loading track {:?}", req.query))?;

        let meta = TrackMeta {
            id: TrackId(self.next_id.fetch_add(1, Ordering::Relaxed)),
            title: aux.title.unwrap_or_else(|| req.query.clone()),
            requested_by: req.requested_by,
            reply_channel: req.reply_channel,
        };
        let track = Track::new_with_data(Input::from(source), Arc::new(meta.clone()));

        let mut call = call.lock().await;
        call.enqueue(track).await;
        let position = call.queue().len().saturating_sub(1);

        Ok(Enqueued { meta, position })
    }

    #[instrument(level = "debug", skip(self))]
    async fn skip(&self, guild: GuildId, failed: Option<TrackId>) -> Result<bool> {
        let Some(call) = self.call(guild) else {
            return Ok(plan_skip(None, failed) != SkipPlan::Nothing);
        };
        let call = call.lock().await;
        let queue = call.queue();

        match plan_skip(queue.current().map(|h| track_meta(&h).id), failed) {
            SkipPlan::Nothing => Ok(false),
            SkipPlan::AlreadyGone => {
                debug!("Failed track already dropped from the queue");
                Ok(true)
            },
            SkipPlan::SkipHead => {
                queue.skip().context("Error skipping track")?;
                Ok(true)
            },
        }
    }

    async fn node(&self, guild: GuildId) -> Result<PlaybackNode> {
        let Some(call) = self.call(guild) else {
            return Ok(PlaybackNode::default());
        };
        let handles = call.lock().await.queue().current_queue();

        let mut tracks = live_tracks(handles).await.into_iter();
        Ok(PlaybackNode {
            now_playing: tracks.next(),
            queue: tracks.collect(),
        })
    }

    #[instrument(level = "debug", skip(self))]
    async fn stop(&self, guild: GuildId) -> Result {
        self.leave(guild).await.map(|_| ())
    }
}

/// Songbird callback for one kind of track event in one guild
#[derive(Debug)]
struct TrackEvents {
    backend: Weak<SongbirdBackend>,
    guild: GuildId,
    kind: TrackEvent,
}

#[async_trait]
impl songbird::EventHandler for TrackEvents {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let EventContext::Track(tracks) = ctx else {
            return None;
        };
        let backend = self.backend.upgrade()?;

        for (state, handle) in *tracks {
            let Some(evt) =
                playback_event(self.kind, &state.playing, self.guild, Some(track_meta(handle)))
            else {
                continue;
            };

            let backend = Arc::clone(&backend);
            tokio::spawn(async move {
                backend.playback.handle(&*backend, evt).await;
            });
        }

        None
    }
}

#[cfg(test)]
mod test {
    use serenity::model::id::GuildId;
    use songbird::{
        tracks::{PlayError, PlayMode},
        TrackEvent,
    };

    use super::{playback_event, plan_skip, SkipPlan};
    use crate::{
        prelude::*,
        voice::{playback::PlaybackEvent, test::meta, TrackId},
    };

    const BAD: TrackId = TrackId(1);
    const GOOD: TrackId = TrackId(2);

    fn errored() -> PlayMode {
        PlayMode::Errored(PlayError::Decode(Arc::new(
            symphonia::core::errors::Error::DecodeError("corrupt frame"),
        )))
    }

    #[test]
    fn test_failed_head_not_yet_popped() {
        assert_eq!(plan_skip(Some(BAD), Some(BAD)), SkipPlan::SkipHead);
    }

    #[test]
    fn test_failure_leaves_next_track_alone() {
        // [bad, good] after songbird popped `bad`
        assert_eq!(plan_skip(Some(GOOD), Some(BAD)), SkipPlan::AlreadyGone);
    }

    #[test]
    fn test_failure_of_last_track_still_skips() {
        // [bad] after songbird popped `bad`
        assert_eq!(plan_skip(None, Some(BAD)), SkipPlan::AlreadyGone);
    }

    #[test]
    fn test_manual_skip() {
        assert_eq!(plan_skip(Some(GOOD), None), SkipPlan::SkipHead);
        assert_eq!(plan_skip(None, None), SkipPlan::Nothing);
    }

    #[test]
    fn test_error_reported_once() {
        let guild = GuildId::new(1);
        let track = Some(meta("broken"));

        assert!(matches!(
            playback_event(TrackEvent::Error, &errored(), guild, track.clone()),
            Some(PlaybackEvent::TrackException { .. })
        ));
        assert_eq!(
            playback_event(TrackEvent::End, &errored(), guild, track.clone()),
            None
        );
        assert_eq!(
            playback_event(TrackEvent::End, &PlayMode::End, guild, track.clone()),
            Some(PlaybackEvent::TrackFinished { guild, track })
        );
    }
}
