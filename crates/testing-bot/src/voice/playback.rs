//! Reactions to track lifecycle notifications from the voice backend

use serenity::{
    http::Http,
    model::id::{ChannelId, GuildId},
};

use super::{TrackMeta, VoiceBackend};
use crate::prelude::*;

pub const NOTHING_TO_SKIP: &str = "Nothing to skip";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEvent {
    TrackStarted {
        guild: GuildId,
        track: Option<TrackMeta>,
    },
    TrackFinished {
        guild: GuildId,
        track: Option<TrackMeta>,
    },
    TrackException {
        guild: GuildId,
        track: Option<TrackMeta>,
        error: String,
    },
}

/// Sends plain-text replies to a channel
#[async_trait]
pub trait Responder: fmt::Debug + Send + Sync {
    async fn respond(&self, channel: ChannelId, content: &str) -> Result;
}

pub struct HttpResponder(pub Arc<Http>);

impl fmt::Debug for HttpResponder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("HttpResponder").finish_non_exhaustive()
    }
}

#[async_trait]
impl Responder for HttpResponder {
    async fn respond(&self, channel: ChannelId, content: &str) -> Result {
        channel
            .say(&self.0, content)
            .await
            .with_context(|| format!("Error sending message to {channel}"))?;

        Ok(())
    }
}

/// What the exception handler ended up doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionOutcome {
    NothingToSkip,
    Skipped,
    Stopped,
}

#[derive(Debug)]
pub struct PlaybackHandler {
    responder: Arc<dyn Responder>,
}

impl PlaybackHandler {
    pub fn new(responder: Arc<dyn Responder>) -> Self { Self { responder } }

    /// Handle one notification.  Errors are logged here and never escape.
    pub async fn handle(&self, backend: &dyn VoiceBackend, event: PlaybackEvent) {
        match event {
            PlaybackEvent::TrackStarted { guild, track } => {
                info!(%guild, title = track.as_ref().map(|t| &*t.title), "Track started");
            },
            PlaybackEvent::TrackFinished { guild, track } => {
                info!(%guild, title = track.as_ref().map(|t| &*t.title), "Track finished");
            },
            PlaybackEvent::TrackException {
                guild,
                track,
                error,
            } => {
                warn!(
                    %guild,
                    title = track.as_ref().map(|t| &*t.title),
                    %error,
                    "Track exception",
                );

                match self.track_exception(backend, guild, track.as_ref()).await {
                    Ok(outcome) => debug!(%guild, ?outcome, "Track exception handled"),
                    Err(err) => error!(%guild, ?err, "Error handling track exception"),
                }
            },
        }
    }

    /// Drop the failing track, then release the session if nothing is left
    #[instrument(level = "debug", skip(self, backend, track))]
    pub async fn track_exception(
        &self,
        backend: &dyn VoiceBackend,
        guild: GuildId,
        track: Option<&TrackMeta>,
    ) -> Result<ExceptionOutcome> {
        if !backend
            .skip(guild, track.map(|t| t.id))
            .await
            .context("Error skipping errored track")?
        {
            match track.map(|t| t.reply_channel) {
                Some(channel) => self
                    .responder
                    .respond(channel, NOTHING_TO_SKIP)
                    .await
                    .context("Error sending skip reply")?,
                None => debug!(%guild, "Nothing to skip and nowhere to say so"),
            }

            return Ok(ExceptionOutcome::NothingToSkip);
        }

        let node = backend
            .node(guild)
            .await
            .context("Error fetching playback state after skip")?;

        if !node.is_empty() {
            return Ok(ExceptionOutcome::Skipped);
        }

        backend
            .stop(guild)
            .await
            .context("Error stopping playback after skip")?;

        Ok(ExceptionOutcome::Stopped)
    }
}

#[cfg(test)]
mod test {
    use serenity::model::id::{ChannelId, GuildId};

    use super::{
        ExceptionOutcome, PlaybackEvent, PlaybackHandler, Responder, NOTHING_TO_SKIP,
    };
    use crate::{
        prelude::*,
        voice::{
            test::{meta, Call, MockBackend, MockResponder},
            PlaybackNode,
        },
    };

    const GUILD: GuildId = GuildId::new(1);

    fn handler() -> (Arc<MockResponder>, PlaybackHandler) {
        let res = Arc::new(MockResponder::default());
        let handler = PlaybackHandler::new(Arc::clone(&res) as Arc<dyn Responder>);
        (res, handler)
    }

    fn exception() -> PlaybackEvent {
        PlaybackEvent::TrackException {
            guild: GUILD,
            track: Some(meta("broken")),
            error: "decode error".into(),
        }
    }

    fn stops(backend: &MockBackend) -> usize { backend.count(|c| matches!(c, Call::Stop(_))) }

    #[tokio::test]
    async fn test_nothing_to_skip() {
        let (res, handler) = handler();
        let backend = MockBackend::new(false, PlaybackNode::default());

        handler.handle(&backend, exception()).await;

        assert_eq!(res.sent(), [(
            ChannelId::new(9),
            NOTHING_TO_SKIP.to_owned()
        )]);
        assert_eq!(stops(&backend), 0);
        assert_eq!(backend.calls(), [Call::Skip(GUILD, Some(meta("broken").id))]);
    }

    #[tokio::test]
    async fn test_nothing_to_skip_without_channel() {
        let (res, handler) = handler();
        let backend = MockBackend::new(false, PlaybackNode::default());

        let outcome = handler
            .track_exception(&backend, GUILD, None)
            .await
            .unwrap();

        assert_eq!(outcome, ExceptionOutcome::NothingToSkip);
        assert!(res.sent().is_empty());
        assert_eq!(stops(&backend), 0);
        assert_eq!(backend.calls(), [Call::Skip(GUILD, None)]);
    }

    #[tokio::test]
    async fn test_skip_then_empty_stops_once() {
        let (res, handler) = handler();
        let backend = MockBackend::new(true, PlaybackNode::default());

        handler.handle(&backend, exception()).await;

        assert_eq!(backend.calls(), [
            Call::Skip(GUILD, Some(meta("broken").id)),
            Call::Node(GUILD),
            Call::Stop(GUILD)
        ]);
        assert!(res.sent().is_empty());
    }

    #[tokio::test]
    async fn test_skip_with_queue_keeps_playing() {
        let (res, handler) = handler();
        let backend = MockBackend::new(true, PlaybackNode {
            now_playing: None,
            queue: vec![meta("next")],
        });

        let outcome = handler
            .track_exception(&backend, GUILD, Some(&meta("broken")))
            .await
            .unwrap();

        assert_eq!(outcome, ExceptionOutcome::Skipped);
        assert_eq!(stops(&backend), 0);
        assert!(res.sent().is_empty());
    }

    #[tokio::test]
    async fn test_skip_with_now_playing_keeps_playing() {
        let (_, handler) = handler();
        let backend = MockBackend::new(true, PlaybackNode {
            now_playing: Some(meta("next")),
            queue: vec![],
        });

        let outcome = handler
            .track_exception(&backend, GUILD, Some(&meta("broken")))
            .await
            .unwrap();

        assert_eq!(outcome, ExceptionOutcome::Skipped);
        assert_eq!(stops(&backend), 0);
    }

    #[tokio::test]
    async fn test_start_and_finish_are_passive() {
        let (res, handler) = handler();
        let backend = MockBackend::new(true, PlaybackNode::default());

        handler
            .handle(&backend, PlaybackEvent::TrackStarted {
                guild: GUILD,
                track: Some(meta("a")),
            })
            .await;
        handler
            .handle(&backend, PlaybackEvent::TrackFinished {
                guild: GUILD,
                track: None,
            })
            .await;

        assert!(backend.calls().is_empty());
        assert!(res.sent().is_empty());
    }
}
