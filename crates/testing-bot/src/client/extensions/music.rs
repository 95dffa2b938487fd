use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    model::{
        application::CommandOptionType,
        id::{ChannelId, GuildId, UserId},
    },
    utils::MessageBuilder,
};

use super::Commands;
use crate::{
    client::command::{
        handler::{CommandResult, DeferError, Error, Response},
        response::{Message, MessageBody, MessageOpts},
        visitor::Visitor,
        CommandContext, CommandHandler, CommandOpts,
    },
    prelude::*,
    util::rate_limit::RateLimitParams,
    voice::{playback::NOTHING_TO_SKIP, Enqueued, PlaybackNode, TrackMeta, TrackRequest},
};

const NOT_CONNECTED: &str = "Please connect to a voice channel first.";

pub fn load(opts: &CommandOpts) -> Result<Commands> {
    let cmds: Commands = vec![
        Box::new(Join),
        Box::new(Leave),
        Box::new(Play {
            limit: opts.play_rate_limit,
        }),
        Box::new(Skip),
        Box::new(Stop),
        Box::new(Queue),
        Box::new(NowPlaying),
    ];

    Ok(cmds)
}

fn guild(cx: CommandContext<'_>) -> Result<GuildId, Error> {
    cx.aci.guild_id.ok_or_else(|| {
        Message::plain("This command only works in a server.")
            .ephemeral(true)
            .into_err("Command used outside a guild")
    })
}

/// Voice channel `user` is in, according to the gateway cache
fn voice_channel(cx: CommandContext<'_>, guild: GuildId, user: UserId) -> Option<ChannelId> {
    let guild = guild.to_guild_cached(&cx.ctx.cache)?;
    guild.voice_states.get(&user).and_then(|s| s.channel_id)
}

fn caller_channel(cx: CommandContext<'_>, guild: GuildId) -> Result<ChannelId, Error> {
    voice_channel(cx, guild, cx.aci.user.id).ok_or_else(|| {
        Message::plain(NOT_CONNECTED)
            .ephemeral(true)
            .into_err("Caller not in voice")
    })
}

fn push_track<'a>(mb: &'a mut MessageBuilder, track: &TrackMeta) -> &'a mut MessageBuilder {
    mb.push_safe(track.title.as_str())
        .push(" (requested by ")
        .user(track.requested_by)
        .push(")")
}

fn describe_enqueued(enqueued: &Enqueued) -> MessageBody {
    let Enqueued { meta, position } = enqueued;

    MessageBody::rich(|mb| {
        if *position == 0 {
            mb.push_bold("Now playing:").push(" ");
            push_track(mb, meta)
        } else {
            mb.push_bold("Queued:").push(" ");
            push_track(mb, meta).push(format!(" at position {position}"))
        }
    })
}

fn describe_queue(node: &PlaybackNode) -> MessageBody {
    if node.is_empty() {
        return MessageBody::plain("The queue is empty.");
    }

    MessageBody::rich(|mb| {
        if let Some(ref track) = node.now_playing {
            mb.push_bold("Now playing:").push(" ");
            push_track(mb, track).push("\n");
        }

        for (i, track) in node.queue.iter().enumerate() {
            mb.push(format!("{}. ", i + 1));
            push_track(mb, track).push("\n");
        }

        mb
    })
}

#[derive(Debug)]
struct Join;

#[async_trait]
impl CommandHandler for Join {
    fn name(&self) -> &'static str { "join" }

    fn register(&self, _: &CommandOpts, cmd: CreateCommand) -> CreateCommand {
        cmd.description("Join your voice channel")
    }

    async fn respond(&self, cx: CommandContext<'_>, _: &mut Visitor<'_>) -> CommandResult {
        let guild = guild(cx)?;
        let channel = caller_channel(cx, guild)?;
        let app = Arc::clone(cx.app);

        Ok(Response::DeferMessage(
            MessageOpts::new(),
            tokio::spawn(async move {
                app.voice.join(guild, channel).await?;

                Ok::<_, DeferError<_>>(MessageBody::rich(|mb| mb.push("Joined ").channel(channel)))
            }),
        ))
    }
}

#[derive(Debug)]
struct Leave;

#[async_trait]
impl CommandHandler for Leave {
    fn name(&self) -> &'static str { "leave" }

    fn register(&self, _: &CommandOpts, cmd: CreateCommand) -> CreateCommand {
        cmd.description("Leave the voice channel")
    }

    async fn respond(&self, cx: CommandContext<'_>, _: &mut Visitor<'_>) -> CommandResult {
        let guild = guild(cx)?;

        let msg = if cx.app.voice.leave(guild).await? {
            Message::plain("Left voice.")
        } else {
            Message::plain("I'm not in a voice channel.").ephemeral(true)
        };

        Ok(Response::Message(msg))
    }
}

#[derive(Debug)]
struct Play {
    limit: RateLimitParams,
}

#[async_trait]
impl CommandHandler for Play {
    fn name(&self) -> &'static str { "play" }

    fn register(&self, _: &CommandOpts, cmd: CreateCommand) -> CreateCommand {
        cmd.description("Play a song from a URL or a search")
            .add_option(
                CreateCommandOption::new(
                    CommandOptionType::String,
                    "query",
                    "A link, or something to search for",
                )
                .required(true),
            )
    }

    async fn respond(&self, cx: CommandContext<'_>, visitor: &mut Visitor<'_>) -> CommandResult {
        let guild = guild(cx)?;
        let query = visitor.visit_string("query")?.required()?.to_owned();
        let user = cx.aci.user.id;

        if !cx
            .app
            .cache
            .rate_limit(self.limit, &format!("play:{user}"))
            .await?
        {
            return Err(Message::plain("Slow down!  Try again in a minute.")
                .ephemeral(true)
                .into_err("Play rate limit hit"));
        }

        let join = match voice_channel(cx, guild, cx.app.bot_id) {
            Some(_) => None,
            None => Some(caller_channel(cx, guild)?),
        };

        let app = Arc::clone(cx.app);
        let req = TrackRequest {
            query,
            requested_by: user,
            reply_channel: cx.aci.channel_id,
        };

        Ok(Response::DeferMessage(
            MessageOpts::new(),
            tokio::spawn(async move {
                if let Some(channel) = join {
                    app.voice.join(guild, channel).await?;
                }

                let enqueued = app.voice.enqueue(guild, req).await.map_err(|e| {
                    warn!(?e, "Error enqueueing track");
                    DeferError::Response(
                        "Enqueue failed",
                        MessageBody::plain("Couldn't load that track."),
                    )
                })?;

                Ok::<_, DeferError<_>>(describe_enqueued(&enqueued))
            }),
        ))
    }
}

#[derive(Debug)]
struct Skip;

#[async_trait]
impl CommandHandler for Skip {
    fn name(&self) -> &'static str { "skip" }

    fn register(&self, _: &CommandOpts, cmd: CreateCommand) -> CreateCommand {
        cmd.description("Skip the current song")
    }

    async fn respond(&self, cx: CommandContext<'_>, _: &mut Visitor<'_>) -> CommandResult {
        let guild = guild(cx)?;

        let msg = if cx.app.voice.skip(guild, None).await? {
            Message::plain("Skipped.")
        } else {
            Message::plain(NOTHING_TO_SKIP).ephemeral(true)
        };

        Ok(Response::Message(msg))
    }
}

#[derive(Debug)]
struct Stop;

#[async_trait]
impl CommandHandler for Stop {
    fn name(&self) -> &'static str { "stop" }

    fn register(&self, _: &CommandOpts, cmd: CreateCommand) -> CreateCommand {
        cmd.description("Stop playback and clear the queue")
    }

    async fn respond(&self, cx: CommandContext<'_>, _: &mut Visitor<'_>) -> CommandResult {
        let guild = guild(cx)?;
        cx.app.voice.stop(guild).await?;

        Ok(Response::Message(Message::plain("Stopped.")))
    }
}

#[derive(Debug)]
struct Queue;

#[async_trait]
impl CommandHandler for Queue {
    fn name(&self) -> &'static str { "queue" }

    fn register(&self, _: &CommandOpts, cmd: CreateCommand) -> CreateCommand {
        cmd.description("Show the song queue")
    }

    async fn respond(&self, cx: CommandContext<'_>, _: &mut Visitor<'_>) -> CommandResult {
        let node = cx.app.voice.node(guild(cx)?).await?;

        Ok(Response::Message(describe_queue(&node).into()))
    }
}

#[derive(Debug)]
struct NowPlaying;

#[async_trait]
impl CommandHandler for NowPlaying {
    fn name(&self) -> &'static str { "nowplaying" }

    fn register(&self, _: &CommandOpts, cmd: CreateCommand) -> CreateCommand {
        cmd.description("Show the current song")
    }

    async fn respond(&self, cx: CommandContext<'_>, _: &mut Visitor<'_>) -> CommandResult {
        let node = cx.app.voice.node(guild(cx)?).await?;

        let msg = match node.now_playing {
            Some(ref track) => Message::rich(|mb| {
                mb.push_bold("Now playing:").push(" ");
                push_track(mb, track)
            }),
            None => Message::plain("Nothing is playing.").ephemeral(true),
        };

        Ok(Response::Message(msg))
    }
}

#[cfg(test)]
mod test {
    use super::{describe_enqueued, describe_queue};
    use crate::voice::{test::meta, Enqueued, PlaybackNode};

    #[test]
    fn test_empty_queue() {
        assert_eq!(
            describe_queue(&PlaybackNode::default()).content(),
            "The queue is empty."
        );
    }

    #[test]
    fn test_queue_listing() {
        let body = describe_queue(&PlaybackNode {
            now_playing: Some(meta("first")),
            queue: vec![meta("second"), meta("third")],
        });
        let lines: Vec<_> = body.content().lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("**Now playing:** first"));
        assert!(lines[1].starts_with("1. second"));
        assert!(lines[2].starts_with("2. third"));
        assert!(lines.iter().all(|l| l.ends_with("(requested by <@7>)")));
    }

    #[test]
    fn test_queue_without_current() {
        let body = describe_queue(&PlaybackNode {
            now_playing: None,
            queue: vec![meta("next")],
        });

        assert!(body.content().starts_with("1. next"));
    }

    #[test]
    fn test_enqueued_position() {
        let now = describe_enqueued(&Enqueued {
            meta: meta("song"),
            position: 0,
        });
        let later = describe_enqueued(&Enqueued {
            meta: meta("song"),
            position: 2,
        });

        assert!(now.content().starts_with("**Now playing:** song"));
        assert!(later.content().starts_with("**Queued:** song"));
        assert!(later.content().ends_with("at position 2"));
    }
}
