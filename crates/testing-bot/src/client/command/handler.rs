use serenity::{
    builder::CreateCommand,
    client::Context,
    model::{application::CommandInteraction, id::GuildId},
};

use super::{
    response::{Message, MessageBody, MessageOpts},
    visitor,
};
use crate::{client::App, prelude::*, util::rate_limit::RateLimitParams};

#[derive(Debug, Clone, clap::Args)]
#[group(skip)]
pub struct Opts {
    /// Register commands to this guild only, instead of globally
    #[arg(long, env)]
    test_guild: Option<u64>,

    /// Per-user limit on /play requests
    #[arg(long, env, default_value = "5/3x1min")]
    pub play_rate_limit: RateLimitParams,
}

impl Opts {
    pub fn test_guild(&self) -> Option<GuildId> {
        self.test_guild.filter(|&id| id != 0).map(GuildId::new)
    }
}

#[derive(Debug)]
pub enum Response {
    Message(Message),
    /// Acknowledge now and edit in the task's output once it finishes
    DeferMessage(
        MessageOpts,
        tokio::task::JoinHandle<DeferResult<MessageBody>>,
    ),
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Error parsing command: {0}")]
    Parse(#[from] visitor::Error),
    #[error("Bot responded with error: {0}")]
    Response(&'static str, Message),
    #[error("Unexpected error: {0}")]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum DeferError<T> {
    #[error("Bot responded with error: {0}")]
    Response(&'static str, T),
    #[error("Unexpected error: {0}")]
    Other(#[from] anyhow::Error),
}

pub type CommandResult = Result<Response, Error>;
pub type DeferResult<T> = Result<T, DeferError<T>>;

/// Everything a command needs to answer one interaction
#[derive(Clone, Copy)]
pub struct CommandContext<'a> {
    pub ctx: &'a Context,
    pub app: &'a Arc<App>,
    pub aci: &'a CommandInteraction,
}

impl fmt::Debug for CommandContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandContext")
            .field("command", &self.aci.data.name)
            .field("user", &self.aci.user.id)
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait Handler: fmt::Debug + Send + Sync {
    /// Command name, unique across every loaded extension
    fn name(&self) -> &'static str;

    fn register(&self, opts: &Opts, cmd: CreateCommand) -> CreateCommand;

    async fn respond(
        &self,
        cx: CommandContext<'_>,
        visitor: &mut visitor::Visitor<'_>,
    ) -> CommandResult;
}
