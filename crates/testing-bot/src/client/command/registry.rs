use serenity::{
    builder::{CreateCommand, CreateInteractionResponse, CreateInteractionResponseMessage},
    client::Context,
    http::Http,
    model::{
        application::{Command, CommandDataOptionValue, CommandInteraction},
        id::CommandId,
    },
    utils::MessageBuilder,
};

use super::{
    handler::{self, CommandContext, DeferError},
    visitor,
};
use crate::{client::App, prelude::*};

pub const NOT_READY: &str = "Still starting!  Please try again later.";
const UNKNOWN: &str = "Unknown command - this may be a bug.";

fn aci_name(aci: &CommandInteraction) -> String {
    use fmt::Write;

    let mut s = format!("/{}", aci.data.name);
    for opt in &aci.data.options {
        match opt.value {
            CommandDataOptionValue::String(ref v) => write!(s, " {}({v:?})", opt.name),
            ref v => write!(s, " {}({:?})", opt.name, v.kind()),
        }
        .ok();
    }

    s
}

type HandlerMap = HashMap<CommandId, Arc<dyn handler::Handler>>;

#[derive(Debug)]
struct RegistryInit {
    opts: handler::Opts,
    list: Vec<Arc<dyn handler::Handler>>,
}

#[derive(Debug)]
enum RegistryState {
    Uninit(RegistryInit),
    Init(HandlerMap),
}

enum Lookup {
    NotReady,
    Unknown,
    Found(Arc<dyn handler::Handler>),
}

impl RegistryState {
    fn lookup(&self, id: CommandId) -> Lookup {
        match self {
            Self::Uninit(_) => Lookup::NotReady,
            Self::Init(m) => m.get(&id).map_or(Lookup::Unknown, |h| Lookup::Found(Arc::clone(h))),
        }
    }
}

/// Slash commands from every loaded extension.  Commands are rejected with
/// [`NOT_READY`] until [`init`](Self::init) has published them to Discord.
#[derive(Debug)]
pub struct Registry(tokio::sync::RwLock<RegistryState>);

fn reply(content: impl Into<String>, ephemeral: bool) -> CreateInteractionResponse {
    CreateInteractionResponse::Message(
        CreateInteractionResponseMessage::new()
            .content(content)
            .ephemeral(ephemeral),
    )
}

impl Registry {
    /// Fails if two handlers share a name
    pub fn new(opts: handler::Opts, list: Vec<Box<dyn handler::Handler>>) -> Result<Self> {
        let mut seen = HashSet::new();
        for cmd in &list {
            ensure!(seen.insert(cmd.name()), "Duplicate command name {:?}", cmd.name());
        }

        let list = list.into_iter().map(Arc::from).collect();
        Ok(Self(RegistryState::Uninit(RegistryInit { opts, list }).into()))
    }

    #[instrument(level = "debug", skip(http, init))]
    async fn publish(http: &Http, init: &RegistryInit) -> Result<HandlerMap> {
        let RegistryInit { opts, list } = init;

        let builders: Vec<_> = list
            .iter()
            .map(|h| h.register(opts, CreateCommand::new(h.name())))
            .collect();

        let cmds = match opts.test_guild() {
            Some(guild) => {
                debug!(%guild, "Registering guild commands");
                guild.set_commands(http, builders).await
            },
            None => {
                debug!("Registering global commands");
                Command::set_global_commands(http, builders).await
            },
        }
        .context("Error registering commands")?;

        let mut by_name: HashMap<_, _> = list.iter().map(|h| (h.name(), Arc::clone(h))).collect();
        let mut handlers = HashMap::new();

        for cmd in cmds {
            let Some(handler) = by_name.remove(cmd.name.as_str()) else {
                warn!(name = %cmd.name, "Discord returned an unexpected command");
                continue;
            };

            debug!(name = %cmd.name, id = %cmd.id, "Registered command");
            handlers.insert(cmd.id, handler);
        }

        if !by_name.is_empty() {
            warn!(missing = ?by_name.keys().collect::<Vec<_>>(), "Some commands were not registered");
        }

        Ok(handlers)
    }

    /// Publish commands to Discord.  Returns false if this already happened,
    /// e.g. on a gateway reconnect.  A failed publish leaves the registry
    /// uninitialized so the next `ready` tries again.
    pub async fn init(&self, http: &Http) -> Result<bool> {
        if matches!(*self.0.read().await, RegistryState::Init(_)) {
            return Ok(false);
        }

        let mut state = self.0.write().await;
        let RegistryState::Uninit(ref init) = *state else {
            return Ok(false);
        };

        let handlers = Self::publish(http, init).await?;
        *state = RegistryState::Init(handlers);
        Ok(true)
    }

    async fn respond(
        ctx: &Context,
        aci: &CommandInteraction,
        res: handler::CommandResult,
    ) -> Result<(), serenity::Error> {
        match res {
            Ok(handler::Response::Message(msg)) => {
                aci.create_response(&ctx.http, msg.build_response()).await
            },
            Ok(handler::Response::DeferMessage(opts, task)) => {
                aci.create_response(&ctx.http, opts.build_defer()).await?;

                let body = match task.await {
                    Ok(Ok(body)) => body,
                    Ok(Err(DeferError::Response(err, body))) => {
                        debug!(err);
                        body
                    },
                    Ok(Err(DeferError::Other(err))) => {
                        error!(?err, "Unexpected error handling deferred command");
                        super::response::MessageBody::rich(|mb| {
                            mb.push("Unexpected error: ").push_mono_safe(err.to_string())
                        })
                    },
                    Err(err) => {
                        error!(?err, "Deferred command task failed");
                        super::response::MessageBody::plain("Unexpected error.")
                    },
                };

                aci.edit_response(&ctx.http, body.build_edit_response())
                    .await
                    .map(|_| ())
            },
            Err(handler::Error::Parse(err)) => {
                warn!(?err, "Unexpected error parsing command");
                aci.create_response(
                    &ctx.http,
                    reply(
                        MessageBuilder::new()
                            .push("Unexpected error parsing command: ")
                            .push_mono_safe(err.to_string())
                            .build(),
                        true,
                    ),
                )
                .await
            },
            Err(handler::Error::Response(err, msg)) => {
                debug!(err);
                aci.create_response(&ctx.http, msg.build_response()).await
            },
            Err(handler::Error::Other(err)) => {
                error!(?err, "Unexpected error handling command");
                aci.create_response(
                    &ctx.http,
                    reply(
                        MessageBuilder::new()
                            .push("Unexpected error: ")
                            .push_mono_safe(err.to_string())
                            .build(),
                        true,
                    ),
                )
                .await
            },
        }
    }

    #[instrument(
        level = "error",
        name = "handle_aci",
        err,
        skip(self, ctx, app, aci),
        fields(name = aci_name(aci), id = %aci.id),
    )]
    async fn try_handle(
        &self,
        ctx: &Context,
        app: &Arc<App>,
        aci: &CommandInteraction,
    ) -> Result<(), serenity::Error> {
        let lookup = self.0.read().await.lookup(aci.data.id);

        let handler = match lookup {
            Lookup::NotReady => {
                warn!("Rejecting command due to uninitialized registry");
                return aci.create_response(&ctx.http, reply(NOT_READY, true)).await;
            },
            Lookup::Unknown => {
                warn!("Rejecting unknown command");
                return aci.create_response(&ctx.http, reply(UNKNOWN, true)).await;
            },
            Lookup::Found(h) => h,
        };

        debug!(?handler, "Handling command");

        let mut vis = visitor::Visitor::new(&aci.data);
        let res = handler
            .respond(CommandContext { ctx, app, aci }, &mut vis)
            .await;

        Self::respond(ctx, aci, res).await
    }

    #[inline]
    pub async fn handle(&self, ctx: &Context, app: &Arc<App>, aci: &CommandInteraction) {
        self.try_handle(ctx, app, aci).await.ok();
    }
}

#[cfg(test)]
mod test {
    use serenity::{builder::CreateCommand, http::Http, model::id::CommandId};

    use super::{
        handler::{self, CommandContext, CommandResult, Handler},
        visitor::Visitor,
        Lookup, Registry, RegistryState,
    };
    use crate::prelude::*;

    #[derive(Debug)]
    struct Named(&'static str);

    #[async_trait]
    impl Handler for Named {
        fn name(&self) -> &'static str { self.0 }

        fn register(&self, _: &handler::Opts, cmd: CreateCommand) -> CreateCommand { cmd }

        async fn respond(&self, _: CommandContext<'_>, _: &mut Visitor<'_>) -> CommandResult {
            unreachable!()
        }
    }

    #[derive(Debug, clap::Parser)]
    struct Wrapper {
        #[command(flatten)]
        opts: handler::Opts,
    }

    fn opts() -> handler::Opts { <Wrapper as clap::Parser>::parse_from(["test"]).opts }

    #[tokio::test]
    async fn test_rejects_before_init() {
        let list: Vec<Box<dyn Handler>> = vec![Box::new(Named("ping"))];
        let reg = Registry::new(opts(), list).unwrap();
        let state = reg.0.read().await;

        assert!(matches!(state.lookup(CommandId::new(1)), Lookup::NotReady));
    }

    #[test]
    fn test_duplicate_names() {
        let list: Vec<Box<dyn Handler>> = vec![Box::new(Named("play")), Box::new(Named("play"))];
        let err = Registry::new(opts(), list).unwrap_err();

        assert!(err.to_string().contains("\"play\""));
    }

    #[test]
    fn test_lookup_after_init() {
        let mut map = HashMap::new();
        map.insert(CommandId::new(5), Arc::new(Named("skip")) as Arc<dyn Handler>);
        let state = RegistryState::Init(map);

        assert!(matches!(
            state.lookup(CommandId::new(5)),
            Lookup::Found(h) if h.name() == "skip"
        ));
        assert!(matches!(state.lookup(CommandId::new(6)), Lookup::Unknown));
    }

    #[tokio::test]
    async fn test_failed_init_is_retried() {
        let list: Vec<Box<dyn Handler>> = vec![Box::new(Named("ping"))];
        let reg = Registry::new(opts(), list).unwrap();
        // No application ID, so registration fails before any request is made
        let http = Http::new("x");

        assert!(reg.init(&http).await.is_err());
        assert!(reg.init(&http).await.is_err());
        assert!(matches!(
            reg.0.read().await.lookup(CommandId::new(1)),
            Lookup::NotReady
        ));
    }

    #[tokio::test]
    async fn test_init_after_ready_is_noop() {
        let mut map = HashMap::new();
        map.insert(CommandId::new(5), Arc::new(Named("skip")) as Arc<dyn Handler>);
        let reg = Registry(RegistryState::Init(map).into());

        assert!(!reg.init(&Http::new("x")).await.unwrap());
    }
}
