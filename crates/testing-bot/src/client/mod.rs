use serenity::{
    gateway::ActivityData,
    http::Http,
    model::{
        gateway::GatewayIntents,
        id::{ApplicationId, ChannelId},
    },
    Client,
};
use songbird::{Config, Songbird};

use self::{
    command::{CommandOpts, Registry},
    event::{dispatch, GatewayEvent},
    lifecycle::OpsNotifier,
};
use crate::{
    cache::{Cache, CacheOpts},
    prelude::*,
    secret::Credential,
    voice::{
        playback::{HttpResponder, PlaybackHandler},
        SongbirdBackend, VoiceGateway,
    },
    VERSION,
};

mod app;
mod command;
pub mod event;
mod extensions;
mod handler;
pub mod lifecycle;

pub use app::{App, ShardManagerKey};

#[derive(Debug, clap::Args)]
pub struct ClientOpts {
    /// File containing the Discord bot token
    #[arg(long, env, default_value = "secrets/token")]
    token_file: PathBuf,

    /// Text channel to post startup and shutdown notices in
    #[arg(long, env)]
    ops_channel: Option<u64>,

    #[command(flatten)]
    cache: CacheOpts,

    #[command(flatten)]
    commands: CommandOpts,
}

/// A fully-constructed client, ready to connect
pub struct Bot {
    pub client: Client,
    pub app: Arc<App>,
}

impl fmt::Debug for Bot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bot")
            .field("app", &self.app)
            .finish_non_exhaustive()
    }
}

#[instrument(level = "error", name = "build_client", skip(opts))]
pub async fn build(opts: ClientOpts) -> Result<Bot> {
    let ClientOpts {
        token_file,
        ops_channel,
        cache,
        commands,
    } = opts;

    let cred = Credential::load(&token_file).await?;

    let (manifest, cmds) = extensions::load(&commands)?;
    let registry = Registry::new(commands, cmds).context("Error building command registry")?;

    let cache = Cache::open(&cache).await?;

    let http = Arc::new(Http::new(cred.token()));
    let songbird = Songbird::serenity_from_config(Config::default());
    let gateway = VoiceGateway::new(Arc::clone(&songbird), cred.id());
    let voice = SongbirdBackend::new(
        songbird,
        crate::util::http_client(None)?,
        PlaybackHandler::new(Arc::new(HttpResponder(Arc::clone(&http)))),
    );

    let app = Arc::new(App {
        bot_id: cred.id(),
        manifest,
        registry,
        cache,
        voice,
        ops: OpsNotifier::new(
            ops_channel.filter(|&c| c != 0).map(ChannelId::new),
            Arc::new(HttpResponder(http)),
        ),
    });

    dispatch(&app, GatewayEvent::Starting).await?;

    let client = Client::builder(cred.token(), GatewayIntents::non_privileged())
        .event_handler_arc(handler::Handler::new_rc(Arc::clone(&app)))
        .voice_manager_arc(gateway)
        .activity(ActivityData::listening(format!(
            "some absolute bangers | Version {VERSION}"
        )))
        .application_id(ApplicationId::new(cred.id().get()))
        .await
        .context("Error constructing Serenity client")?;

    client
        .data
        .write()
        .await
        .insert::<ShardManagerKey>(Arc::clone(&client.shard_manager));

    Ok(Bot { client, app })
}
