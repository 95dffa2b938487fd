//! Process-level startup and shutdown steps

use std::sync::atomic::{AtomicBool, Ordering};

use serenity::{client::Context, model::{gateway::Ready, id::ChannelId}};

use super::App;
use crate::{prelude::*, voice::playback::Responder, VERSION};

const NOTIFY_TIMEOUT: Duration = Duration::from_secs(5);

/// Status messages for the operations channel.  Every method is a no-op if
/// no channel was configured.
#[derive(Debug)]
pub struct OpsNotifier {
    channel: Option<ChannelId>,
    responder: Arc<dyn Responder>,
    stopping: AtomicBool,
    timeout: Duration,
}

impl OpsNotifier {
    pub fn new(channel: Option<ChannelId>, responder: Arc<dyn Responder>) -> Self {
        Self {
            channel,
            responder,
            stopping: AtomicBool::new(false),
            timeout: NOTIFY_TIMEOUT,
        }
    }

    async fn notify(&self, content: &str) -> Result {
        let Some(channel) = self.channel else {
            return Ok(());
        };

        self.responder.respond(channel, content).await
    }

    pub async fn online(&self) -> Result {
        self.notify(&format!("Testing v{VERSION} now online!"))
            .await
            .context("Error sending online notification")
    }

    /// Announce shutdown without ever holding it up.  Only the first call
    /// sends anything.
    pub async fn shutting_down(&self) {
        if self.stopping.swap(true, Ordering::AcqRel) {
            return;
        }

        let msg = format!("Testing v{VERSION} is shutting down.");
        match tokio::time::timeout(self.timeout, self.notify(&msg)).await {
            Ok(Ok(())) => (),
            Ok(Err(err)) => warn!(?err, "Error sending shutdown notification"),
            Err(_) => warn!("Shutdown notification timed out"),
        }
    }
}

pub fn starting(app: &App) {
    info!(
        bot = %app.bot_id,
        extensions = %app.manifest,
        "Starting testing-bot v{VERSION}",
    );
}

#[instrument(level = "error", skip_all)]
pub async fn started(app: &App, ctx: &Context, ready: &Ready) -> Result {
    info!(
        user = %ready.user.name,
        guilds = ready.guilds.len(),
        "Gateway session ready",
    );

    if !app
        .registry
        .init(&ctx.http)
        .await
        .context("Error initializing command registry")?
    {
        debug!("Commands already registered, skipping");
        return Ok(());
    }

    info!("Commands registered");
    app.ops.online().await
}

pub async fn stopping(app: &App) {
    info!("Stopping");
    app.ops.shutting_down().await;
}

#[cfg(test)]
mod test {
    use serenity::model::id::ChannelId;

    use super::OpsNotifier;
    use crate::{
        prelude::*,
        voice::{playback::Responder, test::MockResponder},
        VERSION,
    };

    const OPS: ChannelId = ChannelId::new(42);

    fn notifier(channel: Option<ChannelId>) -> (Arc<MockResponder>, OpsNotifier) {
        let res = Arc::new(MockResponder::default());
        let ops = OpsNotifier::new(channel, Arc::clone(&res) as Arc<dyn Responder>);
        (res, ops)
    }

    #[tokio::test]
    async fn test_disabled_without_channel() {
        let (res, ops) = notifier(None);

        ops.online().await.unwrap();
        ops.shutting_down().await;

        assert!(res.sent().is_empty());
    }

    #[tokio::test]
    async fn test_online_message() {
        let (res, ops) = notifier(Some(OPS));

        ops.online().await.unwrap();

        assert_eq!(res.sent(), [(OPS, format!("Testing v{VERSION} now online!"))]);
    }

    #[tokio::test]
    async fn test_shutdown_at_most_once() {
        let (res, ops) = notifier(Some(OPS));

        ops.shutting_down().await;
        ops.shutting_down().await;

        assert_eq!(res.sent(), [(
            OPS,
            format!("Testing v{VERSION} is shutting down.")
        )]);
    }

    #[derive(Debug)]
    struct Hang;

    #[async_trait]
    impl Responder for Hang {
        async fn respond(&self, _: ChannelId, _: &str) -> Result {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_bounded() {
        let ops = OpsNotifier::new(Some(OPS), Arc::new(Hang));

        tokio::time::timeout(Duration::from_secs(60), ops.shutting_down())
            .await
            .unwrap();
    }
}
