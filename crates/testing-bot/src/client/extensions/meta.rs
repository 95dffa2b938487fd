use serenity::builder::CreateCommand;

use super::Commands;
use crate::{
    client::{
        command::{
            handler::{CommandResult, Response},
            response::Message,
            visitor::Visitor,
            CommandContext, CommandHandler, CommandOpts,
        },
        ShardManagerKey,
    },
    prelude::*,
};

pub fn load(_: &CommandOpts) -> Result<Commands> {
    let cmds: Commands = vec![Box::new(Ping), Box::new(Version)];
    Ok(cmds)
}

#[derive(Debug)]
struct Ping;

#[async_trait]
impl CommandHandler for Ping {
    fn name(&self) -> &'static str { "ping" }

    fn register(&self, _: &CommandOpts, cmd: CreateCommand) -> CreateCommand {
        cmd.description("Check if the bot is alive")
    }

    async fn respond(&self, cx: CommandContext<'_>, _: &mut Visitor<'_>) -> CommandResult {
        let shards = cx.ctx.data.read().await.get::<ShardManagerKey>().cloned();

        let latency = match shards {
            Some(shards) => shards
                .runners
                .lock()
                .await
                .get(&cx.ctx.shard_id)
                .and_then(|r| r.latency),
            None => {
                warn!("Shard manager missing from client data");
                None
            },
        };

        Ok(Response::Message(
            Message::plain(describe_latency(latency)).ephemeral(true),
        ))
    }
}

/// Heartbeat latency is unknown until the shard's first heartbeat is acked
fn describe_latency(latency: Option<Duration>) -> String {
    match latency {
        Some(l) => format!("Pong! (gateway latency {}ms)", l.as_millis()),
        None => "Pong! (gateway latency not measured yet)".into(),
    }
}

#[derive(Debug)]
struct Version;

#[async_trait]
impl CommandHandler for Version {
    fn name(&self) -> &'static str { "version" }

    fn register(&self, _: &CommandOpts, cmd: CreateCommand) -> CreateCommand {
        cmd.description("Show the running bot version")
    }

    async fn respond(&self, cx: CommandContext<'_>, _: &mut Visitor<'_>) -> CommandResult {
        Ok(Response::Message(
            Message::plain(format!(
                "testing-bot v{} ({} extensions: {})",
                crate::VERSION,
                cx.app.manifest.names().len(),
                cx.app.manifest,
            ))
            .ephemeral(true),
        ))
    }
}

#[cfg(test)]
mod test {
    use super::describe_latency;
    use crate::prelude::*;

    #[test]
    fn test_latency() {
        assert_eq!(
            describe_latency(Some(Duration::from_millis(42))),
            "Pong! (gateway latency 42ms)"
        );
        assert_eq!(
            describe_latency(None),
            "Pong! (gateway latency not measured yet)"
        );
    }
}
