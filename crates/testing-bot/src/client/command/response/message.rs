use serenity::{
    builder::{CreateInteractionResponse, CreateInteractionResponseMessage, EditInteractionResponse},
    utils::MessageBuilder,
};

use super::super::handler;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageBody {
    content: String,
}

impl MessageBody {
    #[inline]
    pub fn rich(f: impl FnOnce(&mut MessageBuilder) -> &mut MessageBuilder) -> Self {
        let mut content = MessageBuilder::new();
        f(&mut content);
        Self {
            content: content.build(),
        }
    }

    /// Plain text, with markdown and mentions escaped
    #[inline]
    pub fn plain(c: impl Into<String>) -> Self { Self::rich(|mb| mb.push_safe(c.into())) }

    #[inline]
    pub fn content(&self) -> &str { &self.content }

    pub fn into_err(self, msg: &'static str) -> handler::DeferError<MessageBody> {
        handler::DeferError::Response(msg, self)
    }

    pub fn build_edit_response(self) -> EditInteractionResponse {
        EditInteractionResponse::new().content(self.content)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MessageOpts {
    ephemeral: bool,
}

impl MessageOpts {
    #[inline]
    pub fn new() -> Self { Self::default() }

    pub fn ephemeral(self, ephemeral: bool) -> Self { Self { ephemeral } }

    pub fn build_defer(self) -> CreateInteractionResponse {
        CreateInteractionResponse::Defer(
            CreateInteractionResponseMessage::new().ephemeral(self.ephemeral),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    body: MessageBody,
    opts: MessageOpts,
}

impl From<MessageBody> for Message {
    fn from(body: MessageBody) -> Self {
        Self {
            body,
            opts: MessageOpts::default(),
        }
    }
}

impl Message {
    #[inline]
    pub fn rich(f: impl FnOnce(&mut MessageBuilder) -> &mut MessageBuilder) -> Self {
        MessageBody::rich(f).into()
    }

    #[inline]
    pub fn plain(c: impl Into<String>) -> Self { MessageBody::plain(c).into() }

    #[inline]
    pub fn body(&self) -> &MessageBody { &self.body }

    #[inline]
    pub fn is_ephemeral(&self) -> bool { self.opts.ephemeral }

    #[inline]
    pub fn ephemeral(self, ephemeral: bool) -> Self {
        Self {
            opts: self.opts.ephemeral(ephemeral),
            ..self
        }
    }

    pub fn into_err(self, msg: &'static str) -> handler::Error {
        handler::Error::Response(msg, self)
    }

    pub fn build_response(self) -> CreateInteractionResponse {
        let Self {
            body: MessageBody { content },
            opts: MessageOpts { ephemeral },
        } = self;

        CreateInteractionResponse::Message(
            CreateInteractionResponseMessage::new()
                .content(content)
                .ephemeral(ephemeral),
        )
    }
}

#[cfg(test)]
mod test {
    use super::{Message, MessageBody};

    #[test]
    fn test_plain_escapes_markdown() {
        let msg = Message::plain("**loud** @everyone");

        assert_ne!(msg.body().content(), "**loud** @everyone");
        assert!(msg.body().content().contains("loud"));
        assert!(!msg.is_ephemeral());
    }

    #[test]
    fn test_rich_keeps_formatting() {
        let body = MessageBody::rich(|mb| mb.push_bold("Now playing: ").push_safe("song"));

        assert_eq!(body.content(), "**Now playing: **song");
    }

    #[test]
    fn test_ephemeral() {
        assert!(Message::plain("hi").ephemeral(true).is_ephemeral());
    }
}
