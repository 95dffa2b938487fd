#![allow(clippy::module_name_repetitions)]

use serenity::model::application::{
    CommandData, CommandDataOption, CommandDataOptionValue, CommandOptionType, CommandType,
};

use crate::prelude::*;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Attempted to read options for a non-slash command")]
    NotChatInput,
    #[error("No value for required command option {0:?}")]
    MissingOptionValue(String),
    #[error("Type mismatch in value of command option {0:?} - expected {1}, found {2:?}")]
    BadOptionType(String, &'static str, CommandOptionType),
}

type Result<T> = std::result::Result<T, Error>;
type OptionMap<'a> = HashMap<&'a str, &'a CommandDataOption>;

/// Reads each top-level option of a slash command at most once
pub struct Visitor<'a> {
    cmd: &'a CommandData,
    opts: Option<OptionMap<'a>>,
}

impl fmt::Debug for Visitor<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Visitor")
            .field("cmd", &self.cmd.name)
            .finish_non_exhaustive()
    }
}

macro_rules! visit_basic {
    () => {};

    (
        #[doc = $desc:literal]
        $vis:vis fn $name:ident() -> $ty:ty { $var:ident($val:pat) => $expr:expr }
        $($tt:tt)*
    ) => {
        $vis fn $name(&mut self, name: &'a str) -> Result<OptionVisitor<'a, $ty>> {
            let val = self
                .visit_opt(name)?
                .map(|opt| match &opt.value {
                    CommandDataOptionValue::$var($val) => Ok($expr),
                    v => Err(Error::BadOptionType(name.to_owned(), $desc, v.kind())),
                })
                .transpose()?;

            Ok(OptionVisitor(name, val))
        }

        visit_basic! { $($tt)* }
    };
}

impl<'a> Visitor<'a> {
    visit_basic! {
        ///a string
        pub fn visit_string() -> &'a str { String(s) => s.as_str() }
    }

    pub fn new(cmd: &'a CommandData) -> Self { Self { cmd, opts: None } }

    fn visit_opts(&mut self) -> Result<&mut OptionMap<'a>> {
        if self.opts.is_none() {
            if !matches!(self.cmd.kind, CommandType::ChatInput) {
                return Err(Error::NotChatInput);
            }

            let cmd = self.cmd;
            self.opts = Some(cmd.options.iter().map(|o| (&*o.name, o)).collect());
        }

        Ok(self.opts.get_or_insert_with(HashMap::new))
    }

    /// Discord omits optional options the user left blank, so absence is
    /// only an error once the caller asks for [`OptionVisitor::required`]
    #[inline]
    fn visit_opt(&mut self, name: &'a str) -> Result<Option<&'a CommandDataOption>> {
        Ok(self.visit_opts()?.remove(name))
    }
}

#[derive(Debug)]
pub struct OptionVisitor<'a, T>(&'a str, Option<T>);

impl<T> OptionVisitor<'_, T> {
    pub fn required(self) -> Result<T> {
        self.1
            .ok_or_else(|| Error::MissingOptionValue(self.0.to_owned()))
    }
}
