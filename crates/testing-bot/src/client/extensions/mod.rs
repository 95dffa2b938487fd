//! Command modules loaded at startup

use super::command::{CommandHandler, CommandOpts};
use crate::prelude::*;

mod meta;
mod music;

pub type Commands = Vec<Box<dyn CommandHandler>>;
type Ctor = fn(&CommandOpts) -> Result<Commands>;

/// Every extension, in load order
const EXTENSIONS: &[(&str, Ctor)] = &[("meta", meta::load), ("music", music::load)];

/// Names of the extensions that were loaded, in load order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionManifest(Vec<&'static str>);

impl ExtensionManifest {
    #[inline]
    pub fn names(&self) -> &[&'static str] { &self.0 }
}

impl fmt::Display for ExtensionManifest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0.join(", ")) }
}

fn load_from(list: &[(&'static str, Ctor)], opts: &CommandOpts) -> Result<(ExtensionManifest, Commands)> {
    let mut names = Vec::with_capacity(list.len());
    let mut cmds = vec![];

    for &(name, ctor) in list {
        ensure!(!names.contains(&name), "Duplicate extension name {name:?}");

        let loaded = ctor(opts).with_context(|| format!("Error loading extension {name:?}"))?;
        debug!(name, commands = loaded.len(), "Loaded extension");

        names.push(name);
        cmds.extend(loaded);
    }

    Ok((ExtensionManifest(names), cmds))
}

#[instrument(level = "error", name = "load_extensions", skip(opts))]
pub fn load(opts: &CommandOpts) -> Result<(ExtensionManifest, Commands)> {
    let (manifest, cmds) = load_from(EXTENSIONS, opts)?;
    info!(extensions = %manifest, "Extensions loaded");
    Ok((manifest, cmds))
}

#[cfg(test)]
mod test {
    use super::{load_from, Commands, Ctor, EXTENSIONS};
    use crate::{
        client::command::{CommandOpts, Registry},
        prelude::*,
    };

    #[derive(Debug, clap::Parser)]
    struct Wrapper {
        #[command(flatten)]
        opts: CommandOpts,
    }

    fn opts() -> CommandOpts { <Wrapper as clap::Parser>::parse_from(["test"]).opts }

    fn empty(_: &CommandOpts) -> Result<Commands> { Ok(vec![]) }

    fn broken(_: &CommandOpts) -> Result<Commands> { bail!("nope") }

    #[test]
    fn test_builtin_load_order() {
        let (manifest, cmds) = load_from(EXTENSIONS, &opts()).unwrap();

        assert_eq!(manifest.names(), ["meta", "music"]);
        assert_eq!(manifest.to_string(), "meta, music");
        assert!(cmds.iter().any(|c| c.name() == "play"));
    }

    #[test]
    fn test_builtin_commands_unique() {
        let (_, cmds) = load_from(EXTENSIONS, &opts()).unwrap();

        Registry::new(opts(), cmds).unwrap();
    }

    #[test]
    fn test_duplicate_extension() {
        let list: &[(&str, Ctor)] = &[("a", empty), ("b", empty), ("a", empty)];
        let err = load_from(list, &opts()).unwrap_err();

        assert!(err.to_string().contains("\"a\""));
    }

    #[test]
    fn test_failing_extension() {
        let list: &[(&str, Ctor)] = &[("a", empty), ("b", broken)];
        let err = load_from(list, &opts()).unwrap_err();

        assert!(format!("{err:?}").contains("nope"));
        assert!(err.to_string().contains("\"b\""));
    }
}
