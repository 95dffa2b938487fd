//! Entry point for testing-bot

#![deny(
    clippy::disallowed_methods,
    clippy::suspicious,
    clippy::style,
    clippy::clone_on_ref_ptr,
    missing_debug_implementations,
    missing_copy_implementations
)]
#![warn(clippy::pedantic, missing_docs)]
#![allow(clippy::module_name_repetitions)]

mod cache;
mod client;
mod entry;
mod secret;
mod util;
mod voice;

mod prelude {
    #![expect(unused_imports, reason = "Some exports may not yet be used")]

    pub use std::{
        borrow::Cow,
        fmt,
        future::Future,
        mem,
        path::{Path, PathBuf},
        str::FromStr,
        sync::{Arc, Weak},
        time::Duration,
    };

    pub use anyhow::{anyhow, bail, ensure, Context as _, Error};
    pub use async_trait::async_trait;
    pub use futures_util::{FutureExt, StreamExt, TryFutureExt};
    pub use hashbrown::{HashMap, HashSet};
    pub use tracing::{
        debug, debug_span, error, error_span, info, info_span, instrument, trace, trace_span, warn,
        warn_span, Instrument,
    };
    pub use tracing_subscriber::prelude::*;
    pub use url::Url;

    pub type Result<T = (), E = Error> = std::result::Result<T, E>;
}

/// Crate version, announced in the bot's presence and ops notifications
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() { entry::main(); }
