pub mod handler;
mod registry;
pub mod visitor;

pub mod response {
    mod message;

    pub use message::*;
}

pub use handler::{CommandContext, Handler as CommandHandler, Opts as CommandOpts};
pub use registry::Registry;
