use crate::prelude::*;

pub mod rate_limit;
pub mod redis;

/// Wrapper that hides its contents from `Debug` output
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct DebugShim<T>(pub T);

impl<T> fmt::Debug for DebugShim<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(std::any::type_name::<T>())
            .finish_non_exhaustive()
    }
}

impl<T> From<T> for DebugShim<T> {
    fn from(val: T) -> Self { Self(val) }
}

/// HTTP client handed to the audio source resolver
pub fn http_client(timeout: Option<Duration>) -> Result<reqwest::Client> {
    let timeout = timeout.unwrap_or(Duration::from_secs(10));

    reqwest::Client::builder()
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .gzip(true)
        .brotli(true)
        .deflate(true)
        .connect_timeout(timeout)
        .build()
        .context("Error building HTTP client")
}
