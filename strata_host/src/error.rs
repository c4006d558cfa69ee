// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Caller-visible failures.

/// Errors returned by [`TreeHost`](crate::TreeHost) and the proxies.
///
/// Invariant violations (a malformed layer tree, a stale handle) are not
/// errors: they panic.
#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The host was used before [`start`](crate::TreeHost::start).
    #[error("the compositor has not been started")]
    NotStarted,
    /// The host was used after [`stop`](crate::TreeHost::stop).
    #[error("the compositor has been stopped")]
    Stopped,
    /// The graphics context was lost and could not be recreated.
    #[error("the graphics context was lost")]
    ContextLost,
    /// A frame was requested with an empty viewport.
    #[error("the viewport is empty")]
    EmptyViewport,
    /// A frame was requested without a root layer.
    #[error("no root layer is set")]
    NoRootLayer,
    /// The compositor thread went away mid-handshake.
    #[error("the compositor thread disconnected")]
    Disconnected,
    /// The renderer failed to initialize.
    #[error("the renderer failed to initialize")]
    InitializationFailed,
}

/// Result type for host operations.
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::Error;

    #[test]
    fn messages_are_lowercase_sentences() {
        for error in [
            Error::NotStarted,
            Error::Stopped,
            Error::ContextLost,
            Error::EmptyViewport,
            Error::NoRootLayer,
            Error::Disconnected,
            Error::InitializationFailed,
        ] {
            let message = error.to_string();
            assert!(
                message.starts_with(char::is_lowercase),
                "{message:?} should start lowercase"
            );
            assert!(!message.ends_with('.'), "{message:?} should not end with a period");
        }
    }
}
