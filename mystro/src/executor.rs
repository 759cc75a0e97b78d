//! The [`Executor`] trait.
use std::future::Ready;

use crate::{Result, transport::MySqlTransport};

/// A type that can returns a [`MySqlTransport`].
pub trait Executor: Unpin {
    /// The returned transport.
    type Transport: MySqlTransport;

    /// Future that resolve to [`Executor::Transport`].
    type Future: Future<Output = Result<Self::Transport>> + Unpin;

    /// Acquire the transport.
    fn connection(self) -> Self::Future;
}

impl<T: MySqlTransport> Executor for &mut T {
    type Transport = Self;

    type Future = Ready<Result<Self>>;

    fn connection(self) -> Self::Future {
        std::future::ready(Ok(self))
    }
}
