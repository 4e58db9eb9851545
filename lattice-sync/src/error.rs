//! Error types.
//!
//! Every variant here signals a broken internal invariant (a bug in the
//! caller or in the engine), never bad user input. Policy failures such as an
//! unknown action name are logged and dropped instead of surfacing here.

use thiserror::Error;

use crate::path::Path;

/// Errors raised by the model, the transaction pipeline and the host builder.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// A structural diff was applied to a model of a different variant.
    #[error("cannot apply a {diff} diff to a {model} model")]
    DiffMismatch {
        model: &'static str,
        diff: &'static str,
    },

    /// A transaction replaced the root with something other than a map.
    #[error("transaction produced a non-map root")]
    RootNotMap,

    /// No ancestor of the hosted path carries a lifetime.
    #[error("no ancestor of {0} carries a lifetime")]
    MissingLifetime(Path),

    /// An initializer was used after it committed its transaction.
    #[error("initializer used after commit")]
    InitializerExpired,

    /// `ReactiveModel::host` was called while another build was running.
    #[error("a host build is already in progress on this model")]
    HostInProgress,
}

pub type Result<T> = std::result::Result<T, Error>;
