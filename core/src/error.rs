use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Registry used before the tree root was observed")]
    RootNotObserved,

    #[error("Unknown entity kind '{kind}'")]
    UnknownKind { kind: String },

    #[error("No entity at path '{path}'")]
    PathNotFound { path: String },

    #[error("Entity {id} is not alive")]
    DeadEntity { id: String },

    #[error("'{parent}' already has a child named '{name}'")]
    DuplicateChild { parent: String, name: String },

    #[error("Entity at '{path}' is already attached to the tree")]
    AlreadyAttached { path: String },

    #[error("The tree root cannot be removed or detached")]
    RootImmutable,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type RegistryResult<T> = Result<T, RegistryError>;

/// Returned by a host when it declines a connection.
/// Recovered locally: the pairing is retried on the next pass.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("connection rejected: {reason}")]
pub struct ConnectRejected {
    pub reason: String,
}

impl ConnectRejected {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}
