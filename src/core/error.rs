use thiserror::Error;

#[derive(Error, Debug)]
pub enum CrudError {
    #[error(
        "No storage base configured. \
         Set one with `CrudEngine::with_base(InMemoryBase::new())` before persisting or replaying types"
    )]
    NoBaseSet,

    #[error("Type symbol mismatch: '{requested}' versus '{registered}'")]
    SymbolMismatch {
        requested: String,
        registered: String,
    },

    #[error("No such domain: '{0}'")]
    NoSuchDomain(String),

    #[error("Declaration error: {0}")]
    Declaration(String),

    #[error("Table '{0}' not found")]
    TableNotFound(String),

    #[error("Table '{0}' already exists")]
    TableExists(String),

    #[error("Command '{0}' is already defined for a different operation")]
    DuplicateCommand(String),

    #[error("Command '{0}' not found")]
    UnknownCommand(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    IoError(String),
}

pub type Result<T> = std::result::Result<T, CrudError>;

impl From<std::io::Error> for CrudError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for CrudError {
    fn from(err: serde_json::Error) -> Self {
        Self::IoError(err.to_string())
    }
}
