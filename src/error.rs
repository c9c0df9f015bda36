use std::path::PathBuf;
use thiserror::Error;

/// Failures of the backing SQLite medium.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to create database directory '{path}': {source}")]
    Directory {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to open chat database '{path}': {source}")]
    Open {
        path: PathBuf,
        source: rusqlite::Error,
    },

    #[error("Chat database operation failed: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("Table 'chats' is malformed: missing column '{column}'")]
    MalformedSchema { column: &'static str },

    #[error("Refusing to store a chat with an empty user input")]
    EmptyInput,
}

/// Failures while reading an import source.
#[derive(Error, Debug)]
pub enum FormatError {
    #[error("Failed to read history file '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("History file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unrecognized history shape: expected a list of conversations or an object with a 'conversations' list, found {found}")]
    UnrecognizedShape { found: &'static str },
}

/// Failures of the completion collaborator.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("No API key configured (set OPENAI_API_KEY or completion.api_key)")]
    MissingCredential,

    #[error("Prompt cannot be empty")]
    EmptyPrompt,

    #[error("Completion request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Completion service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Completion service returned no content")]
    EmptyResponse,
}

#[derive(Error, Debug)]
pub enum RecallError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Api(#[from] ApiError),
}
