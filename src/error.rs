use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("missing environment variable {0}")]
    MissingVar(&'static str),

    #[error("invalid value for {name}: {value:?}")]
    InvalidVar { name: &'static str, value: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("answer service returned {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("sync state unavailable at {path}: {source}")]
    SyncStateUnavailable {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid sync state: {0}")]
    SyncStateFormat(#[from] serde_json::Error),

    #[error("discord error: {0}")]
    Discord(#[from] Box<serenity::Error>),

    #[error("invalid conversation id: {0}")]
    InvalidConversation(String),
}

impl From<serenity::Error> for Error {
    fn from(err: serenity::Error) -> Self {
        Error::Discord(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
