use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The definitions list could not be opened.
    #[error("failed to open definitions file {path:?}: {source}")]
    Config {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("xml error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// Structurally valid XML that does not describe a usable category.
    #[error("invalid definition: {0}")]
    Definition(String),

    #[error("Not enough bytes")]
    NotEnoughData { actual: usize, minimum: usize },

    #[error("invalid length {length} for {what}")]
    InvalidLength { what: &'static str, length: usize },

    #[error("unknown format {0}")]
    UnknownFormat(String),

    /// Data that cannot be sliced according to its definition.
    #[error("malformed data: {0}")]
    Malformed(String),
}

pub type Result<T> = std::result::Result<T, Error>;
