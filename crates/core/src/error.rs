//! Core error types for the MUSH runtime

use crate::Dbref;

#[derive(thiserror::Error, Debug)]
pub enum MushError {
    #[error("Softcode error: {0}")]
    Softcode(String),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No such object: {0}")]
    NoSuchObject(Dbref),

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

pub type Result<T> = std::result::Result<T, MushError>;
