use crate::network::LinkError;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("Link operation failed")]
    Link(#[from] LinkError),

    #[error("I/O error")]
    Io(#[from] io::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Failed to parse MAC address: {0}")]
    MacParse(String),

    #[error("Interface '{0}' not found or has no MAC address")]
    InterfaceInvalid(String),

    #[error("State machine reached a critical failure: {0}")]
    Critical(String),
}
