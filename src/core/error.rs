//! Error types for the raykit runtime

use thiserror::Error;

use crate::fb::Channel;
use crate::object::ObjectKind;

/// Main error type for the runtime
#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown {kind} type '{name}'")]
    UnknownType { kind: ObjectKind, name: String },

    #[error("handle refers to a {found}, expected a {expected}")]
    TypeMismatch { expected: ObjectKind, found: ObjectKind },

    #[error("invalid or released handle")]
    InvalidHandle,

    #[error("invalid volume region: {0}")]
    InvalidRegion(String),

    #[error("invalid volume dimensions: {0}")]
    InvalidDimensions(String),

    #[error("intersection engine fatal error: {0}")]
    EngineFatal(String),

    #[error("usage error: {0}")]
    Usage(String),

    #[error("not implemented: {0}")]
    NotImplemented(&'static str),

    #[error("frame buffer has no {0:?} channel")]
    ChannelNotPresent(Channel),

    #[error("config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}
