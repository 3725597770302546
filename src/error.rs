//! The error taxonomy shared by every layer of the server and client.
//!
//! Mirrors the split used throughout this codebase's storage/control-channel layers: a
//! field-less [`ErrorKind`] carries the wire-visible verb (what gets sent to the peer as
//! `ERROR <kind>:\n...`), while [`Error`] additionally carries an optional source for local
//! logs.

use crate::BoxError;
use derive_more::Display;
use thiserror::Error;

/// The error type threaded through framing, path confinement, credentials, the journal and
/// session dispatch.
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct Error {
    kind: ErrorKind,
    message: String,
    #[source]
    source: Option<BoxError>,
}

impl Error {
    /// Creates a new error carrying a human-readable message but no underlying source.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Error {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new error wrapping an underlying source error.
    pub fn with_source<E>(kind: ErrorKind, message: impl Into<String>, source: E) -> Self
    where
        E: Into<BoxError>,
    {
        Error {
            kind,
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// The wire-visible error kind.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Renders this error the way it is sent over the control channel: `ERROR <kind>:\n<message>`.
    pub fn to_wire(&self) -> String {
        format!("ERROR {}:\n{}", self.kind, self.message)
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Error {
        Error {
            kind,
            message: kind.to_string(),
            source: None,
        }
    }
}

/// The taxonomy of failures the protocol can report, named after the verbs sent on the wire
/// (see the wire protocol's `ERROR <kind>:` convention).
#[derive(Copy, Clone, Eq, PartialEq, Debug, Display)]
pub enum ErrorKind {
    /// Unrecognised verb.
    #[display("unknown_command")]
    UnknownCommand,
    /// A required path argument was missing.
    #[display("no_path")]
    NoPath,
    /// A command was malformed in some other way (missing non-path argument, bad integer, ...).
    #[display("invalid_command")]
    InvalidCommand,
    /// A path escaped the confining user root.
    #[display("access_denied")]
    AccessDenied,
    /// A file was expected to exist and didn't.
    #[display("file_not_found")]
    FileNotFound,
    /// A directory was expected to exist and didn't.
    #[display("directory_not_found")]
    DirectoryNotFound,
    /// A path was expected to exist (type-agnostic) and didn't.
    #[display("path_not_found")]
    PathNotFound,
    /// A path was expected to be a file but is a directory.
    #[display("is_directory")]
    IsDirectory,
    /// A path was expected to be a directory but is a file.
    #[display("not_directory")]
    NotDirectory,
    /// A destination already exists where one was required not to.
    #[display("overwrite_error")]
    OverwriteError,
    /// The target of a DELETE is currently held by an in-progress download.
    #[display("file_in_use")]
    FileInUse,
    /// Opening a file on disk failed.
    #[display("file_open_failed")]
    FileOpenFailed,
    /// Writing to a file on disk failed.
    #[display("file_write_failed")]
    FileWriteFailed,
    /// Creating a directory on disk failed.
    #[display("directory_create_failed")]
    DirectoryCreateFailed,
    /// Reading from the socket failed.
    #[display("recv_failed")]
    RecvFailed,
    /// Writing to the socket failed.
    #[display("send_failed")]
    SendFailed,
    /// The peer disconnected in the middle of a frame.
    #[display("connection_closed")]
    ConnectionClosed,
    /// A control message announced a length past the sanity cap.
    #[display("frame_too_large")]
    FrameTooLarge,
    /// Registration was attempted for a username that already exists.
    #[display("user_exists")]
    UserExists,
    /// A password did not verify against the stored hash.
    #[display("authentication_failed")]
    AuthenticationFailed,
    /// An operation was attempted that the session is not permitted to perform (e.g. a second AUTH).
    #[display("permission_denied")]
    PermissionDenied,
    /// The client received a server frame it did not expect.
    #[display("unknown_response")]
    UnknownResponse,
}

/// Convenience alias used across the core modules.
pub type Result<T> = std::result::Result<T, Error>;
