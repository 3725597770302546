//! Parses a single incoming control message into a [`Command`].

use crate::error::{Error, ErrorKind, Result};

/// One parsed client command, as dispatched from `AwaitingMessage`.
#[derive(Debug, Eq, PartialEq)]
pub enum Command {
    /// `AUTH <user?>` — empty username means public mode.
    Auth { username: String },
    /// `LIST <path?>` — defaults to the working directory.
    List { path: Option<String> },
    /// `CD <path>`.
    Cd { path: String },
    /// `MKDIR <path>`.
    Mkdir { path: String },
    /// `RMDIR <path>`.
    Rmdir { path: String },
    /// `DELETE <path>`.
    Delete { path: String },
    /// `MOVE <src> <dst>`.
    Move { src: String, dst: String },
    /// `COPY <src> <dst>`.
    Copy { src: String, dst: String },
    /// `UPLOAD <size> <local> <remote?>`.
    Upload { size: u64, local: String, remote: Option<String> },
    /// `DOWNLOAD <path>`.
    Download { path: String },
    /// `RESUME <path> <offset>`.
    Resume { path: String, offset: u64 },
    /// `EXIT`.
    Exit,
}

/// Parses one line of client input into a [`Command`].
pub fn parse(line: &str) -> Result<Command> {
    let mut words = line.split_whitespace();
    let verb = words.next().ok_or_else(|| Error::from(ErrorKind::UnknownCommand))?;
    match verb {
        "AUTH" => Ok(Command::Auth {
            username: words.next().unwrap_or_default().to_string(),
        }),
        "LIST" => Ok(Command::List { path: words.next().map(str::to_string) }),
        "CD" => Ok(Command::Cd { path: require_arg(&mut words)? }),
        "MKDIR" => Ok(Command::Mkdir { path: require_arg(&mut words)? }),
        "RMDIR" => Ok(Command::Rmdir { path: require_arg(&mut words)? }),
        "DELETE" => Ok(Command::Delete { path: require_arg(&mut words)? }),
        "MOVE" => {
            let src = require_arg(&mut words)?;
            let dst = require_arg(&mut words)?;
            Ok(Command::Move { src, dst })
        }
        "COPY" => {
            let src = require_arg(&mut words)?;
            let dst = require_arg(&mut words)?;
            Ok(Command::Copy { src, dst })
        }
        "UPLOAD" => {
            let size_text = require_arg(&mut words)?;
            let size: u64 = size_text.parse().map_err(|_| Error::new(ErrorKind::InvalidCommand, "UPLOAD size must be a non-negative integer"))?;
            let local = require_arg(&mut words)?;
            let remote = words.next().map(str::to_string);
            Ok(Command::Upload { size, local, remote })
        }
        "DOWNLOAD" => Ok(Command::Download { path: require_arg(&mut words)? }),
        "RESUME" => {
            let path = require_arg(&mut words)?;
            let offset_text = require_arg(&mut words)?;
            let offset: u64 = offset_text.parse().map_err(|_| Error::new(ErrorKind::InvalidCommand, "RESUME offset must be a non-negative integer"))?;
            Ok(Command::Resume { path, offset })
        }
        "EXIT" => Ok(Command::Exit),
        other => Err(Error::new(ErrorKind::UnknownCommand, format!("unrecognised command {other:?}"))),
    }
}

fn require_arg<'a, I: Iterator<Item = &'a str>>(words: &mut I) -> Result<String> {
    words
        .next()
        .map(str::to_string)
        .ok_or_else(|| Error::from(ErrorKind::NoPath))
}
