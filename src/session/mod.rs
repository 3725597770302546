//! The per-connection session state machine.
//!
//! A [`Session`] owns everything specific to one connection: its working directory, its
//! authentication progress, and (while a transfer is in flight) the open file handle and
//! transfer bookkeeping. It dispatches one event at a time — either an incoming control
//! message, or one bounded chunk of an upload/download — and returns a [`StepOutcome`]
//! describing what the reactor should do next (send a reply, keep going, or tear the
//! connection down). The reactor (`crate::reactor`) owns the actual socket and drives this
//! loop with `tokio::select!`; this module never touches the network directly.

pub mod commands;

use crate::credentials::Credentials;
use crate::error::{Error, ErrorKind, Result};
use crate::filelocks::{FileLockGuard, FileLocks};
use crate::framing::TMP_BUFF_SIZE;
use crate::journal::{TransferJournal, TransferRecord};
use crate::pathguard::{self, ExistenceMode, TypeMode};
use commands::Command;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::fs::File;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, info, warn};

/// State shared by every session on the server: the root directory, the credential table, the
/// process-wide file lock set, and the journal coordinator. Cloned cheaply (everything inside
/// is already `Arc`-backed or immutable) into each accepted connection's task.
#[derive(Clone)]
pub struct Shared {
    /// The server's root directory, containing `users.json`, `public/`, and per-user homes.
    pub root: PathBuf,
    /// The password table.
    pub credentials: Arc<Credentials>,
    /// The process-wide download lock set.
    pub locks: FileLocks,
    /// The per-user-directory journal coordinator.
    pub journal: TransferJournal,
}

/// The session's current position in the protocol state machine (§4.6).
pub enum SessionState {
    /// Waiting for a framed command.
    AwaitingMessage,
    /// Asked whether to register a new username; waiting for `y`/anything else.
    AwaitingRegistrationChoice { username: String },
    /// Registration confirmed; waiting for the chosen password.
    AwaitingRegistrationPassword { username: String },
    /// An existing username was given; waiting for its password.
    AwaitingPassword { username: String },
    /// A resumable upload was offered; waiting for `y`/anything else.
    AwaitingResumeChoice { record: TransferRecord },
    /// Receiving an upload body, one bounded chunk per wakeup.
    AwaitingFile {
        file: File,
        local_path: String,
        remote_path: PathBuf,
        total_bytes: u64,
        bytes_completed: u64,
    },
    /// Sending a download body, one bounded chunk per wakeup.
    DownloadingFile {
        file: File,
        remote_path: PathBuf,
        total_bytes: u64,
        bytes_sent: u64,
        _lock: FileLockGuard,
    },
}

/// What the reactor should do after one step of the session.
pub enum StepOutcome {
    /// Send this framed reply back to the peer and keep the connection open.
    Reply(String),
    /// A reply has already been queued by the handler itself (e.g. `FILEINFO` followed
    /// immediately by streamed bytes); nothing further to send this step.
    Continue,
    /// Tear the connection down (an explicit `EXIT`, or after a registration reply).
    Close(Option<String>),
}

/// One connection's worth of protocol state.
pub struct Session {
    shared: Shared,
    peer: SocketAddr,
    state: SessionState,
    /// `None` until a successful `AUTH` (or public mode) establishes a root.
    client_directory: Option<PathBuf>,
    working_directory: Option<PathBuf>,
    auth_initiated: bool,
}

impl Session {
    /// Creates a fresh session for a newly accepted connection.
    pub fn new(shared: Shared, peer: SocketAddr) -> Self {
        Session {
            shared,
            peer,
            state: SessionState::AwaitingMessage,
            client_directory: None,
            working_directory: None,
            auth_initiated: false,
        }
    }

    /// The session's current state tag, for the reactor to decide what kind of event to wait
    /// for next (a framed message, or one transfer chunk).
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Handles one incoming framed message according to the current state.
    pub async fn handle_message(&mut self, message: &str) -> StepOutcome {
        match std::mem::replace(&mut self.state, SessionState::AwaitingMessage) {
            SessionState::AwaitingMessage => self.dispatch(message).await,
            SessionState::AwaitingRegistrationChoice { username } => self.handle_registration_choice(username, message),
            SessionState::AwaitingRegistrationPassword { username } => self.handle_registration_password(username, message).await,
            SessionState::AwaitingPassword { username } => self.handle_password(username, message).await,
            SessionState::AwaitingResumeChoice { record } => self.handle_resume_choice(record, message).await,
            other => {
                // A framed message arrived while a transfer was in progress; this cannot
                // happen given how the reactor waits, but restoring state keeps us defensive.
                self.state = other;
                StepOutcome::Reply(Error::from(ErrorKind::InvalidCommand).to_wire())
            }
        }
    }

    async fn dispatch(&mut self, message: &str) -> StepOutcome {
        let command = match commands::parse(message) {
            Ok(c) => c,
            Err(e) => return StepOutcome::Reply(e.to_wire()),
        };
        debug!(peer = %self.peer, ?command, "dispatching command");
        match command {
            Command::Auth { username } => self.handle_auth(username).await,
            Command::Exit => StepOutcome::Close(None),
            other => match self.require_root() {
                Ok(root) => self.dispatch_authenticated(root, other).await,
                Err(e) => StepOutcome::Reply(e.to_wire()),
            },
        }
    }

    async fn dispatch_authenticated(&mut self, root: PathBuf, command: Command) -> StepOutcome {
        let result = match command {
            Command::List { path } => self.handle_list(&root, path).await,
            Command::Cd { path } => self.handle_cd(&root, path),
            Command::Mkdir { path } => self.handle_mkdir(&root, path).await,
            Command::Rmdir { path } => self.handle_rmdir(&root, path).await,
            Command::Delete { path } => self.handle_delete(&root, path).await,
            Command::Move { src, dst } => self.handle_move(&root, src, dst).await,
            Command::Copy { src, dst } => self.handle_copy(&root, src, dst).await,
            Command::Upload { size, local, remote } => return self.handle_upload(&root, size, local, remote).await,
            Command::Download { path } => return self.handle_download(&root, path).await,
            Command::Resume { path, offset } => return self.handle_resume(&root, path, offset).await,
            Command::Auth { .. } | Command::Exit => unreachable!("handled by dispatch"),
        };
        match result {
            Ok(body) => StepOutcome::Reply(format!("OK\n{body}")),
            Err(e) => StepOutcome::Reply(e.to_wire()),
        }
    }

    fn require_root(&self) -> Result<PathBuf> {
        self.client_directory
            .clone()
            .ok_or_else(|| Error::new(ErrorKind::PermissionDenied, "AUTH required before this command"))
    }

    async fn handle_auth(&mut self, username: String) -> StepOutcome {
        if self.auth_initiated {
            return StepOutcome::Reply(Error::from(ErrorKind::PermissionDenied).to_wire());
        }
        self.auth_initiated = true;

        if username.is_empty() {
            let root = self.shared.root.join("public");
            return match self.establish_root(root).await {
                Ok(resume) => StepOutcome::Reply(resume),
                Err(e) => StepOutcome::Reply(e.to_wire()),
            };
        }

        if self.shared.credentials.exists(&username).await {
            self.state = SessionState::AwaitingPassword { username: username.clone() };
            StepOutcome::Reply(format!("Password for {username}:"))
        } else {
            self.state = SessionState::AwaitingRegistrationChoice { username: username.clone() };
            StepOutcome::Reply(format!("User {username} not found. Register? (y/n)"))
        }
    }

    fn handle_registration_choice(&mut self, username: String, answer: &str) -> StepOutcome {
        if answer.trim() == "y" {
            self.state = SessionState::AwaitingRegistrationPassword { username: username.clone() };
            StepOutcome::Reply(format!("Password for {username}:"))
        } else {
            StepOutcome::Reply(format!("OK\nRegistration of {username} cancelled."))
        }
    }

    async fn handle_registration_password(&mut self, username: String, password: &str) -> StepOutcome {
        match self.shared.credentials.register(&username, password).await {
            Ok(()) => {
                info!(peer = %self.peer, username = %username, "registered and closing session");
                StepOutcome::Close(Some(format!("OK\nUser {username} registered successfully.")))
            }
            Err(e) => StepOutcome::Close(Some(e.to_wire())),
        }
    }

    async fn handle_password(&mut self, username: String, password: &str) -> StepOutcome {
        match self.shared.credentials.verify(&username, password).await {
            Ok(true) => {
                let root = self.shared.root.join(&username);
                match self.establish_root(root).await {
                    Ok(resume) => {
                        info!(peer = %self.peer, username = %username, "authenticated");
                        StepOutcome::Reply(resume)
                    }
                    Err(e) => StepOutcome::Reply(e.to_wire()),
                }
            }
            Ok(false) => StepOutcome::Reply(Error::from(ErrorKind::AuthenticationFailed).to_wire()),
            Err(e) => StepOutcome::Reply(e.to_wire()),
        }
    }

    /// Creates `root` if missing, sets it as the session's client/working directory, clears
    /// stale journal entries, and returns the `RESUME` frame to send (with or without a
    /// pending upload offer).
    async fn establish_root(&mut self, root: PathBuf) -> Result<String> {
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| Error::with_source(ErrorKind::DirectoryCreateFailed, "failed to create user directory", e))?;
        self.client_directory = Some(root.clone());
        self.working_directory = Some(root.clone());

        let now = now_unix();
        self.shared.journal.clear(&root, now).await?;
        let active = self.shared.journal.active(&root).await?;
        match active.into_iter().next() {
            Some(record) => {
                let reply = format!("RESUME {} {} {}", record.local_path, record.remote_path, record.bytes_completed);
                self.state = SessionState::AwaitingResumeChoice { record };
                Ok(reply)
            }
            None => Ok("RESUME".to_string()),
        }
    }

    async fn handle_resume_choice(&mut self, record: TransferRecord, answer: &str) -> StepOutcome {
        if answer.trim() != "y" {
            let root = self.client_directory.clone().expect("resume choice only reachable after auth");
            if let Err(e) = self.shared.journal.remove(&root, &record.local_path).await {
                warn!(peer = %self.peer, error = %e, "failed to drop a declined resume's journal entry");
            }
            return StepOutcome::Reply("OK\nResume declined.".to_string());
        }
        let remote_path = PathBuf::from(&record.remote_path);
        let part_path = part_path_for(&remote_path);
        let file = match tokio::fs::OpenOptions::new().write(true).create(true).open(&part_path).await {
            Ok(mut f) => {
                if let Err(e) = f.seek(std::io::SeekFrom::Start(record.bytes_completed)).await {
                    return StepOutcome::Reply(Error::with_source(ErrorKind::FileOpenFailed, "failed to seek resumed upload", e).to_wire());
                }
                f
            }
            Err(e) => return StepOutcome::Reply(Error::with_source(ErrorKind::FileOpenFailed, "failed to reopen partial upload", e).to_wire()),
        };
        self.state = SessionState::AwaitingFile {
            file,
            local_path: record.local_path,
            remote_path,
            total_bytes: record.total_bytes,
            bytes_completed: record.bytes_completed,
        };
        StepOutcome::Continue
    }

    async fn handle_list(&self, root: &Path, path: Option<String>) -> Result<String> {
        let working = self.working_directory.as_ref().expect("root implies working directory");
        let target = match path {
            Some(p) => pathguard::resolve(root, working, &p),
            None => working.clone(),
        };
        let canonical = pathguard::verify(root, &target, TypeMode::Directory, ExistenceMode::MustExist)?;
        let mut entries = tokio::fs::read_dir(&canonical)
            .await
            .map_err(|e| Error::with_source(ErrorKind::FileOpenFailed, "failed to read directory", e))?;
        let mut lines = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::with_source(ErrorKind::FileOpenFailed, "failed to read directory entry", e))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            if is_dir {
                lines.push(format!("[DIR]  {name}"));
            } else {
                lines.push(format!("       {name}"));
            }
        }
        Ok(lines.join("\n"))
    }

    fn handle_cd(&mut self, root: &Path, path: String) -> Result<String> {
        let working = self.working_directory.as_ref().expect("root implies working directory").clone();
        let target = pathguard::resolve(root, &working, &path);
        let canonical = pathguard::verify(root, &target, TypeMode::Directory, ExistenceMode::MustExist)?;
        self.working_directory = Some(canonical.clone());
        Ok(format!("Now in {}", canonical.display()))
    }

    async fn handle_mkdir(&self, root: &Path, path: String) -> Result<String> {
        let target = self.resolve(root, &path);
        let canonical = pathguard::verify(root, &target, TypeMode::None, ExistenceMode::MustNotExist)?;
        tokio::fs::create_dir_all(&canonical)
            .await
            .map_err(|e| Error::with_source(ErrorKind::DirectoryCreateFailed, "failed to create directory", e))?;
        Ok(format!("Created {}", canonical.display()))
    }

    async fn handle_rmdir(&self, root: &Path, path: String) -> Result<String> {
        let target = self.resolve(root, &path);
        let canonical = pathguard::verify(root, &target, TypeMode::Directory, ExistenceMode::MustExist)?;
        tokio::fs::remove_dir_all(&canonical)
            .await
            .map_err(|e| Error::with_source(ErrorKind::FileWriteFailed, "failed to remove directory", e))?;
        Ok(format!("Removed {}", canonical.display()))
    }

    async fn handle_delete(&self, root: &Path, path: String) -> Result<String> {
        let target = self.resolve(root, &path);
        let canonical = pathguard::verify(root, &target, TypeMode::File, ExistenceMode::MustExist)?;
        if self.shared.locks.is_locked(&canonical) {
            return Err(Error::from(ErrorKind::FileInUse));
        }
        tokio::fs::remove_file(&canonical)
            .await
            .map_err(|e| Error::with_source(ErrorKind::FileWriteFailed, "failed to delete file", e))?;
        Ok(format!("Deleted {}", canonical.display()))
    }

    async fn handle_move(&self, root: &Path, src: String, dst: String) -> Result<String> {
        let src_target = self.resolve(root, &src);
        let dst_target = self.resolve(root, &dst);
        let src_canonical = pathguard::verify(root, &src_target, TypeMode::None, ExistenceMode::MustExist)?;
        let dst_canonical = pathguard::verify(root, &dst_target, TypeMode::None, ExistenceMode::MustNotExist)?;
        if let Some(parent) = dst_canonical.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::with_source(ErrorKind::DirectoryCreateFailed, "failed to create destination parent", e))?;
        }
        tokio::fs::rename(&src_canonical, &dst_canonical)
            .await
            .map_err(|e| Error::with_source(ErrorKind::FileWriteFailed, "failed to move path", e))?;
        Ok(format!("Moved {} to {}", src_canonical.display(), dst_canonical.display()))
    }

    async fn handle_copy(&self, root: &Path, src: String, dst: String) -> Result<String> {
        let src_target = self.resolve(root, &src);
        let dst_target = self.resolve(root, &dst);
        let src_canonical = pathguard::verify(root, &src_target, TypeMode::None, ExistenceMode::MustExist)?;
        let dst_canonical = pathguard::verify(root, &dst_target, TypeMode::None, ExistenceMode::MustNotExist)?;
        if let Some(parent) = dst_canonical.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::with_source(ErrorKind::DirectoryCreateFailed, "failed to create destination parent", e))?;
        }
        copy_recursive(&src_canonical, &dst_canonical).await?;
        Ok(format!("Copied {} to {}", src_canonical.display(), dst_canonical.display()))
    }

    async fn handle_upload(&mut self, root: &Path, size: u64, local: String, remote: Option<String>) -> StepOutcome {
        let remote_name = remote.unwrap_or_else(|| local.clone());
        let target = self.resolve(root, &remote_name);
        let canonical = match pathguard::verify(root, &target, TypeMode::None, ExistenceMode::DontCare) {
            Ok(p) => p,
            Err(e) => return StepOutcome::Reply(e.to_wire()),
        };
        let part_path = part_path_for(&canonical);
        let file = match tokio::fs::File::create(&part_path).await {
            Ok(f) => f,
            Err(e) => return StepOutcome::Reply(Error::with_source(ErrorKind::FileOpenFailed, "failed to open upload destination", e).to_wire()),
        };
        let record = TransferRecord {
            local_path: local.clone(),
            remote_path: canonical.to_string_lossy().into_owned(),
            bytes_completed: 0,
            total_bytes: size,
            timestamp: now_unix(),
        };
        if let Err(e) = self.shared.journal.add(root, &record, now_unix()).await {
            return StepOutcome::Reply(e.to_wire());
        }
        self.state = SessionState::AwaitingFile {
            file,
            local_path: local,
            remote_path: canonical,
            total_bytes: size,
            bytes_completed: 0,
        };
        StepOutcome::Reply("READY".to_string())
    }

    async fn handle_download(&mut self, root: &Path, path: String) -> StepOutcome {
        let target = self.resolve(root, &path);
        let canonical = match pathguard::verify(root, &target, TypeMode::File, ExistenceMode::MustExist) {
            Ok(p) => p,
            Err(e) => return StepOutcome::Reply(e.to_wire()),
        };
        let metadata = match tokio::fs::metadata(&canonical).await {
            Ok(m) => m,
            Err(e) => return StepOutcome::Reply(Error::with_source(ErrorKind::FileOpenFailed, "failed to stat file", e).to_wire()),
        };
        let file = match File::open(&canonical).await {
            Ok(f) => f,
            Err(e) => return StepOutcome::Reply(Error::with_source(ErrorKind::FileOpenFailed, "failed to open file for download", e).to_wire()),
        };
        let lock = self.shared.locks.lock(&canonical);
        self.state = SessionState::DownloadingFile {
            file,
            remote_path: canonical.clone(),
            total_bytes: metadata.len(),
            bytes_sent: 0,
            _lock: lock,
        };
        StepOutcome::Reply(format!("FILEINFO {} {}", canonical.display(), metadata.len()))
    }

    async fn handle_resume(&mut self, root: &Path, path: String, offset: u64) -> StepOutcome {
        let target = self.resolve(root, &path);
        let canonical = match pathguard::verify(root, &target, TypeMode::File, ExistenceMode::MustExist) {
            Ok(p) => p,
            Err(e) => return StepOutcome::Reply(e.to_wire()),
        };
        let metadata = match tokio::fs::metadata(&canonical).await {
            Ok(m) => m,
            Err(e) => return StepOutcome::Reply(Error::with_source(ErrorKind::FileOpenFailed, "failed to stat file", e).to_wire()),
        };
        let mut file = match File::open(&canonical).await {
            Ok(f) => f,
            Err(e) => return StepOutcome::Reply(Error::with_source(ErrorKind::FileOpenFailed, "failed to open file for resume", e).to_wire()),
        };
        if let Err(e) = file.seek(std::io::SeekFrom::Start(offset)).await {
            return StepOutcome::Reply(Error::with_source(ErrorKind::FileOpenFailed, "failed to seek to resume offset", e).to_wire());
        }
        let lock = self.shared.locks.lock(&canonical);
        self.state = SessionState::DownloadingFile {
            file,
            remote_path: canonical,
            total_bytes: metadata.len(),
            bytes_sent: offset,
            _lock: lock,
        };
        StepOutcome::Continue
    }

    /// Performs one bounded chunk of an in-progress upload, reading from `stream`.
    pub async fn upload_chunk<R>(&mut self, stream: &mut R) -> StepOutcome
    where
        R: tokio::io::AsyncRead + Unpin,
    {
        let SessionState::AwaitingFile { mut file, local_path, remote_path, total_bytes, bytes_completed } =
            std::mem::replace(&mut self.state, SessionState::AwaitingMessage)
        else {
            unreachable!("upload_chunk called outside AwaitingFile");
        };

        // A zero-size UPLOAD (or a resume that already covered every byte) has nothing left to
        // read; the client never sends a chunk for it, so waiting on the socket here would hang.
        let new_completed = if bytes_completed >= total_bytes {
            bytes_completed
        } else {
            let remaining = (total_bytes - bytes_completed).min(TMP_BUFF_SIZE as u64) as usize;
            let mut buf = vec![0u8; remaining];
            let n = match crate::framing::recv_file_chunk(stream, &mut buf).await {
                Ok(n) => n,
                Err(e) => return StepOutcome::Reply(e.to_wire()),
            };
            if let Err(e) = file.write_all(&buf[..n]).await {
                return StepOutcome::Reply(Error::with_source(ErrorKind::FileWriteFailed, "failed writing upload chunk", e).to_wire());
            }
            bytes_completed + n as u64
        };

        let root = self.client_directory.clone().expect("upload only reachable after auth");
        if let Err(e) = self.shared.journal.update(&root, &remote_path.to_string_lossy(), new_completed, now_unix()).await {
            warn!(peer = %self.peer, error = %e, "failed to update transfer journal");
        }

        if new_completed >= total_bytes {
            drop(file);
            let final_path = remote_path.clone();
            if let Err(e) = tokio::fs::rename(part_path_for(&remote_path), &final_path).await {
                return StepOutcome::Reply(Error::with_source(ErrorKind::FileWriteFailed, "failed to finalise upload", e).to_wire());
            }
            if let Err(e) = self.shared.journal.remove(&root, &local_path).await {
                warn!(peer = %self.peer, error = %e, "failed to clear completed transfer from journal");
            }
            info!(peer = %self.peer, path = %final_path.display(), "upload complete");
            self.state = SessionState::AwaitingMessage;
            StepOutcome::Reply(format!("OK\nUploaded file to {}", final_path.display()))
        } else {
            self.state = SessionState::AwaitingFile {
                file,
                local_path,
                remote_path,
                total_bytes,
                bytes_completed: new_completed,
            };
            StepOutcome::Continue
        }
    }

    /// Performs one bounded chunk of an in-progress download, writing to `stream`.
    pub async fn download_chunk<W>(&mut self, stream: &mut W) -> StepOutcome
    where
        W: tokio::io::AsyncWrite + Unpin,
    {
        let SessionState::DownloadingFile { mut file, remote_path, total_bytes, bytes_sent, _lock } =
            std::mem::replace(&mut self.state, SessionState::AwaitingMessage)
        else {
            unreachable!("download_chunk called outside DownloadingFile");
        };

        let n = match crate::framing::send_file_chunk(stream, &mut file, TMP_BUFF_SIZE).await {
            Ok(n) => n,
            Err(e) => return StepOutcome::Reply(e.to_wire()),
        };
        let new_sent = bytes_sent + n as u64;
        if n == 0 || new_sent >= total_bytes {
            info!(peer = %self.peer, path = %remote_path.display(), "download complete");
            drop(_lock);
            self.state = SessionState::AwaitingMessage;
            StepOutcome::Continue
        } else {
            self.state = SessionState::DownloadingFile {
                file,
                remote_path,
                total_bytes,
                bytes_sent: new_sent,
                _lock,
            };
            StepOutcome::Continue
        }
    }

    fn resolve(&self, root: &Path, path: &str) -> PathBuf {
        let working = self.working_directory.as_ref().expect("root implies working directory");
        pathguard::resolve(root, working, path)
    }
}

fn part_path_for(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(".part");
    PathBuf::from(os)
}

fn now_unix() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).expect("system clock is after the epoch").as_secs()
}

async fn copy_recursive(src: &Path, dst: &Path) -> Result<()> {
    let metadata = tokio::fs::metadata(src)
        .await
        .map_err(|e| Error::with_source(ErrorKind::FileOpenFailed, "failed to stat copy source", e))?;
    if metadata.is_dir() {
        tokio::fs::create_dir_all(dst)
            .await
            .map_err(|e| Error::with_source(ErrorKind::DirectoryCreateFailed, "failed to create copy destination", e))?;
        let mut entries = tokio::fs::read_dir(src)
            .await
            .map_err(|e| Error::with_source(ErrorKind::FileOpenFailed, "failed to read copy source directory", e))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::with_source(ErrorKind::FileOpenFailed, "failed to read copy source entry", e))?
        {
            let child_dst = dst.join(entry.file_name());
            Box::pin(copy_recursive(&entry.path(), &child_dst)).await?;
        }
        Ok(())
    } else {
        tokio::fs::copy(src, dst)
            .await
            .map(|_| ())
            .map_err(|e| Error::with_source(ErrorKind::FileWriteFailed, "failed to copy file", e))
    }
}
