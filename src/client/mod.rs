//! The interactive client: reads one line at a time from stdin, sends the corresponding
//! frame(s), and prints the server's reply. Out of scope for the core design (see the
//! project's scope notes) beyond the chunked transfer dance it must perform in lockstep with
//! the server.

use crate::error::{Error, ErrorKind, Result};
use crate::framing::{recv_file_chunk, recv_msg, send_file_chunk, send_msg, TMP_BUFF_SIZE};
use crate::journal::TransferJournal;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{info, warn};

/// Drives one client session against a connected server socket.
pub struct ClientDriver {
    stream: TcpStream,
    /// Local directory used to stash partial downloads and their journal.
    local_dir: PathBuf,
    journal: TransferJournal,
}

impl ClientDriver {
    /// Wraps an already-connected socket.
    pub fn new(stream: TcpStream, local_dir: PathBuf) -> Self {
        ClientDriver {
            stream,
            local_dir,
            journal: TransferJournal::new(),
        }
    }

    /// Sends the initial `AUTH` and handles the server's registration/login prompts and its
    /// `RESUME` offer, reading additional lines from `input` as needed. Returns the server's
    /// final reply text to print.
    pub async fn authenticate<R>(&mut self, username: Option<&str>, input: &mut R) -> Result<String>
    where
        R: AsyncBufReadExt + Unpin,
    {
        send_msg(&mut self.stream, &format!("AUTH {}", username.unwrap_or(""))).await?;
        let mut reply = recv_msg(&mut self.stream).await?;

        loop {
            if reply.starts_with("User ") && reply.contains("Register?") {
                println!("{reply}");
                let answer = read_line(input).await?;
                send_msg(&mut self.stream, &answer).await?;
                reply = recv_msg(&mut self.stream).await?;
                continue;
            }
            if reply.starts_with("Password for") {
                println!("{reply}");
                let password = read_line(input).await?;
                send_msg(&mut self.stream, &password).await?;
                reply = recv_msg(&mut self.stream).await?;
                continue;
            }
            break;
        }

        if let Some(rest) = reply.strip_prefix("RESUME") {
            let rest = rest.trim();
            if !rest.is_empty() {
                println!("Resume pending upload: {rest}? (y/n)");
                let answer = read_line(input).await?;
                send_msg(&mut self.stream, &answer).await?;
                if answer.trim() == "y" {
                    let (local, bytes_completed) = parse_upload_resume_offer(rest)?;
                    self.drive_upload_body(&local, bytes_completed).await?;
                    let completion = recv_msg(&mut self.stream).await?;
                    println!("{completion}");
                }
            }
            self.resume_pending_downloads().await?;
            return Ok("OK\nLogged in.".to_string());
        }

        Ok(reply)
    }

    /// Consults the local journal for downloads interrupted by a previous run and resumes each
    /// in turn, oldest first.
    async fn resume_pending_downloads(&mut self) -> Result<()> {
        let records = match self.journal.active(&self.local_dir).await {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "failed to read local transfer journal");
                return Ok(());
            }
        };
        for record in records {
            info!(
                remote = %record.remote_path,
                bytes_completed = record.bytes_completed,
                "resuming interrupted download"
            );
            let reply = self.resume_download(&record.local_path, &record.remote_path, record.bytes_completed).await?;
            println!("{reply}");
        }
        Ok(())
    }

    /// Handles one fully-formed local command line (already authenticated).
    pub async fn send_command(&mut self, line: &str) -> Result<String> {
        let mut words = line.split_whitespace();
        match words.next() {
            Some("UPLOAD") => self.upload(words.next(), words.next()).await,
            Some("DOWNLOAD") => self.download(words.next()).await,
            _ => {
                send_msg(&mut self.stream, line).await?;
                recv_msg(&mut self.stream).await
            }
        }
    }

    async fn upload(&mut self, local: Option<&str>, remote: Option<&str>) -> Result<String> {
        let local = local.ok_or_else(|| Error::from(ErrorKind::NoPath))?;
        let local_path = self.local_dir.join(local);
        let metadata = tokio::fs::metadata(&local_path)
            .await
            .map_err(|e| Error::with_source(ErrorKind::FileOpenFailed, "failed to stat local file", e))?;
        let command = match remote {
            Some(remote) => format!("UPLOAD {} {} {}", metadata.len(), local, remote),
            None => format!("UPLOAD {} {}", metadata.len(), local),
        };
        send_msg(&mut self.stream, &command).await?;
        let ready = recv_msg(&mut self.stream).await?;
        if ready != "READY" {
            return Ok(ready);
        }
        let mut file = tokio::fs::File::open(&local_path)
            .await
            .map_err(|e| Error::with_source(ErrorKind::FileOpenFailed, "failed to open local file", e))?;
        loop {
            let n = send_file_chunk(&mut self.stream, &mut file, TMP_BUFF_SIZE).await?;
            if n == 0 {
                break;
            }
        }
        recv_msg(&mut self.stream).await
    }

    async fn download(&mut self, path: Option<&str>) -> Result<String> {
        let path = path.ok_or_else(|| Error::from(ErrorKind::NoPath))?;
        send_msg(&mut self.stream, &format!("DOWNLOAD {path}")).await?;
        let header = recv_msg(&mut self.stream).await?;
        let Some(rest) = header.strip_prefix("FILEINFO ") else {
            return Ok(header);
        };
        let mut parts = rest.rsplitn(2, ' ');
        let size: u64 = parts.next().and_then(|s| s.parse().ok()).ok_or_else(|| Error::from(ErrorKind::UnknownResponse))?;
        let remote_path = parts.next().ok_or_else(|| Error::from(ErrorKind::UnknownResponse))?.to_string();
        self.receive_body(path, &remote_path, size, 0).await
    }

    /// Resumes a previously interrupted download using the local journal.
    pub async fn resume_download(&mut self, local: &str, remote: &str, offset: u64) -> Result<String> {
        send_msg(&mut self.stream, &format!("RESUME {remote} {offset}")).await?;
        self.receive_body(local, remote, offset, offset).await
    }

    async fn receive_body(&mut self, local: &str, remote_path: &str, total: u64, start_offset: u64) -> Result<String> {
        let part_path = self.local_dir.join(format!("{local}.part"));
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .open(&part_path)
            .await
            .map_err(|e| Error::with_source(ErrorKind::FileOpenFailed, "failed to open local partial download", e))?;
        let mut received = start_offset;
        self.journal_add(local, remote_path, received, total).await;
        while received < total {
            let remaining = (total - received).min(TMP_BUFF_SIZE as u64) as usize;
            let mut buf = vec![0u8; remaining];
            let n = recv_file_chunk(&mut self.stream, &mut buf).await?;
            file.write_all(&buf[..n])
                .await
                .map_err(|e| Error::with_source(ErrorKind::FileWriteFailed, "failed writing downloaded chunk", e))?;
            received += n as u64;
            self.journal_update(remote_path, received).await;
        }
        drop(file);
        let final_path = self.local_dir.join(local);
        tokio::fs::rename(&part_path, &final_path)
            .await
            .map_err(|e| Error::with_source(ErrorKind::FileWriteFailed, "failed renaming completed download", e))?;
        self.journal_remove(local).await;
        Ok(format!("OK\nDownloaded {}", final_path.display()))
    }

    /// Streams the remaining bytes of a resumed upload: the server has re-entered
    /// `AwaitingFile` expecting the tail of `local`, starting at `bytes_completed`.
    async fn drive_upload_body(&mut self, local: &str, bytes_completed: u64) -> Result<()> {
        let local_path = self.local_dir.join(local);
        let mut file = tokio::fs::File::open(&local_path)
            .await
            .map_err(|e| Error::with_source(ErrorKind::FileOpenFailed, "failed to reopen local file for resumed upload", e))?;
        file.seek(std::io::SeekFrom::Start(bytes_completed))
            .await
            .map_err(|e| Error::with_source(ErrorKind::FileOpenFailed, "failed to seek to resume offset", e))?;
        info!(path = %local_path.display(), bytes_completed, "streaming remaining bytes of resumed upload");
        loop {
            let n = send_file_chunk(&mut self.stream, &mut file, TMP_BUFF_SIZE).await?;
            if n == 0 {
                break;
            }
        }
        Ok(())
    }

    async fn journal_add(&self, local: &str, remote: &str, bytes: u64, total: u64) {
        let record = crate::journal::TransferRecord {
            local_path: local.to_string(),
            remote_path: remote.to_string(),
            bytes_completed: bytes,
            total_bytes: total,
            timestamp: now_unix(),
        };
        if let Err(e) = self.journal.add(&self.local_dir, &record, now_unix()).await {
            warn!(error = %e, "failed to record download start in local journal");
        }
    }

    async fn journal_update(&self, remote: &str, bytes: u64) {
        if let Err(e) = self.journal.update(&self.local_dir, remote, bytes, now_unix()).await {
            warn!(error = %e, "failed to update local download journal");
        }
    }

    async fn journal_remove(&self, local: &str) {
        if let Err(e) = self.journal.remove(&self.local_dir, local).await {
            warn!(error = %e, "failed to clear completed download from local journal");
        }
    }
}

async fn read_line<R>(input: &mut R) -> Result<String>
where
    R: AsyncBufReadExt + Unpin,
{
    let mut line = String::new();
    input
        .read_line(&mut line)
        .await
        .map_err(|e| Error::with_source(ErrorKind::RecvFailed, "failed reading from stdin", e))?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

/// Parses a `RESUME`-offer's tail (`<local> <remote> <bytes_completed>`) into the local path and
/// completed-byte count; the remote path is allowed to contain spaces, so it is bounded from
/// the left by the first word and from the right by the last.
fn parse_upload_resume_offer(rest: &str) -> Result<(String, u64)> {
    let mut head = rest.splitn(2, ' ');
    let local = head.next().filter(|s| !s.is_empty()).ok_or_else(|| Error::from(ErrorKind::UnknownResponse))?;
    let remainder = head.next().ok_or_else(|| Error::from(ErrorKind::UnknownResponse))?;
    let mut tail = remainder.rsplitn(2, ' ');
    let bytes_completed: u64 = tail.next().and_then(|s| s.parse().ok()).ok_or_else(|| Error::from(ErrorKind::UnknownResponse))?;
    Ok((local.to_string(), bytes_completed))
}

fn now_unix() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).expect("system clock is after the epoch").as_secs()
}

/// Local commands handled entirely client-side, never sent to the server.
pub fn is_local_command(line: &str) -> bool {
    matches!(line.split_whitespace().next(), Some("HELP"))
}

/// The help text printed for the local `HELP` command.
pub fn help_text() -> &'static str {
    "Commands: LIST [path], CD path, MKDIR path, RMDIR path, DELETE path, MOVE src dst, \
     COPY src dst, UPLOAD local [remote], DOWNLOAD path, EXIT, HELP"
}

/// Where the client stores partial downloads and its local journal; defaults to the current
/// directory unless overridden.
pub fn default_local_dir() -> PathBuf {
    Path::new(".").to_path_buf()
}
