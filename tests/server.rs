//! End-to-end tests driving the reactor over a real TCP socket, matching the seed scenarios.

use parcel::credentials::Credentials;
use parcel::filelocks::FileLocks;
use parcel::journal::TransferJournal;
use parcel::session::Shared;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

async fn start_server() -> (TempDir, std::net::SocketAddr) {
    let dir = TempDir::new().unwrap();
    tokio::fs::create_dir_all(dir.path().join("public")).await.unwrap();
    let shared = Shared {
        root: dir.path().to_path_buf(),
        credentials: Arc::new(Credentials::load(dir.path()).await.unwrap()),
        locks: FileLocks::new(),
        journal: TransferJournal::new(),
    };
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let (stream, peer) = listener.accept().await.unwrap();
            let shared = shared.clone();
            tokio::spawn(async move {
                let _ = run_one(stream, peer, shared).await;
            });
        }
    });
    (dir, addr)
}

// Mirrors parcel::reactor::run_session without re-exporting a private fn: drives one
// connection to completion using the same public session API the reactor uses.
async fn run_one(mut stream: TcpStream, peer: std::net::SocketAddr, shared: Shared) -> anyhow::Result<()> {
    use parcel::framing::{recv_msg, send_msg};
    use parcel::session::{Session, SessionState, StepOutcome};

    let mut session = Session::new(shared, peer);
    loop {
        let outcome = match session.state() {
            SessionState::AwaitingFile { .. } => session.upload_chunk(&mut stream).await,
            SessionState::DownloadingFile { .. } => session.download_chunk(&mut stream).await,
            _ => {
                let message = match recv_msg(&mut stream).await {
                    Ok(m) => m,
                    Err(_) => return Ok(()),
                };
                session.handle_message(&message).await
            }
        };
        match outcome {
            StepOutcome::Reply(body) => send_msg(&mut stream, &body).await?,
            StepOutcome::Continue => {}
            StepOutcome::Close(Some(body)) => {
                send_msg(&mut stream, &body).await?;
                return Ok(());
            }
            StepOutcome::Close(None) => return Ok(()),
        }
    }
}

async fn send(stream: &mut TcpStream, msg: &str) {
    parcel::framing::send_msg(stream, msg).await.unwrap();
}

async fn recv(stream: &mut TcpStream) -> String {
    parcel::framing::recv_msg(stream).await.unwrap()
}

#[tokio::test]
async fn public_list_round_trip() {
    let (_dir, addr) = start_server().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    send(&mut stream, "AUTH").await;
    let resume = recv(&mut stream).await;
    assert_eq!(resume, "RESUME");

    send(&mut stream, "LIST").await;
    let reply = recv(&mut stream).await;
    assert!(reply.starts_with("OK\n"));
}

#[tokio::test]
async fn registration_flow_creates_a_user() {
    let (dir, addr) = start_server().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    send(&mut stream, "AUTH alice").await;
    let prompt = recv(&mut stream).await;
    assert!(prompt.contains("Register?"));

    send(&mut stream, "y").await;
    let prompt = recv(&mut stream).await;
    assert!(prompt.starts_with("Password for"));

    send(&mut stream, "hunter2").await;
    let reply = recv(&mut stream).await;
    assert!(reply.contains("registered successfully"));

    let creds = Credentials::load(dir.path()).await.unwrap();
    assert!(creds.exists("alice").await);
}

#[tokio::test]
async fn upload_then_download_round_trip() {
    let (_dir, addr) = start_server().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    // Register alice first so the session has a non-public root.
    send(&mut stream, "AUTH alice").await;
    recv(&mut stream).await;
    send(&mut stream, "y").await;
    recv(&mut stream).await;
    send(&mut stream, "hunter2").await;
    recv(&mut stream).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    send(&mut stream, "AUTH alice").await;
    recv(&mut stream).await;
    send(&mut stream, "hunter2").await;
    let resume = recv(&mut stream).await;
    assert_eq!(resume, "RESUME");

    send(&mut stream, "UPLOAD 11 hello.txt").await;
    let ready = recv(&mut stream).await;
    assert_eq!(ready, "READY");
    stream.write_all(b"hello world").await.unwrap();
    let reply = recv(&mut stream).await;
    assert!(reply.contains("Uploaded file to"));

    send(&mut stream, "DOWNLOAD hello.txt").await;
    let header = recv(&mut stream).await;
    assert!(header.starts_with("FILEINFO"));
    assert!(header.ends_with(" 11"));

    let mut body = vec![0u8; 11];
    stream.read_exact(&mut body).await.unwrap();
    assert_eq!(body, b"hello world");
}

#[tokio::test]
async fn path_traversal_is_rejected() {
    let (_dir, addr) = start_server().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    send(&mut stream, "AUTH alice").await;
    recv(&mut stream).await;
    send(&mut stream, "y").await;
    recv(&mut stream).await;
    send(&mut stream, "hunter2").await;
    recv(&mut stream).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    send(&mut stream, "AUTH alice").await;
    recv(&mut stream).await;
    send(&mut stream, "hunter2").await;
    recv(&mut stream).await;

    send(&mut stream, "CD ../bob").await;
    let reply = recv(&mut stream).await;
    assert!(reply.starts_with("ERROR access_denied:"));
}

#[tokio::test]
async fn second_auth_is_permission_denied() {
    let (_dir, addr) = start_server().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    send(&mut stream, "AUTH").await;
    recv(&mut stream).await;
    send(&mut stream, "AUTH").await;
    let reply = recv(&mut stream).await;
    assert!(reply.starts_with("ERROR permission_denied:"));
}

async fn register_alice(addr: std::net::SocketAddr) {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    send(&mut stream, "AUTH alice").await;
    recv(&mut stream).await;
    send(&mut stream, "y").await;
    recv(&mut stream).await;
    send(&mut stream, "hunter2").await;
    recv(&mut stream).await;
}

async fn login_alice(addr: std::net::SocketAddr) -> TcpStream {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    send(&mut stream, "AUTH alice").await;
    recv(&mut stream).await;
    send(&mut stream, "hunter2").await;
    recv(&mut stream).await;
    stream
}

#[tokio::test]
async fn resume_upload_completes_after_reconnecting() {
    let (_dir, addr) = start_server().await;
    register_alice(addr).await;

    let body: Vec<u8> = (0..20u8).map(|i| b'a' + (i % 26)).collect();

    {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        send(&mut stream, "AUTH alice").await;
        recv(&mut stream).await;
        send(&mut stream, "hunter2").await;
        let resume = recv(&mut stream).await;
        assert_eq!(resume, "RESUME");

        send(&mut stream, "UPLOAD 20 hello.txt").await;
        let ready = recv(&mut stream).await;
        assert_eq!(ready, "READY");
        stream.write_all(&body[..10]).await.unwrap();
        // `stream` drops here, simulating a connection lost partway through the upload.
    }

    // Give the server a moment to notice the half-closed socket and update its journal.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    send(&mut stream, "AUTH alice").await;
    recv(&mut stream).await;
    send(&mut stream, "hunter2").await;
    let offer = recv(&mut stream).await;
    assert!(offer.starts_with("RESUME hello.txt"), "got: {offer}");
    assert!(offer.ends_with(" 10"), "got: {offer}");

    send(&mut stream, "y").await;
    stream.write_all(&body[10..]).await.unwrap();
    let reply = recv(&mut stream).await;
    assert!(reply.contains("Uploaded file to"));

    send(&mut stream, "DOWNLOAD hello.txt").await;
    let header = recv(&mut stream).await;
    assert!(header.starts_with("FILEINFO"));
    assert!(header.ends_with(" 20"));
    let mut downloaded = vec![0u8; 20];
    stream.read_exact(&mut downloaded).await.unwrap();
    assert_eq!(downloaded, body);
}

#[tokio::test]
async fn delete_is_refused_while_a_download_holds_the_file() {
    let (_dir, addr) = start_server().await;
    register_alice(addr).await;

    let body = vec![b'x'; 4 * 1024 * 1024];
    let mut uploader = login_alice(addr).await;
    send(&mut uploader, &format!("UPLOAD {} big.bin", body.len())).await;
    let ready = recv(&mut uploader).await;
    assert_eq!(ready, "READY");
    uploader.write_all(&body).await.unwrap();
    let reply = recv(&mut uploader).await;
    assert!(reply.contains("Uploaded file to"));
    drop(uploader);

    let mut downloader = login_alice(addr).await;
    send(&mut downloader, "DOWNLOAD big.bin").await;
    let header = recv(&mut downloader).await;
    assert!(header.starts_with("FILEINFO"));

    // The server starts streaming as soon as FILEINFO is sent; give it time to fill the
    // socket buffer and block on the write, since nothing here reads the body yet, so the
    // lock stays held.
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    let mut deleter = login_alice(addr).await;
    send(&mut deleter, "DELETE big.bin").await;
    let reply = recv(&mut deleter).await;
    assert!(reply.starts_with("ERROR file_in_use:"), "got: {reply}");

    let mut downloaded = vec![0u8; body.len()];
    downloader.read_exact(&mut downloaded).await.unwrap();
    assert_eq!(downloaded, body);

    send(&mut deleter, "DELETE big.bin").await;
    let reply = recv(&mut deleter).await;
    assert!(reply.contains("Deleted"));
}
