#![deny(clippy::all)]
#![forbid(unsafe_code)]

//! parcel is a small multi-user remote file store: a server that hosts a rooted directory
//! tree and a client that browses it and transfers files to and from it over a single TCP
//! connection, with resumable chunked transfers, per-user path confinement, and
//! password-hash-backed credentials.
//!
//! # Quick start
//!
//! Add the `parcel` and `tokio` crates to your project's dependencies in Cargo.toml:
//!
//! ```toml
//! [dependencies]
//! parcel = "0.1.0"
//! tokio = { version = "1", features = ["full"] }
//! ```
//!
//! Run the server:
//!
//! ```no_run
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! use parcel::credentials::Credentials;
//! use parcel::{filelocks::FileLocks, journal::TransferJournal, session::Shared};
//! use std::sync::Arc;
//!
//! let root = std::path::PathBuf::from("/srv/parcel");
//! let shared = Shared {
//!     root: root.clone(),
//!     credentials: Arc::new(Credentials::load(&root).await?),
//!     locks: FileLocks::new(),
//!     journal: TransferJournal::new(),
//! };
//! parcel::reactor::serve("0.0.0.0:9000".parse()?, shared).await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod credentials;
pub mod error;
pub mod filelocks;
pub mod framing;
pub mod journal;
pub mod pathguard;
pub mod reactor;
pub mod session;

pub(crate) type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;
