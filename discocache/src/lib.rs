//! # discocache - Cache store for Disco audio artifacts
//!
//! This crate provides the object-store seam used by the playback engine to
//! keep transcoded tracks around between plays. A store is a flat key/value
//! space: keys are track identifiers, values are encoded audio artifacts that
//! the store treats as opaque bytes.
//!
//! ## Backends
//!
//! ```text
//! discocache
//!     ├── store.rs       - CacheStore trait, ByteStream, CacheError
//!     ├── fs.rs          - FsStore, one file per key with atomic rename
//!     ├── http.rs        - HttpStore, path-style GET/PUT object store
//!     └── config_ext.rs  - builds the configured store from discoconfig
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use discocache::{CacheStore, FsStore};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = FsStore::new("./cache_audio")?;
//!
//!     let artifact = tokio::fs::File::open("track.mp3").await?;
//!     store.put("dQw4w9WgXcQ", Box::new(artifact), None).await?;
//!
//!     match store.get("dQw4w9WgXcQ").await {
//!         Ok(_stream) => println!("cache hit"),
//!         Err(e) if e.is_not_found() => println!("cache miss"),
//!         Err(e) => return Err(e.into()),
//!     }
//!     Ok(())
//! }
//! ```

pub mod fs;
pub mod http;
pub mod store;

#[cfg(feature = "discoconfig")]
pub mod config_ext;

pub use fs::FsStore;
pub use http::HttpStore;
pub use store::{validate_key, ByteStream, CacheError, CacheStore};

#[cfg(feature = "discoconfig")]
pub use config_ext::CacheStoreConfigExt;
