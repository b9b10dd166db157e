//! manualseek - semantic passage retrieval over a single reference manual.
//!
//! The text of a manual is split into overlapping chunks, each chunk is
//! embedded, and the vectors are kept in a [redb](https://github.com/cberner/redb)
//! store. Questions are embedded the same way and answered with the most
//! similar passages, tagged with the page they came from.
//!
//! # Quick start
//!
//! ```
//! # let tmp = tempfile::tempdir().unwrap();
//! use manualseek::{Document, EngineConfig, HashingEmbedder, Session};
//!
//! let manual = Document::from_pages(
//!     "patriot",
//!     [
//!         "Brake noise when stopping usually means the pads are worn.",
//!         "Check the engine oil level every month.",
//!     ],
//! );
//!
//! let session = Session::open(
//!     &tmp.path().join("index.redb"),
//!     EngineConfig::default(),
//!     Box::new(HashingEmbedder::new(384).unwrap()),
//! )
//! .unwrap();
//! session.open_or_build(&manual).unwrap();
//!
//! let passages = session.retrieve("brake noise", Some(1), None).unwrap();
//! assert_eq!(passages[0].page, Some(1));
//! println!("{}", passages[0].formatted());
//! ```

pub mod chunking;
pub mod config;
pub mod data_dir;
pub mod document;
pub mod embedding;
pub mod error;
pub mod fingerprint;
pub mod http_embedder;
pub mod index_store;
pub mod retriever;
pub mod sections;
pub mod session;
pub mod vector_index;

pub use chunking::{Chunk, Chunker, ChunkingConfig};
pub use config::EngineConfig;
pub use data_dir::DataDir;
pub use document::Document;
pub use embedding::{Embedding, EmbeddingProvider, HashingEmbedder, RetryPolicy};
pub use error::{EmbeddingError, Error, Result};
pub use http_embedder::HttpEmbedder;
pub use index_store::{IndexStore, Manifest};
pub use retriever::{Passage, Retriever, RetrieverConfig};
pub use session::Session;
pub use vector_index::{IndexEntry, SearchResult, VectorIndex};
