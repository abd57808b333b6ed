#![deny(warnings)]
#![deny(dead_code)]
#![deny(unused_variables)]
#![deny(unused_imports)]

pub mod config;
pub mod error;
pub mod profile;
pub mod redact;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use profile::{EmbedderProfile, ErrorClass};
pub use traits::{EmbedError, EmbedErrorKind, EmbedderCapability};
pub use types::{Chunk, ChunkId, EmbeddedChunk};
