//! Loading decomposed rows into a [`Sink`](crate::sink::Sink)

pub mod chunked;
pub mod file;

pub use chunked::{ChunkedLoader, DEFAULT_CHUNK_SIZE};
pub use file::{preview, table_name_for, FileLoader, TablePreview, DEFAULT_PREVIEW_SAMPLE};
