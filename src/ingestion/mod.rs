//! Song ingestion: content-addressed storage, probing and cover extraction.

mod ingestor;
mod models;

pub use ingestor::{IngestionError, Ingestor};
pub use models::{Ingested, SongFields, StoredCover, Upload};
