pub mod handlers;
pub mod server;

pub use server::{IngestState, build_ingest_router, serve};
