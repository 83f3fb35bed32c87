pub mod ingest;
pub mod sync_supervisor;
