pub mod support;

mod ingest;
