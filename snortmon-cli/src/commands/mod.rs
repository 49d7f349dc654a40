//! Command handlers -- one module per subcommand

pub mod config;
pub mod events;
pub mod ingest;
pub mod rules;
