pub mod audit_ingest_commands;
