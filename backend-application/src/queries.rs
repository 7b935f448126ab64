pub mod audit_log_queries;
pub mod flag_queries;
