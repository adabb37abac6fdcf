//! Log database migrations - embedded SQL files
//!
//! Kept separate from the escrow schema because logs live in their own
//! DuckDB file.

pub const LOG_MIGRATIONS: &[(&str, &str)] = &[
    ("000_migrations.sql", include_str!("000_migrations.sql")),
    ("001_event_log.sql", include_str!("001_event_log.sql")),
];
