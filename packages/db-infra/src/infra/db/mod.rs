pub mod core;

pub use self::core::{build_admin_pool, orchestrate_migration, orchestrate_migration_internal};
