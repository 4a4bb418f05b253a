pub mod migrate;
pub mod preview;

pub use migrate::{run_migrate, MigrateArgs};
pub use preview::{run_preview, PreviewArgs};
