pub mod backup;

pub use backup::{handle_backup_command, BackupArgs};
