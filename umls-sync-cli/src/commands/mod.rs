pub mod full_import;
pub mod incremental_sync;
pub mod init_meta;
