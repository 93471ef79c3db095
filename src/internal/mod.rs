pub mod aggregate;
pub mod aggregator;
pub mod context;
pub mod ledger;
pub mod models;
pub mod mutation;
pub mod naming;
pub mod notification;
pub mod profile;
pub mod spec_folders;
pub mod usage;
pub mod watcher;
pub mod workspace;
