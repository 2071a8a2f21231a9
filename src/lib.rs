pub mod config;
pub mod db;
pub mod loader;
pub mod updater;
pub mod urls;

/// Application name for XDG paths
pub const APP_NAME: &str = "show-urls";

/// Table holding one row per show. Owned by the stats database, not by us.
pub const SHOWS_TABLE: &str = "ww_shows";
