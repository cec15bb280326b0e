/// Source ids as used on the command line and in `registry/*.json`.
pub const BILETIX: &str = "biletix";
pub const BILETINO: &str = "biletino";
pub const BILETINIAL: &str = "biletinial";

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";
pub const CONFIG_PATH_ENV: &str = "WHATNEXT_CONFIG";
pub const METRICS_PORT_ENV: &str = "WHATNEXT_METRICS_PORT";

/// Get all built-in source ids, in run order
pub fn get_supported_sources() -> Vec<&'static str> {
    vec![BILETINIAL, BILETINO, BILETIX]
}
