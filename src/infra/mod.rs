pub mod http_client;
pub mod static_browser;
