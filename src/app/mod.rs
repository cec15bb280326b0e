pub mod ports;
pub mod report;
pub mod scrape_use_case;
