use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical event classification, independent of any site's vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Concert,
    Theater,
    Standup,
    Exhibition,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Concert => "concert",
            EventType::Theater => "theater",
            EventType::Standup => "standup",
            EventType::Exhibition => "exhibition",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an event was first scraped from. Never changes after creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    Biletix,
    Biletino,
    Biletinial,
    Manual,
}

impl EventSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventSource::Biletix => "biletix",
            EventSource::Biletino => "biletino",
            EventSource::Biletinial => "biletinial",
            EventSource::Manual => "manual",
        }
    }
}

impl fmt::Display for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerformanceType {
    Theater,
    Standup,
}

impl PerformanceType {
    pub fn from_event_type(event_type: EventType) -> Option<Self> {
        match event_type {
            EventType::Theater => Some(PerformanceType::Theater),
            EventType::Standup => Some(PerformanceType::Standup),
            _ => None,
        }
    }
}

/// Transient record for one listing card or detail page.
///
/// Absent fields are empty strings. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEventInfo {
    pub title: String,
    pub date_str: String,
    pub venue_name: String,
    pub location: String,
    pub ticket_url: String,
    pub image_url: String,
    pub description: String,
}

impl RawEventInfo {
    pub fn is_empty(&self) -> bool {
        self.title.is_empty()
            && self.date_str.is_empty()
            && self.venue_name.is_empty()
            && self.location.is_empty()
            && self.ticket_url.is_empty()
            && self.image_url.is_empty()
            && self.description.is_empty()
    }
}
