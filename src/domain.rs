use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{EventSource, EventType, PerformanceType};

/// Natural key used for find-or-create lookups.
pub fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// A venue in the system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Venue {
    pub id: Option<Uuid>,
    pub name: String,
    pub name_lower: String,
    pub location: Option<String>,
    pub city: Option<String>,
    pub capacity: Option<u32>,
    pub created_at: DateTime<Utc>,
}

impl Venue {
    pub fn new(name: &str, location: Option<String>) -> Self {
        let name = name.trim().to_string();
        Self {
            id: None,
            name_lower: name_key(&name),
            name,
            location: location.filter(|l| !l.trim().is_empty()),
            city: None,
            capacity: None,
            created_at: Utc::now(),
        }
    }
}

/// An artist in the system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artist {
    pub id: Option<Uuid>,
    pub name: String,
    pub name_lower: String,
    pub genre: Option<String>,
    pub biography: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Artist {
    pub fn new(name: &str) -> Self {
        let name = name.trim().to_string();
        Self {
            id: None,
            name_lower: name_key(&name),
            name,
            genre: None,
            biography: None,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Director {
    pub id: Option<Uuid>,
    pub name: String,
    pub name_lower: String,
    pub biography: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Director {
    pub fn new(name: &str) -> Self {
        let name = name.trim().to_string();
        Self {
            id: None,
            name_lower: name_key(&name),
            name,
            biography: None,
            created_at: Utc::now(),
        }
    }
}

/// Cast member of a performing-art event. Embedded, never looked up on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Actor {
    pub name: String,
    pub biography: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gallery {
    pub id: Option<Uuid>,
    pub name: String,
    pub name_lower: String,
    pub location: Option<String>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Gallery {
    pub fn new(name: &str, location: Option<String>) -> Self {
        let name = name.trim().to_string();
        Self {
            id: None,
            name_lower: name_key(&name),
            name,
            location: location.filter(|l| !l.trim().is_empty()),
            description: None,
            created_at: Utc::now(),
        }
    }
}

/// Poster image carried inline with the event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventImage {
    pub data_base64: String,
    pub mime_type: String,
    pub source_url: String,
}

/// Type-specific payload of an [`Event`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventKind {
    Concert {
        artist: Option<Artist>,
        concert_type: Option<String>,
    },
    PerformingArt {
        performance_type: PerformanceType,
        actors: Vec<Actor>,
        director: Option<Director>,
    },
    Exhibition {
        artist: Option<Artist>,
        gallery: Option<Gallery>,
        art_type: Option<String>,
    },
}

/// An event in the system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub source: EventSource,
    pub city: Option<String>,
    pub ticket_urls: Vec<String>,
    pub image: Option<EventImage>,
    pub venue: Option<Venue>,
    pub kind: EventKind,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Event {
    pub fn new(title: &str, start_date: NaiveDate, source: EventSource, kind: EventKind) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            title: title.trim().to_string(),
            description: None,
            start_date,
            end_date: None,
            source,
            city: None,
            ticket_urls: Vec::new(),
            image: None,
            venue: None,
            kind,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn event_type(&self) -> EventType {
        match &self.kind {
            EventKind::Concert { .. } => EventType::Concert,
            EventKind::PerformingArt { performance_type: PerformanceType::Theater, .. } => {
                EventType::Theater
            }
            EventKind::PerformingArt { performance_type: PerformanceType::Standup, .. } => {
                EventType::Standup
            }
            EventKind::Exhibition { .. } => EventType::Exhibition,
        }
    }

    /// Adds a ticket URL unless it is blank or already present.
    /// Returns true when the set grew.
    pub fn add_ticket_url(&mut self, url: &str) -> bool {
        let url = url.trim();
        if url.is_empty() || self.ticket_urls.iter().any(|u| u == url) {
            return false;
        }
        self.ticket_urls.push(url.to_string());
        true
    }

    pub fn artist(&self) -> Option<&Artist> {
        match &self.kind {
            EventKind::Concert { artist, .. } | EventKind::Exhibition { artist, .. } => {
                artist.as_ref()
            }
            EventKind::PerformingArt { .. } => None,
        }
    }

    pub fn venue_name(&self) -> Option<&str> {
        self.venue.as_ref().map(|v| v.name.as_str()).filter(|n| !n.is_empty())
    }

    pub fn gallery(&self) -> Option<&Gallery> {
        match &self.kind {
            EventKind::Exhibition { gallery, .. } => gallery.as_ref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn concert() -> Event {
        let date = NaiveDate::from_ymd_opt(2024, 12, 25).unwrap();
        Event::new(
            "Duman - Konser",
            date,
            EventSource::Biletix,
            EventKind::Concert { artist: None, concert_type: None },
        )
    }

    #[test]
    fn ticket_urls_behave_as_a_set() {
        let mut event = concert();
        assert!(event.add_ticket_url("https://a.example/1"));
        assert!(!event.add_ticket_url("https://a.example/1"));
        assert!(!event.add_ticket_url("  "));
        assert!(event.add_ticket_url("https://b.example/1"));
        assert_eq!(event.ticket_urls.len(), 2);
    }

    #[test]
    fn event_type_follows_kind() {
        let mut event = concert();
        assert_eq!(event.event_type(), EventType::Concert);

        event.kind = EventKind::PerformingArt {
            performance_type: PerformanceType::Standup,
            actors: vec![],
            director: None,
        };
        assert_eq!(event.event_type(), EventType::Standup);
    }

    #[test]
    fn names_keep_a_lowercase_key() {
        let venue = Venue::new("  Zorlu PSM ", Some(String::new()));
        assert_eq!(venue.name, "Zorlu PSM");
        assert_eq!(venue.name_lower, "zorlu psm");
        assert_eq!(venue.location, None);
    }
}
