use crate::domain::{name_key, Artist, Director, Event, EventKind, Gallery, Venue};
use crate::error::{Result, ScraperError};
use crate::types::PerformanceType;
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};
use uuid::Uuid;

#[async_trait]
pub trait VenueStore: Send + Sync {
    async fn find_venue_by_name(&self, name: &str) -> Result<Option<Venue>>;
    /// Persists the venue, or returns the stored one when the name is taken.
    async fn save_venue(&self, venue: Venue) -> Result<Venue>;
}

#[async_trait]
pub trait ArtistStore: Send + Sync {
    async fn find_artist_by_name(&self, name: &str) -> Result<Option<Artist>>;
    async fn save_artist(&self, artist: Artist) -> Result<Artist>;
}

#[async_trait]
pub trait DirectorStore: Send + Sync {
    async fn find_director_by_name(&self, name: &str) -> Result<Option<Director>>;
    async fn save_director(&self, director: Director) -> Result<Director>;
}

#[async_trait]
pub trait GalleryStore: Send + Sync {
    async fn find_gallery_by_name(&self, name: &str) -> Result<Option<Gallery>>;
    async fn save_gallery(&self, gallery: Gallery) -> Result<Gallery>;
}

#[async_trait]
pub trait EventStore: Send + Sync {
    async fn insert_event(&self, event: Event) -> Result<Event>;
    async fn update_event(&self, event: &Event) -> Result<()>;
    async fn count_events(&self) -> Result<usize>;
    async fn list_events(&self) -> Result<Vec<Event>>;
}

#[async_trait]
pub trait ConcertEventStore: Send + Sync {
    /// Concerts on `start_date` whose venue name matches case-insensitively.
    async fn find_concerts_by_start_date_and_venue_name(
        &self,
        start_date: NaiveDate,
        venue_name: &str,
    ) -> Result<Vec<Event>>;
    async fn exists_concert_by_artist_name_and_start_date(
        &self,
        artist_name: &str,
        start_date: NaiveDate,
    ) -> Result<bool>;
}

#[async_trait]
pub trait PerformingArtEventStore: Send + Sync {
    async fn exists_performance_by_title_and_start_date_and_type(
        &self,
        title: &str,
        start_date: NaiveDate,
        performance_type: PerformanceType,
    ) -> Result<bool>;
}

#[async_trait]
pub trait ExhibitionEventStore: Send + Sync {
    async fn find_exhibitions_by_start_date_and_gallery_name(
        &self,
        start_date: NaiveDate,
        gallery_name: &str,
    ) -> Result<Vec<Event>>;
}

/// Everything the pipeline needs from persistence.
pub trait Storage:
    VenueStore
    + ArtistStore
    + DirectorStore
    + GalleryStore
    + EventStore
    + ConcertEventStore
    + PerformingArtEventStore
    + ExhibitionEventStore
{
}

impl<T> Storage for T where
    T: VenueStore
        + ArtistStore
        + DirectorStore
        + GalleryStore
        + EventStore
        + ConcertEventStore
        + PerformingArtEventStore
        + ExhibitionEventStore
{
}

/// Serialized form of an [`InMemoryStorage`].
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct StorageSnapshot {
    pub venues: Vec<Venue>,
    pub artists: Vec<Artist>,
    pub directors: Vec<Director>,
    pub galleries: Vec<Gallery>,
    pub events: Vec<Event>,
}

/// In-memory storage implementation for development/testing
#[derive(Default)]
pub struct InMemoryStorage {
    venues: Arc<Mutex<HashMap<Uuid, Venue>>>,
    artists: Arc<Mutex<HashMap<Uuid, Artist>>>,
    directors: Arc<Mutex<HashMap<Uuid, Director>>>,
    galleries: Arc<Mutex<HashMap<Uuid, Gallery>>>,
    events: Arc<Mutex<HashMap<Uuid, Event>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|e| ScraperError::Persistence(format!("store lock poisoned: {}", e)))
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a snapshot written by [`InMemoryStorage::save_snapshot`].
    /// A missing file yields an empty store.
    pub fn load_snapshot(path: &Path) -> Result<Self> {
        let storage = Self::new();
        if !path.exists() {
            debug!("No snapshot at {}, starting empty", path.display());
            return Ok(storage);
        }

        let content = std::fs::read_to_string(path)?;
        let snapshot: StorageSnapshot = serde_json::from_str(&content)?;
        {
            let mut venues = lock(&storage.venues)?;
            for v in snapshot.venues {
                if let Some(id) = v.id {
                    venues.insert(id, v);
                }
            }
            let mut artists = lock(&storage.artists)?;
            for a in snapshot.artists {
                if let Some(id) = a.id {
                    artists.insert(id, a);
                }
            }
            let mut directors = lock(&storage.directors)?;
            for d in snapshot.directors {
                if let Some(id) = d.id {
                    directors.insert(id, d);
                }
            }
            let mut galleries = lock(&storage.galleries)?;
            for g in snapshot.galleries {
                if let Some(id) = g.id {
                    galleries.insert(id, g);
                }
            }
            let mut events = lock(&storage.events)?;
            for e in snapshot.events {
                if let Some(id) = e.id {
                    events.insert(id, e);
                }
            }
            info!("Loaded snapshot from {} ({} events)", path.display(), events.len());
        }
        Ok(storage)
    }

    pub fn save_snapshot(&self, path: &Path) -> Result<()> {
        let snapshot = StorageSnapshot {
            venues: lock(&self.venues)?.values().cloned().collect(),
            artists: lock(&self.artists)?.values().cloned().collect(),
            directors: lock(&self.directors)?.values().cloned().collect(),
            galleries: lock(&self.galleries)?.values().cloned().collect(),
            events: lock(&self.events)?.values().cloned().collect(),
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, serde_json::to_string_pretty(&snapshot)?)?;
        info!("Saved snapshot to {} ({} events)", path.display(), snapshot.events.len());
        Ok(())
    }
}

#[async_trait]
impl VenueStore for InMemoryStorage {
    async fn find_venue_by_name(&self, name: &str) -> Result<Option<Venue>> {
        let key = name_key(name);
        let venues = lock(&self.venues)?;
        Ok(venues.values().find(|v| v.name_lower == key).cloned())
    }

    async fn save_venue(&self, mut venue: Venue) -> Result<Venue> {
        let mut venues = lock(&self.venues)?;
        if let Some(existing) = venues.values().find(|v| v.name_lower == venue.name_lower) {
            return Ok(existing.clone());
        }
        let id = Uuid::new_v4();
        venue.id = Some(id);
        venues.insert(id, venue.clone());
        debug!("Created venue: {} with id {}", venue.name, id);
        Ok(venue)
    }
}

#[async_trait]
impl ArtistStore for InMemoryStorage {
    async fn find_artist_by_name(&self, name: &str) -> Result<Option<Artist>> {
        let key = name_key(name);
        let artists = lock(&self.artists)?;
        Ok(artists.values().find(|a| a.name_lower == key).cloned())
    }

    async fn save_artist(&self, mut artist: Artist) -> Result<Artist> {
        let mut artists = lock(&self.artists)?;
        if let Some(existing) = artists.values().find(|a| a.name_lower == artist.name_lower) {
            return Ok(existing.clone());
        }
        let id = Uuid::new_v4();
        artist.id = Some(id);
        artists.insert(id, artist.clone());
        debug!("Created artist: {} with id {}", artist.name, id);
        Ok(artist)
    }
}

#[async_trait]
impl DirectorStore for InMemoryStorage {
    async fn find_director_by_name(&self, name: &str) -> Result<Option<Director>> {
        let key = name_key(name);
        let directors = lock(&self.directors)?;
        Ok(directors.values().find(|d| d.name_lower == key).cloned())
    }

    async fn save_director(&self, mut director: Director) -> Result<Director> {
        let mut directors = lock(&self.directors)?;
        if let Some(existing) = directors.values().find(|d| d.name_lower == director.name_lower) {
            return Ok(existing.clone());
        }
        let id = Uuid::new_v4();
        director.id = Some(id);
        directors.insert(id, director.clone());
        debug!("Created director: {} with id {}", director.name, id);
        Ok(director)
    }
}

#[async_trait]
impl GalleryStore for InMemoryStorage {
    async fn find_gallery_by_name(&self, name: &str) -> Result<Option<Gallery>> {
        let key = name_key(name);
        let galleries = lock(&self.galleries)?;
        Ok(galleries.values().find(|g| g.name_lower == key).cloned())
    }

    async fn save_gallery(&self, mut gallery: Gallery) -> Result<Gallery> {
        let mut galleries = lock(&self.galleries)?;
        if let Some(existing) = galleries.values().find(|g| g.name_lower == gallery.name_lower) {
            return Ok(existing.clone());
        }
        let id = Uuid::new_v4();
        gallery.id = Some(id);
        galleries.insert(id, gallery.clone());
        debug!("Created gallery: {} with id {}", gallery.name, id);
        Ok(gallery)
    }
}

#[async_trait]
impl EventStore for InMemoryStorage {
    async fn insert_event(&self, mut event: Event) -> Result<Event> {
        let id = Uuid::new_v4();
        event.id = Some(id);

        let mut events = lock(&self.events)?;
        events.insert(id, event.clone());

        debug!("Created event: {} with id {}", event.title, id);
        Ok(event)
    }

    async fn update_event(&self, event: &Event) -> Result<()> {
        let event_id = event
            .id
            .ok_or_else(|| ScraperError::Persistence("Cannot update event without ID".to_string()))?;

        let mut events = lock(&self.events)?;
        if !events.contains_key(&event_id) {
            return Err(ScraperError::Persistence(format!("No event with id {}", event_id)));
        }
        let mut updated = event.clone();
        updated.updated_at = Utc::now();
        events.insert(event_id, updated);

        debug!("Updated event: {} with id {}", event.title, event_id);
        Ok(())
    }

    async fn count_events(&self) -> Result<usize> {
        Ok(lock(&self.events)?.len())
    }

    async fn list_events(&self) -> Result<Vec<Event>> {
        let mut events: Vec<Event> = lock(&self.events)?.values().cloned().collect();
        events.sort_by(|a, b| a.start_date.cmp(&b.start_date).then(a.title.cmp(&b.title)));
        Ok(events)
    }
}

#[async_trait]
impl ConcertEventStore for InMemoryStorage {
    async fn find_concerts_by_start_date_and_venue_name(
        &self,
        start_date: NaiveDate,
        venue_name: &str,
    ) -> Result<Vec<Event>> {
        let key = name_key(venue_name);
        let events = lock(&self.events)?;
        Ok(events
            .values()
            .filter(|e| matches!(e.kind, EventKind::Concert { .. }))
            .filter(|e| e.start_date == start_date)
            .filter(|e| e.venue.as_ref().map(|v| v.name_lower == key).unwrap_or(false))
            .cloned()
            .collect())
    }

    async fn exists_concert_by_artist_name_and_start_date(
        &self,
        artist_name: &str,
        start_date: NaiveDate,
    ) -> Result<bool> {
        let events = lock(&self.events)?;
        Ok(events.values().any(|e| {
            e.start_date == start_date
                && matches!(&e.kind, EventKind::Concert { artist: Some(a), .. } if a.name == artist_name)
        }))
    }
}

#[async_trait]
impl PerformingArtEventStore for InMemoryStorage {
    async fn exists_performance_by_title_and_start_date_and_type(
        &self,
        title: &str,
        start_date: NaiveDate,
        performance_type: PerformanceType,
    ) -> Result<bool> {
        let events = lock(&self.events)?;
        Ok(events.values().any(|e| {
            e.title == title
                && e.start_date == start_date
                && matches!(&e.kind, EventKind::PerformingArt { performance_type: pt, .. } if *pt == performance_type)
        }))
    }
}

#[async_trait]
impl ExhibitionEventStore for InMemoryStorage {
    async fn find_exhibitions_by_start_date_and_gallery_name(
        &self,
        start_date: NaiveDate,
        gallery_name: &str,
    ) -> Result<Vec<Event>> {
        let key = name_key(gallery_name);
        let events = lock(&self.events)?;
        Ok(events
            .values()
            .filter(|e| e.start_date == start_date)
            .filter(|e| e.gallery().map(|g| g.name_lower == key).unwrap_or(false))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EventSource;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn save_venue_is_idempotent_on_name() {
        let storage = InMemoryStorage::new();
        let first = storage.save_venue(Venue::new("Zorlu PSM", None)).await.unwrap();
        let second = storage.save_venue(Venue::new("ZORLU psm", None)).await.unwrap();
        assert_eq!(first.id, second.id);
        assert!(storage.find_venue_by_name("zorlu psm").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn concert_lookup_matches_venue_case_insensitively() {
        let storage = InMemoryStorage::new();
        let mut event = Event::new(
            "Duman",
            date(2024, 12, 25),
            EventSource::Biletix,
            EventKind::Concert { artist: None, concert_type: None },
        );
        event.venue = Some(Venue::new("Volkswagen Arena", None));
        storage.insert_event(event).await.unwrap();

        let found = storage
            .find_concerts_by_start_date_and_venue_name(date(2024, 12, 25), "volkswagen ARENA")
            .await
            .unwrap();
        assert_eq!(found.len(), 1);

        let other_day = storage
            .find_concerts_by_start_date_and_venue_name(date(2024, 12, 26), "Volkswagen Arena")
            .await
            .unwrap();
        assert!(other_day.is_empty());
    }

    #[tokio::test]
    async fn update_requires_known_id() {
        let storage = InMemoryStorage::new();
        let event = Event::new(
            "Sergi",
            date(2024, 1, 1),
            EventSource::Manual,
            EventKind::Exhibition { artist: None, gallery: None, art_type: None },
        );
        assert!(storage.update_event(&event).await.is_err());
    }

    #[tokio::test]
    async fn snapshot_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");

        let storage = InMemoryStorage::new();
        storage.save_artist(Artist::new("Sezen Aksu")).await.unwrap();
        storage
            .insert_event(Event::new(
                "Hamlet",
                date(2024, 3, 1),
                EventSource::Biletinial,
                EventKind::PerformingArt {
                    performance_type: PerformanceType::Theater,
                    actors: vec![],
                    director: None,
                },
            ))
            .await
            .unwrap();
        storage.save_snapshot(&path).unwrap();

        let restored = InMemoryStorage::load_snapshot(&path).unwrap();
        assert_eq!(restored.count_events().await.unwrap(), 1);
        assert!(restored.find_artist_by_name("sezen aksu").await.unwrap().is_some());
        assert!(restored
            .exists_performance_by_title_and_start_date_and_type(
                "Hamlet",
                date(2024, 3, 1),
                PerformanceType::Theater
            )
            .await
            .unwrap());
    }
}
