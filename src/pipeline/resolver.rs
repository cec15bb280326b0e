//! Decides whether a freshly built event is new, a duplicate to drop, or a
//! duplicate whose ticket links should be folded into the stored record.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, error, info, instrument, warn};

use crate::domain::{Artist, Director, Event, EventKind, Gallery, Venue};
use crate::error::Result;
use crate::pipeline::similarity::TitleSimilarity;
use crate::storage::Storage;
use crate::types::EventType;

/// Duplicate check used for concerts of one source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConcertPolicy {
    /// Same day and venue, then similar title or same artist. Merges.
    #[default]
    Broad,
    /// Exact artist name and day. Never merges.
    Strict,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    Duplicate(String),
    MissingKey(String),
    Failed(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Duplicate(msg) => write!(f, "duplicate: {}", msg),
            SkipReason::MissingKey(msg) => write!(f, "missing key: {}", msg),
            SkipReason::Failed(msg) => write!(f, "failed: {}", msg),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Inserted(Event),
    Merged(Event),
    Skipped(SkipReason),
}

pub struct DuplicateResolver {
    similarity: TitleSimilarity,
    dedup_exhibitions: bool,
}

impl DuplicateResolver {
    pub fn new(similarity: TitleSimilarity, dedup_exhibitions: bool) -> Self {
        Self { similarity, dedup_exhibitions }
    }

    /// Errors are contained here and reported as [`SkipReason::Failed`].
    #[instrument(skip(self, event, store), fields(title = %event.title, source = %event.source))]
    pub async fn resolve(&self, event: Event, store: &dyn Storage, concert_policy: ConcertPolicy) -> Resolution {
        let outcome = match (event.event_type(), concert_policy) {
            (EventType::Concert, ConcertPolicy::Broad) => self.resolve_concert_broad(event, store).await,
            (EventType::Concert, ConcertPolicy::Strict) => self.resolve_concert_strict(event, store).await,
            (EventType::Theater | EventType::Standup, _) => self.resolve_performing_art(event, store).await,
            (EventType::Exhibition, _) => self.resolve_exhibition(event, store).await,
        };
        match outcome {
            Ok(resolution) => resolution,
            Err(e) => {
                error!("Failed to persist event: {}", e);
                Resolution::Skipped(SkipReason::Failed(e.to_string()))
            }
        }
    }

    fn is_same_concert(&self, existing: &Event, candidate: &Event) -> bool {
        if self.similarity.similar(&existing.title, &candidate.title) {
            return true;
        }
        match (existing.artist(), candidate.artist()) {
            (Some(a), Some(b)) => a.name_lower == b.name_lower,
            _ => false,
        }
    }

    async fn resolve_concert_broad(&self, event: Event, store: &dyn Storage) -> Result<Resolution> {
        if let Some(venue_name) = event.venue_name() {
            let candidates = store
                .find_concerts_by_start_date_and_venue_name(event.start_date, venue_name)
                .await?;
            if let Some(existing) = candidates.into_iter().find(|c| self.is_same_concert(c, &event)) {
                return self.merge_into(existing, event, store).await.map(Resolution::Merged);
            }
        }
        self.insert_concert(event, store).await
    }

    async fn merge_into(&self, mut existing: Event, incoming: Event, store: &dyn Storage) -> Result<Event> {
        let mut added = 0;
        for url in &incoming.ticket_urls {
            if existing.add_ticket_url(url) {
                added += 1;
            }
        }

        if existing.artist().is_none() {
            if let Some(artist) = incoming.artist() {
                let artist = find_or_create_artist(store, artist.clone()).await?;
                if let EventKind::Concert { artist: slot, .. } | EventKind::Exhibition { artist: slot, .. } =
                    &mut existing.kind
                {
                    *slot = Some(artist);
                }
            }
        }

        store.update_event(&existing).await?;
        info!(
            "Merged {:?} ({}) into existing event {:?}, {} new ticket link(s)",
            incoming.title, incoming.source, existing.title, added
        );
        Ok(existing)
    }

    async fn insert_concert(&self, mut event: Event, store: &dyn Storage) -> Result<Resolution> {
        if let EventKind::Concert { artist: Some(artist), .. } = &mut event.kind {
            *artist = find_or_create_artist(store, artist.clone()).await?;
        }
        self.attach_venue(&mut event, store).await?;
        let saved = store.insert_event(event).await?;
        info!("Inserted concert {:?} on {}", saved.title, saved.start_date);
        Ok(Resolution::Inserted(saved))
    }

    async fn resolve_concert_strict(&self, event: Event, store: &dyn Storage) -> Result<Resolution> {
        let Some(artist_name) = event.artist().map(|a| a.name.clone()) else {
            warn!("Skipping concert {:?}: no artist name", event.title);
            return Ok(Resolution::Skipped(SkipReason::MissingKey("artist name".to_string())));
        };
        if store
            .exists_concert_by_artist_name_and_start_date(&artist_name, event.start_date)
            .await?
        {
            warn!("Skipping concert {:?}: {} already playing on {}", event.title, artist_name, event.start_date);
            return Ok(Resolution::Skipped(SkipReason::Duplicate(format!(
                "{} on {}",
                artist_name, event.start_date
            ))));
        }
        self.insert_concert(event, store).await
    }

    async fn resolve_performing_art(&self, mut event: Event, store: &dyn Storage) -> Result<Resolution> {
        let EventKind::PerformingArt { performance_type, .. } = &event.kind else {
            return Ok(Resolution::Skipped(SkipReason::Failed("not a performing art".to_string())));
        };
        if store
            .exists_performance_by_title_and_start_date_and_type(&event.title, event.start_date, *performance_type)
            .await?
        {
            warn!("Skipping performance {:?}: already stored for {}", event.title, event.start_date);
            return Ok(Resolution::Skipped(SkipReason::Duplicate(format!(
                "{} on {}",
                event.title, event.start_date
            ))));
        }

        if let EventKind::PerformingArt { director: Some(director), .. } = &mut event.kind {
            *director = find_or_create_director(store, director.clone()).await?;
        }
        self.attach_venue(&mut event, store).await?;
        let saved = store.insert_event(event).await?;
        info!("Inserted performance {:?} on {}", saved.title, saved.start_date);
        Ok(Resolution::Inserted(saved))
    }

    async fn resolve_exhibition(&self, mut event: Event, store: &dyn Storage) -> Result<Resolution> {
        if self.dedup_exhibitions {
            if let Some(gallery) = event.gallery().map(|g| g.name.clone()) {
                let candidates = store
                    .find_exhibitions_by_start_date_and_gallery_name(event.start_date, &gallery)
                    .await?;
                if let Some(existing) = candidates
                    .into_iter()
                    .find(|c| self.similarity.similar(&c.title, &event.title))
                {
                    return self.merge_into(existing, event, store).await.map(Resolution::Merged);
                }
            }
        }

        if let EventKind::Exhibition { artist, gallery, .. } = &mut event.kind {
            if let Some(a) = artist {
                *a = find_or_create_artist(store, a.clone()).await?;
            }
            if let Some(g) = gallery {
                *g = find_or_create_gallery(store, g.clone()).await?;
            }
        }
        let saved = store.insert_event(event).await?;
        info!("Inserted exhibition {:?} on {}", saved.title, saved.start_date);
        Ok(Resolution::Inserted(saved))
    }

    async fn attach_venue(&self, event: &mut Event, store: &dyn Storage) -> Result<()> {
        if let Some(venue) = event.venue.take() {
            event.venue = Some(find_or_create_venue(store, venue).await?);
        }
        Ok(())
    }
}

/// Returns the stored venue with the same name, creating it on first sight.
pub async fn find_or_create_venue(store: &dyn Storage, venue: Venue) -> Result<Venue> {
    if venue.id.is_some() {
        return Ok(venue);
    }
    if let Some(existing) = store.find_venue_by_name(&venue.name).await? {
        debug!("Found existing venue: {}", existing.name);
        return Ok(existing);
    }
    let created = store.save_venue(venue).await?;
    info!("Created new venue: {}", created.name);
    Ok(created)
}

pub async fn find_or_create_artist(store: &dyn Storage, artist: Artist) -> Result<Artist> {
    if artist.id.is_some() {
        return Ok(artist);
    }
    if let Some(existing) = store.find_artist_by_name(&artist.name).await? {
        debug!("Found existing artist: {}", existing.name);
        return Ok(existing);
    }
    let created = store.save_artist(artist).await?;
    info!("Created new artist: {}", created.name);
    Ok(created)
}

pub async fn find_or_create_director(store: &dyn Storage, director: Director) -> Result<Director> {
    if director.id.is_some() {
        return Ok(director);
    }
    if let Some(existing) = store.find_director_by_name(&director.name).await? {
        return Ok(existing);
    }
    let created = store.save_director(director).await?;
    info!("Created new director: {}", created.name);
    Ok(created)
}

pub async fn find_or_create_gallery(store: &dyn Storage, gallery: Gallery) -> Result<Gallery> {
    if gallery.id.is_some() {
        return Ok(gallery);
    }
    if let Some(existing) = store.find_gallery_by_name(&gallery.name).await? {
        return Ok(existing);
    }
    let created = store.save_gallery(gallery).await?;
    info!("Created new gallery: {}", created.name);
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Actor;
    use crate::pipeline::similarity::SimilarityPolicy;
    use crate::storage::{ArtistStore, EventStore, InMemoryStorage};
    use crate::types::{EventSource, PerformanceType};
    use chrono::NaiveDate;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 12, 25).unwrap()
    }

    fn concert(title: &str, artist: Option<&str>, venue: &str, url: &str, source: EventSource) -> Event {
        let mut event = Event::new(
            title,
            day(),
            source,
            EventKind::Concert { artist: artist.map(Artist::new), concert_type: None },
        );
        event.venue = Some(Venue::new(venue, None));
        event.add_ticket_url(url);
        event
    }

    fn play(title: &str) -> Event {
        let mut event = Event::new(
            title,
            day(),
            EventSource::Biletinial,
            EventKind::PerformingArt {
                performance_type: PerformanceType::Theater,
                actors: vec![Actor { name: "Haluk Bilginer".to_string(), biography: None }],
                director: Some(Director::new("Ayşe Emel Mesci")),
            },
        );
        event.venue = Some(Venue::new("Harbiye Muhsin Ertuğrul", None));
        event
    }

    fn resolver() -> DuplicateResolver {
        DuplicateResolver::new(TitleSimilarity::new(SimilarityPolicy::EditDistance), false)
    }

    #[tokio::test]
    async fn broad_policy_merges_similar_concert() {
        let store = InMemoryStorage::new();
        let resolver = resolver();

        let first = concert("Duman Konseri", None, "Zorlu PSM", "https://a/1", EventSource::Biletix);
        assert!(matches!(resolver.resolve(first, &store, ConcertPolicy::Broad).await, Resolution::Inserted(_)));

        let second = concert("Duman Konseri!", Some("Duman"), "zorlu psm", "https://b/2", EventSource::Biletino);
        let Resolution::Merged(merged) = resolver.resolve(second, &store, ConcertPolicy::Broad).await else {
            panic!("expected a merge");
        };

        assert_eq!(merged.ticket_urls, vec!["https://a/1".to_string(), "https://b/2".to_string()]);
        assert_eq!(merged.artist().map(|a| a.name.as_str()), Some("Duman"));
        assert!(merged.artist().and_then(|a| a.id).is_some());
        assert_eq!(merged.source, EventSource::Biletix);
        assert_eq!(store.count_events().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn broad_policy_matches_on_artist_alone() {
        let store = InMemoryStorage::new();
        let resolver = resolver();

        let first = concert("Tarkan", Some("Tarkan"), "Harbiye", "https://a/1", EventSource::Biletix);
        resolver.resolve(first, &store, ConcertPolicy::Broad).await;
        let second = concert("Megastar Yılbaşı Gecesi", Some("TARKAN"), "Harbiye", "https://b/1", EventSource::Biletino);
        assert!(matches!(resolver.resolve(second, &store, ConcertPolicy::Broad).await, Resolution::Merged(_)));
    }

    #[tokio::test]
    async fn broad_policy_inserts_when_no_candidate_matches() {
        let store = InMemoryStorage::new();
        let resolver = resolver();

        let first = concert("Duman", Some("Duman"), "Zorlu PSM", "https://a/1", EventSource::Biletix);
        resolver.resolve(first, &store, ConcertPolicy::Broad).await;

        let other_act = concert("Mor ve Ötesi", Some("Mor ve Ötesi"), "Zorlu PSM", "https://a/2", EventSource::Biletix);
        assert!(matches!(resolver.resolve(other_act, &store, ConcertPolicy::Broad).await, Resolution::Inserted(_)));

        let other_venue = concert("Duman", Some("Duman"), "Jolly Joker", "https://a/3", EventSource::Biletix);
        assert!(matches!(resolver.resolve(other_venue, &store, ConcertPolicy::Broad).await, Resolution::Inserted(_)));

        assert_eq!(store.count_events().await.unwrap(), 3);
        // One venue row per name, one artist row per name.
        assert!(store.find_artist_by_name("duman").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn strict_policy_keys_on_artist_and_day() {
        let store = InMemoryStorage::new();
        let resolver = resolver();

        let first = concert("Duman - Konser", Some("Duman"), "Zorlu PSM", "https://a/1", EventSource::Biletix);
        assert!(matches!(resolver.resolve(first, &store, ConcertPolicy::Strict).await, Resolution::Inserted(_)));

        let again = concert("Duman - Başka Salon", Some("Duman"), "Jolly Joker", "https://a/2", EventSource::Biletix);
        assert!(matches!(
            resolver.resolve(again, &store, ConcertPolicy::Strict).await,
            Resolution::Skipped(SkipReason::Duplicate(_))
        ));

        let anonymous = concert("Gizli Konser", None, "Zorlu PSM", "https://a/3", EventSource::Biletix);
        assert!(matches!(
            resolver.resolve(anonymous, &store, ConcertPolicy::Strict).await,
            Resolution::Skipped(SkipReason::MissingKey(_))
        ));
    }

    #[tokio::test]
    async fn performing_art_second_submission_is_skipped() {
        let store = InMemoryStorage::new();
        let resolver = resolver();

        let Resolution::Inserted(saved) = resolver.resolve(play("Kral Lear"), &store, ConcertPolicy::Broad).await else {
            panic!("expected insert");
        };
        assert!(saved.venue.as_ref().and_then(|v| v.id).is_some());

        assert!(matches!(
            resolver.resolve(play("Kral Lear"), &store, ConcertPolicy::Broad).await,
            Resolution::Skipped(SkipReason::Duplicate(_))
        ));
        assert_eq!(store.count_events().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn exhibitions_follow_dedup_setting() {
        let exhibition = || {
            Event::new(
                "Modern Sanat Sergisi",
                day(),
                EventSource::Manual,
                EventKind::Exhibition {
                    artist: None,
                    gallery: Some(Gallery::new("Pera Müzesi", None)),
                    art_type: None,
                },
            )
        };

        let store = InMemoryStorage::new();
        let always_insert = resolver();
        always_insert.resolve(exhibition(), &store, ConcertPolicy::Broad).await;
        always_insert.resolve(exhibition(), &store, ConcertPolicy::Broad).await;
        assert_eq!(store.count_events().await.unwrap(), 2);

        let store = InMemoryStorage::new();
        let dedup = DuplicateResolver::new(TitleSimilarity::default(), true);
        dedup.resolve(exhibition(), &store, ConcertPolicy::Broad).await;
        assert!(matches!(dedup.resolve(exhibition(), &store, ConcertPolicy::Broad).await, Resolution::Merged(_)));
        assert_eq!(store.count_events().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn find_or_create_returns_existing_rows() {
        let store = InMemoryStorage::new();
        let first = find_or_create_venue(&store, Venue::new("Zorlu PSM", None)).await.unwrap();
        let second = find_or_create_venue(&store, Venue::new("zorlu psm", Some("Levazım".to_string()))).await.unwrap();
        assert_eq!(first.id, second.id);

        let artist = find_or_create_artist(&store, Artist::new("Duman")).await.unwrap();
        let again = find_or_create_artist(&store, Artist::new("DUMAN")).await.unwrap();
        assert_eq!(artist.id, again.id);

        let director = find_or_create_director(&store, Director::new("Işıl Kasapoğlu")).await.unwrap();
        assert!(director.id.is_some());
    }
}
