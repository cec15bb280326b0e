use tracing::{debug, warn};

use crate::domain::{Artist, Event, EventKind, Gallery, Venue};
use crate::error::ScraperError;
use crate::pipeline::dates::DateNormalizer;
use crate::pipeline::enrich::merge_fields;
use crate::registry::SourceConfig;
use crate::storage::Storage;
use crate::types::{EventType, PerformanceType, RawEventInfo};

/// Context a card was scraped in.
#[derive(Debug, Clone, Default)]
pub struct BuildContext {
    pub city: Option<String>,
}

/// Text before the first hyphen, trimmed. The whole title when there is no
/// hyphen or nothing precedes it.
pub fn extract_artist_name(title: &str) -> String {
    match title.split_once('-') {
        Some((head, _)) if !head.trim().is_empty() => head.trim().to_string(),
        _ => title.trim().to_string(),
    }
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Turns raw card and detail fields into a canonical [`Event`].
pub struct EventBuilder<'a> {
    source: &'a SourceConfig,
    dates: &'a DateNormalizer,
}

impl<'a> EventBuilder<'a> {
    pub fn new(source: &'a SourceConfig, dates: &'a DateNormalizer) -> Self {
        Self { source, dates }
    }

    /// Returns `None` when the type is not emitted by this source or the
    /// start date cannot be parsed. Both cases are logged.
    pub async fn build(
        &self,
        event_type: EventType,
        basic: &RawEventInfo,
        detail: Option<&RawEventInfo>,
        store: &dyn Storage,
        ctx: &BuildContext,
    ) -> Option<Event> {
        if !self.source.supports(event_type) {
            let err = ScraperError::UnknownEventType {
                source_id: self.source.source_id.clone(),
                event_type: event_type.to_string(),
            };
            warn!("Skipping {:?}: {}", basic.title, err);
            return None;
        }

        let fields = merge_fields(basic, detail);
        let title = fields.title.trim();
        if title.is_empty() {
            warn!("Skipping card without title from {}", self.source.source_id);
            return None;
        }

        let range = match self.dates.parse_range(&fields.date_str) {
            Ok(range) => range,
            Err(e) => {
                warn!("Skipping {:?}: date unknown ({})", title, e);
                return None;
            }
        };

        let kind = match event_type {
            EventType::Concert => EventKind::Concert {
                artist: non_empty(&extract_artist_name(title)).map(|name| Artist::new(&name)),
                concert_type: None,
            },
            EventType::Theater | EventType::Standup => EventKind::PerformingArt {
                performance_type: PerformanceType::from_event_type(event_type)
                    .unwrap_or(PerformanceType::Theater),
                actors: Vec::new(),
                director: None,
            },
            EventType::Exhibition => EventKind::Exhibition {
                artist: None,
                gallery: non_empty(&fields.venue_name)
                    .map(|name| Gallery::new(&name, non_empty(&fields.location))),
                art_type: None,
            },
        };

        let mut event = Event::new(title, range.start, self.source.source, kind);
        event.end_date = range.end;
        event.description = non_empty(&fields.description);
        event.city = ctx.city.clone().or_else(|| non_empty(&fields.location));
        event.add_ticket_url(&fields.ticket_url);
        if event_type != EventType::Exhibition {
            event.venue = self.resolve_venue(&fields, store).await;
        }
        Some(event)
    }

    /// Reuses a stored venue with the same name, otherwise prepares a new one.
    async fn resolve_venue(&self, fields: &RawEventInfo, store: &dyn Storage) -> Option<Venue> {
        let name = non_empty(&fields.venue_name)?;
        match store.find_venue_by_name(&name).await {
            Ok(Some(existing)) => {
                debug!("Reusing venue {}", existing.name);
                Some(existing)
            }
            Ok(None) => Some(Venue::new(&name, non_empty(&fields.location))),
            Err(e) => {
                warn!("Venue lookup for {:?} failed: {}", name, e);
                Some(Venue::new(&name, non_empty(&fields.location)))
            }
        }
    }
}
