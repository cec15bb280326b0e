use crate::registry::SourceCategory;
use crate::types::EventType;

const STANDUP_MARKERS: &[&str] = &["stand up", "stand-up", "standup"];
const CONCERT_MARKERS: &[&str] = &["concert", "konser"];
const THEATER_MARKERS: &[&str] = &["theater", "theatre", "tiyatro"];
const EXHIBITION_MARKERS: &[&str] = &["exhibition", "sergi"];

/// Maps a card's text and listing category to a canonical [`EventType`].
pub struct EventTypeClassifier;

impl EventTypeClassifier {
    /// Stand-up markers always win. A category that implies its type decides
    /// next; otherwise concert, theater and exhibition markers are checked in
    /// that order before falling back to the category default.
    pub fn classify(title: &str, description: &str, category: &SourceCategory) -> EventType {
        let text = format!("{} {}", title, description).to_lowercase();
        let mentions = |markers: &[&str]| markers.iter().any(|m| text.contains(m));

        if mentions(STANDUP_MARKERS) {
            return EventType::Standup;
        }
        if category.implies_type {
            return category.default_type;
        }
        if mentions(CONCERT_MARKERS) {
            EventType::Concert
        } else if mentions(THEATER_MARKERS) {
            EventType::Theater
        } else if mentions(EXHIBITION_MARKERS) {
            EventType::Exhibition
        } else {
            category.default_type
        }
    }
}
