//! Track model.
//!
//! A [`Track`] is produced once by a [`SourceResolver`](crate::SourceResolver)
//! and never mutated afterwards. Workers clone it freely when reporting state.

use std::fmt;
use std::time::Duration;

/// A resolved, playable unit of audio with display metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    id: String,
    title: String,
    duration: String,
    locator: String,
    requester: String,
    channel_id: String,
    cache_eligible: bool,
}

impl Track {
    /// Starts a builder for a track with the given identifier and locator.
    pub fn builder(id: impl Into<String>, locator: impl Into<String>) -> TrackBuilder {
        TrackBuilder {
            track: Track {
                id: id.into(),
                title: String::new(),
                duration: String::new(),
                locator: locator.into(),
                requester: String::new(),
                channel_id: String::new(),
                cache_eligible: false,
            },
        }
    }

    /// Stable identifier, also the cache key.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Human-readable duration, empty when unknown.
    pub fn duration(&self) -> &str {
        &self.duration
    }

    /// Origin locator: a remote URL or a directly playable stream locator.
    pub fn locator(&self) -> &str {
        &self.locator
    }

    pub fn requester(&self) -> &str {
        &self.requester
    }

    /// Text channel the request came from.
    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    /// Whether the origin may be fetched and persisted to the cache store.
    pub fn cache_eligible(&self) -> bool {
        self.cache_eligible
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let title = if self.title.is_empty() {
            &self.id
        } else {
            &self.title
        };
        if self.duration.is_empty() {
            write!(f, "{}", title)
        } else {
            write!(f, "{} ({})", title, self.duration)
        }
    }
}

/// Builder returned by [`Track::builder`].
#[derive(Debug, Clone)]
pub struct TrackBuilder {
    track: Track,
}

impl TrackBuilder {
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.track.title = title.into();
        self
    }

    /// Sets an already formatted duration string.
    pub fn duration(mut self, duration: impl Into<String>) -> Self {
        self.track.duration = duration.into();
        self
    }

    /// Sets the duration from a length, formatted with [`format_duration`].
    pub fn length(mut self, length: Duration) -> Self {
        self.track.duration = format_duration(length);
        self
    }

    pub fn requester(mut self, requester: impl Into<String>) -> Self {
        self.track.requester = requester.into();
        self
    }

    pub fn channel_id(mut self, channel_id: impl Into<String>) -> Self {
        self.track.channel_id = channel_id.into();
        self
    }

    pub fn cache_eligible(mut self, eligible: bool) -> Self {
        self.track.cache_eligible = eligible;
        self
    }

    pub fn build(self) -> Track {
        self.track
    }
}

/// Formats a length as `m:ss`, `h:mm:ss` or `d:hh:mm:ss`.
///
/// ```
/// use std::time::Duration;
/// use discoplay::format_duration;
///
/// assert_eq!(format_duration(Duration::from_secs(213)), "3:33");
/// assert_eq!(format_duration(Duration::from_secs(3_725)), "1:02:05");
/// ```
pub fn format_duration(length: Duration) -> String {
    let total = length.as_secs();
    let seconds = total % 60;
    let minutes = (total / 60) % 60;
    let hours = (total / 3_600) % 24;
    let days = total / 86_400;

    if days > 0 {
        format!("{}:{:02}:{:02}:{:02}", days, hours, minutes, seconds)
    } else if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let track = Track::builder("abc", "https://media.example/abc.webm")
            .title("Some Song")
            .length(Duration::from_secs(61))
            .requester("alice")
            .channel_id("text-1")
            .cache_eligible(true)
            .build();

        assert_eq!(track.id(), "abc");
        assert_eq!(track.title(), "Some Song");
        assert_eq!(track.duration(), "1:01");
        assert_eq!(track.locator(), "https://media.example/abc.webm");
        assert_eq!(track.requester(), "alice");
        assert_eq!(track.channel_id(), "text-1");
        assert!(track.cache_eligible());
        assert_eq!(track.to_string(), "Some Song (1:01)");
    }

    #[test]
    fn test_display_falls_back_to_id() {
        let track = Track::builder("abc", "/tmp/abc.ogg").build();
        assert_eq!(track.to_string(), "abc");
        assert!(!track.cache_eligible());
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(0)), "0:00");
        assert_eq!(format_duration(Duration::from_secs(59)), "0:59");
        assert_eq!(format_duration(Duration::from_secs(600)), "10:00");
        assert_eq!(format_duration(Duration::from_secs(3_600)), "1:00:00");
        assert_eq!(format_duration(Duration::from_secs(90_061)), "1:01:01:01");
    }
}
