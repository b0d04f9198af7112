use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Which source family a track is played from. Never mixed within one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rendition {
    #[default]
    Primary,
    Alternate,
}

impl Rendition {
    pub fn other(self) -> Self {
        match self {
            Rendition::Primary => Rendition::Alternate,
            Rendition::Alternate => Rendition::Primary,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Rendition::Primary => "original",
            Rendition::Alternate => "alternate",
        }
    }
}

/// Stable identity of a track: `{group}/{rendition folder}/{file key}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackId(String);

impl TrackId {
    pub fn new(group: &str, folder: &str, file_key: &str) -> Self {
        Self(format!("{}/{}/{}", group, folder, file_key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    pub id: TrackId,
    pub group: String,
    pub rendition: Rendition,
    pub title: String,
    pub file_key: String,
    pub duration_hint: Option<Duration>,
    pub source_url: String,
}

impl Track {
    /// Identity check used by every surface; never compares by reference.
    pub fn is_same(&self, other: &Track) -> bool {
        self.id == other.id
    }

    pub fn duration_seconds(&self) -> Option<u64> {
        self.duration_hint.map(|d| d.as_secs())
    }

    pub fn display_duration(&self) -> String {
        self.duration_hint
            .map(format_duration)
            .unwrap_or_else(|| "--:--".to_string())
    }
}

/// Parse a catalog time hint: `m:ss`, `h:mm:ss` or bare seconds.
pub fn parse_time_hint(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let mut total: u64 = 0;
    let parts: Vec<&str> = raw.split(':').collect();
    if parts.len() > 3 {
        return None;
    }
    for (i, part) in parts.iter().enumerate() {
        let value: u64 = part.trim().parse().ok()?;
        // minutes/seconds after the leading field must stay below 60
        if i > 0 && value >= 60 {
            return None;
        }
        total = total * 60 + value;
    }
    Some(Duration::from_secs(total))
}

pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}
