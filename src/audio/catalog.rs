use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};
use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

use super::track::{parse_time_hint, Rendition, Track, TrackId};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse catalog: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("catalog has no groups")]
    Empty,
    #[error("duplicate group name '{0}' in catalog")]
    DuplicateGroup(String),
    #[error("group '{group}' lists '{file_key}' more than once")]
    DuplicateTrack { group: String, file_key: String },
}

/// Extensions the rodio decoders in this build can open.
const PLAYABLE_EXTENSIONS: &[&str] = &["mp3", "flac", "ogg", "oga", "wav", "m4a", "mp4", "aac"];

fn has_playable_extension(file_key: &str) -> bool {
    Path::new(file_key)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| PLAYABLE_EXTENSIONS.iter().any(|p| p.eq_ignore_ascii_case(ext)))
}

fn default_primary_folder() -> String {
    "original".to_string()
}

fn default_alternate_folder() -> String {
    "alternate".to_string()
}

/// On-disk shape of `catalog.toml`.
#[derive(Debug, Deserialize)]
struct CatalogFile {
    base_url: String,
    #[serde(default = "default_primary_folder")]
    primary_folder: String,
    #[serde(default = "default_alternate_folder")]
    alternate_folder: String,
    #[serde(default)]
    groups: Vec<GroupFile>,
}

#[derive(Debug, Deserialize)]
struct GroupFile {
    name: String,
    #[serde(default)]
    tracks: Vec<EntryFile>,
}

#[derive(Debug, Deserialize)]
struct EntryFile {
    title: String,
    time: Option<String>,
    file_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub title: String,
    pub duration_hint: Option<Duration>,
    pub file_key: String,
}

#[derive(Debug, Clone)]
pub struct Group {
    pub name: String,
    /// Alphabetical by folded title, ties broken by file key.
    entries: Vec<CatalogEntry>,
}

impl Group {
    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }
}

/// Static, build-time-known list of playable items, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Catalog {
    base_url: String,
    primary_folder: String,
    alternate_folder: String,
    groups: Vec<Group>,
}

impl Catalog {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let catalog = Self::from_toml_str(&content)?;
        info!(
            "Loaded catalog from {}: {} groups, {} entries",
            path.display(),
            catalog.groups.len(),
            catalog.len()
        );
        Ok(catalog)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = toml::from_str(content)?;
        if file.groups.is_empty() {
            return Err(CatalogError::Empty);
        }
        if file.groups.len() < 2 {
            warn!("Catalog has a single group; grouping will be trivial");
        }

        let mut seen = HashSet::new();
        let mut groups = Vec::with_capacity(file.groups.len());
        for group in file.groups {
            if !seen.insert(group.name.clone()) {
                return Err(CatalogError::DuplicateGroup(group.name));
            }
            // one file per group; the source URL is the track's identity
            let mut keys = HashSet::new();
            if let Some(entry) = group.tracks.iter().find(|e| !keys.insert(e.file_key.as_str())) {
                return Err(CatalogError::DuplicateTrack {
                    group: group.name.clone(),
                    file_key: entry.file_key.clone(),
                });
            }

            let mut entries: Vec<CatalogEntry> = group
                .tracks
                .into_iter()
                .map(|entry| {
                    if !has_playable_extension(&entry.file_key) {
                        warn!("'{}' has an unrecognised audio extension", entry.file_key);
                    }
                    let duration_hint = entry.time.as_deref().and_then(|raw| {
                        let parsed = parse_time_hint(raw);
                        if parsed.is_none() {
                            warn!("Ignoring unparsable time '{}' for '{}'", raw, entry.title);
                        }
                        parsed
                    });
                    CatalogEntry {
                        title: entry.title,
                        duration_hint,
                        file_key: entry.file_key,
                    }
                })
                .collect();
            entries.sort_by(|a, b| {
                fold_text(&a.title)
                    .cmp(&fold_text(&b.title))
                    .then_with(|| a.file_key.cmp(&b.file_key))
            });

            groups.push(Group {
                name: group.name,
                entries,
            });
        }

        Ok(Self {
            base_url: file.base_url,
            primary_folder: file.primary_folder,
            alternate_folder: file.alternate_folder,
            groups,
        })
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    pub fn len(&self) -> usize {
        self.groups.iter().map(|g| g.entries.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn folder(&self, rendition: Rendition) -> &str {
        match rendition {
            Rendition::Primary => &self.primary_folder,
            Rendition::Alternate => &self.alternate_folder,
        }
    }

    pub fn source_url(&self, group: &str, rendition: Rendition, file_key: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            self.base_url.trim_end_matches('/'),
            group.trim_matches('/'),
            self.folder(rendition).trim_matches('/'),
            file_key.trim_start_matches('/')
        )
    }

    /// One group's tracks in a rendition, already in display order.
    pub fn tracks(&self, group: &Group, rendition: Rendition) -> Vec<Track> {
        let folder = self.folder(rendition);
        group
            .entries
            .iter()
            .map(|entry| Track {
                id: TrackId::new(&group.name, folder, &entry.file_key),
                group: group.name.clone(),
                rendition,
                title: entry.title.clone(),
                file_key: entry.file_key.clone(),
                duration_hint: entry.duration_hint,
                source_url: self.source_url(&group.name, rendition, &entry.file_key),
            })
            .collect()
    }
}

/// Case- and diacritic-insensitive form used for both sorting and search.
pub fn fold_text(text: &str) -> String {
    text.nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .collect()
}

#[cfg(test)]
pub(crate) const SAMPLE_CATALOG: &str = r#"
base_url = "https://cdn.example.org/audio/"
primary_folder = "mp3"
alternate_folder = "midi"

[[groups]]
name = "choir"

[[groups.tracks]]
title = "Ubi Caritas"
time = "2:40"
file_key = "ubi.mp3"

[[groups.tracks]]
title = "Ave Verum"
time = "3:05"
file_key = "ave.mp3"

[[groups.tracks]]
title = "Écoute la pluie"
file_key = "ecoute.mp3"

[[groups]]
name = "quartet"

[[groups.tracks]]
title = "Zadok the Priest"
time = "5:30"
file_key = "zadok.mp3"

[[groups.tracks]]
title = "Amazing Grace"
time = "bogus"
file_key = "grace.mp3"
"#;
