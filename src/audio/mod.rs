pub mod catalog;
pub mod controller;
#[cfg(feature = "audio")]
pub mod player;
pub mod sequencer;
pub mod snapshot;
pub mod track;
pub mod transport;

pub use catalog::{Catalog, CatalogError};
pub use controller::{Advance, PlaybackController};
#[cfg(feature = "audio")]
pub use player::{probe_duration, RodioTransport};
pub use sequencer::{compute_view, Sequencer};
pub use snapshot::{NowPlaying, PlaybackSnapshot, PlaybackStatus};
pub use track::{Rendition, Track, TrackId};
pub use transport::{AttemptToken, Resource, Transport, TransportError, TransportEvent, TransportEventKind};
