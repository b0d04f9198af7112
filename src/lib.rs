// Rehearsal - rehearsal track player library
// One shared playback resource, many surfaces reading its snapshot

pub mod audio;  // controller, race guard, sequencer, transports
pub mod config; // settings and preferences
pub mod ui;     // playback surfaces and terminal host

pub use audio::{
    Advance, Catalog, PlaybackController, PlaybackSnapshot, PlaybackStatus, Rendition, Sequencer,
    Track,
};
pub use config::Config;
