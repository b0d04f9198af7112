// Playback surfaces: they read the controller's snapshot and call its API.
// None of them holds playback state of its own.

use std::time::Duration;

use crate::audio::{PlaybackController, PlaybackSnapshot, PlaybackStatus, Sequencer, Track};

#[derive(Debug, Clone, PartialEq)]
pub struct InlineView {
    pub is_current: bool,
    pub is_playing: bool,
    pub is_loading: bool,
    /// The current attempt for this row failed.
    pub unavailable: bool,
    pub elapsed: Duration,
    pub duration: Option<Duration>,
    pub progress: f64,
}

/// Play button embedded in a list row.
#[derive(Debug, Clone)]
pub struct InlinePlayer {
    track: Track,
    probed_duration: Option<Duration>,
}

impl InlinePlayer {
    pub fn new(track: Track) -> Self {
        Self {
            track,
            probed_duration: None,
        }
    }

    pub fn track(&self) -> &Track {
        &self.track
    }

    pub fn view(&self, snapshot: &PlaybackSnapshot) -> InlineView {
        if snapshot.is_current(&self.track.source_url) {
            let duration = if snapshot.duration.is_zero() {
                self.display_duration()
            } else {
                Some(snapshot.duration)
            };
            InlineView {
                is_current: true,
                is_playing: snapshot.status == PlaybackStatus::Playing,
                is_loading: snapshot.status == PlaybackStatus::Loading,
                unavailable: snapshot.status == PlaybackStatus::Error,
                elapsed: snapshot.current_time,
                duration,
                progress: snapshot.progress(),
            }
        } else {
            InlineView {
                is_current: false,
                is_playing: false,
                is_loading: false,
                unavailable: false,
                elapsed: Duration::ZERO,
                duration: self.display_duration(),
                progress: 0.0,
            }
        }
    }

    fn display_duration(&self) -> Option<Duration> {
        self.track.duration_hint.or(self.probed_duration)
    }

    /// A row that is not playing and has no length to show may ask for a side probe.
    pub fn needs_probe(&self, snapshot: &PlaybackSnapshot) -> bool {
        !snapshot.is_current(&self.track.source_url)
            && self.track.duration_hint.is_none()
            && self.probed_duration.is_none()
    }

    pub fn set_probed_duration(&mut self, duration: Duration) {
        self.probed_duration = Some(duration);
    }

    pub fn press(&self, controller: &mut PlaybackController) {
        controller.play(&self.track);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MiniBarView {
    pub title: String,
    pub status: PlaybackStatus,
    pub elapsed: Duration,
    pub duration: Duration,
    pub progress: f64,
    pub volume: f32,
    pub error: Option<String>,
    pub volume_popover_open: bool,
}

/// Persistent "now playing" strip.
#[derive(Debug, Clone)]
pub struct MiniBar {
    volume_popover_open: bool,
    volume_step: f32,
}

impl MiniBar {
    pub fn new(volume_step: f32) -> Self {
        Self {
            volume_popover_open: false,
            volume_step,
        }
    }

    /// Hidden (None) while nothing is loaded.
    pub fn view(&self, snapshot: &PlaybackSnapshot) -> Option<MiniBarView> {
        let track = snapshot.current_track.as_ref()?;
        Some(MiniBarView {
            title: track.title.clone(),
            status: snapshot.status,
            elapsed: snapshot.current_time,
            duration: snapshot.duration,
            progress: snapshot.progress(),
            volume: snapshot.volume,
            error: snapshot.error.clone(),
            volume_popover_open: self.volume_popover_open,
        })
    }

    pub fn toggle(&self, controller: &mut PlaybackController) {
        controller.toggle_play_pause();
    }

    pub fn stop(&mut self, controller: &mut PlaybackController) {
        self.volume_popover_open = false;
        controller.stop_track();
    }

    pub fn toggle_volume_popover(&mut self) {
        self.volume_popover_open = !self.volume_popover_open;
    }

    pub fn is_volume_popover_open(&self) -> bool {
        self.volume_popover_open
    }

    pub fn nudge_volume(&self, controller: &mut PlaybackController, steps: i32) {
        let volume = controller.volume() + self.volume_step * steps as f32;
        controller.set_volume(volume);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FullPlayerView {
    pub title: Option<String>,
    pub status: PlaybackStatus,
    pub elapsed: Duration,
    pub duration: Duration,
    pub progress: f64,
    pub has_next: bool,
    pub has_previous: bool,
    /// 1-based position and length of the visible list.
    pub position: Option<(usize, usize)>,
    pub unavailable: bool,
}

/// Full player page with next/previous over the sequencer's current view.
#[derive(Clone)]
pub struct FullPlayer {
    sequencer: Sequencer,
    seek_step: Duration,
}

impl FullPlayer {
    pub fn new(sequencer: Sequencer, seek_step: Duration) -> Self {
        Self {
            sequencer,
            seek_step,
        }
    }

    pub fn sequencer(&self) -> &Sequencer {
        &self.sequencer
    }

    pub fn view(&self, snapshot: &PlaybackSnapshot) -> FullPlayerView {
        let view_len = self.sequencer.view().len();
        let position = self
            .sequencer
            .current_index(snapshot)
            .map(|idx| (idx + 1, view_len));

        FullPlayerView {
            title: snapshot.current_track.as_ref().map(|t| t.title.clone()),
            status: snapshot.status,
            elapsed: snapshot.current_time,
            duration: snapshot.duration,
            progress: snapshot.progress(),
            has_next: self.sequencer.has_next(snapshot),
            has_previous: self.sequencer.has_previous(snapshot),
            position,
            unavailable: snapshot.status == PlaybackStatus::Error,
        }
    }

    pub fn next(&self, controller: &mut PlaybackController) -> bool {
        self.sequencer.play_next(controller)
    }

    pub fn previous(&self, controller: &mut PlaybackController) -> bool {
        self.sequencer.play_previous(controller)
    }

    pub fn seek_by(&self, controller: &mut PlaybackController, forward: bool) {
        let current = controller.snapshot().current_time.as_secs_f64();
        let step = self.seek_step.as_secs_f64();
        let target = if forward { current + step } else { current - step };
        controller.seek_to(target);
    }
}
