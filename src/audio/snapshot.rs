use std::time::Duration;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackStatus {
    #[default]
    Idle,
    Loading,
    Playing,
    Paused,
    Error,
}

/// What the controller was last asked to play.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NowPlaying {
    pub title: String,
    pub source_url: String,
}

/// The externally observable playback state. Published whole on every
/// transition; surfaces never see a half-updated value.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackSnapshot {
    pub current_track: Option<NowPlaying>,
    pub status: PlaybackStatus,
    pub current_time: Duration,
    pub duration: Duration,
    pub volume: f32,
    pub error: Option<String>,
}

impl PlaybackSnapshot {
    pub fn idle(volume: f32) -> Self {
        Self {
            current_track: None,
            status: PlaybackStatus::Idle,
            current_time: Duration::ZERO,
            duration: Duration::ZERO,
            volume,
            error: None,
        }
    }

    pub fn is_current(&self, source_url: &str) -> bool {
        self.current_track
            .as_ref()
            .is_some_and(|t| t.source_url == source_url)
    }

    pub fn is_playing(&self) -> bool {
        self.status == PlaybackStatus::Playing
    }

    pub fn has_error(&self) -> bool {
        self.status == PlaybackStatus::Error
    }

    /// Elapsed fraction in `0.0..=1.0`, zero while the duration is unknown.
    pub fn progress(&self) -> f64 {
        if self.duration.is_zero() {
            return 0.0;
        }
        (self.current_time.as_secs_f64() / self.duration.as_secs_f64()).clamp(0.0, 1.0)
    }
}

/// Single-slot publisher; subscribers always read the latest snapshot.
pub(crate) struct SnapshotCell {
    tx: watch::Sender<PlaybackSnapshot>,
}

impl SnapshotCell {
    pub(crate) fn new(initial: PlaybackSnapshot) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    pub(crate) fn get(&self) -> PlaybackSnapshot {
        self.tx.borrow().clone()
    }

    pub(crate) fn publish(&self, next: PlaybackSnapshot) {
        // send_replace succeeds even with no live receivers
        self.tx.send_replace(next);
    }

    pub(crate) fn update(&self, f: impl FnOnce(&mut PlaybackSnapshot)) {
        let mut next = self.get();
        f(&mut next);
        self.publish(next);
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<PlaybackSnapshot> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribers_see_replacements() {
        let cell = SnapshotCell::new(PlaybackSnapshot::idle(0.5));
        let mut rx = cell.subscribe();
        assert!(!rx.has_changed().unwrap());

        cell.update(|s| s.status = PlaybackStatus::Loading);
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().status, PlaybackStatus::Loading);
    }

    #[test]
    fn test_progress_without_duration() {
        let mut snapshot = PlaybackSnapshot::idle(1.0);
        assert_eq!(snapshot.progress(), 0.0);
        snapshot.duration = Duration::from_secs(100);
        snapshot.current_time = Duration::from_secs(25);
        assert!((snapshot.progress() - 0.25).abs() < f64::EPSILON);
    }
}
