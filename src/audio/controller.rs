use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use super::snapshot::{NowPlaying, PlaybackSnapshot, PlaybackStatus, SnapshotCell};
use super::track::Track;
use super::transport::{
    AttemptToken, EventSink, Resource, Transport, TransportEvent, TransportEventKind,
};

/// Answer from an end-of-track handler.
///
/// The handler is asked "can you continue from here?", not told "the track
/// ended". It returns the track to open next and the controller does the
/// opening itself.
#[derive(Debug, Clone, PartialEq)]
pub enum Advance {
    Next(Track),
    NoNext,
}

pub type OnEnded = Box<dyn FnMut(Option<&NowPlaying>) -> Advance>;

/// Owns the one shared playback resource and the snapshot every surface reads.
///
/// Events from the transport are tagged with the [`AttemptToken`] of the
/// `play_track` call that opened their resource; anything tagged with an
/// older token is dropped before it can touch state.
pub struct PlaybackController {
    transport: Box<dyn Transport>,
    resource: Option<Box<dyn Resource>>,
    token: AttemptToken,
    // set once the live resource reports metadata or position
    loaded: bool,
    volume: f32,
    snapshot: SnapshotCell,
    on_ended: Option<OnEnded>,
    events_tx: EventSink,
    events_rx: mpsc::UnboundedReceiver<TransportEvent>,
    // queued events kept across a seek, applied before the channel
    held: VecDeque<TransportEvent>,
}

impl PlaybackController {
    pub fn new(transport: Box<dyn Transport>, volume: f32) -> Self {
        let volume = if volume.is_nan() { 1.0 } else { volume.clamp(0.0, 1.0) };
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Self {
            transport,
            resource: None,
            token: AttemptToken::default(),
            loaded: false,
            volume,
            snapshot: SnapshotCell::new(PlaybackSnapshot::idle(volume)),
            on_ended: None,
            events_tx,
            events_rx,
            held: VecDeque::new(),
        }
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        self.snapshot.get()
    }

    pub fn subscribe(&self) -> watch::Receiver<PlaybackSnapshot> {
        self.snapshot.subscribe()
    }

    pub fn is_current(&self, source_url: &str) -> bool {
        self.snapshot.get().is_current(source_url)
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn play(&mut self, track: &Track) {
        self.play_track(track.title.clone(), track.source_url.clone());
    }

    /// Play `source_url`, or toggle pause/resume if it is already the current track.
    pub fn play_track(&mut self, title: impl Into<String>, source_url: impl Into<String>) {
        let title = title.into();
        let source_url = source_url.into();
        let current = self.snapshot.get();

        if current.is_current(&source_url) && self.resource.is_some() {
            match current.status {
                PlaybackStatus::Playing | PlaybackStatus::Loading => {
                    debug!("Same source requested while playing, pausing: {}", source_url);
                    self.pause_track();
                    return;
                }
                PlaybackStatus::Paused => {
                    debug!("Same source requested while paused, resuming: {}", source_url);
                    self.resume_track();
                    return;
                }
                PlaybackStatus::Idle | PlaybackStatus::Error => {}
            }
        }

        self.release_resource();
        self.token = self.token.next();
        self.loaded = false;
        let token = self.token;
        info!("Opening '{}' ({}) as attempt {:?}", title, source_url, token);

        self.snapshot.publish(PlaybackSnapshot {
            current_track: Some(NowPlaying {
                title,
                source_url: source_url.clone(),
            }),
            status: PlaybackStatus::Loading,
            current_time: Duration::ZERO,
            duration: Duration::ZERO,
            volume: self.volume,
            error: None,
        });

        match self.transport.open(&source_url, token, self.events_tx.clone()) {
            Ok(mut resource) => {
                resource.set_volume(self.volume);
                let started = resource.play();
                self.resource = Some(resource);
                if let Err(e) = started {
                    self.fail(e.to_string());
                }
            }
            Err(e) => self.fail(e.to_string()),
        }
    }

    pub fn pause_track(&mut self) {
        let status = self.snapshot.get().status;
        if !matches!(status, PlaybackStatus::Playing | PlaybackStatus::Loading) {
            return;
        }
        if let Some(resource) = self.resource.as_mut() {
            resource.pause();
            self.snapshot.update(|s| s.status = PlaybackStatus::Paused);
        }
    }

    /// Soft: a resource that refuses to resume leaves the status unchanged.
    pub fn resume_track(&mut self) {
        if self.snapshot.get().status != PlaybackStatus::Paused {
            return;
        }
        let Some(resource) = self.resource.as_mut() else {
            return;
        };
        match resource.play() {
            Ok(()) => {
                let status = if self.loaded {
                    PlaybackStatus::Playing
                } else {
                    PlaybackStatus::Loading
                };
                self.snapshot.update(|s| s.status = status);
            }
            Err(e) => warn!("Resume failed, staying paused: {}", e),
        }
    }

    pub fn toggle_play_pause(&mut self) {
        match self.snapshot.get().status {
            PlaybackStatus::Playing | PlaybackStatus::Loading => self.pause_track(),
            PlaybackStatus::Paused => self.resume_track(),
            PlaybackStatus::Idle | PlaybackStatus::Error => {}
        }
    }

    pub fn stop_track(&mut self) {
        self.release_resource();
        self.loaded = false;
        self.snapshot.publish(PlaybackSnapshot::idle(self.volume));
    }

    /// Seek to `seconds`, clamped to the known duration. Ignored while the duration is unknown.
    pub fn seek_to(&mut self, seconds: f64) {
        let snapshot = self.snapshot.get();
        if snapshot.current_track.is_none() || snapshot.duration.is_zero() || seconds.is_nan() {
            return;
        }
        let Some(resource) = self.resource.as_mut() else {
            return;
        };

        let target = Duration::from_secs_f64(seconds.clamp(0.0, snapshot.duration.as_secs_f64()));
        if let Err(e) = resource.seek(target) {
            warn!("Seek to {:?} failed: {}", target, e);
        }
        self.discard_queued_positions();
        // optimistic: the transport confirms through later time updates
        self.snapshot.update(|s| s.current_time = target);
    }

    pub fn set_volume(&mut self, volume: f32) {
        if volume.is_nan() {
            return;
        }
        self.volume = volume.clamp(0.0, 1.0);
        if let Some(resource) = self.resource.as_mut() {
            resource.set_volume(self.volume);
        }
        let volume = self.volume;
        self.snapshot.update(|s| s.volume = volume);
    }

    /// Install the end-of-track handler. Replaces any previous one.
    pub fn register_on_ended<F>(&mut self, handler: F)
    where
        F: FnMut(Option<&NowPlaying>) -> Advance + 'static,
    {
        self.on_ended = Some(Box::new(handler));
    }

    pub fn clear_on_ended(&mut self) {
        self.on_ended = None;
    }

    /// Apply every queued transport event. Returns how many were taken off the queue.
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        while let Some(event) = self.held.pop_front() {
            self.handle_event(event);
            handled += 1;
        }
        while let Ok(event) = self.events_rx.try_recv() {
            self.handle_event(event);
            handled += 1;
        }
        handled
    }

    pub fn handle_event(&mut self, event: TransportEvent) {
        if event.token != self.token || self.resource.is_none() {
            debug!(
                "Dropping stale {:?} from attempt {:?} (live attempt {:?})",
                event.kind, event.token, self.token
            );
            return;
        }

        match event.kind {
            TransportEventKind::MetadataLoaded { duration } => {
                self.loaded = true;
                self.snapshot.update(|s| {
                    s.duration = duration;
                    if s.status == PlaybackStatus::Loading {
                        s.status = PlaybackStatus::Playing;
                    }
                });
            }
            TransportEventKind::TimeUpdate { position } => {
                self.loaded = true;
                self.snapshot.update(|s| {
                    s.current_time = if s.duration.is_zero() {
                        position
                    } else {
                        position.min(s.duration)
                    };
                    if s.status == PlaybackStatus::Loading {
                        s.status = PlaybackStatus::Playing;
                    }
                });
            }
            TransportEventKind::Error(message) => self.fail(message),
            TransportEventKind::Ended => self.finish(),
        }
    }

    fn finish(&mut self) {
        self.release_resource();
        let finished = self.snapshot.get().current_track;

        let advance = match self.on_ended.as_mut() {
            Some(handler) => handler(finished.as_ref()),
            None => Advance::NoNext,
        };

        match advance {
            Advance::Next(track) => {
                info!("Auto-advancing to '{}'", track.title);
                self.play(&track);
            }
            Advance::NoNext => {
                info!("End of track with nothing queued, going idle");
                self.stop_track();
            }
        }
    }

    /// Current attempt failed: keep the track so surfaces can say which one.
    fn fail(&mut self, message: String) {
        warn!("Playback failed: {}", message);
        self.release_resource();
        self.snapshot.update(|s| {
            s.status = PlaybackStatus::Error;
            s.error = Some(message);
        });
    }

    /// Positions already queued were sampled before the seek and would pull
    /// the optimistic time back. Everything else stays queued in order.
    fn discard_queued_positions(&mut self) {
        while let Ok(event) = self.events_rx.try_recv() {
            if !matches!(event.kind, TransportEventKind::TimeUpdate { .. }) {
                self.held.push_back(event);
            }
        }
    }

    fn release_resource(&mut self) {
        if let Some(mut resource) = self.resource.take() {
            resource.release();
        }
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        self.release_resource();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::transport::mock::MockTransport;

    const URL_A: &str = "https://cdn.test/a.mp3";
    const URL_B: &str = "https://cdn.test/b.mp3";

    fn controller() -> (PlaybackController, MockTransport) {
        let transport = MockTransport::new();
        let controller = PlaybackController::new(Box::new(transport.clone()), 0.8);
        (controller, transport)
    }

    fn loaded(controller: &mut PlaybackController, transport: &MockTransport, url: &str, secs: u64) {
        transport.emit(
            url,
            TransportEventKind::MetadataLoaded {
                duration: Duration::from_secs(secs),
            },
        );
        controller.pump();
    }

    #[test]
    fn test_starts_idle() {
        let (controller, _) = controller();
        let snapshot = controller.snapshot();
        assert_eq!(snapshot.status, PlaybackStatus::Idle);
        assert!(snapshot.current_track.is_none());
        assert_eq!(snapshot.volume, 0.8);
    }

    #[test]
    fn test_play_goes_loading_then_playing() {
        let (mut controller, transport) = controller();
        controller.play_track("SongA", URL_A);
        assert_eq!(controller.snapshot().status, PlaybackStatus::Loading);

        loaded(&mut controller, &transport, URL_A, 120);
        let snapshot = controller.snapshot();
        assert_eq!(snapshot.status, PlaybackStatus::Playing);
        assert_eq!(snapshot.duration, Duration::from_secs(120));
        assert_eq!(transport.log.borrow().volumes, vec![0.8]);
    }

    #[test]
    fn test_single_owner_across_switches() {
        let (mut controller, transport) = controller();
        for url in [URL_A, URL_B, "https://cdn.test/c.mp3", URL_A] {
            controller.play_track("x", url);
        }
        let log = transport.log.borrow();
        assert_eq!(log.opened.len(), 4);
        assert_eq!(log.live, 1);
        assert_eq!(log.max_live, 1);
    }

    #[test]
    fn test_stale_error_is_dropped() {
        let (mut controller, transport) = controller();
        controller.play_track("SongA", URL_A);
        controller.play_track("SongB", URL_B);

        transport.emit(URL_A, TransportEventKind::Error("404".into()));
        transport.emit(
            URL_A,
            TransportEventKind::MetadataLoaded {
                duration: Duration::from_secs(99),
            },
        );
        assert_eq!(controller.pump(), 2);

        let snapshot = controller.snapshot();
        assert_eq!(snapshot.current_track.unwrap().title, "SongB");
        assert_eq!(snapshot.status, PlaybackStatus::Loading);
        assert_eq!(snapshot.error, None);
        assert_eq!(snapshot.duration, Duration::ZERO);
    }

    #[test]
    fn test_current_error_keeps_track() {
        let (mut controller, transport) = controller();
        controller.play_track("SongA", URL_A);
        transport.emit(URL_A, TransportEventKind::Error("decode failed".into()));
        controller.pump();

        let snapshot = controller.snapshot();
        assert_eq!(snapshot.status, PlaybackStatus::Error);
        assert_eq!(snapshot.error.as_deref(), Some("decode failed"));
        assert_eq!(snapshot.current_track.unwrap().source_url, URL_A);
        assert_eq!(transport.log.borrow().live, 0);
        // no automatic retry
        assert_eq!(transport.open_count(), 1);
    }

    #[test]
    fn test_open_failure_is_current_error() {
        let (mut controller, transport) = controller();
        transport.log.borrow_mut().fail_open = Some("no route".into());
        controller.play_track("SongA", URL_A);

        let snapshot = controller.snapshot();
        assert_eq!(snapshot.status, PlaybackStatus::Error);
        assert!(snapshot.error.unwrap().contains("no route"));
        assert_eq!(snapshot.current_track.unwrap().title, "SongA");
    }

    #[test]
    fn test_same_url_toggles_without_new_attempt() {
        let (mut controller, transport) = controller();
        controller.play_track("SongA", URL_A);
        loaded(&mut controller, &transport, URL_A, 120);
        let token = transport.last_token();

        controller.play_track("SongA", URL_A);
        assert_eq!(controller.snapshot().status, PlaybackStatus::Paused);
        controller.play_track("SongA", URL_A);
        assert_eq!(controller.snapshot().status, PlaybackStatus::Playing);

        assert_eq!(transport.open_count(), 1);
        assert_eq!(transport.last_token(), token);
    }

    #[test]
    fn test_same_url_after_error_reopens() {
        let (mut controller, transport) = controller();
        controller.play_track("SongA", URL_A);
        transport.emit(URL_A, TransportEventKind::Error("boom".into()));
        controller.pump();

        controller.play_track("SongA", URL_A);
        assert_eq!(transport.open_count(), 2);
        assert_eq!(controller.snapshot().status, PlaybackStatus::Loading);
        assert_eq!(controller.snapshot().error, None);
    }

    #[test]
    fn test_resume_failure_is_soft() {
        let (mut controller, transport) = controller();
        controller.play_track("SongA", URL_A);
        loaded(&mut controller, &transport, URL_A, 60);
        controller.pause_track();

        transport.log.borrow_mut().fail_play = true;
        controller.resume_track();
        let snapshot = controller.snapshot();
        assert_eq!(snapshot.status, PlaybackStatus::Paused);
        assert_eq!(snapshot.error, None);
    }

    #[test]
    fn test_idle_operations_are_noops() {
        let (mut controller, transport) = controller();
        controller.pause_track();
        controller.resume_track();
        controller.toggle_play_pause();
        controller.seek_to(10.0);
        assert_eq!(controller.snapshot(), PlaybackSnapshot::idle(0.8));
        assert!(transport.log.borrow().seeks.is_empty());
    }

    #[test]
    fn test_seek_clamps_to_duration() {
        let (mut controller, transport) = controller();
        controller.play_track("SongA", URL_A);

        // duration still unknown
        controller.seek_to(30.0);
        assert!(transport.log.borrow().seeks.is_empty());

        loaded(&mut controller, &transport, URL_A, 120);
        controller.seek_to(-5.0);
        assert_eq!(controller.snapshot().current_time, Duration::ZERO);
        controller.seek_to(500.0);
        assert_eq!(controller.snapshot().current_time, Duration::from_secs(120));
        assert_eq!(
            transport.log.borrow().seeks,
            vec![Duration::ZERO, Duration::from_secs(120)]
        );
    }

    #[test]
    fn test_seek_ignores_positions_queued_before_it() {
        let (mut controller, transport) = controller();
        controller.play_track("SongA", URL_A);
        loaded(&mut controller, &transport, URL_A, 120);

        transport.emit(URL_A, TransportEventKind::TimeUpdate { position: Duration::from_secs(10) });
        transport.emit(URL_A, TransportEventKind::Error("glitch".into()));
        controller.seek_to(60.0);
        assert_eq!(controller.snapshot().current_time, Duration::from_secs(60));

        // the error queued before the seek still lands, the old position does not
        assert_eq!(controller.pump(), 1);
        let snapshot = controller.snapshot();
        assert_eq!(snapshot.current_time, Duration::from_secs(60));
        assert_eq!(snapshot.status, PlaybackStatus::Error);
    }

    #[test]
    fn test_seek_then_later_positions_apply() {
        let (mut controller, transport) = controller();
        controller.play_track("SongA", URL_A);
        loaded(&mut controller, &transport, URL_A, 120);

        controller.seek_to(60.0);
        transport.emit(URL_A, TransportEventKind::TimeUpdate { position: Duration::from_secs(61) });
        controller.pump();
        assert_eq!(controller.snapshot().current_time, Duration::from_secs(61));
    }

    #[test]
    fn test_time_update_promotes_and_clamps() {
        let (mut controller, transport) = controller();
        controller.play_track("SongA", URL_A);

        // no duration yet: the raw position is shown and playback counts as started
        transport.emit(URL_A, TransportEventKind::TimeUpdate { position: Duration::from_secs(7) });
        controller.pump();
        let snapshot = controller.snapshot();
        assert_eq!(snapshot.status, PlaybackStatus::Playing);
        assert_eq!(snapshot.current_time, Duration::from_secs(7));

        loaded(&mut controller, &transport, URL_A, 120);
        transport.emit(URL_A, TransportEventKind::TimeUpdate { position: Duration::from_secs(130) });
        controller.pump();
        assert_eq!(controller.snapshot().current_time, Duration::from_secs(120));

        // a position arriving after pause does not flip the status back
        controller.pause_track();
        transport.emit(URL_A, TransportEventKind::TimeUpdate { position: Duration::from_secs(5) });
        controller.pump();
        let snapshot = controller.snapshot();
        assert_eq!(snapshot.status, PlaybackStatus::Paused);
        assert_eq!(snapshot.current_time, Duration::from_secs(5));
    }

    #[test]
    fn test_stale_ended_does_not_advance() {
        use std::cell::Cell;
        use std::rc::Rc;

        let (mut controller, transport) = controller();
        let asked = Rc::new(Cell::new(0));
        let counter = Rc::clone(&asked);
        controller.register_on_ended(move |_| {
            counter.set(counter.get() + 1);
            Advance::NoNext
        });

        controller.play_track("SongA", URL_A);
        controller.play_track("SongB", URL_B);
        transport.emit(URL_A, TransportEventKind::Ended);
        assert_eq!(controller.pump(), 1);

        let snapshot = controller.snapshot();
        assert_eq!(snapshot.current_track.unwrap().title, "SongB");
        assert_eq!(snapshot.status, PlaybackStatus::Loading);
        assert_eq!(asked.get(), 0);
        assert_eq!(transport.open_count(), 2);
        assert_eq!(transport.log.borrow().live, 1);
    }

    #[test]
    fn test_volume_clamps_and_persists() {
        let (mut controller, transport) = controller();
        controller.set_volume(1.7);
        assert_eq!(controller.snapshot().volume, 1.0);
        controller.set_volume(-0.2);
        assert_eq!(controller.volume(), 0.0);
        controller.set_volume(0.4);

        controller.play_track("SongA", URL_A);
        assert_eq!(transport.log.borrow().volumes.last().copied(), Some(0.4));
        assert_eq!(controller.snapshot().volume, 0.4);
    }

    #[test]
    fn test_stop_resets_to_idle() {
        let (mut controller, transport) = controller();
        controller.play_track("SongA", URL_A);
        loaded(&mut controller, &transport, URL_A, 120);
        controller.stop_track();

        assert_eq!(controller.snapshot(), PlaybackSnapshot::idle(0.8));
        assert_eq!(transport.log.borrow().live, 0);

        // late events from the stopped attempt change nothing
        transport.emit(URL_A, TransportEventKind::Error("late".into()));
        controller.pump();
        assert_eq!(controller.snapshot().status, PlaybackStatus::Idle);
    }

    #[test]
    fn test_end_without_handler_goes_idle() {
        let (mut controller, transport) = controller();
        controller.play_track("SongA", URL_A);
        loaded(&mut controller, &transport, URL_A, 120);
        transport.emit(URL_A, TransportEventKind::Ended);
        controller.pump();

        let snapshot = controller.snapshot();
        assert_eq!(snapshot.status, PlaybackStatus::Idle);
        assert!(snapshot.current_track.is_none());
    }

    #[test]
    fn test_last_registered_handler_wins() {
        use crate::audio::track::{Rendition, TrackId};

        let (mut controller, transport) = controller();
        let next = Track {
            id: TrackId::new("g", "f", "b.mp3"),
            group: "g".into(),
            rendition: Rendition::Primary,
            title: "SongB".into(),
            file_key: "b.mp3".into(),
            duration_hint: None,
            source_url: URL_B.into(),
        };
        controller.register_on_ended(|_| Advance::NoNext);
        controller.register_on_ended(move |finished| {
            assert_eq!(finished.unwrap().source_url, URL_A);
            Advance::Next(next.clone())
        });

        controller.play_track("SongA", URL_A);
        transport.emit(URL_A, TransportEventKind::Ended);
        controller.pump();

        let snapshot = controller.snapshot();
        assert_eq!(snapshot.current_track.unwrap().title, "SongB");
        assert_eq!(snapshot.status, PlaybackStatus::Loading);
        assert_eq!(transport.log.borrow().max_live, 1);
    }
}
