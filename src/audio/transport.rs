// The seam between the controller and whatever actually makes sound.
// Implementations may use threads internally but only talk back through EventSink.

use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

/// Tags one `play_track` attempt. Only the controller mints these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct AttemptToken(u64);

impl AttemptToken {
    pub(crate) fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransportEventKind {
    Ended,
    Error(String),
    MetadataLoaded { duration: Duration },
    TimeUpdate { position: Duration },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransportEvent {
    pub token: AttemptToken,
    pub kind: TransportEventKind,
}

pub type EventSink = mpsc::UnboundedSender<TransportEvent>;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to open {url}: {reason}")]
    Open { url: String, reason: String },
    #[error("failed to decode {url}: {reason}")]
    Decode { url: String, reason: String },
    #[error("unsupported source: {0}")]
    UnsupportedSource(String),
    #[error("resource already released")]
    Released,
    #[error("seek failed: {0}")]
    Seek(String),
    #[error("audio output unavailable: {0}")]
    Output(String),
}

/// Opens playback resources bound to a source URL.
pub trait Transport {
    /// Begin loading `source_url`. Every event the resource emits must carry `token`.
    fn open(
        &mut self,
        source_url: &str,
        token: AttemptToken,
        events: EventSink,
    ) -> Result<Box<dyn Resource>, TransportError>;
}

/// One open playback handle. Released exactly once by its owner.
pub trait Resource {
    fn play(&mut self) -> Result<(), TransportError>;
    fn pause(&mut self);
    fn seek(&mut self, position: Duration) -> Result<(), TransportError>;
    fn set_volume(&mut self, volume: f32);
    fn release(&mut self);
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Debug, Default)]
    pub(crate) struct MockLog {
        pub opened: Vec<(String, AttemptToken)>,
        pub live: usize,
        pub max_live: usize,
        pub seeks: Vec<Duration>,
        pub volumes: Vec<f32>,
        pub fail_open: Option<String>,
        pub fail_play: bool,
        sinks: Vec<(String, AttemptToken, EventSink)>,
    }

    /// Records every call and lets tests fire events as if they came from a given URL's resource.
    #[derive(Clone, Default)]
    pub(crate) struct MockTransport {
        pub log: Rc<RefCell<MockLog>>,
    }

    impl MockTransport {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        pub(crate) fn open_count(&self) -> usize {
            self.log.borrow().opened.len()
        }

        pub(crate) fn last_token(&self) -> AttemptToken {
            self.log.borrow().opened.last().map(|(_, t)| *t).unwrap_or_default()
        }

        /// Emit from the most recent resource opened for `url`.
        pub(crate) fn emit(&self, url: &str, kind: TransportEventKind) {
            let log = self.log.borrow();
            let (_, token, sink) = log
                .sinks
                .iter()
                .rev()
                .find(|(u, _, _)| u == url)
                .expect("no resource was opened for url");
            sink.send(TransportEvent { token: *token, kind }).unwrap();
        }
    }

    impl Transport for MockTransport {
        fn open(
            &mut self,
            source_url: &str,
            token: AttemptToken,
            events: EventSink,
        ) -> Result<Box<dyn Resource>, TransportError> {
            let mut log = self.log.borrow_mut();
            log.opened.push((source_url.to_string(), token));
            if let Some(reason) = log.fail_open.clone() {
                return Err(TransportError::Open {
                    url: source_url.to_string(),
                    reason,
                });
            }
            log.sinks.push((source_url.to_string(), token, events));
            log.live += 1;
            log.max_live = log.max_live.max(log.live);
            Ok(Box::new(MockResource {
                log: self.log.clone(),
                released: false,
            }))
        }
    }

    struct MockResource {
        log: Rc<RefCell<MockLog>>,
        released: bool,
    }

    impl Resource for MockResource {
        fn play(&mut self) -> Result<(), TransportError> {
            if self.log.borrow().fail_play {
                return Err(TransportError::Released);
            }
            Ok(())
        }

        fn pause(&mut self) {}

        fn seek(&mut self, position: Duration) -> Result<(), TransportError> {
            self.log.borrow_mut().seeks.push(position);
            Ok(())
        }

        fn set_volume(&mut self, volume: f32) {
            self.log.borrow_mut().volumes.push(volume);
        }

        fn release(&mut self) {
            if !self.released {
                self.released = true;
                self.log.borrow_mut().live -= 1;
            }
        }
    }
}
