use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink, Source};
use std::fs;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

use super::transport::{
    AttemptToken, EventSink, Resource, Transport, TransportError, TransportEvent,
    TransportEventKind,
};

/// Where a source URL actually lives.
#[derive(Debug, Clone, PartialEq)]
enum SourceLocation {
    Local(PathBuf),
    Remote(String),
}

impl SourceLocation {
    fn parse(url: &str) -> Result<Self, TransportError> {
        if let Some(path) = url.strip_prefix("file://") {
            return Ok(SourceLocation::Local(PathBuf::from(path)));
        }
        if url.starts_with("http://") || url.starts_with("https://") {
            if cfg!(feature = "remote") {
                return Ok(SourceLocation::Remote(url.to_string()));
            }
            return Err(TransportError::UnsupportedSource(format!(
                "{} (built without the `remote` feature)",
                url
            )));
        }
        if url.contains("://") {
            return Err(TransportError::UnsupportedSource(url.to_string()));
        }
        Ok(SourceLocation::Local(PathBuf::from(url)))
    }

    fn fetch(&self) -> Result<Vec<u8>, TransportError> {
        match self {
            SourceLocation::Local(path) => fs::read(path).map_err(|e| TransportError::Open {
                url: path.display().to_string(),
                reason: e.to_string(),
            }),
            SourceLocation::Remote(url) => fetch_remote(url),
        }
    }
}

#[cfg(feature = "remote")]
fn fetch_remote(url: &str) -> Result<Vec<u8>, TransportError> {
    reqwest::blocking::get(url)
        .and_then(|response| response.error_for_status())
        .and_then(|response| response.bytes())
        .map(|bytes| bytes.to_vec())
        .map_err(|e| TransportError::Open {
            url: url.to_string(),
            reason: e.to_string(),
        })
}

#[cfg(not(feature = "remote"))]
fn fetch_remote(url: &str) -> Result<Vec<u8>, TransportError> {
    Err(TransportError::UnsupportedSource(url.to_string()))
}

fn decode(url: &str, bytes: Vec<u8>) -> Result<Decoder<Cursor<Vec<u8>>>, TransportError> {
    Decoder::new(Cursor::new(bytes)).map_err(|e| TransportError::Decode {
        url: url.to_string(),
        reason: e.to_string(),
    })
}

/// Read a track's length from a throwaway decoder. Never touches the shared output.
pub fn probe_duration(source_url: &str) -> Result<Option<Duration>, TransportError> {
    let bytes = SourceLocation::parse(source_url)?.fetch()?;
    Ok(decode(source_url, bytes)?.total_duration())
}

/// Plays through the default output device with one rodio `Sink` per resource.
pub struct RodioTransport {
    _stream: OutputStream,
    stream_handle: OutputStreamHandle,
    poll_interval: Duration,
}

impl RodioTransport {
    pub fn new(poll_interval: Duration) -> Result<Self, TransportError> {
        let (stream, stream_handle) =
            OutputStream::try_default().map_err(|e| TransportError::Output(e.to_string()))?;

        Ok(Self {
            _stream: stream,
            stream_handle,
            poll_interval,
        })
    }
}

impl Transport for RodioTransport {
    fn open(
        &mut self,
        source_url: &str,
        token: AttemptToken,
        events: EventSink,
    ) -> Result<Box<dyn Resource>, TransportError> {
        let location = SourceLocation::parse(source_url)?;
        let sink = Sink::try_new(&self.stream_handle)
            .map_err(|e| TransportError::Output(e.to_string()))?;
        let sink = Arc::new(sink);
        let released = Arc::new(AtomicBool::new(false));

        let loader = Loader {
            url: source_url.to_string(),
            location,
            token,
            sink: Arc::clone(&sink),
            released: Arc::clone(&released),
            events,
            poll_interval: self.poll_interval,
        };
        thread::Builder::new()
            .name("rehearsal-loader".to_string())
            .spawn(move || loader.run())
            .map_err(|e| TransportError::Output(e.to_string()))?;

        Ok(Box::new(RodioResource { sink, released }))
    }
}

/// Fetches and decodes off the UI thread, then reports position until the sink drains.
struct Loader {
    url: String,
    location: SourceLocation,
    token: AttemptToken,
    sink: Arc<Sink>,
    released: Arc<AtomicBool>,
    events: EventSink,
    poll_interval: Duration,
}

impl Loader {
    fn emit(&self, kind: TransportEventKind) -> bool {
        self.events
            .send(TransportEvent {
                token: self.token,
                kind,
            })
            .is_ok()
    }

    fn run(self) {
        let decoder = match self
            .location
            .fetch()
            .and_then(|bytes| decode(&self.url, bytes))
        {
            Ok(decoder) => decoder,
            Err(e) => {
                if !self.released.load(Ordering::Acquire) {
                    self.emit(TransportEventKind::Error(e.to_string()));
                }
                return;
            }
        };

        if self.released.load(Ordering::Acquire) {
            debug!("Resource for {} released before it finished loading", self.url);
            return;
        }

        let duration = decoder.total_duration().unwrap_or_default();
        self.sink.append(decoder);
        if !self.emit(TransportEventKind::MetadataLoaded { duration }) {
            return;
        }

        loop {
            thread::sleep(self.poll_interval);
            if self.released.load(Ordering::Acquire) {
                break;
            }
            if self.sink.empty() {
                self.emit(TransportEventKind::Ended);
                break;
            }
            if !self.sink.is_paused()
                && !self.emit(TransportEventKind::TimeUpdate {
                    position: self.sink.get_pos(),
                })
            {
                break;
            }
        }
    }
}

struct RodioResource {
    sink: Arc<Sink>,
    released: Arc<AtomicBool>,
}

impl Resource for RodioResource {
    fn play(&mut self) -> Result<(), TransportError> {
        if self.released.load(Ordering::Acquire) {
            return Err(TransportError::Released);
        }
        self.sink.play();
        Ok(())
    }

    fn pause(&mut self) {
        self.sink.pause();
    }

    fn seek(&mut self, position: Duration) -> Result<(), TransportError> {
        self.sink
            .try_seek(position)
            .map_err(|e| TransportError::Seek(format!("{:?}", e)))
    }

    fn set_volume(&mut self, volume: f32) {
        self.sink.set_volume(volume);
    }

    fn release(&mut self) {
        if !self.released.swap(true, Ordering::AcqRel) {
            self.sink.stop();
        }
    }
}

impl Drop for RodioResource {
    fn drop(&mut self) {
        if !self.released.load(Ordering::Acquire) {
            warn!("Playback resource dropped without release");
            self.release();
        }
    }
}
