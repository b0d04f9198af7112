use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;
use std::sync::Arc;
use tracing::{debug, info};

use super::catalog::{fold_text, Catalog};
use super::controller::{Advance, PlaybackController};
use super::snapshot::PlaybackSnapshot;
use super::track::{Rendition, Track};

/// The ordered, filtered list the full player shows and auto-advance walks.
///
/// Groups keep catalog order, tracks inside a group stay alphabetical. The
/// search only removes items, it never ranks them.
pub fn compute_view(catalog: &Catalog, rendition: Rendition, search: &str) -> Vec<Track> {
    let needle = fold_text(search.trim());
    catalog
        .groups()
        .iter()
        .flat_map(|group| catalog.tracks(group, rendition))
        .filter(|track| needle.is_empty() || fold_text(&track.title).contains(&needle))
        .collect()
}

fn position_of(view: &[Track], source_url: Option<&str>) -> Option<usize> {
    let url = source_url?;
    view.iter().position(|t| t.source_url == url)
}

// A current track outside the view counts as "before the first item".
fn next_in(view: &[Track], source_url: Option<&str>) -> Option<Track> {
    match position_of(view, source_url) {
        Some(idx) => view.get(idx + 1).cloned(),
        None => view.first().cloned(),
    }
}

fn previous_in(view: &[Track], source_url: Option<&str>) -> Option<Track> {
    match position_of(view, source_url) {
        Some(idx) if idx > 0 => view.get(idx - 1).cloned(),
        _ => None,
    }
}

struct SequencerState {
    catalog: Arc<Catalog>,
    rendition: Rendition,
    search: String,
    collapsed: HashSet<String>,
}

impl SequencerState {
    fn view(&self) -> Vec<Track> {
        compute_view(&self.catalog, self.rendition, &self.search)
    }
}

/// Playlist logic behind the full player. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Sequencer {
    state: Rc<RefCell<SequencerState>>,
}

impl Sequencer {
    pub fn new(catalog: Arc<Catalog>, rendition: Rendition) -> Self {
        Self {
            state: Rc::new(RefCell::new(SequencerState {
                catalog,
                rendition,
                search: String::new(),
                collapsed: HashSet::new(),
            })),
        }
    }

    pub fn catalog(&self) -> Arc<Catalog> {
        Arc::clone(&self.state.borrow().catalog)
    }

    pub fn rendition(&self) -> Rendition {
        self.state.borrow().rendition
    }

    pub fn search(&self) -> String {
        self.state.borrow().search.clone()
    }

    pub fn set_search(&self, text: impl Into<String>) {
        let text = text.into();
        debug!("Search set to '{}'", text);
        self.state.borrow_mut().search = text;
    }

    pub fn view(&self) -> Vec<Track> {
        self.state.borrow().view()
    }

    pub fn current_index(&self, snapshot: &PlaybackSnapshot) -> Option<usize> {
        let url = snapshot.current_track.as_ref().map(|t| t.source_url.as_str());
        position_of(&self.view(), url)
    }

    pub fn next_track(&self, snapshot: &PlaybackSnapshot) -> Option<Track> {
        let url = snapshot.current_track.as_ref().map(|t| t.source_url.as_str());
        next_in(&self.view(), url)
    }

    pub fn previous_track(&self, snapshot: &PlaybackSnapshot) -> Option<Track> {
        let url = snapshot.current_track.as_ref().map(|t| t.source_url.as_str());
        previous_in(&self.view(), url)
    }

    pub fn has_next(&self, snapshot: &PlaybackSnapshot) -> bool {
        self.next_track(snapshot).is_some()
    }

    pub fn has_previous(&self, snapshot: &PlaybackSnapshot) -> bool {
        self.previous_track(snapshot).is_some()
    }

    /// Register auto-advance with the controller. The handler reads the
    /// sequencer's state at end-of-track time, so a search typed after the
    /// track started is honored.
    pub fn attach(&self, controller: &mut PlaybackController) {
        let state = Rc::clone(&self.state);
        controller.register_on_ended(move |finished| {
            let view = state.borrow().view();
            let Some(finished) = finished else {
                return Advance::NoNext;
            };
            match next_in(&view, Some(finished.source_url.as_str())) {
                Some(track) => Advance::Next(track),
                None => Advance::NoNext,
            }
        });
    }

    pub fn play_next(&self, controller: &mut PlaybackController) -> bool {
        match self.next_track(&controller.snapshot()) {
            Some(track) => {
                controller.play(&track);
                true
            }
            None => false,
        }
    }

    pub fn play_previous(&self, controller: &mut PlaybackController) -> bool {
        match self.previous_track(&controller.snapshot()) {
            Some(track) => {
                controller.play(&track);
                true
            }
            None => false,
        }
    }

    /// Switch source family. Stops whatever is playing and does not resume.
    pub fn set_rendition(&self, rendition: Rendition, controller: &mut PlaybackController) {
        if self.rendition() == rendition {
            return;
        }
        controller.stop_track();
        self.state.borrow_mut().rendition = rendition;
        info!("Switched rendition to {}", rendition.label());
    }

    pub fn toggle_group(&self, name: &str) {
        let mut state = self.state.borrow_mut();
        if !state.collapsed.remove(name) {
            state.collapsed.insert(name.to_string());
        }
    }

    pub fn is_expanded(&self, name: &str) -> bool {
        !self.state.borrow().collapsed.contains(name)
    }
}
