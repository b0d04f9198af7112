use super::events::{key_to_app_event, AppEvent};
use super::surfaces::{FullPlayer, FullPlayerView, InlinePlayer, InlineView, MiniBar, MiniBarView};
use super::TerminalManager;
use crate::audio::track::format_duration;
use crate::audio::{
    probe_duration, Catalog, PlaybackController, PlaybackSnapshot, PlaybackStatus, RodioTransport,
    Sequencer,
};
use crate::config::Config;
use anyhow::Result;
use crossterm::event::{self, Event, KeyEventKind};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Gauge, List, ListItem, ListState, Paragraph},
    Frame,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

const STATUS_TTL: Duration = Duration::from_secs(3);

/// One visible line of the track list.
#[derive(Debug, Clone, PartialEq)]
enum Entry {
    Group {
        name: String,
        expanded: bool,
        count: usize,
    },
    Row(usize),
}

type ProbeResult = (String, Option<Duration>);

pub struct App {
    terminal: TerminalManager,
    controller: PlaybackController,
    snapshot_rx: watch::Receiver<PlaybackSnapshot>,
    snapshot: PlaybackSnapshot,

    // Surfaces
    player: FullPlayer,
    mini_bar: MiniBar,
    rows: Vec<InlinePlayer>,

    // Side probes for rows without a duration hint
    probed: HashMap<String, Duration>,
    probes_requested: HashSet<String>,
    probe_tx: mpsc::UnboundedSender<ProbeResult>,
    probe_rx: mpsc::UnboundedReceiver<ProbeResult>,

    // UI state
    list_state: ListState,
    search_mode: bool,
    should_quit: bool,
    status_message: Option<(String, Instant)>,
    tick: Duration,
}

impl App {
    pub fn new(config: &Config, catalog: Arc<Catalog>) -> Result<Self> {
        let transport = RodioTransport::new(config.playback.position_poll_interval())?;
        let mut controller = PlaybackController::new(Box::new(transport), config.playback.volume);

        let sequencer = Sequencer::new(catalog, config.playback.initial_rendition);
        sequencer.attach(&mut controller);

        let snapshot_rx = controller.subscribe();
        let snapshot = controller.snapshot();
        let (probe_tx, probe_rx) = mpsc::unbounded_channel();
        let terminal = TerminalManager::new()?;

        let mut app = Self {
            terminal,
            controller,
            snapshot_rx,
            snapshot,
            player: FullPlayer::new(
                sequencer,
                Duration::from_secs(config.playback.seek_step_seconds),
            ),
            mini_bar: MiniBar::new(config.ui.volume_step),
            rows: Vec::new(),
            probed: HashMap::new(),
            probes_requested: HashSet::new(),
            probe_tx,
            probe_rx,
            list_state: ListState::default(),
            search_mode: false,
            should_quit: false,
            status_message: None,
            tick: Duration::from_millis(config.ui.tick_ms),
        };
        app.rebuild_rows();
        Ok(app)
    }

    pub async fn run(&mut self) -> Result<()> {
        info!("Player surfaces ready with {} visible tracks", self.rows.len());

        while !self.should_quit {
            if event::poll(Duration::from_millis(50))? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press {
                        if let Some(app_event) = key_to_app_event(key, self.search_mode) {
                            self.handle_event(app_event);
                        }
                    }
                }
            }

            // Transport events, then whatever snapshot they produced
            self.controller.pump();
            self.sync_snapshot();
            self.drain_probes();

            self.render()?;
            sleep(self.tick).await;
        }

        self.controller.stop_track();
        Ok(())
    }

    fn handle_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::Quit => self.should_quit = true,
            AppEvent::Activate => match self.selected_entry() {
                Some(Entry::Group { name, .. }) => self.toggle_group(&name),
                Some(Entry::Row(idx)) => self.rows[idx].press(&mut self.controller),
                None => {}
            },
            AppEvent::TogglePlayPause => {
                if self.controller.snapshot().current_track.is_some() {
                    self.mini_bar.toggle(&mut self.controller);
                } else if let Some(Entry::Row(idx)) = self.selected_entry() {
                    self.rows[idx].press(&mut self.controller);
                }
            }
            AppEvent::NextTrack => {
                if !self.player.next(&mut self.controller) {
                    self.set_status("Nothing after this track");
                }
            }
            AppEvent::PreviousTrack => {
                if !self.player.previous(&mut self.controller) {
                    self.set_status("Nothing before this track");
                }
            }
            AppEvent::Stop => self.mini_bar.stop(&mut self.controller),
            AppEvent::SeekForward => self.player.seek_by(&mut self.controller, true),
            AppEvent::SeekBackward => self.player.seek_by(&mut self.controller, false),
            AppEvent::Up => self.move_selection(-1),
            AppEvent::Down => self.move_selection(1),
            AppEvent::ToggleGroup => {
                let group = match self.selected_entry() {
                    Some(Entry::Group { name, .. }) => Some(name),
                    Some(Entry::Row(idx)) => Some(self.rows[idx].track().group.clone()),
                    None => None,
                };
                if let Some(group) = group {
                    self.toggle_group(&group);
                }
            }
            AppEvent::VolumeUp => self.mini_bar.nudge_volume(&mut self.controller, 1),
            AppEvent::VolumeDown => self.mini_bar.nudge_volume(&mut self.controller, -1),
            AppEvent::ToggleVolumePopover => self.mini_bar.toggle_volume_popover(),
            AppEvent::SwitchRendition => {
                let sequencer = self.player.sequencer().clone();
                let next = sequencer.rendition().other();
                sequencer.set_rendition(next, &mut self.controller);
                self.rebuild_rows();
                self.set_status(&format!("Rendition: {}", next.label()));
            }
            AppEvent::EnterSearch => self.search_mode = true,
            AppEvent::ExitSearch => self.search_mode = false,
            AppEvent::SearchInput(c) => {
                let sequencer = self.player.sequencer();
                let mut search = sequencer.search();
                search.push(c);
                sequencer.set_search(search);
                self.rebuild_rows();
            }
            AppEvent::SearchBackspace => {
                let sequencer = self.player.sequencer();
                let mut search = sequencer.search();
                search.pop();
                sequencer.set_search(search);
                self.rebuild_rows();
            }
        }
    }

    fn sync_snapshot(&mut self) {
        if !self.snapshot_rx.has_changed().unwrap_or(false) {
            return;
        }
        let next = self.snapshot_rx.borrow_and_update().clone();

        if next.status == PlaybackStatus::Error && self.snapshot.status != PlaybackStatus::Error {
            if let Some(track) = &next.current_track {
                self.set_status(&format!("Unavailable: {}", track.title));
            }
        }
        if next.current_track.is_none() && self.snapshot.current_track.is_some() {
            debug!("Playback returned to idle");
        }
        self.snapshot = next;
    }

    fn rebuild_rows(&mut self) {
        let probed = &self.probed;
        self.rows = self
            .player
            .sequencer()
            .view()
            .into_iter()
            .map(|track| {
                let mut row = InlinePlayer::new(track);
                if let Some(duration) = probed.get(&row.track().source_url) {
                    row.set_probed_duration(*duration);
                }
                row
            })
            .collect();
        self.clamp_selection();
    }

    fn entries(&self) -> Vec<Entry> {
        let sequencer = self.player.sequencer();
        let mut entries = Vec::new();
        let mut start = 0;

        while start < self.rows.len() {
            let group = self.rows[start].track().group.clone();
            let end = self.rows[start..]
                .iter()
                .position(|row| row.track().group != group)
                .map(|offset| start + offset)
                .unwrap_or(self.rows.len());

            let expanded = sequencer.is_expanded(&group);
            entries.push(Entry::Group {
                name: group,
                expanded,
                count: end - start,
            });
            if expanded {
                entries.extend((start..end).map(Entry::Row));
            }
            start = end;
        }
        entries
    }

    fn selected_entry(&self) -> Option<Entry> {
        let selected = self.list_state.selected()?;
        self.entries().into_iter().nth(selected)
    }

    fn toggle_group(&mut self, name: &str) {
        self.player.sequencer().toggle_group(name);
        // keep the cursor on the group header
        if let Some(idx) = self
            .entries()
            .iter()
            .position(|e| matches!(e, Entry::Group { name: n, .. } if n == name))
        {
            self.list_state.select(Some(idx));
        }
    }

    fn clamp_selection(&mut self) {
        let len = self.entries().len();
        match self.list_state.selected() {
            _ if len == 0 => self.list_state.select(None),
            Some(selected) if selected >= len => self.list_state.select(Some(len - 1)),
            None => self.list_state.select(Some(0)),
            Some(_) => {}
        }
    }

    fn move_selection(&mut self, delta: i32) {
        let len = self.entries().len();
        if len == 0 {
            return;
        }
        let current = self.list_state.selected().unwrap_or(0) as i32;
        let next = (current + delta).clamp(0, len as i32 - 1) as usize;
        self.list_state.select(Some(next));
        self.request_probe();
    }

    /// Probe the highlighted row's length on a throwaway decoder, once per source.
    fn request_probe(&mut self) {
        let Some(Entry::Row(idx)) = self.selected_entry() else {
            return;
        };
        let row = &self.rows[idx];
        if !row.needs_probe(&self.snapshot) {
            return;
        }
        let url = row.track().source_url.clone();
        if !self.probes_requested.insert(url.clone()) {
            return;
        }

        spawn_probe(url, self.probe_tx.clone());
    }

    fn drain_probes(&mut self) {
        while let Ok((url, duration)) = self.probe_rx.try_recv() {
            let Some(duration) = duration else {
                continue;
            };
            self.probed.insert(url.clone(), duration);
            for row in self.rows.iter_mut().filter(|r| r.track().source_url == url) {
                row.set_probed_duration(duration);
            }
        }
    }

    fn set_status(&mut self, message: &str) {
        self.status_message = Some((message.to_string(), Instant::now()));
    }

    fn render(&mut self) -> Result<()> {
        let sequencer = self.player.sequencer();
        let header = format!(
            " Rendition: {}   Search: {}{}",
            sequencer.rendition().label(),
            sequencer.search(),
            if self.search_mode { "_" } else { "" }
        );

        let items: Vec<ListItem<'static>> = self
            .entries()
            .into_iter()
            .map(|entry| match entry {
                Entry::Group {
                    name,
                    expanded,
                    count,
                } => ListItem::new(Line::from(Span::styled(
                    format!("{} {} ({})", if expanded { "▾" } else { "▸" }, name, count),
                    Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                ))),
                Entry::Row(idx) => {
                    let row = &self.rows[idx];
                    row_item(&row.track().title, &row.view(&self.snapshot))
                }
            })
            .collect();

        let full = self.player.view(&self.snapshot);
        let mini = self.mini_bar.view(&self.snapshot);
        let status = match &self.status_message {
            Some((message, at)) if at.elapsed() < STATUS_TTL => message.clone(),
            _ => "↑↓ select  ⏎ play  space pause  n/p next/prev  ←→ seek  +/- vol  v volume  / search  r rendition  tab fold  q quit".to_string(),
        };
        let mut list_state = self.list_state.clone();

        self.terminal.draw(|f| {
            draw_screen(f, &header, items, &full, mini.as_ref(), &status, &mut list_state);
        })?;

        self.list_state = list_state;
        Ok(())
    }
}

/// Read a source's length on tokio's blocking pool and report it back, `None` on failure.
fn spawn_probe(url: String, tx: mpsc::UnboundedSender<ProbeResult>) -> JoinHandle<()> {
    tokio::task::spawn_blocking(move || {
        let duration = match probe_duration(&url) {
            Ok(duration) => duration,
            Err(e) => {
                warn!("Duration probe failed for {}: {}", url, e);
                None
            }
        };
        let _ = tx.send((url, duration));
    })
}

fn row_item(title: &str, view: &InlineView) -> ListItem<'static> {
    let (glyph, style) = if view.unavailable {
        ("✖", Style::default().fg(Color::Red))
    } else if view.is_playing {
        ("▶", Style::default().fg(Color::Green).add_modifier(Modifier::BOLD))
    } else if view.is_loading {
        ("…", Style::default().fg(Color::Yellow))
    } else if view.is_current {
        ("⏸", Style::default().fg(Color::Yellow))
    } else {
        (" ", Style::default())
    };

    let timing = match (view.is_current, view.duration) {
        (true, Some(total)) => format!("{} / {}", format_duration(view.elapsed), format_duration(total)),
        (false, Some(total)) => format_duration(total),
        (_, None) => "--:--".to_string(),
    };
    let suffix = if view.unavailable { "  unavailable" } else { "" };

    ListItem::new(Line::from(vec![
        Span::styled(format!("  {} ", glyph), style),
        Span::styled(format!("{:<48}", title), style),
        Span::raw(timing),
        Span::styled(suffix.to_string(), Style::default().fg(Color::Red)),
    ]))
}

fn draw_screen(
    f: &mut Frame,
    header: &str,
    items: Vec<ListItem<'static>>,
    full: &FullPlayerView,
    mini: Option<&MiniBarView>,
    status: &str,
    list_state: &mut ListState,
) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(5),
            Constraint::Length(6),
            Constraint::Length(3),
            Constraint::Length(1),
        ])
        .split(f.area());

    let header = Paragraph::new(header.to_string())
        .block(Block::default().borders(Borders::ALL).title(" Rehearsal "));
    f.render_widget(header, chunks[0]);

    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(" Tracks "))
        .highlight_style(Style::default().bg(Color::DarkGray));
    f.render_stateful_widget(list, chunks[1], list_state);

    draw_full_player(f, chunks[2], full);
    draw_mini_bar(f, chunks[3], mini);

    f.render_widget(
        Paragraph::new(status.to_string()).style(Style::default().fg(Color::Gray)),
        chunks[4],
    );

    if let Some(view) = mini.filter(|m| m.volume_popover_open) {
        let area = popover_rect(chunks[1]);
        f.render_widget(Clear, area);
        let gauge = Gauge::default()
            .block(Block::default().borders(Borders::ALL).title(" Volume "))
            .gauge_style(Style::default().fg(Color::Magenta))
            .ratio(f64::from(view.volume).clamp(0.0, 1.0))
            .label(format!("{}%", (view.volume * 100.0).round() as u32));
        f.render_widget(gauge, area);
    }
}

fn draw_full_player(f: &mut Frame, area: Rect, view: &FullPlayerView) {
    let block = Block::default().borders(Borders::ALL).title(" Player ");
    let inner = block.inner(area);
    f.render_widget(block, area);

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(2), Constraint::Length(1), Constraint::Min(0)])
        .split(inner);

    let title = view.title.clone().unwrap_or_else(|| "Nothing playing".to_string());
    let position = view
        .position
        .map(|(idx, len)| format!("  ({} of {})", idx, len))
        .unwrap_or_default();
    let enabled = |on: bool| {
        if on {
            Style::default().fg(Color::White)
        } else {
            Style::default().fg(Color::DarkGray)
        }
    };
    let mut lines = vec![Line::from(vec![
        Span::styled(title, Style::default().add_modifier(Modifier::BOLD)),
        Span::raw(position),
    ])];
    lines.push(Line::from(vec![
        Span::styled("[p] previous", enabled(view.has_previous)),
        Span::raw("   "),
        Span::styled("[n] next", enabled(view.has_next)),
        Span::styled(
            if view.unavailable { "   this track is unavailable" } else { "" },
            Style::default().fg(Color::Red),
        ),
    ]));
    f.render_widget(Paragraph::new(lines), rows[0]);

    let label = if view.duration.is_zero() {
        format_duration(view.elapsed)
    } else {
        format!("{} / {}", format_duration(view.elapsed), format_duration(view.duration))
    };
    let gauge = Gauge::default()
        .gauge_style(Style::default().fg(Color::Green))
        .ratio(view.progress)
        .label(label);
    f.render_widget(gauge, rows[1]);
}

fn draw_mini_bar(f: &mut Frame, area: Rect, view: Option<&MiniBarView>) {
    let line = match view {
        Some(view) => {
            let glyph = match view.status {
                PlaybackStatus::Playing => "▶",
                PlaybackStatus::Paused => "⏸",
                PlaybackStatus::Loading => "…",
                PlaybackStatus::Error => "✖",
                PlaybackStatus::Idle => "■",
            };
            let mut spans = vec![
                Span::styled(format!(" {} ", glyph), Style::default().fg(Color::Green)),
                Span::styled(view.title.clone(), Style::default().add_modifier(Modifier::BOLD)),
                Span::raw(format!(
                    "  {} / {}  vol {}%",
                    format_duration(view.elapsed),
                    format_duration(view.duration),
                    (view.volume * 100.0).round() as u32
                )),
            ];
            if let Some(error) = &view.error {
                spans.push(Span::styled(
                    format!("  unavailable: {}", error),
                    Style::default().fg(Color::Red),
                ));
            }
            Line::from(spans)
        }
        None => Line::from(Span::styled(
            " Nothing playing",
            Style::default().fg(Color::DarkGray),
        )),
    };

    f.render_widget(
        Paragraph::new(line).block(Block::default().borders(Borders::ALL).title(" Now playing ")),
        area,
    );
}

fn popover_rect(area: Rect) -> Rect {
    let width = area.width.min(40);
    let height = area.height.min(3);
    Rect::new(
        area.x + (area.width.saturating_sub(width)) / 2,
        area.y + (area.height.saturating_sub(height)) / 2,
        width,
        height,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_failed_length_read_reports_none() {
        let dir = tempfile::tempdir().unwrap();
        let url = dir.path().join("missing.mp3").display().to_string();
        let (tx, mut rx) = mpsc::unbounded_channel();

        spawn_probe(url.clone(), tx).await.unwrap();
        assert_eq!(rx.recv().await, Some((url, None)));
    }

    #[test]
    fn test_popover_fits_inside_small_areas() {
        let area = Rect::new(0, 0, 20, 2);
        let popover = popover_rect(area);
        assert_eq!(popover, Rect::new(0, 0, 20, 2));

        let centered = popover_rect(Rect::new(0, 0, 80, 20));
        assert_eq!(centered, Rect::new(20, 8, 40, 3));
    }
}
