use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    Quit,

    // Playback
    Activate,
    TogglePlayPause,
    NextTrack,
    PreviousTrack,
    Stop,
    SeekForward,
    SeekBackward,

    // Navigation
    Up,
    Down,
    ToggleGroup,

    // Volume
    VolumeUp,
    VolumeDown,
    ToggleVolumePopover,

    // Catalog
    SwitchRendition,
    EnterSearch,
    ExitSearch,
    SearchInput(char),
    SearchBackspace,
}

/// Map a key press to an app event. Search mode captures printable keys.
pub fn key_to_app_event(key: KeyEvent, search_mode: bool) -> Option<AppEvent> {
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return Some(AppEvent::Quit);
    }

    if search_mode {
        return match key.code {
            KeyCode::Esc | KeyCode::Enter => Some(AppEvent::ExitSearch),
            KeyCode::Backspace => Some(AppEvent::SearchBackspace),
            KeyCode::Char(c) => Some(AppEvent::SearchInput(c)),
            _ => None,
        };
    }

    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => Some(AppEvent::Quit),

        // Playback controls
        KeyCode::Enter => Some(AppEvent::Activate),
        KeyCode::Char(' ') => Some(AppEvent::TogglePlayPause),
        KeyCode::Char('n') => Some(AppEvent::NextTrack),
        KeyCode::Char('p') => Some(AppEvent::PreviousTrack),
        KeyCode::Char('s') => Some(AppEvent::Stop),
        KeyCode::Right => Some(AppEvent::SeekForward),
        KeyCode::Left => Some(AppEvent::SeekBackward),

        // Navigation
        KeyCode::Up | KeyCode::Char('k') => Some(AppEvent::Up),
        KeyCode::Down | KeyCode::Char('j') => Some(AppEvent::Down),
        KeyCode::Tab => Some(AppEvent::ToggleGroup),

        // Volume
        KeyCode::Char('+') | KeyCode::Char('=') => Some(AppEvent::VolumeUp),
        KeyCode::Char('-') => Some(AppEvent::VolumeDown),
        KeyCode::Char('v') => Some(AppEvent::ToggleVolumePopover),

        // Catalog
        KeyCode::Char('r') => Some(AppEvent::SwitchRendition),
        KeyCode::Char('/') => Some(AppEvent::EnterSearch),

        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn test_search_mode_captures_letters() {
        assert_eq!(
            key_to_app_event(key(KeyCode::Char('q')), true),
            Some(AppEvent::SearchInput('q'))
        );
        assert_eq!(key_to_app_event(key(KeyCode::Char('q')), false), Some(AppEvent::Quit));
        assert_eq!(key_to_app_event(key(KeyCode::Esc), true), Some(AppEvent::ExitSearch));
    }

    #[test]
    fn test_ctrl_c_always_quits() {
        let ctrl_c = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(key_to_app_event(ctrl_c, true), Some(AppEvent::Quit));
        assert_eq!(key_to_app_event(ctrl_c, false), Some(AppEvent::Quit));
    }
}
