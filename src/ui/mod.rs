// Terminal UI - hosts the playback surfaces
// Surfaces are plain render models; ratatui only draws them

pub mod surfaces; // inline rows, mini bar, full player

#[cfg(all(feature = "tui", feature = "audio"))]
mod app; // main application state and event loop
#[cfg(feature = "tui")]
pub mod events; // keyboard event mapping

#[cfg(all(feature = "tui", feature = "audio"))]
pub use app::App;
#[cfg(feature = "tui")]
pub use events::AppEvent;
pub use surfaces::{FullPlayer, InlinePlayer, MiniBar};

#[cfg(feature = "tui")]
pub use terminal::TerminalManager;

#[cfg(feature = "tui")]
mod terminal {
    use anyhow::Result;
    use crossterm::{
        cursor, execute,
        terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    };
    use ratatui::{backend::CrosstermBackend, Frame, Terminal};
    use std::io;

    fn restore_terminal() {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen, cursor::Show);
    }

    /// Raw-mode alternate screen for the player; the shell gets its terminal back on drop.
    pub struct TerminalManager {
        terminal: Terminal<CrosstermBackend<io::Stdout>>,
    }

    impl TerminalManager {
        pub fn new() -> Result<Self> {
            // a previous crash may have left raw mode on
            restore_terminal();

            enable_raw_mode()?;
            let mut stdout = io::stdout();
            if let Err(e) = execute!(stdout, EnterAlternateScreen, cursor::Hide) {
                restore_terminal();
                return Err(e.into());
            }

            let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;
            terminal.clear()?;
            Ok(Self { terminal })
        }

        pub fn draw(&mut self, render: impl FnOnce(&mut Frame)) -> Result<()> {
            self.terminal.draw(render)?;
            Ok(())
        }
    }

    impl Drop for TerminalManager {
        fn drop(&mut self) {
            let _ = self.terminal.clear();
            restore_terminal();
        }
    }
}
