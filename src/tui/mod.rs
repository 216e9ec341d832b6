mod app;
mod ui;

use anyhow::Result;
use app::App;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io;
use std::path::PathBuf;
use std::time::Duration;

/// Run the interactive search UI until the user quits
pub fn run(
    index_dirs: Vec<PathBuf>,
    patterns: Vec<String>,
    lazy: bool,
    limit: Option<usize>,
    initial_query: Option<String>,
) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;

    // Shards load in the background; the UI is usable immediately
    let mut app = App::new(index_dirs, patterns, lazy, limit);
    if let Some(query) = initial_query {
        // Executed once loading completes
        app.set_query(&query);
    }

    let result = run_app(&mut terminal, &mut app);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

fn run_app(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, app: &mut App) -> Result<()> {
    loop {
        app.poll_index_load();

        terminal.draw(|f| ui::draw(f, app))?;

        if !event::poll(Duration::from_millis(100))? {
            continue;
        }

        // Only handle presses; some platforms also report releases
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }

        match (key.modifiers, key.code) {
            (KeyModifiers::CONTROL, KeyCode::Char('c')) => return Ok(()),
            (KeyModifiers::CONTROL, KeyCode::Char('q')) => return Ok(()),
            _ => {}
        }

        if app.mode == app::Mode::Help {
            // Any key closes help
            app.hide_help();
            continue;
        }

        match (key.modifiers, key.code) {
            (KeyModifiers::CONTROL, KeyCode::Char('j'))
            | (KeyModifiers::CONTROL, KeyCode::Char('n')) => app.select_next(),
            (KeyModifiers::CONTROL, KeyCode::Char('k'))
            | (KeyModifiers::CONTROL, KeyCode::Char('p')) => app.select_prev(),
            (KeyModifiers::CONTROL, KeyCode::Char('d')) => app.select_page_down(),
            (KeyModifiers::CONTROL, KeyCode::Char('u')) => app.select_page_up(),
            (KeyModifiers::CONTROL, KeyCode::Char('a')) => app.select_first(),
            (KeyModifiers::CONTROL, KeyCode::Char('e')) => app.select_last(),
            (KeyModifiers::CONTROL, KeyCode::Char('w')) => app.delete_word(),
            (KeyModifiers::CONTROL, KeyCode::Char('h')) => app.backspace(),
            (KeyModifiers::CONTROL, KeyCode::Char('t')) => app.cycle_section(),
            (KeyModifiers::NONE | KeyModifiers::SHIFT, code) => match code {
                KeyCode::Esc => {
                    if app.query.is_empty() {
                        return Ok(());
                    }
                    app.clear_query();
                }
                KeyCode::Enter => app.open_selected(),
                KeyCode::Down | KeyCode::Tab => app.select_next(),
                KeyCode::Up | KeyCode::BackTab => app.select_prev(),
                KeyCode::PageDown => app.select_page_down(),
                KeyCode::PageUp => app.select_page_up(),
                KeyCode::Char(c) => app.push_char(c),
                KeyCode::Backspace => app.backspace(),
                KeyCode::F(1) => app.show_help(),
                _ => {}
            },
            _ => {}
        }
    }
}
