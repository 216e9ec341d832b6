use crate::query::normalize;
use crate::tui::app::{App, Mode};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap},
    Frame,
};

pub fn draw(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Query input
            Constraint::Min(10),   // Results / detail
            Constraint::Length(1), // Status bar
        ])
        .split(f.area());

    draw_query_input(f, app, chunks[0]);
    draw_main_area(f, app, chunks[1]);
    draw_status_bar(f, app, chunks[2]);

    if app.mode == Mode::Help {
        let area = f.area();
        draw_help(f, area);
    }
}

fn draw_query_input(f: &mut Frame, app: &App, area: Rect) {
    let filter = match app.section {
        Some(section) => format!(" [{}]", section),
        None => String::new(),
    };
    let input = Paragraph::new(app.query.as_str())
        .style(Style::default().fg(Color::Yellow))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!(" Symbol{} (Ctrl+T: kind, Enter: open, F1: help, Esc: quit) ", filter)),
        );

    f.render_widget(input, area);

    if app.mode == Mode::Search {
        let width = app.query.chars().count() as u16;
        f.set_cursor_position((area.x + width + 1, area.y + 1));
    }
}

fn draw_main_area(f: &mut Frame, app: &App, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(area);

    draw_results_list(f, app, chunks[0]);
    draw_detail(f, app, chunks[1]);
}

fn draw_results_list(f: &mut Frame, app: &App, area: Rect) {
    let needle = normalize(&app.query);

    let items: Vec<ListItem> = app
        .results
        .iter()
        .map(|hit| {
            let mut spans = highlight_match(&hit.display_label, &needle);
            if !hit.scope_description.is_empty() {
                spans.push(Span::raw("  "));
                spans.push(Span::styled(
                    hit.scope_description.clone(),
                    Style::default().fg(Color::Blue),
                ));
            }
            ListItem::new(Line::from(spans))
        })
        .collect();

    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!(" Results ({}) ", app.results.len())),
        )
        .highlight_style(
            Style::default()
                .bg(Color::DarkGray)
                .add_modifier(Modifier::BOLD),
        );

    let mut state = ListState::default();
    if !app.results.is_empty() {
        state.select(Some(app.selected));
    }
    f.render_stateful_widget(list, area, &mut state);
}

fn draw_detail(f: &mut Frame, app: &App, area: Rect) {
    let label_style = Style::default().fg(Color::DarkGray);

    let content = match app.get_selected_result() {
        Some(hit) => {
            let field = |name: &'static str, value: String, style: Style| {
                Line::from(vec![
                    Span::styled(format!("{:10}", name), label_style),
                    Span::styled(value, style),
                ])
            };
            let url = app.selected_url().unwrap_or_default();

            Text::from(vec![
                field("symbol", hit.display_label.clone(), Style::default().add_modifier(Modifier::BOLD)),
                field("scope", hit.scope_description.clone(), Style::default().fg(Color::Blue)),
                field("token", hit.token.clone(), Style::default()),
                field("match", hit.match_kind.to_string(), Style::default().fg(Color::Yellow)),
                field("sections", hit.sections.to_string(), Style::default()),
                Line::raw(""),
                field("anchor", hit.anchor_url.clone(), Style::default().fg(Color::Green)),
                field("resolved", url, Style::default().fg(Color::Green)),
            ])
        }
        None if app.is_loading() => Text::raw("Loading shards..."),
        None => Text::raw("No symbol selected"),
    };

    let detail = Paragraph::new(content)
        .block(Block::default().borders(Borders::ALL).title(" Detail "))
        .wrap(Wrap { trim: false });

    f.render_widget(detail, area);
}

fn draw_status_bar(f: &mut Frame, app: &App, area: Rect) {
    let status = Paragraph::new(app.status_message.as_str())
        .style(Style::default().fg(Color::Cyan));

    f.render_widget(status, area);
}

fn draw_help(f: &mut Frame, area: Rect) {
    let lines = [
        ("Type", "search incrementally"),
        ("Up/Down, Tab", "move selection"),
        ("PgUp/PgDn", "move by 10"),
        ("Ctrl+A / Ctrl+E", "first / last result"),
        ("Ctrl+T", "cycle kind filter"),
        ("Ctrl+W", "delete word"),
        ("Enter", "open anchor in $BROWSER"),
        ("Esc", "clear query, then quit"),
        ("Ctrl+C", "quit"),
    ];
    let text: Vec<Line> = lines
        .iter()
        .map(|(key, action)| {
            Line::from(vec![
                Span::styled(format!("{:18}", key), Style::default().fg(Color::Yellow)),
                Span::raw(*action),
            ])
        })
        .collect();

    let width = 50u16.min(area.width);
    let height = (lines.len() as u16 + 2).min(area.height);
    let popup = Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    };

    f.render_widget(Clear, popup);
    f.render_widget(
        Paragraph::new(Text::from(text)).block(Block::default().borders(Borders::ALL).title(" Help ")),
        popup,
    );
}

/// Split `text` into spans, highlighting the first case-insensitive
/// occurrence of `needle`
fn highlight_match(text: &str, needle: &str) -> Vec<Span<'static>> {
    // ASCII lowering keeps byte offsets aligned with `text`
    let found = if needle.is_empty() {
        None
    } else {
        text.to_ascii_lowercase().find(needle)
    };

    let Some(start) = found else {
        return vec![Span::raw(text.to_string())];
    };
    let end = start + needle.len();

    let mut spans = Vec::new();
    if start > 0 {
        spans.push(Span::raw(text[..start].to_string()));
    }
    spans.push(Span::styled(
        text[start..end].to_string(),
        Style::default()
            .fg(Color::Black)
            .bg(Color::Yellow)
            .add_modifier(Modifier::BOLD),
    ));
    if end < text.len() {
        spans.push(Span::raw(text[end..].to_string()));
    }
    spans
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_highlight_match() {
        let spans = highlight_match("TaggedCache", "cache");
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].content, "Tagged");
        assert_eq!(spans[1].content, "Cache");

        let spans = highlight_match("keep_alive", "zzz");
        assert_eq!(spans.len(), 1);
    }
}
