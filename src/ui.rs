use crate::app::App;
use crate::braille::BrailleCanvas;
use crate::chat::Speaker;
use crate::controller::{AnalysisText, SelectedRegion};
use crate::economy::{scale, trend, CountryRecord};
use crate::map::GlobeLayers;
use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Sparkline, Widget, Wrap},
    Frame,
};

const ATMOSPHERE: Color = Color::Rgb(0x3b, 0x82, 0xf6);
const TITLE: Color = Color::Rgb(0x60, 0xa5, 0xfa);
const RANK: Color = Color::Rgb(0x93, 0xc5, 0xfd);
const INSIGHT: Color = Color::Rgb(0xd8, 0xb4, 0xfe);
const POSITIVE: Color = Color::Rgb(0x4a, 0xde, 0x80);
const NEGATIVE: Color = Color::Rgb(0xf8, 0x71, 0x71);
const WELCOME: &str = "Click on any country to explore its economy";

/// Screen regions for one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Screen {
    pub globe: Rect,
    /// Drawable globe area inside the border
    pub globe_inner: Rect,
    pub panel: Option<Rect>,
    pub status: Rect,
}

/// Split the terminal: globe (left), detail panel (right, when open), status bar.
pub fn layout(area: Rect, panel_open: bool) -> Screen {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(1)])
        .split(area);

    let (globe, panel) = if panel_open {
        let panel_width = (area.width * 2 / 5).clamp(30, 56).min(area.width);
        let cols = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Min(0), Constraint::Length(panel_width)])
            .split(rows[0]);
        (cols[0], Some(cols[1]))
    } else {
        (rows[0], None)
    };

    Screen {
        globe,
        globe_inner: globe_block().inner(globe),
        panel,
        status: rows[1],
    }
}

/// Render the UI
pub fn render(frame: &mut Frame, app: &App) {
    let screen = layout(frame.area(), app.panel_open());

    render_globe(frame, app, &screen);
    if let Some(panel) = screen.panel {
        if let Some(selected) = app.controller.selected() {
            render_panel(frame, app, selected, panel);
        }
    }
    render_status_bar(frame, app, screen.status);
}

fn globe_block() -> Block<'static> {
    Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(Line::from(vec![
            Span::styled(" GlobalGDP", Style::default().fg(Color::White).add_modifier(Modifier::BOLD)),
            Span::styled(".ai ", Style::default().fg(TITLE).add_modifier(Modifier::BOLD)),
        ]))
        .title(
            Line::from(Span::styled(
                " Real-time Economic Intelligence ",
                Style::default().fg(Color::DarkGray),
            ))
            .alignment(Alignment::Right),
        )
}

fn render_globe(frame: &mut Frame, app: &App, screen: &Screen) {
    let inner = screen.globe_inner;
    frame.render_widget(globe_block(), screen.globe);

    // Braille gives 2x4 resolution per character
    let mut viewport = app.viewport.clone();
    viewport.set_size(inner.width as usize * 2, inner.height as usize * 4);

    let layers = app.renderer.render(
        inner.width as usize,
        inner.height as usize,
        &viewport,
        app.hovered(),
        app.selected_idx(),
    );
    frame.render_widget(GlobeWidget { layers }, inner);

    if !app.renderer.has_data() {
        let notice = Paragraph::new("Boundary data unavailable")
            .style(Style::default().fg(Color::DarkGray))
            .alignment(Alignment::Center);
        frame.render_widget(notice, Rect { y: inner.y, height: 1.min(inner.height), ..inner });
    }

    render_legend(frame, inner);

    if app.show_welcome() && !app.panel_open() {
        render_welcome(frame, inner);
    }
}

/// Braille globe, one canvas per color, drawn back to front
struct GlobeWidget {
    layers: GlobeLayers,
}

impl GlobeWidget {
    fn render_layer(canvas: &BrailleCanvas, color: Color, area: Rect, buf: &mut Buffer) {
        let (width, height) = canvas.size();
        for cy in 0..height.min(area.height as usize) {
            for cx in 0..width.min(area.width as usize) {
                if let Some(ch) = canvas.glyph(cx, cy) {
                    let x = area.x + cx as u16;
                    let y = area.y + cy as u16;
                    buf[(x, y)].set_char(ch).set_fg(color);
                }
            }
        }
    }
}

impl Widget for GlobeWidget {
    fn render(self, area: Rect, buf: &mut Buffer) {
        Self::render_layer(&self.layers.limb, ATMOSPHERE, area, buf);
        Self::render_layer(&self.layers.neutral, scale::NEUTRAL, area, buf);
        for (canvas, palette) in self.layers.buckets.iter().zip(scale::PALETTE) {
            Self::render_layer(canvas, palette, area, buf);
        }
        Self::render_layer(&self.layers.selected, Color::Yellow, area, buf);
        Self::render_layer(&self.layers.hover, Color::White, area, buf);
    }
}

fn render_legend(frame: &mut Frame, globe: Rect) {
    let height = scale::LEGEND.len() as u16 + 3;
    let width = 24;
    if globe.width < width + 2 || globe.height < height + 2 {
        return;
    }
    let area = Rect::new(globe.x + 1, globe.y + globe.height - height - 1, width, height);

    let lines: Vec<Line> = scale::LEGEND
        .iter()
        .map(|&(label, bucket)| {
            Line::from(vec![
                Span::styled("● ", Style::default().fg(scale::PALETTE[bucket])),
                Span::raw(label),
            ])
        })
        .collect();

    let legend = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray))
            .title(Span::styled(
                " GDP Scale (Billions) ",
                Style::default().fg(Color::Gray).add_modifier(Modifier::BOLD),
            )),
    );
    frame.render_widget(Clear, area);
    frame.render_widget(legend, area);
}

fn render_welcome(frame: &mut Frame, globe: Rect) {
    let width = WELCOME.len() as u16 + 4;
    if globe.width < width || globe.height < 6 {
        return;
    }
    let area = Rect::new(
        globe.x + (globe.width - width) / 2,
        globe.y + globe.height - 4,
        width,
        3,
    );
    let hint = Paragraph::new(WELCOME)
        .alignment(Alignment::Center)
        .style(Style::default().fg(Color::White).add_modifier(Modifier::BOLD))
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::DarkGray)));
    frame.render_widget(Clear, area);
    frame.render_widget(hint, area);
}

fn render_panel(frame: &mut Frame, app: &App, selected: &SelectedRegion, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(
            Line::from(Span::styled(" esc ✕ ", Style::default().fg(Color::DarkGray)))
                .alignment(Alignment::Right),
        );
    let inner = block.inner(area);
    frame.render_widget(Clear, area);
    frame.render_widget(block, area);

    let trend_height = if selected.record.is_some() { 6 } else { 0 };
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),            // Header
            Constraint::Length(4),            // Stats
            Constraint::Length(trend_height), // Trend
            Constraint::Fill(3),              // AI insight
            Constraint::Fill(2),              // Chat transcript
            Constraint::Length(3),            // Input
        ])
        .split(inner);

    render_header(frame, selected, chunks[0]);
    render_stats(frame, selected.record, chunks[1]);
    if let Some(record) = selected.record {
        render_trend(frame, record, chunks[2]);
    }
    render_insight(frame, app, selected, chunks[3]);
    render_chat(frame, app, selected, chunks[4]);
    render_input(frame, app, selected, chunks[5]);
}

fn render_header(frame: &mut Frame, selected: &SelectedRegion, area: Rect) {
    let mut lines = vec![Line::from(Span::styled(
        selected.region_name.clone(),
        Style::default().fg(TITLE).add_modifier(Modifier::BOLD),
    ))];
    let mut detail = Vec::new();
    if let Some(record) = selected.record {
        detail.push(Span::styled(format!("RANK #{}", record.rank), Style::default().fg(RANK)));
        detail.push(Span::raw("  "));
    }
    if !selected.iso_code.is_empty() {
        detail.push(Span::styled(selected.iso_code.clone(), Style::default().fg(Color::DarkGray)));
    }
    lines.push(Line::from(detail));
    frame.render_widget(Paragraph::new(lines), area);
}

fn render_stats(frame: &mut Frame, record: Option<&CountryRecord>, area: Rect) {
    let label = Style::default().fg(Color::Gray);
    let value = Style::default().fg(Color::White).add_modifier(Modifier::BOLD);
    let na = || Span::styled("N/A", value);

    let (gdp, growth, population) = match record {
        Some(r) => {
            let growth_color = if r.gdp_growth_percent >= 0.0 { POSITIVE } else { NEGATIVE };
            (
                Span::styled(format_gdp(r.gdp_billions_usd), value),
                Span::styled(format_growth(r.gdp_growth_percent), value.fg(growth_color)),
                Span::styled(format_population(r.population), value),
            )
        }
        None => (na(), na(), na()),
    };

    let lines = vec![
        Line::from(vec![Span::styled("GDP (EST)    ", label), gdp]),
        Line::from(vec![Span::styled("GROWTH       ", label), growth]),
        Line::from(vec![Span::styled("POPULATION   ", label), population]),
    ];
    frame.render_widget(Paragraph::new(lines), area);
}

fn render_trend(frame: &mut Frame, record: &CountryRecord, area: Rect) {
    let history = trend::mock_history(record);
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Min(1), Constraint::Length(1)])
        .split(area);

    frame.render_widget(
        Paragraph::new(Span::styled(
            "5-YEAR TREND (EST.)",
            Style::default().fg(Color::Gray).add_modifier(Modifier::BOLD),
        )),
        rows[0],
    );

    let column = (rows[1].width as usize / history.len().max(1)).max(1);
    let bars = trend_bars(&history, column);
    frame.render_widget(
        Sparkline::default().data(bars).style(Style::default().fg(ATMOSPHERE)),
        rows[1],
    );

    let years: String = history
        .iter()
        .map(|(year, _)| format!("{:<width$}", year, width = column))
        .collect();
    frame.render_widget(
        Paragraph::new(Span::styled(years, Style::default().fg(Color::DarkGray))),
        rows[2],
    );
}

fn render_insight(frame: &mut Frame, app: &App, selected: &SelectedRegion, area: Rect) {
    let mut lines = vec![Line::from(Span::styled(
        "✦ AI Economic Insight",
        Style::default().fg(INSIGHT).add_modifier(Modifier::BOLD),
    ))];

    match app.controller.analysis() {
        AnalysisText::Loading => lines.push(Line::from(Span::styled(
            format!("Analyzing {}'s economy...", selected.region_name),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        ))),
        AnalysisText::Ready(text) => lines.extend(
            markdown_lines(text)
                .into_iter()
                .map(|line| Line::from(Span::styled(line, Style::default().fg(Color::Gray)))),
        ),
        AnalysisText::Empty => {}
    }

    let insight = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .scroll((app.analysis_scroll, 0));
    frame.render_widget(insight, area);
}

fn render_chat(frame: &mut Frame, app: &App, selected: &SelectedRegion, area: Rect) {
    let width = area.width.saturating_sub(1).max(1) as usize;
    let mut lines = vec![Line::from(Span::styled(
        format!("Ask about {}", selected.region_name),
        Style::default().fg(Color::Gray).add_modifier(Modifier::BOLD),
    ))];

    let turns = app.controller.transcript().turns();
    for (idx, turn) in turns.iter().enumerate() {
        let (prefix, style) = match turn.speaker {
            Speaker::User => ("you ▸ ", Style::default().fg(TITLE)),
            Speaker::Assistant => ("ai  ▸ ", Style::default().fg(Color::Gray)),
        };
        let pending = app.controller.is_streaming() && idx + 1 == turns.len() && turn.text.is_empty();
        let text = if pending { "…".to_string() } else { markdown_lines(&turn.text).join("\n") };

        for (line_idx, wrapped) in wrap_text(&text, width.saturating_sub(prefix.chars().count()).max(1))
            .into_iter()
            .enumerate()
        {
            let lead = if line_idx == 0 { prefix } else { "      " };
            lines.push(Line::from(vec![
                Span::styled(lead, style.add_modifier(Modifier::BOLD)),
                Span::styled(wrapped, style),
            ]));
        }
    }

    // Keep the newest turns in view
    let overflow = lines.len().saturating_sub(area.height as usize);
    let visible: Vec<Line> = if overflow > 0 {
        lines.into_iter().skip(overflow).collect()
    } else {
        lines
    };
    frame.render_widget(Paragraph::new(visible), area);
}

fn render_input(frame: &mut Frame, app: &App, selected: &SelectedRegion, area: Rect) {
    let busy = app.controller.is_streaming();
    let border = if busy { Color::DarkGray } else { ATMOSPHERE };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border));
    let inner = block.inner(area);

    let content = if app.input.is_empty() {
        Span::styled(
            format!("Ask about {}'s economy...", selected.region_name),
            Style::default().fg(Color::DarkGray),
        )
    } else {
        // Show the tail when the input is wider than the box
        let max = inner.width.saturating_sub(1) as usize;
        let skip = app.input.chars().count().saturating_sub(max);
        Span::raw(app.input.chars().skip(skip).collect::<String>())
    };
    frame.render_widget(Paragraph::new(content).block(block), area);

    if !busy && inner.width > 0 {
        let typed = (app.input.chars().count() as u16).min(inner.width.saturating_sub(1));
        frame.set_cursor_position((inner.x + typed, inner.y));
    }
}

fn render_status_bar(frame: &mut Frame, app: &App, area: Rect) {
    let dim = Style::default().fg(Color::DarkGray);
    let mut spans = vec![
        Span::styled(" Zoom: ", dim),
        Span::styled(app.zoom_level(), Style::default().fg(Color::Yellow)),
        Span::styled(" | ", dim),
        Span::styled(app.center_coords(), Style::default().fg(Color::Cyan)),
    ];

    if let Some(region) = app.hovered().and_then(|idx| app.renderer.region(idx)) {
        spans.push(Span::styled(" | ", dim));
        spans.push(Span::styled(
            format!("{} ({})", region.display_name, region.iso_code),
            Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
        ));
        match crate::economy::lookup(&region.iso_code) {
            Some(record) => {
                let growth = if record.gdp_growth_percent >= 0.0 { POSITIVE } else { NEGATIVE };
                spans.push(Span::styled(
                    format!(" GDP: {}", format_gdp(record.gdp_billions_usd)),
                    Style::default().fg(RANK),
                ));
                spans.push(Span::styled(
                    format!(" Growth: {}", format_growth(record.gdp_growth_percent)),
                    Style::default().fg(growth),
                ));
            }
            None => spans.push(Span::styled(" Click for AI Analysis", dim)),
        }
    }

    let help = if app.panel_open() {
        " | enter:send pgup/pgdn:scroll esc:close"
    } else {
        " | drag:rotate scroll:zoom click:select q:quit"
    };
    spans.push(Span::styled(help, dim));

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

/// `$27,360B`
pub fn format_gdp(gdp_billions_usd: f64) -> String {
    let whole = gdp_billions_usd.round() as i64;
    let digits = whole.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    let sign = if whole < 0 { "-" } else { "" };
    format!("{sign}${grouped}B")
}

pub fn format_growth(percent: f64) -> String {
    format!("{percent}%")
}

/// Millions with one decimal: `333.0M`
pub fn format_population(population: u64) -> String {
    format!("{:.1}M", population as f64 / 1_000_000.0)
}

/// Plain-text rendition of model markdown: bullets become `•`, heading
/// markers and bold/italic markers are dropped.
pub fn markdown_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| {
            let trimmed = line.trim_start();
            let indent = &line[..line.len() - trimmed.len()];
            let body = if let Some(item) = ["* ", "- ", "+ "]
                .iter()
                .find_map(|marker| trimmed.strip_prefix(marker))
            {
                format!("{indent}• {item}")
            } else if trimmed.starts_with('#') {
                trimmed.trim_start_matches('#').trim_start().to_string()
            } else {
                line.to_string()
            };
            body.replace("**", "").replace("__", "")
        })
        .collect()
}

/// Greedy word wrap on character counts. Words longer than `width` are split.
fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut out = Vec::new();
    for paragraph in text.split('\n') {
        let mut line = String::new();
        let mut len = 0;
        for word in paragraph.split_whitespace() {
            let mut word: Vec<char> = word.chars().collect();
            while word.len() > width {
                if len > 0 {
                    out.push(std::mem::take(&mut line));
                    len = 0;
                }
                out.push(word.drain(..width).collect());
            }
            if word.is_empty() {
                continue;
            }
            if len > 0 && len + 1 + word.len() > width {
                out.push(std::mem::take(&mut line));
                len = 0;
            }
            if len > 0 {
                line.push(' ');
                len += 1;
            }
            len += word.len();
            line.extend(word);
        }
        out.push(line);
    }
    out
}

/// Sparkline heights for the trend, each point repeated `column` times and
/// offset so the smallest point still shows a bar.
fn trend_bars(history: &[(u16, u64)], column: usize) -> Vec<u64> {
    let floor = history.iter().map(|&(_, gdp)| gdp).min().unwrap_or(0);
    let span = history.iter().map(|&(_, gdp)| gdp).max().unwrap_or(0) - floor;
    let base = (span / 4).max(1);
    history
        .iter()
        .flat_map(|&(_, gdp)| std::iter::repeat(gdp - floor + base).take(column))
        .collect()
}
