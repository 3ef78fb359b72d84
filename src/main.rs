use anyhow::{Context, Result};
use clap::Parser;
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
    KeyModifiers, MouseButton, MouseEvent, MouseEventKind,
};
use crossterm::execute;
use gdp_globe::app::App;
use gdp_globe::config::{Args, Config};
use gdp_globe::controller::Controller;
use gdp_globe::data;
use gdp_globe::gemini::{GeminiClient, GenerativeService};
use gdp_globe::map::GlobeRenderer;
use gdp_globe::ui;
use ratatui::DefaultTerminal;
use std::fs::{self, File};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::load(&args, |var| std::env::var(var).ok())?;
    init_logging(&config.log_path())?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    let source = config.boundary_source();
    info!(%source, "loading boundary dataset");
    let regions = runtime.block_on(data::load_regions(&source, config.request_timeout()));
    info!(regions = regions.len(), "boundaries ready");

    if config.api_key.is_none() {
        warn!("no API key in GEMINI_API_KEY or API_KEY; AI requests will fail");
    }
    let client = GeminiClient::new(
        &config.api_base,
        &config.model,
        config.api_key.clone().unwrap_or_default(),
    )?;
    let service: Arc<dyn GenerativeService> = Arc::new(client);
    let controller = Controller::new(service, runtime.handle().clone(), config.request_timeout());
    let rotate = config.auto_rotate.then(|| config.rotate_step());

    // Initialize terminal
    let mut terminal = ratatui::init();
    terminal.clear()?;

    // Enable mouse capture
    execute!(std::io::stdout(), EnableMouseCapture)?;

    let size = terminal.size()?;
    let mut app = App::new(GlobeRenderer::new(regions), controller, rotate, size.width, size.height);
    let result = run(&mut terminal, &mut app);

    // Disable mouse capture and restore terminal
    let _ = execute!(std::io::stdout(), DisableMouseCapture);
    ratatui::restore();

    // Outstanding requests are abandoned
    runtime.shutdown_timeout(Duration::from_millis(100));
    result
}

/// The terminal belongs to the UI, so logs go to a file
fn init_logging(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    }
    let file = File::create(path).with_context(|| format!("failed to open log {}", path.display()))?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent) {
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        app.quit();
        return;
    }

    if app.panel_open() {
        // Typing goes to the chat input
        match key.code {
            KeyCode::Esc => app.close_panel(),
            KeyCode::Enter => app.submit(),
            KeyCode::Backspace => app.backspace(),
            KeyCode::PageUp => app.scroll_analysis_up(),
            KeyCode::PageDown => app.scroll_analysis_down(),
            KeyCode::Left => app.rotate(-10, 0),
            KeyCode::Right => app.rotate(10, 0),
            KeyCode::Up => app.rotate(0, -6),
            KeyCode::Down => app.rotate(0, 6),
            KeyCode::Char(ch) => app.type_char(ch),
            _ => {}
        }
        return;
    }

    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => app.quit(),

        // Rotate with hjkl or arrow keys
        KeyCode::Left | KeyCode::Char('h') => app.rotate(-10, 0),
        KeyCode::Right | KeyCode::Char('l') => app.rotate(10, 0),
        KeyCode::Up | KeyCode::Char('k') => app.rotate(0, -6),
        KeyCode::Down | KeyCode::Char('j') => app.rotate(0, 6),

        // Zoom
        KeyCode::Char('+') | KeyCode::Char('=') => app.zoom_in(),
        KeyCode::Char('-') | KeyCode::Char('_') => app.zoom_out(),

        _ => {}
    }
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    match mouse.kind {
        // Scroll wheel zooms towards the cursor
        MouseEventKind::ScrollUp => app.zoom_in_at(mouse.column, mouse.row),
        MouseEventKind::ScrollDown => app.zoom_out_at(mouse.column, mouse.row),
        MouseEventKind::Moved => app.hover(mouse.column, mouse.row),
        // Press and release without moving selects, dragging rotates
        MouseEventKind::Down(MouseButton::Left) => app.mouse_down(mouse.column, mouse.row),
        MouseEventKind::Drag(MouseButton::Left) => app.mouse_drag(mouse.column, mouse.row),
        MouseEventKind::Up(MouseButton::Left) => app.mouse_up(mouse.column, mouse.row),
        _ => {}
    }
}

fn run(terminal: &mut DefaultTerminal, app: &mut App) -> Result<()> {
    loop {
        terminal.draw(|frame| ui::render(frame, app))?;

        // Handle events with ~60fps target
        if event::poll(Duration::from_millis(16))? {
            match event::read()? {
                // Only handle key press events (not release)
                Event::Key(key) if key.kind == KeyEventKind::Press => handle_key(app, key),
                Event::Mouse(mouse) => handle_mouse(app, mouse),
                Event::Resize(width, height) => app.resize(width, height),
                _ => {}
            }
        }

        app.tick();

        if app.should_quit {
            break;
        }
    }

    Ok(())
}
