use ratatui::layout::{Position, Rect};
use tracing::debug;

use crate::controller::{Controller, RegionClick};
use crate::map::{Flight, GlobeRenderer, GlobeViewport};
use crate::ui;

/// Minimum zoom after flying to a selected region
const FLIGHT_ZOOM: f64 = 1.4;
/// Lines moved per PageUp/PageDown in the analysis text
const SCROLL_STEP: u16 = 5;

/// Application state
pub struct App {
    pub viewport: GlobeViewport,
    pub renderer: GlobeRenderer,
    pub controller: Controller,
    /// Chat input line
    pub input: String,
    pub analysis_scroll: u16,
    pub should_quit: bool,
    auto_rotate: bool,
    /// Radians per frame while auto-rotating
    rotate_step: f64,
    flight: Option<Flight>,
    hovered: Option<usize>,
    selected_idx: Option<usize>,
    show_welcome: bool,
    /// Last mouse position while the left button is held
    last_mouse: Option<(u16, u16)>,
    /// Whether the held button has moved since it went down
    dragged: bool,
    screen: Rect,
    globe_area: Rect,
}

impl App {
    pub fn new(
        renderer: GlobeRenderer,
        controller: Controller,
        rotate_step: Option<f64>,
        width: u16,
        height: u16,
    ) -> Self {
        let mut app = Self {
            viewport: GlobeViewport::world(0, 0),
            renderer,
            controller,
            input: String::new(),
            analysis_scroll: 0,
            should_quit: false,
            auto_rotate: rotate_step.is_some(),
            rotate_step: rotate_step.unwrap_or(0.0),
            flight: None,
            hovered: None,
            selected_idx: None,
            show_welcome: true,
            last_mouse: None,
            dragged: false,
            screen: Rect::new(0, 0, width, height),
            globe_area: Rect::default(),
        };
        app.sync_layout();
        app.viewport = GlobeViewport::world(app.viewport.width, app.viewport.height);
        app
    }

    /// Update layout when the terminal resizes
    pub fn resize(&mut self, width: u16, height: u16) {
        self.screen = Rect::new(0, 0, width, height);
        self.sync_layout();
    }

    /// Fit the viewport to the globe area, which shrinks while the panel is open
    fn sync_layout(&mut self) {
        self.globe_area = ui::layout(self.screen, self.panel_open()).globe_inner;
        // Braille gives 2x4 resolution per character
        self.viewport.set_size(
            self.globe_area.width as usize * 2,
            self.globe_area.height as usize * 4,
        );
    }

    pub fn panel_open(&self) -> bool {
        self.controller.selected().is_some()
    }

    pub fn hovered(&self) -> Option<usize> {
        self.hovered
    }

    pub fn selected_idx(&self) -> Option<usize> {
        self.selected_idx
    }

    pub fn show_welcome(&self) -> bool {
        self.show_welcome
    }

    pub fn auto_rotate(&self) -> bool {
        self.auto_rotate
    }

    /// Any user interaction stops auto-rotation for good
    fn interact(&mut self) {
        if self.auto_rotate {
            debug!("auto-rotation stopped");
        }
        self.auto_rotate = false;
    }

    /// Rotate the globe by a pixel delta
    pub fn rotate(&mut self, dx: i32, dy: i32) {
        self.interact();
        self.flight = None;
        self.viewport.rotate_drag(dx, dy);
    }

    pub fn zoom_in(&mut self) {
        self.interact();
        self.flight = None;
        self.viewport.zoom_in();
    }

    pub fn zoom_out(&mut self) {
        self.interact();
        self.flight = None;
        self.viewport.zoom_out();
    }

    /// Zoom in towards a screen position (terminal column/row)
    pub fn zoom_in_at(&mut self, col: u16, row: u16) {
        let Some((px, py)) = self.pixel_at(col, row) else {
            return;
        };
        self.interact();
        self.flight = None;
        self.viewport.zoom_in_at(px, py);
    }

    /// Zoom out from a screen position (terminal column/row)
    pub fn zoom_out_at(&mut self, col: u16, row: u16) {
        let Some((px, py)) = self.pixel_at(col, row) else {
            return;
        };
        self.interact();
        self.flight = None;
        self.viewport.zoom_out_at(px, py);
    }

    /// Braille pixel at the centre of a terminal cell, if it lies on the globe area
    fn pixel_at(&self, col: u16, row: u16) -> Option<(i32, i32)> {
        if !self.globe_area.contains(Position::new(col, row)) {
            return None;
        }
        let px = (col - self.globe_area.x) as i32 * 2 + 1;
        let py = (row - self.globe_area.y) as i32 * 4 + 2;
        Some((px, py))
    }

    /// Region under a terminal cell
    pub fn region_at(&self, col: u16, row: u16) -> Option<usize> {
        let (px, py) = self.pixel_at(col, row)?;
        self.renderer.pick_pixel(&self.viewport, px, py)
    }

    /// Pointer moved without a button held
    pub fn hover(&mut self, col: u16, row: u16) {
        self.hovered = self.region_at(col, row);
    }

    pub fn mouse_down(&mut self, col: u16, row: u16) {
        if self.pixel_at(col, row).is_some() {
            self.last_mouse = Some((col, row));
            self.dragged = false;
        }
    }

    /// Drag to rotate; the surface follows the cursor
    pub fn mouse_drag(&mut self, col: u16, row: u16) {
        if let Some((last_x, last_y)) = self.last_mouse {
            let dx = (last_x as i32 - col as i32) * 2;
            let dy = (last_y as i32 - row as i32) * 4;
            if dx != 0 || dy != 0 {
                self.dragged = true;
                self.rotate(dx, dy);
            }
            self.last_mouse = Some((col, row));
        }
    }

    /// Button released: a press without movement is a click
    pub fn mouse_up(&mut self, col: u16, row: u16) {
        if self.last_mouse.take().is_some() && !self.dragged {
            self.click(col, row);
        }
        self.dragged = false;
    }

    /// Select the region under the cursor. Clicking empty space does nothing.
    pub fn click(&mut self, col: u16, row: u16) {
        self.interact();
        if let Some(idx) = self.region_at(col, row) {
            self.select_region(idx);
        }
    }

    pub fn select_region(&mut self, idx: usize) {
        let Some(region) = self.renderer.region(idx) else {
            return;
        };
        let click = RegionClick {
            iso_code: region.iso_code.clone(),
            display_name: region.display_name.clone(),
            centroid_lat: region.centroid_lat,
            centroid_lng: region.centroid_lng,
        };

        self.controller.select(click.clone());
        self.selected_idx = Some(idx);
        self.show_welcome = false;
        self.input.clear();
        self.analysis_scroll = 0;
        self.sync_layout();

        let zoom = self.viewport.effective_zoom().max(FLIGHT_ZOOM);
        self.flight = Some(Flight::new(
            &self.viewport,
            click.centroid_lng,
            click.centroid_lat,
            zoom,
            Flight::DEFAULT_FRAMES,
        ));
    }

    pub fn close_panel(&mut self) {
        self.controller.deselect();
        self.selected_idx = None;
        self.input.clear();
        self.analysis_scroll = 0;
        self.sync_layout();
    }

    pub fn type_char(&mut self, ch: char) {
        self.input.push(ch);
    }

    pub fn backspace(&mut self) {
        self.input.pop();
    }

    /// Send the input line. It is kept when the controller refuses the message.
    pub fn submit(&mut self) {
        if self.controller.send_message(&self.input) {
            self.input.clear();
        }
    }

    pub fn scroll_analysis_up(&mut self) {
        self.analysis_scroll = self.analysis_scroll.saturating_sub(SCROLL_STEP);
    }

    pub fn scroll_analysis_down(&mut self) {
        self.analysis_scroll = self.analysis_scroll.saturating_add(SCROLL_STEP);
    }

    /// Per-frame update: apply background results, then animate the camera
    pub fn tick(&mut self) {
        self.controller.drain();

        if let Some(flight) = self.flight.as_mut() {
            if !flight.step(&mut self.viewport) {
                self.flight = None;
            }
        } else if self.auto_rotate {
            self.viewport.spin(self.rotate_step);
        }
    }

    /// Request quit
    pub fn quit(&mut self) {
        self.should_quit = true;
    }

    /// Get current zoom level as a string
    pub fn zoom_level(&self) -> String {
        format!("{:.1}x", self.viewport.effective_zoom())
    }

    /// Get current center coordinates as a string
    pub fn center_coords(&self) -> String {
        let (lon, lat) = self.viewport.center_lonlat();
        format!(
            "{:.1}°{}, {:.1}°{}",
            lat.abs(),
            if lat >= 0.0 { "N" } else { "S" },
            lon.abs(),
            if lon >= 0.0 { "E" } else { "W" }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::AnalysisText;
    use crate::data::tests::fixture_regions;
    use crate::gemini::testing::{FakeService, Scripted};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::runtime::Handle;

    const WIDTH: u16 = 120;
    const HEIGHT: u16 = 40;

    fn app(service: FakeService, rotate: Option<f64>) -> App {
        let controller = Controller::new(Arc::new(service), Handle::current(), Duration::from_secs(5));
        App::new(GlobeRenderer::new(fixture_regions()), controller, rotate, WIDTH, HEIGHT)
    }

    /// Terminal cell showing a geographic point
    fn cell_of(app: &App, lon: f64, lat: f64) -> (u16, u16) {
        let (px, py) = app.viewport.project(lon, lat).unwrap();
        (
            app.globe_area.x + (px / 2) as u16,
            app.globe_area.y + (py / 4) as u16,
        )
    }

    fn facing(app: &mut App, lon: f64, lat: f64) {
        app.viewport.look_at(lon, lat);
        app.viewport.set_zoom(4.0);
    }

    #[tokio::test]
    async fn test_viewport_fits_globe_area() {
        let app = app(FakeService::default(), None);
        assert_eq!(app.globe_area, Rect::new(1, 1, 118, 37));
        assert_eq!((app.viewport.width, app.viewport.height), (236, 148));
        assert!((app.viewport.effective_zoom() - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_click_selects_and_flies() {
        let mut app = app(
            FakeService::default().with_analysis("United States", Scripted::Text("us".into())),
            Some(0.01),
        );
        facing(&mut app, 5.0, 5.0);
        let (col, row) = cell_of(&app, 5.0, 5.0);

        app.mouse_down(col, row);
        app.mouse_up(col, row);

        assert!(!app.auto_rotate());
        assert!(!app.show_welcome());
        assert!(app.panel_open());
        assert_eq!(app.selected_idx(), Some(0));
        assert_eq!(app.controller.selected().unwrap().iso_code, "USA");
        assert_eq!(app.controller.analysis(), &AnalysisText::Loading);
        assert!(app.flight.is_some());
        // Globe area narrowed for the panel
        assert!(app.globe_area.width < 118);
    }

    #[tokio::test]
    async fn test_drag_rotates_without_selecting() {
        let mut app = app(FakeService::default(), Some(0.01));
        facing(&mut app, 5.0, 5.0);
        let (col, row) = cell_of(&app, 5.0, 5.0);
        let before = app.viewport.center_lonlat();

        app.mouse_down(col, row);
        app.mouse_drag(col + 3, row);
        app.mouse_up(col + 3, row);

        assert!(!app.panel_open());
        assert!(!app.auto_rotate());
        assert!(app.show_welcome());
        let after = app.viewport.center_lonlat();
        // Dragging right pulls western longitudes into view
        assert!(after.0 < before.0);
    }

    #[tokio::test]
    async fn test_click_on_ocean_keeps_panel_closed() {
        let mut app = app(FakeService::default(), None);
        facing(&mut app, 15.0, 15.0);
        let (col, row) = cell_of(&app, 15.0, 15.0);
        app.mouse_down(col, row);
        app.mouse_up(col, row);
        assert!(!app.panel_open());
    }

    #[tokio::test]
    async fn test_hover_tracks_region() {
        let mut app = app(FakeService::default(), None);
        facing(&mut app, 25.0, 5.0);
        let (col, row) = cell_of(&app, 21.0, 5.0);
        app.hover(col, row);
        assert_eq!(app.hovered(), Some(1));

        // Inside the hole
        let (col, row) = cell_of(&app, 25.0, 5.0);
        app.hover(col, row);
        assert_eq!(app.hovered(), None);
    }

    #[tokio::test]
    async fn test_auto_rotation_spins_until_interaction() {
        let mut app = app(FakeService::default(), Some(0.05));
        let (lon0, _) = app.viewport.center_lonlat();
        app.tick();
        let (lon1, _) = app.viewport.center_lonlat();
        assert!(lon1 > lon0);

        app.zoom_in();
        app.tick();
        let (lon2, _) = app.viewport.center_lonlat();
        assert!((lon2 - lon1).abs() < 1e-9);
        assert!(!app.auto_rotate());
    }

    #[tokio::test]
    async fn test_close_panel_restores_layout() {
        let mut app = app(FakeService::default(), None);
        app.select_region(1);
        assert!(app.panel_open());
        app.type_char('h');
        app.close_panel();
        assert!(!app.panel_open());
        assert!(app.input.is_empty());
        assert_eq!(app.globe_area.width, 118);
        assert_eq!(app.selected_idx(), None);
    }

    #[tokio::test]
    async fn test_submit_clears_only_when_sent() {
        let mut app = app(
            FakeService::default()
                .with_analysis("France", Scripted::Text("fr".into()))
                .with_reply(vec![Ok("oui")]),
            None,
        );
        app.select_region(1);
        for ch in "   ".chars() {
            app.type_char(ch);
        }
        app.submit();
        assert_eq!(app.input, "   ");

        app.input.clear();
        "Why?".chars().for_each(|ch| app.type_char(ch));
        app.submit();
        assert!(app.input.is_empty());
        assert!(app.controller.is_streaming());
    }
}
