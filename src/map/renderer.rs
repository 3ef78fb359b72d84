use rayon::prelude::*;

use crate::braille::BrailleCanvas;
use crate::data::Region;
use crate::economy::{self, scale};
use crate::map::geometry::draw_line;
use crate::map::globe::{walk_great_circle, GlobeViewport};
use crate::map::spatial::FeatureGrid;

/// Grid cell size in degrees for region picking
const PICK_CELL_DEGREES: f64 = 10.0;

/// Region fill style: which palette layer it lands in
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fill {
    /// Region without economic data
    Neutral,
    /// Palette bucket index
    Bucket(usize),
}

/// Per-frame canvases, drawn back to front by the UI
pub struct GlobeLayers {
    /// Sphere outline
    pub limb: BrailleCanvas,
    /// Regions without data
    pub neutral: BrailleCanvas,
    /// One canvas per palette bucket
    pub buckets: Vec<BrailleCanvas>,
    /// Selected region outline
    pub selected: BrailleCanvas,
    /// Hovered region, drawn on top in white
    pub hover: BrailleCanvas,
}

impl GlobeLayers {
    fn new(width: usize, height: usize) -> Self {
        Self {
            limb: BrailleCanvas::new(width, height),
            neutral: BrailleCanvas::new(width, height),
            buckets: (0..scale::BUCKETS)
                .map(|_| BrailleCanvas::new(width, height))
                .collect(),
            selected: BrailleCanvas::new(width, height),
            hover: BrailleCanvas::new(width, height),
        }
    }

    fn fill_layer(&mut self, fill: Fill) -> &mut BrailleCanvas {
        match fill {
            Fill::Neutral => &mut self.neutral,
            Fill::Bucket(idx) => &mut self.buckets[idx],
        }
    }
}

/// Renders country polygons onto an orthographic globe and resolves picks
pub struct GlobeRenderer {
    regions: Vec<Region>,
    fills: Vec<Fill>,
    grid: FeatureGrid,
}

impl GlobeRenderer {
    pub fn new(regions: Vec<Region>) -> Self {
        let grid = FeatureGrid::build(regions.iter().map(|r| r.bbox), PICK_CELL_DEGREES);
        let fills = regions
            .iter()
            .map(|r| match economy::lookup(&r.iso_code) {
                Some(record) => Fill::Bucket(scale::bucket_for(record.gdp_billions_usd)),
                None => Fill::Neutral,
            })
            .collect();
        Self { regions, fills, grid }
    }

    pub fn has_data(&self) -> bool {
        !self.regions.is_empty()
    }

    pub fn region(&self, idx: usize) -> Option<&Region> {
        self.regions.get(idx)
    }

    pub fn fill(&self, idx: usize) -> Option<Fill> {
        self.fills.get(idx).copied()
    }

    /// Index of the region containing a geographic point
    pub fn pick(&self, lon: f64, lat: f64) -> Option<usize> {
        self.grid
            .query_point(lon, lat)
            .iter()
            .copied()
            .find(|&idx| self.regions[idx].contains(lon, lat))
    }

    /// Index of the region under a braille pixel
    pub fn pick_pixel(&self, viewport: &GlobeViewport, px: i32, py: i32) -> Option<usize> {
        let (lon, lat) = viewport.unproject(px, py)?;
        self.pick(lon, lat)
    }

    /// Render all layers for a canvas of `width` x `height` characters.
    pub fn render(
        &self,
        width: usize,
        height: usize,
        viewport: &GlobeViewport,
        hovered: Option<usize>,
        selected: Option<usize>,
    ) -> GlobeLayers {
        let mut layers = GlobeLayers::new(width, height);
        let px_width = width * 2;
        let px_height = height * 4;

        draw_limb(&mut layers.limb, viewport);

        // Resolve the owning region of every pixel in parallel, one row per task
        let mut owners: Vec<Option<u32>> = vec![None; px_width * px_height];
        owners
            .par_chunks_mut(px_width.max(1))
            .enumerate()
            .for_each(|(py, row)| {
                for (px, owner) in row.iter_mut().enumerate() {
                    *owner = self
                        .pick_pixel(viewport, px as i32, py as i32)
                        .map(|idx| idx as u32);
                }
            });

        // Sparse dither for fills keeps outlines readable
        for (i, owner) in owners.iter().enumerate() {
            let Some(idx) = owner.map(|o| o as usize) else {
                continue;
            };
            let (px, py) = (i % px_width, i / px_width);
            if Some(idx) == hovered {
                layers.hover.set_pixel(px, py);
            } else if (px + py) % 2 == 0 {
                layers.fill_layer(self.fills[idx]).set_pixel(px, py);
            }
        }

        for (idx, region) in self.regions.iter().enumerate() {
            let target = if Some(idx) == hovered {
                &mut layers.hover
            } else if Some(idx) == selected {
                &mut layers.selected
            } else {
                layers.fill_layer(self.fills[idx])
            };
            for ring in region.rings() {
                draw_ring(target, ring, viewport);
            }
        }

        layers
    }
}

/// Outline of the visible disk
fn draw_limb(canvas: &mut BrailleCanvas, viewport: &GlobeViewport) {
    let cx = viewport.width as f64 / 2.0;
    let cy = viewport.height as f64 / 2.0;
    let steps = ((viewport.radius * 0.5) as usize).clamp(32, 720);
    let point = |i: usize| {
        let angle = i as f64 / steps as f64 * std::f64::consts::TAU;
        (
            (cx + angle.cos() * viewport.radius) as i32,
            (cy + angle.sin() * viewport.radius) as i32,
        )
    };
    let mut prev = point(0);
    for i in 1..=steps {
        let next = point(i);
        draw_line(canvas, prev.0, prev.1, next.0, next.1);
        prev = next;
    }
}

/// Draw a ring along great circle arcs, skipping segments on the far side
fn draw_ring(canvas: &mut BrailleCanvas, ring: &[(f64, f64)], viewport: &GlobeViewport) {
    let Some(&(mut prev_lon, mut prev_lat)) = ring.first() else {
        return;
    };
    let mut prev_px = viewport.project(prev_lon, prev_lat);

    for &(lon, lat) in &ring[1..] {
        walk_great_circle(prev_lon, prev_lat, lon, lat, |wlon, wlat| {
            let next_px = viewport.project(wlon, wlat);
            if let (Some((x0, y0)), Some((x1, y1))) = (prev_px, next_px) {
                draw_line(canvas, x0, y0, x1, y1);
            }
            prev_px = next_px;
        });
        prev_lon = lon;
        prev_lat = lat;
    }
}
