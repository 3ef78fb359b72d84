use glam::DVec3;
use std::f64::consts::PI;

/// Sphere radius as a fraction of canvas width at zoom 1
const BASE_RADIUS_FACTOR: f64 = 0.35;
/// Zoom limits expressed as effective zoom
const MIN_ZOOM: f64 = 0.6;
const MAX_ZOOM: f64 = 40.0;

/// Globe viewport using orthographic projection of a rotating sphere.
/// Orientation stored as a rotation matrix (3 column vectors) for
/// efficient point transformation.
#[derive(Clone, Debug)]
pub struct GlobeViewport {
    /// Forward direction (what points at the camera)
    forward: DVec3,
    /// Right direction
    right: DVec3,
    /// Up direction
    up: DVec3,
    /// Sphere radius in braille pixels (controls zoom)
    pub radius: f64,
    /// Canvas pixel width
    pub width: usize,
    /// Canvas pixel height
    pub height: usize,
}

impl GlobeViewport {
    /// Build a globe viewport centered on (lon, lat) with given radius.
    pub fn new(center_lon: f64, center_lat: f64, radius: f64, width: usize, height: usize) -> Self {
        let (forward, right, up) = basis_facing(center_lon, center_lat);
        Self { forward, right, up, radius, width, height }
    }

    /// Whole-earth view sized to the canvas
    pub fn world(width: usize, height: usize) -> Self {
        let radius = base_radius(width, height);
        Self::new(0.0, 20.0, radius, width, height)
    }

    /// Extract the center lon/lat that the globe is looking at.
    pub fn center_lonlat(&self) -> (f64, f64) {
        vec3_to_lonlat(self.forward)
    }

    /// Re-aim the camera at (lon, lat) with north up, keeping the radius.
    pub fn look_at(&mut self, lon: f64, lat: f64) {
        let (forward, right, up) = basis_facing(lon, lat);
        self.forward = forward;
        self.right = right;
        self.up = up;
    }

    /// Project a geographic point to screen pixels.
    /// Returns `None` for back-face points (behind the visible hemisphere).
    #[inline]
    pub fn project(&self, lon: f64, lat: f64) -> Option<(i32, i32)> {
        let p = lonlat_to_vec3(lon, lat);

        // Dot with forward: positive = front-facing
        if p.dot(self.forward) < 0.0 {
            return None;
        }

        let sx = p.dot(self.right);
        let sy = p.dot(self.up);

        let px = (self.width as f64 / 2.0 + sx * self.radius) as i32;
        let py = (self.height as f64 / 2.0 - sy * self.radius) as i32;

        Some((px, py))
    }

    /// Unproject screen pixels back to lon/lat.
    /// Returns `None` if the point is outside the sphere disk.
    #[inline]
    pub fn unproject(&self, px: i32, py: i32) -> Option<(f64, f64)> {
        let sx = (px as f64 - self.width as f64 / 2.0) / self.radius;
        let sy = -(py as f64 - self.height as f64 / 2.0) / self.radius;

        let r2 = sx * sx + sy * sy;
        if r2 > 1.0 {
            return None;
        }

        // Reconstruct 3D point on unit sphere
        let sz = (1.0 - r2).sqrt();
        let p = self.right * sx + self.up * sy + self.forward * sz;
        Some(vec3_to_lonlat(p))
    }

    /// Rotate the globe by a pixel drag delta.
    /// Positive dx = dragged left, globe center shifts east (surface follows cursor).
    pub fn rotate_drag(&mut self, dx: i32, dy: i32) {
        self.turn(dx as f64 / self.radius, -(dy as f64) / self.radius);
    }

    /// Rotate about the view's up and right axes by the given angles (radians)
    fn turn(&mut self, angle_x: f64, angle_y: f64) {
        if angle_x.abs() > 1e-10 {
            let (sin_a, cos_a) = angle_x.sin_cos();
            let new_forward = self.forward * cos_a + self.right * sin_a;
            let new_right = self.right * cos_a - self.forward * sin_a;
            self.forward = new_forward.normalize();
            self.right = new_right.normalize();
        }
        if angle_y.abs() > 1e-10 {
            let (sin_a, cos_a) = angle_y.sin_cos();
            let new_forward = self.forward * cos_a + self.up * sin_a;
            let new_up = self.up * cos_a - self.forward * sin_a;
            self.forward = new_forward.normalize();
            self.up = new_up.normalize();
        }
    }

    /// Ambient rotation about the earth's axis. Positive angles move the view east.
    pub fn spin(&mut self, radians: f64) {
        let (sin_a, cos_a) = radians.sin_cos();
        let rot = |v: DVec3| DVec3::new(v.x * cos_a - v.y * sin_a, v.x * sin_a + v.y * cos_a, v.z);
        self.forward = rot(self.forward).normalize();
        self.right = rot(self.right).normalize();
        self.up = rot(self.up).normalize();
    }

    /// Zoom in by scaling the sphere radius.
    pub fn zoom_in(&mut self) {
        self.set_zoom(self.effective_zoom() * 1.5);
    }

    /// Zoom out by scaling the sphere radius.
    pub fn zoom_out(&mut self) {
        self.set_zoom(self.effective_zoom() / 1.5);
    }

    /// Set the effective zoom, clamped to the supported range
    pub fn set_zoom(&mut self, zoom: f64) {
        self.radius = zoom.clamp(MIN_ZOOM, MAX_ZOOM) * base_radius(self.width, self.height);
    }

    /// Zoom in towards a specific pixel location.
    pub fn zoom_in_at(&mut self, px: i32, py: i32) {
        self.zoom_at(px, py, 1.5);
    }

    /// Zoom out from a specific pixel location.
    pub fn zoom_out_at(&mut self, px: i32, py: i32) {
        self.zoom_at(px, py, 1.0 / 1.5);
    }

    /// Zoom by factor towards a specific pixel, keeping the geographic point under cursor fixed.
    fn zoom_at(&mut self, px: i32, py: i32, factor: f64) {
        let target = self.unproject(px, py);

        self.set_zoom(self.effective_zoom() * factor);

        // Re-orient so the same geo point stays under cursor
        if let Some((lon, lat)) = target {
            let target_vec = lonlat_to_vec3(lon, lat);
            let sx_now = target_vec.dot(self.right);
            let sy_now = target_vec.dot(self.up);
            let sx_want = (px as f64 - self.width as f64 / 2.0) / self.radius;
            let sy_want = -(py as f64 - self.height as f64 / 2.0) / self.radius;
            // d(sx)/d(angle) is -depth, so scale the correction by it
            let depth = target_vec.dot(self.forward).max(0.2);
            self.turn((sx_now - sx_want) / depth, (sy_now - sy_want) / depth);
        }
    }

    /// Effective zoom level, 1.0 when the globe fills ~70% of the canvas width.
    pub fn effective_zoom(&self) -> f64 {
        self.radius / base_radius(self.width, self.height)
    }

    /// Set viewport dimensions, preserving the effective zoom.
    pub fn set_size(&mut self, width: usize, height: usize) {
        let zoom = self.effective_zoom();
        self.width = width;
        self.height = height;
        self.set_zoom(zoom);
    }
}

/// Radius at zoom 1; limited by height so the sphere fits wide terminals
fn base_radius(width: usize, height: usize) -> f64 {
    (width as f64 * BASE_RADIUS_FACTOR)
        .min(height as f64 * 0.45)
        .max(1.0)
}

/// Camera basis looking at (lon, lat) with north up
fn basis_facing(lon: f64, lat: f64) -> (DVec3, DVec3, DVec3) {
    let lon_rad = lon.to_radians();
    let lat_rad = lat.to_radians();

    let forward = lonlat_to_vec3(lon, lat);

    // Derivative of forward w.r.t. latitude (points north on sphere)
    let raw_up = DVec3::new(
        -lat_rad.sin() * lon_rad.cos(),
        -lat_rad.sin() * lon_rad.sin(),
        lat_rad.cos(),
    );

    // Right points east, so screen x grows eastward
    let right = raw_up.cross(forward).normalize();
    let up = forward.cross(right).normalize();
    (forward, right, up)
}

/// Convert lon/lat (degrees) to a unit sphere vector.
#[inline(always)]
fn lonlat_to_vec3(lon: f64, lat: f64) -> DVec3 {
    let lon_rad = lon.to_radians();
    let lat_rad = lat.to_radians();
    DVec3::new(
        lat_rad.cos() * lon_rad.cos(),
        lat_rad.cos() * lon_rad.sin(),
        lat_rad.sin(),
    )
}

#[inline(always)]
fn vec3_to_lonlat(p: DVec3) -> (f64, f64) {
    let lat = p.z.clamp(-1.0, 1.0).asin().to_degrees();
    let lon = p.y.atan2(p.x).to_degrees();
    (lon, lat)
}

/// Spherical interpolation between two geographic points, `t` in [0, 1].
fn slerp_lonlat(from: (f64, f64), to: (f64, f64), t: f64) -> (f64, f64) {
    let a = lonlat_to_vec3(from.0, from.1);
    let b = lonlat_to_vec3(to.0, to.1);
    let angle = a.dot(b).clamp(-1.0, 1.0).acos();
    let sin_angle = angle.sin();
    if sin_angle.abs() < 1e-10 {
        // Identical or antipodal; nothing sensible to interpolate along
        return if t < 1.0 { from } else { to };
    }
    let p = a * (((1.0 - t) * angle).sin() / sin_angle) + b * ((t * angle).sin() / sin_angle);
    vec3_to_lonlat(p)
}

/// Smooth camera transition to a geographic point and zoom level
#[derive(Clone, Debug)]
pub struct Flight {
    from: (f64, f64),
    to: (f64, f64),
    from_zoom: f64,
    to_zoom: f64,
    frame: u32,
    frames: u32,
}

impl Flight {
    /// ~1 second at 60fps
    pub const DEFAULT_FRAMES: u32 = 60;

    pub fn new(viewport: &GlobeViewport, lon: f64, lat: f64, zoom: f64, frames: u32) -> Self {
        Self {
            from: viewport.center_lonlat(),
            to: (lon, lat),
            from_zoom: viewport.effective_zoom(),
            to_zoom: zoom,
            frame: 0,
            frames: frames.max(1),
        }
    }

    /// Advance one frame and apply it. Returns false once the flight has landed.
    pub fn step(&mut self, viewport: &mut GlobeViewport) -> bool {
        self.frame = (self.frame + 1).min(self.frames);
        let linear = self.frame as f64 / self.frames as f64;
        // Ease in-out
        let t = 0.5 - 0.5 * (linear * PI).cos();

        let (lon, lat) = slerp_lonlat(self.from, self.to, t);
        viewport.look_at(lon, lat);
        viewport.set_zoom(self.from_zoom + (self.to_zoom - self.from_zoom) * t);

        self.frame < self.frames
    }
}

/// Interpolate along a great circle arc and call a visitor for each subdivision point.
/// Subdivides adaptively: ~2° segments for smooth curves at braille resolution.
#[inline]
pub fn walk_great_circle(
    lon0: f64, lat0: f64,
    lon1: f64, lat1: f64,
    mut visitor: impl FnMut(f64, f64),
) {
    let a = lonlat_to_vec3(lon0, lat0);
    let b = lonlat_to_vec3(lon1, lat1);

    let angle = a.dot(b).clamp(-1.0, 1.0).acos();
    let steps = ((angle.to_degrees() / 2.0).ceil() as usize).max(1);

    let sin_angle = angle.sin();
    if steps == 1 || sin_angle.abs() < 1e-10 {
        visitor(lon1, lat1);
        return;
    }

    for i in 1..=steps {
        let t = i as f64 / steps as f64;
        let sa = ((1.0 - t) * angle).sin() / sin_angle;
        let sb = (t * angle).sin() / sin_angle;
        let (lon, lat) = vec3_to_lonlat(a * sa + b * sb);
        visitor(lon, lat);
    }
}
