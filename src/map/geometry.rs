use crate::braille::BrailleCanvas;

/// A closed ring of (lon, lat) vertices
pub type Ring = Vec<(f64, f64)>;

/// Draw a line using Bresenham's algorithm
pub fn draw_line(canvas: &mut BrailleCanvas, x0: i32, y0: i32, x1: i32, y1: i32) {
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    let mut x = x0;
    let mut y = y0;

    loop {
        canvas.set_pixel_signed(x, y);

        if x == x1 && y == y1 {
            break;
        }

        let e2 = 2 * err;

        if e2 >= dy {
            if x == x1 {
                break;
            }
            err += dy;
            x += sx;
        }

        if e2 <= dx {
            if y == y1 {
                break;
            }
            err += dx;
            y += sy;
        }
    }
}

/// Even-odd ray cast against a single ring
pub fn point_in_ring(ring: &[(f64, f64)], lon: f64, lat: f64) -> bool {
    let mut inside = false;
    let n = ring.len();
    if n < 3 {
        return false;
    }
    let mut j = n - 1;
    for i in 0..n {
        let (xi, yi) = ring[i];
        let (xj, yj) = ring[j];
        if (yi > lat) != (yj > lat) && lon < (xj - xi) * (lat - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Inside the exterior ring (first) and outside every hole
pub fn point_in_polygon(rings: &[Ring], lon: f64, lat: f64) -> bool {
    match rings.split_first() {
        Some((exterior, holes)) => {
            point_in_ring(exterior, lon, lat)
                && !holes.iter().any(|hole| point_in_ring(hole, lon, lat))
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(min: f64, max: f64) -> Ring {
        vec![(min, min), (max, min), (max, max), (min, max), (min, min)]
    }

    #[test]
    fn test_horizontal_line() {
        let mut canvas = BrailleCanvas::new(5, 1);
        draw_line(&mut canvas, 0, 0, 9, 0);
        assert_eq!(canvas.to_string(), "⠉⠉⠉⠉⠉");
    }

    #[test]
    fn test_vertical_line() {
        let mut canvas = BrailleCanvas::new(1, 2);
        draw_line(&mut canvas, 0, 0, 0, 7);
        assert_eq!(canvas.to_string(), "⡇\n⡇");
    }

    #[test]
    fn test_point_in_ring() {
        let ring = square(0.0, 10.0);
        assert!(point_in_ring(&ring, 5.0, 5.0));
        assert!(!point_in_ring(&ring, 15.0, 5.0));
        assert!(!point_in_ring(&ring, -0.1, 5.0));
        assert!(!point_in_ring(&ring[..2], 5.0, 5.0));
    }

    #[test]
    fn test_polygon_with_hole() {
        let rings = vec![square(0.0, 10.0), square(4.0, 6.0)];
        assert!(point_in_polygon(&rings, 1.0, 1.0));
        assert!(!point_in_polygon(&rings, 5.0, 5.0));
        assert!(!point_in_polygon(&[], 5.0, 5.0));
    }
}
