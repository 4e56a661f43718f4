//! Pure calculation functions for crop geometry.
//!
//! All functions here are pure and testable without any I/O or images.

/// Reduce an output size to its smallest integer aspect unit.
///
/// # Examples
/// ```
/// # use idframe::imaging::aspect_unit;
/// assert_eq!(aspect_unit(360, 480), (3, 4));
/// assert_eq!(aspect_unit(600, 600), (1, 1));
/// ```
pub fn aspect_unit(width: u32, height: u32) -> (u32, u32) {
    let divisor = gcd(width, height).max(1);
    (width / divisor, height / divisor)
}

fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// Axis-aligned box in frame coordinates, before snapping to pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Region {
    pub center_x: f64,
    pub center_y: f64,
    pub width: f64,
    pub height: f64,
}

/// Grow a box by `margin` on every side: `margin * width` left and right,
/// `margin * height` above and below. The center is unchanged.
pub fn expand_by_margin(region: Region, margin: f64) -> Region {
    Region {
        width: region.width * (1.0 + 2.0 * margin),
        height: region.height * (1.0 + 2.0 * margin),
        ..region
    }
}

/// Smallest number of aspect units `k` such that a `k*unit_w x k*unit_h`
/// rectangle covers `region`. Growing to whole units enlarges only the side
/// that is short relative to the aspect ratio.
pub fn units_to_cover(region: Region, unit: (u32, u32)) -> u32 {
    let (unit_w, unit_h) = (f64::from(unit.0), f64::from(unit.1));
    let k = (region.width / unit_w).ceil().max((region.height / unit_h).ceil());
    if k.is_finite() && k >= 1.0 {
        k.min(f64::from(u32::MAX)) as u32
    } else {
        1
    }
}

/// Largest number of aspect units that fit in a `frame_w x frame_h` frame.
pub fn max_units(frame: (u32, u32), unit: (u32, u32)) -> u32 {
    (frame.0 / unit.0).min(frame.1 / unit.1)
}

/// Place a span of `size` pixels centered on `center`, translated to lie
/// inside `0..limit`. Requires `size <= limit`.
pub fn clamp_span(center: f64, size: u32, limit: u32) -> u32 {
    let max_start = limit.saturating_sub(size);
    let ideal = (center - f64::from(size) / 2.0).round();
    if ideal <= 0.0 {
        0
    } else {
        (ideal as u32).min(max_start)
    }
}

/// Scale factor that brings the long edge of `(width, height)` down to
/// `max_edge`. Never greater than 1.
pub fn probe_scale(width: u32, height: u32, max_edge: u32) -> f64 {
    let long = width.max(height);
    if long <= max_edge || long == 0 {
        1.0
    } else {
        f64::from(max_edge) / f64::from(long)
    }
}
