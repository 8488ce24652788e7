//! Distance helpers on a spherical Earth.

/// A WGS84 position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn midpoint(self, other: GeoPoint) -> GeoPoint {
        GeoPoint {
            lat: (self.lat + other.lat) / 2.0,
            lon: (self.lon + other.lon) / 2.0,
        }
    }
}

/// Great-circle distance in meters.
pub fn haversine_m(a: GeoPoint, b: GeoPoint, earth_radius_m: f64) -> f64 {
    let phi1 = a.lat.to_radians();
    let phi2 = b.lat.to_radians();
    let dphi = (b.lat - a.lat).to_radians();
    let dlambda = (b.lon - a.lon).to_radians();

    let h = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    earth_radius_m * c
}

/// Distance in meters from `p` to the segment `a`-`b`.
///
/// Uses an equirectangular projection with origin at `a`. Longitudes are scaled
/// by the cosine of the mean latitude of the three points. The projection
/// parameter is clamped to `[0, 1]`, so points beyond either end measure to
/// the nearest endpoint.
pub fn point_to_segment_m(p: GeoPoint, a: GeoPoint, b: GeoPoint, earth_radius_m: f64) -> f64 {
    let phi = ((a.lat + b.lat + p.lat) / 3.0).to_radians();
    let scale_x = earth_radius_m * phi.cos();

    let px = (p.lon - a.lon).to_radians() * scale_x;
    let py = (p.lat - a.lat).to_radians() * earth_radius_m;
    let bx = (b.lon - a.lon).to_radians() * scale_x;
    let by = (b.lat - a.lat).to_radians() * earth_radius_m;

    let seg_len2 = bx * bx + by * by;
    if seg_len2 == 0.0 {
        return px.hypot(py);
    }

    let t = ((px * bx + py * by) / seg_len2).clamp(0.0, 1.0);
    (px - t * bx).hypot(py - t * by)
}
