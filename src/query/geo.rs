//! Spherical geometry for GeoJSON points stored as `{ type: "Point", coordinates: [lng, lat] }`.

use bson::{Bson, doc};

/// Earth radius used for radian/metre conversions, in metres.
pub const EARTH_RADIUS_M: f64 = 6_378_100.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub lng: f64,
    pub lat: f64,
}

impl GeoPoint {
    #[must_use]
    pub const fn new(lng: f64, lat: f64) -> Self {
        Self { lng, lat }
    }

    /// Accepts a GeoJSON point or a bare `[lng, lat]` pair.
    #[must_use]
    pub fn from_bson(v: &Bson) -> Option<Self> {
        let coords = match v {
            Bson::Document(d) => d.get_array("coordinates").ok()?,
            Bson::Array(a) => a,
            _ => return None,
        };
        let lng = as_f64(coords.first()?)?;
        let lat = as_f64(coords.get(1)?)?;
        Some(Self { lng, lat })
    }

    #[must_use]
    pub fn to_bson(self) -> Bson {
        Bson::Document(doc! { "type": "Point", "coordinates": [self.lng, self.lat] })
    }

    /// Great-circle angle between two points, in radians (haversine).
    #[must_use]
    pub fn central_angle(self, other: Self) -> f64 {
        let (p1, p2) = (self.lat.to_radians(), other.lat.to_radians());
        let dp = p2 - p1;
        let dl = (other.lng - self.lng).to_radians();
        let a = (dp / 2.0).sin().powi(2) + p1.cos() * p2.cos() * (dl / 2.0).sin().powi(2);
        2.0 * a.sqrt().min(1.0).asin()
    }

    #[must_use]
    pub fn distance_m(self, other: Self) -> f64 {
        self.central_angle(other) * EARTH_RADIUS_M
    }
}

fn as_f64(v: &Bson) -> Option<f64> {
    match v {
        Bson::Double(f) => Some(*f),
        Bson::Int32(i) => Some(f64::from(*i)),
        #[allow(clippy::cast_precision_loss)]
        Bson::Int64(i) => Some(*i as f64),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceUnit {
    Miles,
    Kilometers,
}

impl DistanceUnit {
    /// `mi` selects miles; anything else is kilometres.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        if raw == "mi" { Self::Miles } else { Self::Kilometers }
    }

    /// Earth radius in this unit, for turning a distance into radians.
    #[must_use]
    pub const fn earth_radius(self) -> f64 {
        match self {
            Self::Miles => 3963.2,
            Self::Kilometers => 6378.1,
        }
    }

    /// Factor converting metres into this unit.
    #[must_use]
    pub const fn from_meters(self) -> f64 {
        match self {
            Self::Miles => 0.000_621_371,
            Self::Kilometers => 0.001,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_geojson_and_pairs() {
        let p = GeoPoint::from_bson(&GeoPoint::new(-118.1, 34.1).to_bson()).unwrap();
        assert_eq!(p, GeoPoint::new(-118.1, 34.1));
        assert!(GeoPoint::from_bson(&Bson::String("x".into())).is_none());
    }

    #[test]
    fn one_degree_of_latitude_is_about_111_km() {
        let d = GeoPoint::new(0.0, 0.0).distance_m(GeoPoint::new(0.0, 1.0));
        assert!((d - 111_317.0).abs() < 100.0, "{d}");
    }

    #[test]
    fn unit_parsing() {
        assert_eq!(DistanceUnit::parse("mi"), DistanceUnit::Miles);
        assert_eq!(DistanceUnit::parse("km"), DistanceUnit::Kilometers);
        assert_eq!(DistanceUnit::parse("furlongs"), DistanceUnit::Kilometers);
    }
}
