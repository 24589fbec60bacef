//! Latitude/longitude → raster cell.
//!
//! The projection is equirectangular: both axes are linear in degrees, with no
//! conformal correction. The target map only covers a narrow, already
//! foreshortened latitude band, so the distortion is not visible at 120 × 60.
//!
//! Longitude wraps around the globe starting at
//! [`ProjectionConfig::start_longitude`] (column 0). Latitude is clamped to
//! `[min_latitude, max_latitude]` and mapped top-down, so north is row 0.

use std::f64::consts::TAU;

use crate::common::{LatLng, PixelPoint, PrepError, ProjectionConfig};

#[derive(Debug, Clone, Copy)]
pub struct MapProjector {
    config: ProjectionConfig,
    start_longitude_rad: f64,
}

impl MapProjector {
    pub fn new(config: ProjectionConfig) -> Result<Self, PrepError> {
        config.validate()?;
        Ok(Self {
            config,
            start_longitude_rad: config.start_longitude.to_radians(),
        })
    }

    pub fn config(&self) -> &ProjectionConfig {
        &self.config
    }

    /// Column for a longitude in degrees. Any finite longitude is accepted.
    pub fn column(&self, longitude: f64) -> u32 {
        let width = self.config.map_width;
        let offset = (longitude.to_radians() - self.start_longitude_rad).rem_euclid(TAU);
        let x = (offset / TAU * f64::from(width)).round() as u32;
        // Offsets just short of a full turn round up onto the seam.
        x % width
    }

    /// Row for a latitude in degrees, clamped to the configured band.
    pub fn row(&self, latitude: f64) -> u32 {
        let ProjectionConfig {
            map_height,
            min_latitude,
            max_latitude,
            ..
        } = self.config;
        let lat = latitude.clamp(min_latitude, max_latitude);
        let fraction = (lat - min_latitude) / (max_latitude - min_latitude);
        let y = ((1.0 - fraction) * f64::from(map_height)).round() as u32;
        // The southern bound itself would land one row past the bottom edge.
        y.min(map_height - 1)
    }

    pub fn project(&self, latitude: f64, longitude: f64) -> PixelPoint {
        PixelPoint::new(self.column(longitude), self.row(latitude))
    }

    pub fn project_latlng(&self, position: LatLng) -> PixelPoint {
        self.project(position.lat, position.lng)
    }
}
