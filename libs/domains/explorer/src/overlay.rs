//! Viewport-driven thumbnail overlays.
//!
//! Overlays are all-or-nothing: they are produced only while every displayed
//! axis is zoomed below the threshold, and then only for points inside the
//! visible range (bounds inclusive). The output depends on nothing but the
//! inputs, so callers replace the previous directive set wholesale.

use crate::error::ExplorerResult;
use crate::models::{DataPointRecord, OverlayDirective, OverlayLayer, ViewportRange};

/// Axis extent, in projected units, below which overlays appear
pub const ZOOM_THRESHOLD: f64 = 2.0;
/// Thumbnail edge length in projected units
pub const THUMBNAIL_SIZE: f64 = 0.25;
pub const OVERLAY_OPACITY: f64 = 0.9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayConfig {
    pub zoom_threshold: f64,
    pub thumbnail_size: f64,
    pub opacity: f64,
    pub layer: OverlayLayer,
}

impl OverlayConfig {
    /// Reads `OVERLAY_ZOOM_THRESHOLD`, `OVERLAY_THUMBNAIL_SIZE` and `OVERLAY_OPACITY`
    pub fn from_env() -> ExplorerResult<Self> {
        let defaults = Self::default();
        Ok(Self {
            zoom_threshold: core_config::env_parse_or(
                "OVERLAY_ZOOM_THRESHOLD",
                defaults.zoom_threshold,
            )?,
            thumbnail_size: core_config::env_parse_or(
                "OVERLAY_THUMBNAIL_SIZE",
                defaults.thumbnail_size,
            )?,
            opacity: core_config::env_parse_or("OVERLAY_OPACITY", defaults.opacity)?,
            layer: defaults.layer,
        })
    }

    /// True when the range is non-empty and every axis extent is below the threshold
    pub fn is_zoomed_in(&self, range: &ViewportRange) -> bool {
        !range.is_empty()
            && range.axes().iter().all(|r| {
                let extent = r.extent();
                extent.is_finite() && extent < self.zoom_threshold
            })
    }

    pub fn compute(
        &self,
        range: &ViewportRange,
        points: &[DataPointRecord],
    ) -> Vec<OverlayDirective> {
        if !self.is_zoomed_in(range) {
            return Vec::new();
        }

        points
            .iter()
            .filter_map(|point| {
                let position = range
                    .axes()
                    .iter()
                    .map(|r| point.coordinate(r.axis).filter(|v| r.contains(*v)))
                    .collect::<Option<Vec<f64>>>()?;

                Some(OverlayDirective {
                    record_id: point.id,
                    image_url: point.image_url.clone(),
                    position,
                    size: self.thumbnail_size,
                    opacity: self.opacity,
                    layer: self.layer,
                })
            })
            .collect()
    }
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            zoom_threshold: ZOOM_THRESHOLD,
            thumbnail_size: THUMBNAIL_SIZE,
            opacity: OVERLAY_OPACITY,
            layer: OverlayLayer::Above,
        }
    }
}

/// Overlay directives for `points` under `range`, using the default constants
pub fn compute_overlays(range: &ViewportRange, points: &[DataPointRecord]) -> Vec<OverlayDirective> {
    OverlayConfig::default().compute(range, points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Axis;
    use uuid::Uuid;

    fn point(id: i64, coordinate: &[f64]) -> DataPointRecord {
        DataPointRecord {
            id,
            project_id: Uuid::nil(),
            label: format!("img-{id}"),
            image_url: format!("https://cdn.test/{id}.jpg"),
            embedding_vector: None,
            projected_coordinate: coordinate.to_vec(),
        }
    }

    fn cloud() -> Vec<DataPointRecord> {
        vec![
            point(1, &[0.0, 0.0]),
            point(2, &[0.5, 0.5]),
            point(3, &[5.0, 5.0]),
        ]
    }

    #[test]
    fn test_zoomed_in_emits_points_in_range() {
        let range = ViewportRange::planar((-1.0, 1.0), (-1.0, 1.0));
        let overlays = compute_overlays(&range, &cloud());

        let ids: Vec<_> = overlays.iter().map(|o| o.record_id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(overlays[1].position, vec![0.5, 0.5]);
        assert_eq!(overlays[1].size, THUMBNAIL_SIZE);
        assert_eq!(overlays[1].opacity, OVERLAY_OPACITY);
        assert_eq!(overlays[1].layer, OverlayLayer::Above);
    }

    #[test]
    fn test_one_wide_axis_disables_overlays() {
        let range = ViewportRange::planar((-0.1, 0.1), (-10.0, 10.0));
        assert!(compute_overlays(&range, &cloud()).is_empty());
    }

    #[test]
    fn test_extent_equal_to_threshold_is_not_zoomed() {
        let range = ViewportRange::planar((0.0, ZOOM_THRESHOLD), (0.0, 1.0));
        assert!(compute_overlays(&range, &cloud()).is_empty());
    }

    #[test]
    fn test_boundary_points_are_included() {
        let range = ViewportRange::planar((0.5, 1.5), (-0.5, 0.5));
        let overlays = compute_overlays(&range, &cloud());

        assert_eq!(overlays.len(), 1);
        assert_eq!(overlays[0].record_id, 2);
    }

    #[test]
    fn test_identical_inputs_give_identical_output() {
        let range = ViewportRange::planar((-1.0, 1.0), (-1.0, 1.0));
        let points = cloud();

        assert_eq!(compute_overlays(&range, &points), compute_overlays(&range, &points));
    }

    #[test]
    fn test_empty_inputs() {
        assert!(compute_overlays(&ViewportRange::new(), &cloud()).is_empty());
        let range = ViewportRange::planar((10.0, 11.0), (10.0, 11.0));
        assert!(compute_overlays(&range, &cloud()).is_empty());
        assert!(compute_overlays(&range, &[]).is_empty());
    }

    #[test]
    fn test_reversed_bounds_are_normalised() {
        let range = ViewportRange::planar((1.0, -1.0), (1.0, -1.0));
        assert_eq!(compute_overlays(&range, &cloud()).len(), 2);
    }

    #[test]
    fn test_decoded_reversed_range_matches_built_range() {
        let built = ViewportRange::planar((0.5, -0.5), (0.5, -0.5));
        let decoded: ViewportRange = serde_json::from_str(
            r#"{"axes": [{"axis": "x", "min": 0.5, "max": -0.5}, {"axis": "y", "min": 0.5, "max": -0.5}]}"#,
        )
        .unwrap();
        let points = [point(1, &[0.0, 0.0])];

        assert_eq!(compute_overlays(&decoded, &points), compute_overlays(&built, &points));
        assert_eq!(compute_overlays(&decoded, &points).len(), 1);
    }

    #[test]
    fn test_wide_reversed_range_is_not_zoomed() {
        let decoded: ViewportRange = serde_json::from_str(
            r#"{"axes": [{"axis": "x", "min": 50.0, "max": -50.0}, {"axis": "y", "min": 0.5, "max": -0.5}]}"#,
        )
        .unwrap();
        assert!(!OverlayConfig::default().is_zoomed_in(&decoded));
    }

    #[test]
    fn test_nan_bound_is_not_zoomed() {
        let range = ViewportRange::planar((f64::NAN, 0.5), (0.0, 0.5));
        assert!(!OverlayConfig::default().is_zoomed_in(&range));
    }

    #[test]
    fn test_spatial_range_uses_three_components() {
        let points = vec![point(1, &[0.1, 0.2, 0.3]), point(2, &[0.1, 0.2, 4.0])];
        let range = ViewportRange::spatial((0.0, 1.0), (0.0, 1.0), (0.0, 1.0));

        let overlays = compute_overlays(&range, &points);
        assert_eq!(overlays.len(), 1);
        assert_eq!(overlays[0].position, vec![0.1, 0.2, 0.3]);
    }

    #[test]
    fn test_points_missing_an_axis_are_skipped() {
        let range = ViewportRange::planar((0.0, 1.0), (0.0, 1.0)).with_axis(Axis::Z, 0.0, 1.0);
        assert!(compute_overlays(&range, &cloud()).is_empty());
    }

    #[test]
    fn test_custom_threshold() {
        let config = OverlayConfig {
            zoom_threshold: 20.0,
            ..OverlayConfig::default()
        };
        let range = ViewportRange::planar((-10.0, 9.0), (-10.0, 9.0));

        assert_eq!(config.compute(&range, &cloud()).len(), 3);
    }

    #[test]
    fn test_config_from_env() {
        temp_env::with_vars(
            [
                ("OVERLAY_ZOOM_THRESHOLD", Some("5.5")),
                ("OVERLAY_THUMBNAIL_SIZE", None),
                ("OVERLAY_OPACITY", None),
            ],
            || {
                let config = OverlayConfig::from_env().unwrap();
                assert_eq!(config.zoom_threshold, 5.5);
                assert_eq!(config.thumbnail_size, THUMBNAIL_SIZE);
            },
        );
    }
}
