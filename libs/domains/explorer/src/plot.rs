//! Renderable scatter view over the coordinate store.

use serde::Serialize;
use std::sync::Arc;

use observability::ExplorerMetrics;

use crate::error::{ExplorerError, ExplorerResult};
use crate::models::{DataPointId, Dimensionality, OverlayDirective, ViewportRange};
use crate::overlay::OverlayConfig;
use crate::store::{CoordinateStore, StoreSnapshot};

pub const MARKER_SIZE: f64 = 8.0;
pub const COLORSCALE: &str = "Viridis";
pub const COLORBAR_TITLE: &str = "Component 1";

/// Marker series, one entry per record in store order
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScatterTrace {
    pub ids: Vec<DataPointId>,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub z: Option<Vec<f64>>,
    /// Hover text
    pub text: Vec<String>,
    /// Colour values, taken from the first component
    pub color: Vec<f64>,
    pub marker_size: f64,
    pub colorscale: &'static str,
    pub colorbar_title: &'static str,
}

impl ScatterTrace {
    fn from_snapshot(snapshot: &StoreSnapshot, view: Dimensionality) -> Self {
        let spatial = view == Dimensionality::Three;
        let mut trace = ScatterTrace {
            z: spatial.then(Vec::new),
            marker_size: MARKER_SIZE,
            colorscale: COLORSCALE,
            colorbar_title: COLORBAR_TITLE,
            ..Default::default()
        };

        for record in &snapshot.records {
            let c = &record.projected_coordinate;
            let (Some(&x), Some(&y)) = (c.first(), c.get(1)) else {
                continue;
            };
            trace.ids.push(record.id);
            trace.x.push(x);
            trace.y.push(y);
            if let Some(z) = trace.z.as_mut() {
                z.push(c.get(2).copied().unwrap_or_default());
            }
            trace.text.push(format!("Name: {}", record.label));
            trace.color.push(x);
        }

        trace
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Everything needed to draw the plot at one store version
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlotFrame {
    pub version: u64,
    pub view: Dimensionality,
    pub trace: ScatterTrace,
    pub overlays: Vec<OverlayDirective>,
}

/// Binds the store and overlay engine; tracks the view mode and last viewport
#[derive(Debug)]
pub struct PlotSurface {
    store: CoordinateStore,
    overlay: OverlayConfig,
    view: Dimensionality,
    viewport: Option<ViewportRange>,
    overlays: Vec<OverlayDirective>,
    overlays_version: u64,
}

impl PlotSurface {
    pub fn new(store: CoordinateStore, overlay: OverlayConfig) -> Self {
        Self {
            store,
            overlay,
            view: Dimensionality::Two,
            viewport: None,
            overlays: Vec::new(),
            overlays_version: 0,
        }
    }

    pub fn view(&self) -> Dimensionality {
        self.view
    }

    /// Switch between 2D and 3D. 3D needs a store of 3-component points.
    pub fn set_view(&mut self, view: Dimensionality) -> ExplorerResult<()> {
        if view == Dimensionality::Three
            && self.store.snapshot().dimensionality != Some(Dimensionality::Three)
        {
            return Err(ExplorerError::Validation(
                "3D view needs three projected components".to_string(),
            ));
        }
        if self.view != view {
            self.view = view;
            self.viewport = None;
            self.overlays.clear();
        }
        Ok(())
    }

    /// Apply a new visible range and recompute overlays from scratch
    pub fn on_viewport_change(&mut self, range: ViewportRange) -> &[OverlayDirective] {
        let snapshot = self.store.snapshot();
        self.viewport = Some(range);
        self.recompute(&snapshot);
        &self.overlays
    }

    /// Forget the view mode and viewport, e.g. when another project is opened
    pub fn reset(&mut self) {
        self.view = Dimensionality::Two;
        self.viewport = None;
        self.overlays.clear();
        self.overlays_version = 0;
    }

    pub fn viewport(&self) -> Option<&ViewportRange> {
        self.viewport.as_ref()
    }

    pub fn overlays(&self) -> &[OverlayDirective] {
        &self.overlays
    }

    /// Current frame; overlays are recomputed if the store changed since the last viewport event
    pub fn frame(&mut self) -> PlotFrame {
        let snapshot = self.store.snapshot();

        if self.view == Dimensionality::Three
            && snapshot.dimensionality != Some(Dimensionality::Three)
        {
            tracing::debug!("Store is no longer 3D, falling back to 2D view");
            self.view = Dimensionality::Two;
            self.viewport = None;
        }
        if self.overlays_version != snapshot.version {
            self.recompute(&snapshot);
        }

        PlotFrame {
            version: snapshot.version,
            view: self.view,
            trace: ScatterTrace::from_snapshot(&snapshot, self.view),
            overlays: self.overlays.clone(),
        }
    }

    fn recompute(&mut self, snapshot: &Arc<StoreSnapshot>) {
        self.overlays = match &self.viewport {
            Some(range) => self.overlay.compute(range, &snapshot.records),
            None => Vec::new(),
        };
        self.overlays_version = snapshot.version;
        ExplorerMetrics::set_overlay_count(self.overlays.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DataPointRecord;
    use uuid::Uuid;

    fn record(project_id: Uuid, id: i64, label: &str, coordinate: &[f64]) -> DataPointRecord {
        DataPointRecord {
            id,
            project_id,
            label: label.to_string(),
            image_url: format!("https://cdn.test/{id}.jpg"),
            embedding_vector: None,
            projected_coordinate: coordinate.to_vec(),
        }
    }

    fn surface_with(records: Vec<DataPointRecord>) -> (PlotSurface, CoordinateStore, Uuid) {
        let store = CoordinateStore::new();
        let project_id = records.first().map(|r| r.project_id).unwrap_or_default();
        store.replace(project_id, records).unwrap();
        (PlotSurface::new(store.clone(), OverlayConfig::default()), store, project_id)
    }

    #[test]
    fn test_frame_builds_trace() {
        let project_id = Uuid::new_v4();
        let (mut surface, _, _) = surface_with(vec![
            record(project_id, 1, "cat.jpg", &[0.5, -1.0]),
            record(project_id, 2, "dog.jpg", &[2.0, 3.0]),
        ]);

        let frame = surface.frame();

        assert_eq!(frame.version, 1);
        assert_eq!(frame.view, Dimensionality::Two);
        assert_eq!(frame.trace.x, vec![0.5, 2.0]);
        assert_eq!(frame.trace.y, vec![-1.0, 3.0]);
        assert_eq!(frame.trace.z, None);
        assert_eq!(frame.trace.text, vec!["Name: cat.jpg", "Name: dog.jpg"]);
        assert_eq!(frame.trace.color, frame.trace.x);
        assert!(frame.overlays.is_empty());
    }

    #[test]
    fn test_viewport_change_replaces_overlays() {
        let project_id = Uuid::new_v4();
        let (mut surface, _, _) = surface_with(vec![
            record(project_id, 1, "a", &[0.0, 0.0]),
            record(project_id, 2, "b", &[3.0, 3.0]),
        ]);

        let overlays = surface.on_viewport_change(ViewportRange::planar((-0.5, 0.5), (-0.5, 0.5)));
        assert_eq!(overlays.len(), 1);

        let overlays = surface.on_viewport_change(ViewportRange::planar((2.5, 3.5), (2.5, 3.5)));
        assert_eq!(overlays.len(), 1);
        assert_eq!(overlays[0].record_id, 2);

        let overlays = surface.on_viewport_change(ViewportRange::planar((-10.0, 10.0), (-10.0, 10.0)));
        assert!(overlays.is_empty());
    }

    #[test]
    fn test_refresh_recomputes_overlays_with_last_viewport() {
        let project_id = Uuid::new_v4();
        let (mut surface, store, _) = surface_with(vec![record(project_id, 1, "a", &[5.0, 5.0])]);
        surface.on_viewport_change(ViewportRange::planar((-0.5, 0.5), (-0.5, 0.5)));
        assert!(surface.overlays().is_empty());

        // Re-fit moved the point into view
        store
            .replace(project_id, vec![record(project_id, 1, "a", &[0.1, 0.1])])
            .unwrap();

        let frame = surface.frame();
        assert_eq!(frame.version, 2);
        assert_eq!(frame.overlays.len(), 1);
    }

    #[test]
    fn test_three_d_view_needs_three_components() {
        let project_id = Uuid::new_v4();
        let (mut surface, _, _) = surface_with(vec![record(project_id, 1, "a", &[0.0, 0.0])]);

        assert!(surface.set_view(Dimensionality::Three).is_err());
        assert_eq!(surface.view(), Dimensionality::Two);
    }

    #[test]
    fn test_three_d_view_includes_z() {
        let project_id = Uuid::new_v4();
        let (mut surface, _, _) =
            surface_with(vec![record(project_id, 1, "a", &[0.1, 0.2, 0.3])]);

        surface.set_view(Dimensionality::Three).unwrap();
        let frame = surface.frame();

        assert_eq!(frame.view, Dimensionality::Three);
        assert_eq!(frame.trace.z, Some(vec![0.3]));
    }

    #[test]
    fn test_view_falls_back_when_store_loses_third_axis() {
        let project_id = Uuid::new_v4();
        let (mut surface, store, _) =
            surface_with(vec![record(project_id, 1, "a", &[0.1, 0.2, 0.3])]);
        surface.set_view(Dimensionality::Three).unwrap();

        store.reset(Some(project_id));

        assert_eq!(surface.frame().view, Dimensionality::Two);
    }

    #[test]
    fn test_frame_serialises() {
        let project_id = Uuid::new_v4();
        let (mut surface, _, _) = surface_with(vec![record(project_id, 1, "a", &[0.0, 0.0])]);

        let json = serde_json::to_value(surface.frame()).unwrap();

        assert_eq!(json["view"], "2d");
        assert_eq!(json["trace"]["colorscale"], "Viridis");
        assert!(json["trace"].get("z").is_none());
    }
}
