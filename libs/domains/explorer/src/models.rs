use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use strum::{Display, EnumIter, EnumString};
use uuid::Uuid;

/// Identifier assigned to a data point by the relational store
pub type DataPointId = i64;

// ============================================================================
// Files
// ============================================================================

/// Image formats accepted for ingestion and image probes
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[strum(ascii_case_insensitive)]
pub enum ImageKind {
    #[strum(to_string = "image/jpeg", serialize = "image/jpg")]
    #[serde(rename = "image/jpeg", alias = "image/jpg")]
    Jpeg,
    #[strum(to_string = "image/png")]
    #[serde(rename = "image/png")]
    Png,
    #[strum(to_string = "image/gif")]
    #[serde(rename = "image/gif")]
    Gif,
}

impl ImageKind {
    /// Resolve a MIME type, ignoring parameters such as `; charset=binary`
    pub fn from_mime(mime_type: &str) -> Option<Self> {
        mime_type
            .split(';')
            .next()
            .map(str::trim)
            .and_then(|essence| essence.parse().ok())
    }

    pub fn extension(self) -> &'static str {
        match self {
            ImageKind::Jpeg => "jpg",
            ImageKind::Png => "png",
            ImageKind::Gif => "gif",
        }
    }
}

/// A user-selected file: name, declared MIME type and raw bytes
#[derive(Clone, PartialEq, Eq)]
pub struct ImageFile {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl ImageFile {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }

    pub fn kind(&self) -> Option<ImageKind> {
        ImageKind::from_mime(&self.mime_type)
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for ImageFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageFile")
            .field("name", &self.name)
            .field("mime_type", &self.mime_type)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

// ============================================================================
// Coordinates
// ============================================================================

/// Plot axis
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    /// Position of this axis inside a projected coordinate
    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }
}

/// Number of projected components shown by a store or a plot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display)]
pub enum Dimensionality {
    #[default]
    #[serde(rename = "2d")]
    #[strum(to_string = "2d")]
    Two,
    #[serde(rename = "3d")]
    #[strum(to_string = "3d")]
    Three,
}

impl Dimensionality {
    pub fn from_components(components: usize) -> Option<Self> {
        match components {
            2 => Some(Dimensionality::Two),
            3 => Some(Dimensionality::Three),
            _ => None,
        }
    }

    pub fn components(self) -> usize {
        match self {
            Dimensionality::Two => 2,
            Dimensionality::Three => 3,
        }
    }

    pub fn axes(self) -> &'static [Axis] {
        match self {
            Dimensionality::Two => &[Axis::X, Axis::Y],
            Dimensionality::Three => &[Axis::X, Axis::Y, Axis::Z],
        }
    }
}

/// A projected image as held by the coordinate store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPointRecord {
    pub id: DataPointId,
    pub project_id: Uuid,
    pub label: String,
    pub image_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_vector: Option<Vec<f32>>,
    pub projected_coordinate: Vec<f64>,
}

impl DataPointRecord {
    pub fn dimension(&self) -> usize {
        self.projected_coordinate.len()
    }

    pub fn coordinate(&self, axis: Axis) -> Option<f64> {
        self.projected_coordinate.get(axis.index()).copied()
    }
}

// ============================================================================
// Viewport & overlays
// ============================================================================

/// Visible interval on one axis; bounds are inclusive
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawAxisRange")]
pub struct AxisRange {
    pub axis: Axis,
    pub min: f64,
    pub max: f64,
}

#[derive(Deserialize)]
struct RawAxisRange {
    axis: Axis,
    min: f64,
    max: f64,
}

impl From<RawAxisRange> for AxisRange {
    fn from(raw: RawAxisRange) -> Self {
        Self::new(raw.axis, raw.min, raw.max)
    }
}

impl AxisRange {
    /// Build a range, swapping reversed bounds. NaN bounds are kept as-is.
    pub fn new(axis: Axis, a: f64, b: f64) -> Self {
        let (min, max) = if b < a { (b, a) } else { (a, b) };
        Self { axis, min, max }
    }

    pub fn extent(&self) -> f64 {
        self.max - self.min
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Latest visible range reported by the plot, one entry per displayed axis
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawViewportRange")]
pub struct ViewportRange {
    axes: Vec<AxisRange>,
}

#[derive(Deserialize)]
struct RawViewportRange {
    #[serde(default)]
    axes: Vec<AxisRange>,
}

/// Decoded ranges go through `with_axis`, so repeated axes collapse to the last one
impl From<RawViewportRange> for ViewportRange {
    fn from(raw: RawViewportRange) -> Self {
        raw.axes
            .into_iter()
            .fold(Self::new(), |range, r| range.with_axis(r.axis, r.min, r.max))
    }
}

impl ViewportRange {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn planar(x: (f64, f64), y: (f64, f64)) -> Self {
        Self::new().with_axis(Axis::X, x.0, x.1).with_axis(Axis::Y, y.0, y.1)
    }

    pub fn spatial(x: (f64, f64), y: (f64, f64), z: (f64, f64)) -> Self {
        Self::planar(x, y).with_axis(Axis::Z, z.0, z.1)
    }

    /// Set the range of one axis, replacing an earlier value for the same axis
    pub fn with_axis(mut self, axis: Axis, min: f64, max: f64) -> Self {
        let range = AxisRange::new(axis, min, max);
        match self.axes.iter_mut().find(|r| r.axis == axis) {
            Some(existing) => *existing = range,
            None => {
                self.axes.push(range);
                self.axes.sort_by_key(|r| r.axis);
            }
        }
        self
    }

    pub fn axes(&self) -> &[AxisRange] {
        &self.axes
    }

    pub fn get(&self, axis: Axis) -> Option<&AxisRange> {
        self.axes.iter().find(|r| r.axis == axis)
    }

    pub fn is_empty(&self) -> bool {
        self.axes.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum OverlayLayer {
    #[default]
    Above,
    Below,
}

/// Instruction to draw a thumbnail at a plotted position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlayDirective {
    pub record_id: DataPointId,
    pub image_url: String,
    /// Anchor in plot units, one component per viewport axis
    pub position: Vec<f64>,
    pub size: f64,
    pub opacity: f64,
    pub layer: OverlayLayer,
}

// ============================================================================
// Queries
// ============================================================================

/// Number of nearest neighbours a probe asks for
pub const MIN_TOP_K: u32 = 1;
pub const MAX_TOP_K: u32 = 10;
pub const DEFAULT_TOP_K: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ProbeKind {
    Text,
    Image,
}

/// User-supplied similarity probe
#[derive(Debug, Clone, PartialEq)]
pub enum QueryProbe {
    Text { text: String, top_k: u32 },
    Image { blob: ImageFile, top_k: u32 },
}

impl QueryProbe {
    pub fn text(text: impl Into<String>, top_k: u32) -> Self {
        QueryProbe::Text {
            text: text.into(),
            top_k,
        }
    }

    pub fn image(blob: ImageFile, top_k: u32) -> Self {
        QueryProbe::Image { blob, top_k }
    }

    pub fn kind(&self) -> ProbeKind {
        match self {
            QueryProbe::Text { .. } => ProbeKind::Text,
            QueryProbe::Image { .. } => ProbeKind::Image,
        }
    }

    pub fn top_k(&self) -> u32 {
        match self {
            QueryProbe::Text { top_k, .. } | QueryProbe::Image { top_k, .. } => *top_k,
        }
    }
}

/// One row of the remote `/query` response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryHit {
    pub data_point_id: DataPointId,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub similarity: Option<f64>,
    #[serde(default)]
    pub image_url: Option<String>,
}

/// A ranked query result ready for display
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub data_point_id: DataPointId,
    pub label: String,
    pub image_url: Option<String>,
    pub similarity_score: Option<f64>,
}

impl QueryResult {
    /// Score with two decimals, or `N/A` when the service sent none
    pub fn score_label(&self) -> String {
        match self.similarity_score {
            Some(score) if score.is_finite() => format!("{:.2}", score),
            _ => "N/A".to_string(),
        }
    }
}

impl From<QueryHit> for QueryResult {
    fn from(hit: QueryHit) -> Self {
        Self {
            data_point_id: hit.data_point_id,
            label: hit.label,
            image_url: hit.image_url,
            similarity_score: hit.similarity,
        }
    }
}

impl fmt::Display for QueryResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Data Point ID: {}, Similarity Score: {}",
            self.data_point_id,
            self.score_label()
        )
    }
}

// ============================================================================
// Embedding service payloads
// ============================================================================

/// One entry of the batched embed/project request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedItem {
    pub data_point_id: DataPointId,
    pub image_url: String,
}

/// Projection returned for one data point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectedPoint {
    #[serde(alias = "dataPointId")]
    pub data_point_id: DataPointId,
    #[serde(
        alias = "projectedCoordinate",
        alias = "coordinate",
        alias = "pca_embedding"
    )]
    pub projected_coordinate: Vec<f64>,
}

// ============================================================================
// Persisted data points
// ============================================================================

/// Data point row as stored by the relational collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub id: DataPointId,
    pub project_id: Uuid,
    pub label: String,
    pub image_url: String,
    pub created_at: DateTime<Utc>,
}

/// DTO for creating a data point
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDataPoint {
    pub project_id: Uuid,
    pub label: String,
    pub image_url: String,
}
