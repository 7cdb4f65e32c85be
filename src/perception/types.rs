use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementType {
    Button,
    Input,
    Link,
    Text,
    Image,
    Checkbox,
    Radio,
    Select,
    Menu,
    MenuItem,
    Icon,
    Container,
    /// Synthetic element produced by the grid fallback.
    GridCell,
    Unknown,
}

impl ElementType {
    pub fn as_str(self) -> &'static str {
        match self {
            ElementType::Button => "button",
            ElementType::Input => "input",
            ElementType::Link => "link",
            ElementType::Text => "text",
            ElementType::Image => "image",
            ElementType::Checkbox => "checkbox",
            ElementType::Radio => "radio",
            ElementType::Select => "select",
            ElementType::Menu => "menu",
            ElementType::MenuItem => "menu_item",
            ElementType::Icon => "icon",
            ElementType::Container => "container",
            ElementType::GridCell => "grid_cell",
            ElementType::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UIElement {
    /// Unique within one snapshot only.
    pub id: String,
    pub kind: ElementType,
    /// Normalized bounding box [xmin, ymin, xmax, ymax] in range 0.0–1.0
    pub bbox: [f32; 4],
    pub label: Option<String>,
    pub confidence: f32,
    /// Smallest enclosing element, for hierarchy context.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

impl UIElement {
    /// Centre of the bounding box in normalized space.
    pub fn center(&self) -> (f64, f64) {
        (
            (self.bbox[0] as f64 + self.bbox[2] as f64) / 2.0,
            (self.bbox[1] as f64 + self.bbox[3] as f64) / 2.0,
        )
    }

    /// `xmin < xmax`, `ymin < ymax`, everything inside [0, 1].
    pub fn is_well_formed(&self) -> bool {
        let [x1, y1, x2, y2] = self.bbox;
        self.bbox.iter().all(|v| (0.0..=1.0).contains(v)) && x1 < x2 && y1 < y2
    }

    pub fn area(&self) -> f32 {
        (self.bbox[2] - self.bbox[0]) * (self.bbox[3] - self.bbox[1])
    }

    /// Whether `other` lies entirely inside this element's box.
    pub fn contains(&self, other: &UIElement) -> bool {
        self.bbox[0] <= other.bbox[0]
            && self.bbox[1] <= other.bbox[1]
            && self.bbox[2] >= other.bbox[2]
            && self.bbox[3] >= other.bbox[3]
    }
}

/// Device metadata captured atomically with one screenshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CaptureMeta {
    pub logical_width: u32,
    pub logical_height: u32,
    /// Physical pixels per logical pixel. Always > 0.
    pub scale_factor: f64,
    /// Physical desktop position of the captured monitor's top-left corner.
    pub monitor_origin_x: i32,
    pub monitor_origin_y: i32,
    pub monitor_index: u32,
}

impl CaptureMeta {
    pub fn physical_size(&self) -> (u32, u32) {
        (
            (self.logical_width as f64 * self.scale_factor).round() as u32,
            (self.logical_height as f64 * self.scale_factor).round() as u32,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerceptionSource {
    /// Trained element detector output.
    Detector,
    /// N×N labeled grid fallback.
    SomGrid,
}

/// One screen capture plus its localized targets. Immutable once built; the
/// capture metadata can only be read through the snapshot it belongs to.
#[derive(Debug, Clone)]
pub struct PerceptionSnapshot {
    image: Option<Vec<u8>>,
    elements: Vec<UIElement>,
    meta: CaptureMeta,
    source: PerceptionSource,
    grid_n: Option<u32>,
    captured_at: chrono::DateTime<chrono::Utc>,
}

impl PerceptionSnapshot {
    pub fn from_detections(
        image: Option<Vec<u8>>,
        elements: Vec<UIElement>,
        meta: CaptureMeta,
    ) -> Self {
        Self {
            image,
            elements,
            meta,
            source: PerceptionSource::Detector,
            grid_n: None,
            captured_at: chrono::Utc::now(),
        }
    }

    pub fn grid(
        image: Option<Vec<u8>>,
        elements: Vec<UIElement>,
        meta: CaptureMeta,
        grid_n: u32,
    ) -> Self {
        Self {
            image,
            elements,
            meta,
            source: PerceptionSource::SomGrid,
            grid_n: Some(grid_n),
            captured_at: chrono::Utc::now(),
        }
    }

    /// PNG bytes shown to the model (annotated or gridded when enabled).
    pub fn image(&self) -> Option<&[u8]> {
        self.image.as_deref()
    }

    pub fn elements(&self) -> &[UIElement] {
        &self.elements
    }

    pub fn element(&self, id: &str) -> Option<&UIElement> {
        self.elements.iter().find(|e| e.id == id)
    }

    pub fn meta(&self) -> &CaptureMeta {
        &self.meta
    }

    pub fn source(&self) -> PerceptionSource {
        self.source
    }

    /// Grid size when the snapshot came from the grid fallback.
    pub fn grid_n(&self) -> Option<u32> {
        self.grid_n
    }

    pub fn captured_at(&self) -> chrono::DateTime<chrono::Utc> {
        self.captured_at
    }
}
