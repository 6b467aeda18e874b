// ============================================================================
// OVERLAY SCENE — annotation elements with selection, drag, transform, and
// text editing. The scene itself is never committed: every mutation is
// flattened onto the current bitmap and the raster becomes the preview.
// ============================================================================

pub mod render;

use crate::ops::text::{FontStyle, TextAlignment};

/// Stable per-session element identifier, rendered as `element-{n}`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ElementId(u32);

impl std::fmt::Display for ElementId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "element-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
//  Elements
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq)]
pub struct TextElement {
    pub id: ElementId,
    pub x: f32,
    pub y: f32,
    pub content: String,
    pub font_family: String,
    pub font_size: f32,
    pub style: FontStyle,
    pub align: TextAlignment,
    pub stroke: [u8; 4],
    pub fill: [u8; 4],
    pub rotation: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LineElement {
    pub id: ElementId,
    pub x: f32,
    pub y: f32,
    /// Endpoints relative to (x, y).
    pub points: [(f32, f32); 2],
    pub stroke_width: f32,
    pub stroke: [u8; 4],
    pub fill: [u8; 4],
    pub rotation: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CircleElement {
    pub id: ElementId,
    pub x: f32,
    pub y: f32,
    pub radius: f32,
    pub stroke_width: f32,
    pub stroke: [u8; 4],
    pub fill: [u8; 4],
    pub rotation: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RectElement {
    pub id: ElementId,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub stroke_width: f32,
    pub stroke: [u8; 4],
    pub fill: [u8; 4],
    pub rotation: f32,
}

/// Tagged union over the annotation kinds. Dispatch is on the variant — an
/// element only carries the geometry its kind actually uses.
#[derive(Clone, Debug, PartialEq)]
pub enum OverlayElement {
    Text(TextElement),
    Line(LineElement),
    Circle(CircleElement),
    Rect(RectElement),
}

impl OverlayElement {
    pub fn id(&self) -> ElementId {
        match self {
            OverlayElement::Text(e) => e.id,
            OverlayElement::Line(e) => e.id,
            OverlayElement::Circle(e) => e.id,
            OverlayElement::Rect(e) => e.id,
        }
    }

    pub fn position(&self) -> (f32, f32) {
        match self {
            OverlayElement::Text(e) => (e.x, e.y),
            OverlayElement::Line(e) => (e.x, e.y),
            OverlayElement::Circle(e) => (e.x, e.y),
            OverlayElement::Rect(e) => (e.x, e.y),
        }
    }

    pub fn rotation(&self) -> f32 {
        match self {
            OverlayElement::Text(e) => e.rotation,
            OverlayElement::Line(e) => e.rotation,
            OverlayElement::Circle(e) => e.rotation,
            OverlayElement::Rect(e) => e.rotation,
        }
    }

    pub fn kind_label(&self) -> &'static str {
        match self {
            OverlayElement::Text(_) => "text",
            OverlayElement::Line(_) => "line",
            OverlayElement::Circle(_) => "circle",
            OverlayElement::Rect(_) => "rect",
        }
    }

    fn set_position(&mut self, x: f32, y: f32) {
        match self {
            OverlayElement::Text(e) => {
                e.x = x;
                e.y = y;
            }
            OverlayElement::Line(e) => {
                e.x = x;
                e.y = y;
            }
            OverlayElement::Circle(e) => {
                e.x = x;
                e.y = y;
            }
            OverlayElement::Rect(e) => {
                e.x = x;
                e.y = y;
            }
        }
    }

    fn set_rotation(&mut self, rotation: f32) {
        match self {
            OverlayElement::Text(e) => e.rotation = rotation,
            OverlayElement::Line(e) => e.rotation = rotation,
            OverlayElement::Circle(e) => e.rotation = rotation,
            OverlayElement::Rect(e) => e.rotation = rotation,
        }
    }

    fn set_colors(&mut self, color: [u8; 4]) {
        match self {
            OverlayElement::Text(e) => {
                e.stroke = color;
                e.fill = color;
            }
            OverlayElement::Line(e) => {
                e.stroke = color;
                e.fill = color;
            }
            OverlayElement::Circle(e) => {
                e.stroke = color;
                e.fill = color;
            }
            OverlayElement::Rect(e) => {
                e.stroke = color;
                e.fill = color;
            }
        }
    }

    /// Fold a finished transform's scale factors into the stored geometry.
    /// Afterwards the element reads as if it had been created at this size —
    /// the next transform starts from identity scale, nothing compounds.
    fn scale_geometry(&mut self, sx: f32, sy: f32) {
        match self {
            OverlayElement::Text(e) => {
                // Text scales uniformly through its font size.
                e.font_size = (e.font_size * sx.abs().max(sy.abs())).max(1.0);
            }
            OverlayElement::Line(e) => {
                for p in &mut e.points {
                    p.0 *= sx;
                    p.1 *= sy;
                }
            }
            OverlayElement::Circle(e) => {
                e.radius = (e.radius * sx.abs().max(sy.abs())).max(0.5);
            }
            OverlayElement::Rect(e) => {
                e.width = (e.width * sx.abs()).max(1.0);
                e.height = (e.height * sy.abs()).max(1.0);
            }
        }
    }

    /// Local-space half extents used for hit testing (text is approximated
    /// from its content, which is good enough for pointer picking).
    fn half_extents(&self) -> (f32, f32) {
        match self {
            OverlayElement::Text(e) => {
                let longest = e
                    .content
                    .split('\n')
                    .map(|l| l.chars().count())
                    .max()
                    .unwrap_or(0) as f32;
                let lines = e.content.split('\n').count() as f32;
                (
                    (longest * e.font_size * 0.3).max(e.font_size * 0.5),
                    (lines * e.font_size * 0.6).max(e.font_size * 0.5),
                )
            }
            OverlayElement::Line(e) => {
                let hx = e.points.iter().map(|p| p.0.abs()).fold(0.0, f32::max);
                let hy = e.points.iter().map(|p| p.1.abs()).fold(0.0, f32::max);
                (hx + e.stroke_width, hy + e.stroke_width)
            }
            OverlayElement::Circle(e) => (e.radius, e.radius),
            OverlayElement::Rect(e) => (e.width * 0.5, e.height * 0.5),
        }
    }

    /// Rotation-aware point containment test.
    fn hit_test(&self, px: f32, py: f32) -> bool {
        let (cx, cy) = self.position();
        let (sin, cos) = (-self.rotation()).to_radians().sin_cos();
        let dx = px - cx;
        let dy = py - cy;
        let lx = dx * cos - dy * sin;
        let ly = dx * sin + dy * cos;
        let (hx, hy) = self.half_extents();
        lx.abs() <= hx && ly.abs() <= hy
    }
}

// ---------------------------------------------------------------------------
//  Interaction state machine
// ---------------------------------------------------------------------------

/// Per-element interaction: Idle → Selected → (Dragging | Transforming |
/// EditingText) → Idle. Selection is tracked separately so a drag or
/// transform always acts on the sole selected element.
#[derive(Clone, Debug, PartialEq, Default)]
pub enum Interaction {
    #[default]
    Idle,
    Dragging {
        id: ElementId,
        /// Pointer offset from the element position at grab time.
        grab: (f32, f32),
    },
    Transforming {
        id: ElementId,
        scale_x: f32,
        scale_y: f32,
        rotation: f32,
    },
    EditingText {
        id: ElementId,
        draft: String,
    },
}

// ---------------------------------------------------------------------------
//  Scene
// ---------------------------------------------------------------------------

/// The mutable annotation scene for the overlay tool. Methods that change
/// what would be rendered return `true`; the session flattens the scene into
/// a new preview bitmap whenever that happens.
#[derive(Clone, Debug, Default)]
pub struct OverlayScene {
    elements: Vec<OverlayElement>,
    selected: Option<ElementId>,
    interaction: Interaction,
    next_id: u32,
}

impl OverlayScene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn elements(&self) -> &[OverlayElement] {
        &self.elements
    }

    pub fn element(&self, id: ElementId) -> Option<&OverlayElement> {
        self.elements.iter().find(|e| e.id() == id)
    }

    pub fn selected(&self) -> Option<ElementId> {
        self.selected
    }

    pub fn interaction(&self) -> &Interaction {
        &self.interaction
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    fn fresh_id(&mut self) -> ElementId {
        self.next_id += 1;
        ElementId(self.next_id)
    }

    fn element_mut(&mut self, id: ElementId) -> Option<&mut OverlayElement> {
        self.elements.iter_mut().find(|e| e.id() == id)
    }

    // -- Add (type-specific defaults; new elements are NOT auto-selected) --

    pub fn add_text(&mut self, x: f32, y: f32, content: &str) -> ElementId {
        let id = self.fresh_id();
        self.elements.push(OverlayElement::Text(TextElement {
            id,
            x,
            y,
            content: content.to_string(),
            font_family: "Arial".to_string(),
            font_size: 24.0,
            style: FontStyle::Normal,
            align: TextAlignment::Left,
            stroke: [0, 0, 0, 255],
            fill: [0, 0, 0, 255],
            rotation: 0.0,
        }));
        id
    }

    pub fn add_line(&mut self, x: f32, y: f32) -> ElementId {
        let id = self.fresh_id();
        self.elements.push(OverlayElement::Line(LineElement {
            id,
            x,
            y,
            points: [(-60.0, 0.0), (60.0, 0.0)],
            stroke_width: 4.0,
            stroke: [0, 0, 0, 255],
            fill: [0, 0, 0, 255],
            rotation: 0.0,
        }));
        id
    }

    pub fn add_circle(&mut self, x: f32, y: f32) -> ElementId {
        let id = self.fresh_id();
        self.elements.push(OverlayElement::Circle(CircleElement {
            id,
            x,
            y,
            radius: 40.0,
            stroke_width: 2.0,
            stroke: [0, 0, 0, 255],
            fill: [0, 0, 0, 255],
            rotation: 0.0,
        }));
        id
    }

    pub fn add_rect(&mut self, x: f32, y: f32) -> ElementId {
        let id = self.fresh_id();
        self.elements.push(OverlayElement::Rect(RectElement {
            id,
            x,
            y,
            width: 120.0,
            height: 80.0,
            stroke_width: 2.0,
            stroke: [0, 0, 0, 255],
            fill: [0, 0, 0, 255],
            rotation: 0.0,
        }));
        id
    }

    // -- Selection (no re-render needed, selection is chrome-side) --

    /// Click at a canvas point: topmost hit becomes the sole selection,
    /// empty canvas clears it.
    pub fn select_at(&mut self, x: f32, y: f32) -> Option<ElementId> {
        self.selected = self
            .elements
            .iter()
            .rev()
            .find(|e| e.hit_test(x, y))
            .map(|e| e.id());
        self.selected
    }

    pub fn select(&mut self, id: ElementId) -> bool {
        if self.element(id).is_some() {
            self.selected = Some(id);
            true
        } else {
            false
        }
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    // -- Shared attributes --

    /// Set both stroke and fill (the settings menu drives them together).
    pub fn set_element_color(&mut self, id: ElementId, color: [u8; 4]) -> bool {
        match self.element_mut(id) {
            Some(e) => {
                e.set_colors(color);
                true
            }
            None => false,
        }
    }

    // -- Text settings --

    pub fn set_text_size(&mut self, id: ElementId, font_size: f32) -> bool {
        match self.element_mut(id) {
            Some(OverlayElement::Text(e)) => {
                e.font_size = font_size.max(1.0);
                true
            }
            _ => false,
        }
    }

    pub fn set_text_style(&mut self, id: ElementId, style: FontStyle) -> bool {
        match self.element_mut(id) {
            Some(OverlayElement::Text(e)) => {
                e.style = style;
                true
            }
            _ => false,
        }
    }

    pub fn set_text_align(&mut self, id: ElementId, align: TextAlignment) -> bool {
        match self.element_mut(id) {
            Some(OverlayElement::Text(e)) => {
                e.align = align;
                true
            }
            _ => false,
        }
    }

    pub fn set_text_family(&mut self, id: ElementId, family: &str) -> bool {
        match self.element_mut(id) {
            Some(OverlayElement::Text(e)) => {
                e.font_family = family.to_string();
                true
            }
            _ => false,
        }
    }

    // -- Drag --

    /// Grab the element under the pointer. Selects it and enters `Dragging`;
    /// returns the grabbed id, or `None` when the press landed on empty
    /// canvas (which clears the selection).
    pub fn begin_drag(&mut self, x: f32, y: f32) -> Option<ElementId> {
        let hit = self.select_at(x, y)?;
        let (ex, ey) = self.element(hit)?.position();
        self.interaction = Interaction::Dragging {
            id: hit,
            grab: (x - ex, y - ey),
        };
        Some(hit)
    }

    /// Follow the pointer. The element position moves live (the flatten at
    /// drag-end persists it); returns `false` because no commit-worthy
    /// mutation happened yet.
    pub fn drag_to(&mut self, x: f32, y: f32) -> bool {
        if let Interaction::Dragging { id, grab } = self.interaction {
            if let Some(e) = self.element_mut(id) {
                e.set_position(x - grab.0, y - grab.1);
            }
        }
        false
    }

    /// Release: the position set by the last `drag_to` is now permanent.
    pub fn end_drag(&mut self) -> bool {
        if matches!(self.interaction, Interaction::Dragging { .. }) {
            self.interaction = Interaction::Idle;
            true
        } else {
            false
        }
    }

    // -- Transform (resize/rotate via handles) --

    /// Start a handle transform on the selected element.
    pub fn begin_transform(&mut self) -> bool {
        let Some(id) = self.selected else {
            return false;
        };
        let Some(e) = self.element(id) else {
            return false;
        };
        self.interaction = Interaction::Transforming {
            id,
            scale_x: 1.0,
            scale_y: 1.0,
            rotation: e.rotation(),
        };
        true
    }

    /// Track the live transform matrix while a handle is being dragged.
    pub fn transform_to(&mut self, scale_x: f32, scale_y: f32, rotation: f32) -> bool {
        if let Interaction::Transforming {
            scale_x: sx,
            scale_y: sy,
            rotation: rot,
            ..
        } = &mut self.interaction
        {
            *sx = scale_x;
            *sy = scale_y;
            *rot = rotation;
        }
        false
    }

    /// Transform end: recompute the stored geometry from the live factors and
    /// reset the transient scale to identity, so the next transform measures
    /// from clean geometry.
    pub fn end_transform(&mut self) -> bool {
        if let Interaction::Transforming {
            id,
            scale_x,
            scale_y,
            rotation,
        } = self.interaction
        {
            if let Some(e) = self.element_mut(id) {
                e.scale_geometry(scale_x, scale_y);
                e.set_rotation(rotation);
            }
            self.interaction = Interaction::Idle;
            true
        } else {
            false
        }
    }

    // -- Text editing --

    /// Double-click on a text element swaps it for an edit box seeded with
    /// the current content.
    pub fn begin_text_edit(&mut self, id: ElementId) -> bool {
        let draft = match self.element(id) {
            Some(OverlayElement::Text(e)) => e.content.clone(),
            _ => return false,
        };
        self.selected = Some(id);
        self.interaction = Interaction::EditingText { id, draft };
        true
    }

    /// Replace the draft with what the edit box currently holds.
    pub fn edit_text_input(&mut self, text: &str) -> bool {
        if let Interaction::EditingText { draft, .. } = &mut self.interaction {
            *draft = text.to_string();
        }
        false
    }

    /// Enter (or focus loss): the draft becomes the element content.
    pub fn commit_text_edit(&mut self) -> bool {
        if let Interaction::EditingText { id, draft } =
            std::mem::replace(&mut self.interaction, Interaction::Idle)
        {
            if let Some(OverlayElement::Text(e)) = self.element_mut(id) {
                e.content = draft;
                return true;
            }
        }
        false
    }

    /// Escape: drop the draft, keep the original content.
    pub fn abort_text_edit(&mut self) -> bool {
        if matches!(self.interaction, Interaction::EditingText { .. }) {
            self.interaction = Interaction::Idle;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_formatted() {
        let mut scene = OverlayScene::new();
        let a = scene.add_rect(10.0, 10.0);
        let b = scene.add_circle(20.0, 20.0);
        let c = scene.add_text(5.0, 5.0, "hi");
        assert_ne!(a, b);
        assert_ne!(b, c);
        assert_eq!(a.to_string(), "element-1");
        assert_eq!(c.to_string(), "element-3");
    }

    #[test]
    fn add_does_not_select() {
        let mut scene = OverlayScene::new();
        scene.add_rect(10.0, 10.0);
        assert_eq!(scene.selected(), None);
    }

    #[test]
    fn click_selects_topmost_and_empty_clears() {
        let mut scene = OverlayScene::new();
        let below = scene.add_rect(50.0, 50.0);
        let above = scene.add_circle(50.0, 50.0);
        assert_eq!(scene.select_at(50.0, 50.0), Some(above));
        // A point only the rect covers
        assert_eq!(scene.select_at(50.0 + 55.0, 50.0), Some(below));
        assert_eq!(scene.select_at(500.0, 500.0), None);
        assert_eq!(scene.selected(), None);
    }

    #[test]
    fn drag_persists_position_on_release() {
        let mut scene = OverlayScene::new();
        let id = scene.add_rect(50.0, 50.0);
        assert_eq!(scene.begin_drag(55.0, 52.0), Some(id));
        assert!(!scene.drag_to(155.0, 152.0)); // live move, no flatten yet
        assert!(scene.end_drag()); // flatten now
        assert_eq!(scene.element(id).unwrap().position(), (150.0, 150.0));
        assert_eq!(*scene.interaction(), Interaction::Idle);
    }

    #[test]
    fn transform_end_folds_scale_and_resets_to_identity() {
        let mut scene = OverlayScene::new();
        let id = scene.add_rect(50.0, 50.0);
        scene.select(id);
        assert!(scene.begin_transform());
        scene.transform_to(2.0, 0.5, 45.0);
        assert!(scene.end_transform());

        let Some(OverlayElement::Rect(rect)) = scene.element(id) else {
            panic!("rect expected");
        };
        assert_eq!(rect.width, 240.0);
        assert_eq!(rect.height, 40.0);
        assert_eq!(rect.rotation, 45.0);
        // Back at identity: a second no-op transform must not compound.
        scene.select(id);
        scene.begin_transform();
        scene.end_transform();
        let Some(OverlayElement::Rect(rect)) = scene.element(id) else {
            panic!("rect expected");
        };
        assert_eq!(rect.width, 240.0);
        assert_eq!(rect.height, 40.0);
    }

    #[test]
    fn text_edit_commit_and_escape() {
        let mut scene = OverlayScene::new();
        let id = scene.add_text(10.0, 10.0, "before");

        assert!(scene.begin_text_edit(id));
        scene.edit_text_input("after");
        assert!(scene.commit_text_edit());
        let Some(OverlayElement::Text(t)) = scene.element(id) else {
            panic!("text expected");
        };
        assert_eq!(t.content, "after");

        // Escape keeps the committed content
        scene.begin_text_edit(id);
        scene.edit_text_input("discarded");
        assert!(!scene.abort_text_edit());
        let Some(OverlayElement::Text(t)) = scene.element(id) else {
            panic!("text expected");
        };
        assert_eq!(t.content, "after");
        assert_eq!(*scene.interaction(), Interaction::Idle);
    }

    #[test]
    fn text_edit_only_applies_to_text_elements() {
        let mut scene = OverlayScene::new();
        let id = scene.add_circle(10.0, 10.0);
        assert!(!scene.begin_text_edit(id));
    }

    #[test]
    fn color_change_reports_a_mutation() {
        let mut scene = OverlayScene::new();
        let id = scene.add_circle(10.0, 10.0);
        assert!(scene.set_element_color(id, [255, 0, 0, 255]));
        let Some(OverlayElement::Circle(c)) = scene.element(id) else {
            panic!("circle expected");
        };
        assert_eq!(c.stroke, [255, 0, 0, 255]);
        assert_eq!(c.fill, [255, 0, 0, 255]);
    }
}
