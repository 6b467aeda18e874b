// ============================================================================
// EDIT SESSION — the orchestrating state machine of the editor
// ============================================================================
//
// `SessionState` is the single source of truth: the reference image, the
// committed image, the live preview, the active tool, and the bounded
// undo/redo history. Every transition runs through the pure reducer
// `reduce(SessionState, Action) -> (SessionState, Vec<Effect>)` — no hidden
// mutable singleton, so the whole pipeline is deterministic under test.
// `EditSession` owns the state plus the per-tool parameter sets and routes
// tool computations into the reducer as `ToolOutput` actions.

use uuid::Uuid;

use crate::bitmap::Bitmap;
use crate::history::{DEFAULT_CAPACITY, EditHistory};
use crate::io::{self, DEFAULT_EXPORT_NAME, ExportArtifact, ExportError};
use crate::ops::adjustments::{AdjustParams, adjust};
use crate::ops::crop::{AspectRatio, CropParams, CropRect, crop};
use crate::ops::filters::{FilterKind, apply_filter, filter_thumbnail};
use crate::ops::text::{FontStyle, TextAlignment};
use crate::ops::transform::{Interpolation, ResizeParams, RotateParams, resize, rotate_flip};
use crate::overlay::render::OverlayRenderer;
use crate::overlay::{ElementId, OverlayScene};

// ---------------------------------------------------------------------------
//  Configuration
// ---------------------------------------------------------------------------

/// Tunables for a session. Plain values — session state is ephemeral, so
/// nothing here persists anywhere.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Maximum undo depth before the oldest snapshot is evicted.
    pub history_capacity: usize,
    /// Upload size cap in bytes.
    pub max_upload_bytes: usize,
    /// Edge length of filter-menu thumbnails.
    pub thumbnail_edge: u32,
    /// Filename suggested for exports.
    pub export_filename: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_CAPACITY,
            max_upload_bytes: 32 * 1024 * 1024,
            thumbnail_edge: crate::ops::filters::THUMBNAIL_EDGE,
            export_filename: DEFAULT_EXPORT_NAME.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
//  Tools, actions, effects
// ---------------------------------------------------------------------------

/// The editing surfaces a user can switch between.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ToolKind {
    Crop,
    Resize,
    Rotate,
    Adjust,
    Filter,
    Overlay,
}

impl ToolKind {
    pub fn label(&self) -> &'static str {
        match self {
            ToolKind::Crop => "Crop",
            ToolKind::Resize => "Resize",
            ToolKind::Rotate => "Rotate and flip",
            ToolKind::Adjust => "Adjust",
            ToolKind::Filter => "Filters",
            ToolKind::Overlay => "Annotate",
        }
    }

    pub fn all() -> &'static [ToolKind] {
        &[
            ToolKind::Crop,
            ToolKind::Resize,
            ToolKind::Rotate,
            ToolKind::Adjust,
            ToolKind::Filter,
            ToolKind::Overlay,
        ]
    }
}

/// Everything that can change session state.
#[derive(Clone, Debug)]
pub enum Action {
    /// Switch the editing surface (`None` = no tool).
    SelectTool(Option<ToolKind>),
    /// A tool computed a new preview from its live parameters.
    ToolOutput(Bitmap),
    /// Commit the preview into the committed image.
    Apply,
    /// Discard the preview.
    Cancel,
    Undo,
    Redo,
    /// Hard reset to the upload-time image. Bypasses the undo stack.
    RevertToOriginal,
    /// A newly uploaded image replaces the whole session.
    ReplaceImage(Bitmap),
}

/// Side effects the caller must carry out after a transition. The reducer
/// itself never talks to a renderer or the user.
#[derive(Clone, Debug, PartialEq)]
pub enum Effect {
    /// Re-render the editing surface from the preview bitmap.
    ShowPreview,
    /// The preview is gone; render the committed image.
    ShowCurrent,
    /// Uncommitted changes block a tool switch — ask the user to commit or
    /// discard, then resolve via `EditSession::resolve_tool_switch`.
    ConfirmToolSwitch { requested: Option<ToolKind> },
    /// A rendering backend failure; the attempted edit was abandoned.
    RenderFailed(String),
}

/// The user's answer to a `ConfirmToolSwitch` prompt. `Keep` is the dismiss
/// path: nothing changes, the session stays on the previous tool.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SwitchDecision {
    Commit,
    Discard,
    Keep,
}

// ---------------------------------------------------------------------------
//  State + reducer
// ---------------------------------------------------------------------------

/// The single source of truth for one editing session.
#[derive(Clone, Debug)]
pub struct SessionState {
    /// Immutable reference image, set at upload. Only `RevertToOriginal`
    /// reads it.
    pub original: Bitmap,
    /// The last committed image.
    pub current: Bitmap,
    /// Speculative result of the active tool's in-progress parameters.
    pub temp: Option<Bitmap>,
    pub active_tool: Option<ToolKind>,
    /// True iff `temp` holds something that differs from `current`.
    pub dirty: bool,
    pub history: EditHistory,
}

impl SessionState {
    pub fn new(original: Bitmap, history_capacity: usize) -> Self {
        Self {
            current: original.clone(),
            original,
            temp: None,
            active_tool: None,
            dirty: false,
            history: EditHistory::new(history_capacity),
        }
    }
}

/// The pure transition function. Total over valid states: "apply with no
/// preview" and "undo on an empty stack" are no-ops, not errors.
pub fn reduce(mut state: SessionState, action: Action) -> (SessionState, Vec<Effect>) {
    match action {
        Action::SelectTool(requested) => {
            if state.dirty {
                // Not a transition yet — the caller prompts and comes back.
                return (state, vec![Effect::ConfirmToolSwitch { requested }]);
            }
            state.active_tool = requested;
            state.temp = None;
            (state, vec![Effect::ShowCurrent])
        }
        Action::ToolOutput(bitmap) => {
            state.dirty = bitmap != state.current;
            state.temp = Some(bitmap);
            (state, vec![Effect::ShowPreview])
        }
        Action::Apply => {
            let Some(temp) = state.temp.take() else {
                return (state, Vec::new());
            };
            let displaced = std::mem::replace(&mut state.current, temp);
            state.history.push_commit(displaced);
            state.dirty = false;
            (state, vec![Effect::ShowCurrent])
        }
        Action::Cancel => {
            state.temp = None;
            state.dirty = false;
            (state, vec![Effect::ShowCurrent])
        }
        Action::Undo => {
            if !state.history.can_undo() {
                return (state, Vec::new());
            }
            // An in-flight preview would reference the pre-undo image; drop it.
            state.temp = None;
            state.dirty = false;
            if let Some(restored) = state.history.undo(state.current.clone()) {
                state.current = restored;
            }
            (state, vec![Effect::ShowCurrent])
        }
        Action::Redo => {
            if !state.history.can_redo() {
                return (state, Vec::new());
            }
            state.temp = None;
            state.dirty = false;
            if let Some(restored) = state.history.redo(state.current.clone()) {
                state.current = restored;
            }
            (state, vec![Effect::ShowCurrent])
        }
        Action::RevertToOriginal => {
            // Hard reset: the displaced image is NOT pushed onto the undo
            // stack, so a revert cannot be undone.
            state.current = state.original.clone();
            state.temp = None;
            state.dirty = false;
            (state, vec![Effect::ShowCurrent])
        }
        Action::ReplaceImage(bitmap) => {
            state.original = bitmap.clone();
            state.current = bitmap;
            state.temp = None;
            state.dirty = false;
            state.active_tool = None;
            state.history.clear();
            (state, vec![Effect::ShowCurrent])
        }
    }
}

// ---------------------------------------------------------------------------
//  Tool parameter sets
// ---------------------------------------------------------------------------

/// Per-tool parameter bundles, owned by the session for its lifetime. Each
/// set is independent; commit/cancel resets all of them to neutral, and
/// selecting a tool re-derives that tool's defaults from the committed
/// image's dimensions.
#[derive(Clone, Debug)]
pub struct ToolParams {
    pub crop: CropParams,
    pub resize: ResizeParams,
    pub rotate: RotateParams,
    pub adjust: AdjustParams,
    pub filter: FilterKind,
    pub overlay: OverlayScene,
}

impl ToolParams {
    fn for_source(src_w: u32, src_h: u32) -> Self {
        Self {
            crop: CropParams::for_source(src_w, src_h),
            resize: ResizeParams::for_source(src_w, src_h),
            rotate: RotateParams::default(),
            adjust: AdjustParams::default(),
            filter: FilterKind::default(),
            overlay: OverlayScene::new(),
        }
    }
}

// ---------------------------------------------------------------------------
//  Controller
// ---------------------------------------------------------------------------

/// Owns the session state, the tool parameter sets, and the overlay
/// renderer; every mutation goes through `dispatch`.
pub struct EditSession {
    id: Uuid,
    config: SessionConfig,
    state: SessionState,
    params: ToolParams,
    /// Set while a dirty tool switch waits for the user's decision.
    pending_switch: Option<Option<ToolKind>>,
    renderer: OverlayRenderer,
}

impl EditSession {
    /// Start a session on a decoded upload.
    pub fn new(original: Bitmap) -> Self {
        Self::with_config(original, SessionConfig::default())
    }

    pub fn with_config(original: Bitmap, config: SessionConfig) -> Self {
        let (w, h) = original.dimensions();
        crate::log_info!("session start: {}x{} image", w, h);
        Self {
            id: Uuid::new_v4(),
            state: SessionState::new(original, config.history_capacity),
            params: ToolParams::for_source(w, h),
            pending_switch: None,
            renderer: OverlayRenderer::new(),
            config,
        }
    }

    // -- Accessors ---------------------------------------------------------

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn current(&self) -> &Bitmap {
        &self.state.current
    }

    pub fn original(&self) -> &Bitmap {
        &self.state.original
    }

    pub fn temp(&self) -> Option<&Bitmap> {
        self.state.temp.as_ref()
    }

    /// What the editing surface should show right now.
    pub fn display_bitmap(&self) -> &Bitmap {
        self.state.temp.as_ref().unwrap_or(&self.state.current)
    }

    pub fn active_tool(&self) -> Option<ToolKind> {
        self.state.active_tool
    }

    pub fn is_dirty(&self) -> bool {
        self.state.dirty
    }

    pub fn can_undo(&self) -> bool {
        self.state.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.state.history.can_redo()
    }

    pub fn params(&self) -> &ToolParams {
        &self.params
    }

    pub fn overlay(&self) -> &OverlayScene {
        &self.params.overlay
    }

    // -- Dispatch ----------------------------------------------------------

    /// Run one action through the reducer and keep the parameter sets in
    /// step with the contract: apply/cancel reset everything to neutral, an
    /// accepted tool switch re-derives that tool's defaults.
    pub fn dispatch(&mut self, action: Action) -> Vec<Effect> {
        let is_apply_or_cancel = matches!(action, Action::Apply | Action::Cancel);
        let selected = match &action {
            Action::SelectTool(t) => Some(*t),
            _ => None,
        };
        let is_replace = matches!(action, Action::ReplaceImage(_));

        let (next, effects) = reduce(self.state.clone(), action);
        self.state = next;

        let switch_blocked = effects
            .iter()
            .any(|e| matches!(e, Effect::ConfirmToolSwitch { .. }));
        if let Some(requested) = selected {
            if switch_blocked {
                self.pending_switch = Some(requested);
            } else {
                // A completed switch supersedes any unanswered prompt.
                self.pending_switch = None;
                self.reset_params();
            }
        }
        if (is_apply_or_cancel && !effects.is_empty()) || is_replace {
            self.reset_params();
        }
        effects
    }

    fn reset_params(&mut self) {
        let (w, h) = self.state.current.dimensions();
        self.params = ToolParams::for_source(w, h);
    }

    // -- Controller contract ----------------------------------------------

    /// Switch the editing surface. With uncommitted changes this returns
    /// `ConfirmToolSwitch` and changes nothing until the user answers.
    pub fn select_tool(&mut self, kind: Option<ToolKind>) -> Vec<Effect> {
        self.dispatch(Action::SelectTool(kind))
    }

    /// Answer a pending `ConfirmToolSwitch`. Declining (`Keep`) leaves the
    /// session exactly as it was before the switch attempt.
    pub fn resolve_tool_switch(&mut self, decision: SwitchDecision) -> Vec<Effect> {
        let Some(requested) = self.pending_switch.take() else {
            return Vec::new();
        };
        match decision {
            SwitchDecision::Keep => Vec::new(),
            SwitchDecision::Commit => {
                let mut effects = self.dispatch(Action::Apply);
                effects.extend(self.dispatch(Action::SelectTool(requested)));
                effects
            }
            SwitchDecision::Discard => {
                let mut effects = self.dispatch(Action::Cancel);
                effects.extend(self.dispatch(Action::SelectTool(requested)));
                effects
            }
        }
    }

    pub fn apply(&mut self) -> Vec<Effect> {
        self.dispatch(Action::Apply)
    }

    pub fn cancel(&mut self) -> Vec<Effect> {
        self.dispatch(Action::Cancel)
    }

    pub fn undo(&mut self) -> Vec<Effect> {
        self.dispatch(Action::Undo)
    }

    pub fn redo(&mut self) -> Vec<Effect> {
        self.dispatch(Action::Redo)
    }

    pub fn revert_to_original(&mut self) -> Vec<Effect> {
        self.dispatch(Action::RevertToOriginal)
    }

    /// Replace the whole session with a newly uploaded image.
    pub fn load_image(&mut self, bitmap: Bitmap) -> Vec<Effect> {
        self.dispatch(Action::ReplaceImage(bitmap))
    }

    /// Serialize the committed image for download. Pure side effect — no
    /// state changes, failures are reported to the caller.
    pub fn export(&self) -> Result<ExportArtifact, ExportError> {
        let bytes = io::encode_png(&self.state.current)?;
        Ok(ExportArtifact {
            bytes,
            filename: self.config.export_filename.clone(),
        })
    }

    // -- Crop tool ---------------------------------------------------------

    pub fn set_crop_rect(&mut self, rect: CropRect) -> Vec<Effect> {
        if self.state.active_tool != Some(ToolKind::Crop) {
            return Vec::new();
        }
        let (w, h) = self.state.current.dimensions();
        self.params.crop.set_rect(rect, w, h);
        self.push_crop_preview()
    }

    pub fn set_crop_aspect(&mut self, aspect: AspectRatio) -> Vec<Effect> {
        if self.state.active_tool != Some(ToolKind::Crop) {
            return Vec::new();
        }
        let (w, h) = self.state.current.dimensions();
        self.params.crop.set_aspect(aspect, w, h);
        self.push_crop_preview()
    }

    fn push_crop_preview(&mut self) -> Vec<Effect> {
        // A zero-area rectangle produces no output: the callback is withheld
        // and whatever preview existed stays in place.
        match crop(&self.state.current, self.params.crop.rect) {
            Some(bitmap) => self.dispatch(Action::ToolOutput(bitmap)),
            None => Vec::new(),
        }
    }

    // -- Resize tool -------------------------------------------------------

    pub fn set_resize_width(&mut self, width: u32) -> Vec<Effect> {
        if self.state.active_tool != Some(ToolKind::Resize) {
            return Vec::new();
        }
        let (w, h) = self.state.current.dimensions();
        self.params.resize.set_width(width, w, h);
        self.push_resize_preview()
    }

    pub fn set_resize_height(&mut self, height: u32) -> Vec<Effect> {
        if self.state.active_tool != Some(ToolKind::Resize) {
            return Vec::new();
        }
        let (w, h) = self.state.current.dimensions();
        self.params.resize.set_height(height, w, h);
        self.push_resize_preview()
    }

    pub fn set_resize_aspect_lock(&mut self, locked: bool) -> Vec<Effect> {
        if self.state.active_tool != Some(ToolKind::Resize) {
            return Vec::new();
        }
        self.params.resize.lock_aspect = locked;
        let (w, h) = self.state.current.dimensions();
        // Re-derive height from the width the user last settled on.
        let width = self.params.resize.width;
        self.params.resize.set_width(width, w, h);
        self.push_resize_preview()
    }

    pub fn set_resize_filter(&mut self, filter: Interpolation) -> Vec<Effect> {
        if self.state.active_tool != Some(ToolKind::Resize) {
            return Vec::new();
        }
        self.params.resize.filter = filter;
        self.push_resize_preview()
    }

    fn push_resize_preview(&mut self) -> Vec<Effect> {
        let p = self.params.resize;
        match resize(&self.state.current, p.width, p.height, p.filter) {
            Some(bitmap) => self.dispatch(Action::ToolOutput(bitmap)),
            None => Vec::new(),
        }
    }

    // -- Rotate/flip tool --------------------------------------------------

    pub fn rotate_cw(&mut self) -> Vec<Effect> {
        if self.state.active_tool != Some(ToolKind::Rotate) {
            return Vec::new();
        }
        self.params.rotate.rotate_cw();
        self.push_rotate_preview()
    }

    pub fn rotate_ccw(&mut self) -> Vec<Effect> {
        if self.state.active_tool != Some(ToolKind::Rotate) {
            return Vec::new();
        }
        self.params.rotate.rotate_ccw();
        self.push_rotate_preview()
    }

    pub fn toggle_flip_horizontal(&mut self) -> Vec<Effect> {
        if self.state.active_tool != Some(ToolKind::Rotate) {
            return Vec::new();
        }
        self.params.rotate.toggle_flip_horizontal();
        self.push_rotate_preview()
    }

    pub fn toggle_flip_vertical(&mut self) -> Vec<Effect> {
        if self.state.active_tool != Some(ToolKind::Rotate) {
            return Vec::new();
        }
        self.params.rotate.toggle_flip_vertical();
        self.push_rotate_preview()
    }

    fn push_rotate_preview(&mut self) -> Vec<Effect> {
        // Always recomputed from the committed image, never from a previous
        // rotation — four quarter turns land back on the exact source bytes.
        let bitmap = rotate_flip(&self.state.current, self.params.rotate);
        self.dispatch(Action::ToolOutput(bitmap))
    }

    // -- Adjust tool -------------------------------------------------------

    pub fn set_adjustments(&mut self, params: AdjustParams) -> Vec<Effect> {
        if self.state.active_tool != Some(ToolKind::Adjust) {
            return Vec::new();
        }
        self.params.adjust = params.clamped();
        let bitmap = adjust(&self.state.current, &self.params.adjust);
        self.dispatch(Action::ToolOutput(bitmap))
    }

    // -- Filter tool -------------------------------------------------------

    pub fn set_filter(&mut self, kind: FilterKind) -> Vec<Effect> {
        if self.state.active_tool != Some(ToolKind::Filter) {
            return Vec::new();
        }
        self.params.filter = kind;
        let bitmap = apply_filter(&self.state.current, kind);
        self.dispatch(Action::ToolOutput(bitmap))
    }

    /// Thumbnails for the filter menu, one per preset, computed from the
    /// committed image without touching session state.
    pub fn filter_thumbnails(&self) -> Vec<(FilterKind, Bitmap)> {
        FilterKind::all()
            .iter()
            .map(|&kind| {
                (
                    kind,
                    filter_thumbnail(&self.state.current, kind, self.config.thumbnail_edge),
                )
            })
            .collect()
    }

    // -- Overlay tool ------------------------------------------------------

    pub fn overlay_add_text(&mut self, x: f32, y: f32, content: &str) -> (Option<ElementId>, Vec<Effect>) {
        if self.state.active_tool != Some(ToolKind::Overlay) {
            return (None, Vec::new());
        }
        let id = self.params.overlay.add_text(x, y, content);
        (Some(id), self.flatten_overlay())
    }

    pub fn overlay_add_line(&mut self, x: f32, y: f32) -> (Option<ElementId>, Vec<Effect>) {
        if self.state.active_tool != Some(ToolKind::Overlay) {
            return (None, Vec::new());
        }
        let id = self.params.overlay.add_line(x, y);
        (Some(id), self.flatten_overlay())
    }

    pub fn overlay_add_circle(&mut self, x: f32, y: f32) -> (Option<ElementId>, Vec<Effect>) {
        if self.state.active_tool != Some(ToolKind::Overlay) {
            return (None, Vec::new());
        }
        let id = self.params.overlay.add_circle(x, y);
        (Some(id), self.flatten_overlay())
    }

    pub fn overlay_add_rect(&mut self, x: f32, y: f32) -> (Option<ElementId>, Vec<Effect>) {
        if self.state.active_tool != Some(ToolKind::Overlay) {
            return (None, Vec::new());
        }
        let id = self.params.overlay.add_rect(x, y);
        (Some(id), self.flatten_overlay())
    }

    pub fn overlay_select_at(&mut self, x: f32, y: f32) -> Option<ElementId> {
        if self.state.active_tool != Some(ToolKind::Overlay) {
            return None;
        }
        self.params.overlay.select_at(x, y)
    }

    pub fn overlay_begin_drag(&mut self, x: f32, y: f32) -> Option<ElementId> {
        if self.state.active_tool != Some(ToolKind::Overlay) {
            return None;
        }
        self.params.overlay.begin_drag(x, y)
    }

    pub fn overlay_drag_to(&mut self, x: f32, y: f32) -> Vec<Effect> {
        self.params.overlay.drag_to(x, y);
        Vec::new()
    }

    pub fn overlay_end_drag(&mut self) -> Vec<Effect> {
        if self.params.overlay.end_drag() {
            self.flatten_overlay()
        } else {
            Vec::new()
        }
    }

    pub fn overlay_begin_transform(&mut self) -> bool {
        self.state.active_tool == Some(ToolKind::Overlay) && self.params.overlay.begin_transform()
    }

    pub fn overlay_transform_to(&mut self, scale_x: f32, scale_y: f32, rotation: f32) -> Vec<Effect> {
        self.params.overlay.transform_to(scale_x, scale_y, rotation);
        Vec::new()
    }

    pub fn overlay_end_transform(&mut self) -> Vec<Effect> {
        if self.params.overlay.end_transform() {
            self.flatten_overlay()
        } else {
            Vec::new()
        }
    }

    pub fn overlay_begin_text_edit(&mut self, id: ElementId) -> bool {
        self.state.active_tool == Some(ToolKind::Overlay)
            && self.params.overlay.begin_text_edit(id)
    }

    pub fn overlay_edit_text_input(&mut self, text: &str) {
        self.params.overlay.edit_text_input(text);
    }

    /// Enter — and also the focus-loss path, which commits like Enter.
    pub fn overlay_commit_text_edit(&mut self) -> Vec<Effect> {
        if self.params.overlay.commit_text_edit() {
            self.flatten_overlay()
        } else {
            Vec::new()
        }
    }

    /// Escape: leave edit mode without committing the draft.
    pub fn overlay_abort_text_edit(&mut self) {
        self.params.overlay.abort_text_edit();
    }

    pub fn overlay_set_color(&mut self, id: ElementId, color: [u8; 4]) -> Vec<Effect> {
        if self.state.active_tool == Some(ToolKind::Overlay)
            && self.params.overlay.set_element_color(id, color)
        {
            self.flatten_overlay()
        } else {
            Vec::new()
        }
    }

    pub fn overlay_set_text_size(&mut self, id: ElementId, size: f32) -> Vec<Effect> {
        if self.state.active_tool == Some(ToolKind::Overlay)
            && self.params.overlay.set_text_size(id, size)
        {
            self.flatten_overlay()
        } else {
            Vec::new()
        }
    }

    pub fn overlay_set_text_style(&mut self, id: ElementId, style: FontStyle) -> Vec<Effect> {
        if self.state.active_tool == Some(ToolKind::Overlay)
            && self.params.overlay.set_text_style(id, style)
        {
            self.flatten_overlay()
        } else {
            Vec::new()
        }
    }

    pub fn overlay_set_text_align(&mut self, id: ElementId, align: TextAlignment) -> Vec<Effect> {
        if self.state.active_tool == Some(ToolKind::Overlay)
            && self.params.overlay.set_text_align(id, align)
        {
            self.flatten_overlay()
        } else {
            Vec::new()
        }
    }

    /// Flatten the overlay scene over the committed image and route the
    /// raster in as the preview. A renderer failure abandons the edit: the
    /// preview and the committed image stay exactly as they were.
    fn flatten_overlay(&mut self) -> Vec<Effect> {
        match self.renderer.flatten(&self.params.overlay, &self.state.current) {
            Ok(bitmap) => self.dispatch(Action::ToolOutput(bitmap)),
            Err(e) => {
                crate::log_err!("overlay flatten failed: {}", e);
                vec![Effect::RenderFailed(e.to_string())]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn session() -> EditSession {
        EditSession::new(Bitmap::filled(100, 50, Rgba([200, 150, 100, 255])))
    }

    fn brightened(session: &mut EditSession) -> Vec<Effect> {
        session.select_tool(Some(ToolKind::Adjust));
        session.set_adjustments(AdjustParams {
            brightness: 0.2,
            ..Default::default()
        })
    }

    #[test]
    fn tool_output_sets_preview_and_dirty() {
        let mut s = session();
        let effects = brightened(&mut s);
        assert_eq!(effects, vec![Effect::ShowPreview]);
        assert!(s.is_dirty());
        assert!(s.temp().is_some());
        assert!(s.display_bitmap().same_identity(s.temp().unwrap()));
    }

    #[test]
    fn cancel_leaves_current_bit_identical() {
        let mut s = session();
        let before = s.current().clone();
        brightened(&mut s);
        let effects = s.cancel();
        assert_eq!(effects, vec![Effect::ShowCurrent]);
        assert!(s.current().same_identity(&before));
        assert!(s.temp().is_none());
        assert!(!s.is_dirty());
    }

    #[test]
    fn apply_commits_exactly_the_preview_bytes() {
        let mut s = session();
        let before = s.current().clone();
        brightened(&mut s);
        let preview = s.temp().unwrap().clone();
        s.apply();
        assert!(s.current().same_identity(&preview));
        assert!(s.temp().is_none());
        assert!(!s.is_dirty());
        assert!(s.can_undo());
        // The displaced image is on the undo stack
        s.undo();
        assert!(s.current().same_identity(&before));
    }

    #[test]
    fn apply_without_preview_is_a_no_op() {
        let mut s = session();
        assert!(s.apply().is_empty());
        assert!(!s.can_undo());
    }

    #[test]
    fn apply_resets_all_tool_params() {
        let mut s = session();
        s.select_tool(Some(ToolKind::Rotate));
        s.rotate_cw();
        assert_eq!(s.params().rotate.angle, 90);
        s.apply();
        assert_eq!(s.params().rotate.angle, 0);
        assert_eq!(s.params().adjust, AdjustParams::default());
        // Crop defaults re-derive from the new (rotated) dimensions
        assert_eq!(s.params().crop.rect.width, 50);
        assert_eq!(s.params().crop.rect.height, 100);
    }

    #[test]
    fn undo_redo_inverse_law() {
        let mut s = session();
        for _ in 0..3 {
            brightened(&mut s);
            s.apply();
        }
        let before_undo = s.current().clone();
        s.undo();
        assert!(!s.current().same_identity(&before_undo));
        s.redo();
        assert!(s.current().same_identity(&before_undo));
    }

    #[test]
    fn undo_on_empty_stack_is_a_no_op() {
        let mut s = session();
        assert!(s.undo().is_empty());
        assert!(s.redo().is_empty());
    }

    #[test]
    fn bounded_history_evicts_oldest() {
        let mut s = session();
        for _ in 0..25 {
            brightened(&mut s);
            s.apply();
        }
        assert_eq!(s.state().history.undo_count(), 20);
        // Drain the stack: exactly 20 undos take effect, the 21st is a no-op.
        for _ in 0..20 {
            assert_eq!(s.undo(), vec![Effect::ShowCurrent]);
        }
        assert!(s.undo().is_empty());
    }

    #[test]
    fn new_commit_after_undo_clears_redo() {
        let mut s = session();
        brightened(&mut s);
        s.apply();
        s.undo();
        assert!(s.can_redo());
        brightened(&mut s);
        s.apply();
        assert!(!s.can_redo());
        assert!(s.redo().is_empty());
    }

    #[test]
    fn revert_bypasses_the_undo_stack() {
        let mut s = session();
        brightened(&mut s);
        s.apply();
        let undo_before = s.state().history.undo_count();
        s.revert_to_original();
        assert!(s.current().same_identity(s.original()));
        assert_eq!(s.state().history.undo_count(), undo_before);
    }

    #[test]
    fn dirty_tool_switch_prompts_and_keep_changes_nothing() {
        let mut s = session();
        brightened(&mut s);
        let effects = s.select_tool(Some(ToolKind::Filter));
        assert_eq!(
            effects,
            vec![Effect::ConfirmToolSwitch {
                requested: Some(ToolKind::Filter)
            }]
        );
        // Pre-switch state, untouched
        assert_eq!(s.active_tool(), Some(ToolKind::Adjust));
        assert!(s.is_dirty());
        assert!(s.temp().is_some());

        let effects = s.resolve_tool_switch(SwitchDecision::Keep);
        assert!(effects.is_empty());
        assert_eq!(s.active_tool(), Some(ToolKind::Adjust));
        assert!(s.is_dirty());
    }

    #[test]
    fn dirty_tool_switch_commit_applies_then_switches() {
        let mut s = session();
        brightened(&mut s);
        let preview = s.temp().unwrap().clone();
        s.select_tool(Some(ToolKind::Filter));
        s.resolve_tool_switch(SwitchDecision::Commit);
        assert_eq!(s.active_tool(), Some(ToolKind::Filter));
        assert!(s.current().same_identity(&preview));
        assert!(s.can_undo());
    }

    #[test]
    fn dirty_tool_switch_discard_keeps_current() {
        let mut s = session();
        let before = s.current().clone();
        brightened(&mut s);
        s.select_tool(Some(ToolKind::Filter));
        s.resolve_tool_switch(SwitchDecision::Discard);
        assert_eq!(s.active_tool(), Some(ToolKind::Filter));
        assert!(s.current().same_identity(&before));
        assert!(!s.can_undo());
    }

    #[test]
    fn tool_methods_ignore_calls_for_inactive_tools() {
        let mut s = session();
        s.select_tool(Some(ToolKind::Filter));
        assert!(s.rotate_cw().is_empty());
        assert!(s.set_crop_rect(CropRect::new(0, 0, 10, 10)).is_empty());
        assert!(s.temp().is_none());
    }

    #[test]
    fn crop_preview_follows_the_rect() {
        let mut s = session();
        s.select_tool(Some(ToolKind::Crop));
        let effects = s.set_crop_rect(CropRect::new(10, 10, 30, 20));
        assert_eq!(effects, vec![Effect::ShowPreview]);
        assert_eq!(s.temp().unwrap().dimensions(), (30, 20));
    }

    #[test]
    fn zero_area_crop_withholds_the_preview() {
        let mut s = session();
        s.select_tool(Some(ToolKind::Crop));
        let effects = s.set_crop_rect(CropRect::new(10, 10, 0, 20));
        assert!(effects.is_empty());
        assert!(s.temp().is_none());
    }

    #[test]
    fn resize_lock_derives_height_from_source_ratio() {
        let mut s = EditSession::new(Bitmap::filled(1000, 500, Rgba([9, 9, 9, 255])));
        s.select_tool(Some(ToolKind::Resize));
        s.set_resize_width(400);
        assert_eq!(s.temp().unwrap().dimensions(), (400, 200));
    }

    #[test]
    fn four_quarter_turns_preview_the_original_bytes() {
        let mut s = session();
        s.select_tool(Some(ToolKind::Rotate));
        for _ in 0..4 {
            s.rotate_cw();
        }
        // Identical bytes — so the session is not even dirty
        assert_eq!(s.temp().unwrap(), s.current());
        assert!(!s.is_dirty());
    }

    #[test]
    fn filter_preview_and_thumbnails() {
        let mut s = session();
        s.select_tool(Some(ToolKind::Filter));
        s.set_filter(FilterKind::Sepia);
        assert!(s.is_dirty());

        let thumbs = s.filter_thumbnails();
        assert_eq!(thumbs.len(), FilterKind::all().len());
        for (_, thumb) in &thumbs {
            assert_eq!(thumb.dimensions(), (74, 74));
        }
        // Computing thumbnails did not disturb the preview
        assert!(s.is_dirty());
    }

    #[test]
    fn overlay_mutations_flatten_into_the_preview() {
        let mut s = session();
        s.select_tool(Some(ToolKind::Overlay));
        let (id, effects) = s.overlay_add_rect(50.0, 25.0);
        assert!(id.is_some());
        assert_eq!(effects, vec![Effect::ShowPreview]);
        assert!(s.is_dirty());

        // Drag: live moves don't flatten, the release does
        assert_eq!(s.overlay_begin_drag(50.0, 25.0), id);
        assert!(s.overlay_drag_to(60.0, 30.0).is_empty());
        assert_eq!(s.overlay_end_drag(), vec![Effect::ShowPreview]);
    }

    #[test]
    fn switching_tools_drops_the_overlay_scene() {
        let mut s = session();
        s.select_tool(Some(ToolKind::Overlay));
        s.overlay_add_circle(30.0, 30.0);
        s.apply();
        // Committed raster survives; the editable elements do not.
        assert!(s.overlay().is_empty());
    }

    #[test]
    fn replace_image_resets_the_whole_session() {
        let mut s = session();
        brightened(&mut s);
        s.apply();
        assert!(s.can_undo());

        let fresh = Bitmap::filled(10, 10, Rgba([0, 0, 0, 255]));
        s.load_image(fresh.clone());
        assert!(s.current().same_identity(&fresh));
        assert!(s.original().same_identity(&fresh));
        assert!(!s.can_undo());
        assert_eq!(s.active_tool(), None);
        assert_eq!(s.params().crop.rect.width, 10);
    }

    #[test]
    fn export_produces_png_bytes_without_touching_state() {
        let mut s = session();
        brightened(&mut s);
        let artifact = s.export().unwrap();
        assert_eq!(artifact.filename, "edited_image.png");
        // PNG magic
        assert_eq!(&artifact.bytes[..8], &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]);
        // Export reads `current`, not the preview, and changes nothing
        assert!(s.is_dirty());
    }
}
