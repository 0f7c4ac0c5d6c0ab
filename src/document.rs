use std::fmt;

use crate::canvas::{to_hex, Layer, LayerId, LayerKind, LayerTransform, PixelBuffer, Position, THUMBNAIL_MAX_EDGE};
use crate::components::history::{HistoryEntry, HistoryStore, DEFAULT_MAX_HISTORY};
use crate::compositor::composite;
use crate::error::{EditorError, EditorResult};
use crate::ops::filters::{apply_filter, FilterSpec};
use crate::ops::text::{render_text, FontTextRasterizer, TextData, TextRasterizer};
use crate::settings::EditorSettings;

/// The open image: an ordered layer stack (index 0 is the bottom, base
/// layer), the active layer, and the undo history.
pub struct Document {
    layers: Vec<Layer>,
    active: Option<LayerId>,
    history: HistoryStore,
    thumbnail_edge: u32,
    text: Box<dyn TextRasterizer>,
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("layers", &self.layers.len())
            .field("active", &self.active)
            .field("history", &self.history.len())
            .finish()
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        Self {
            layers: Vec::new(),
            active: None,
            history: HistoryStore::new(DEFAULT_MAX_HISTORY),
            thumbnail_edge: THUMBNAIL_MAX_EDGE,
            text: Box::new(FontTextRasterizer::new()),
        }
    }

    pub fn with_settings(settings: &EditorSettings) -> Self {
        Self {
            history: HistoryStore::new(settings.max_history_steps),
            thumbnail_edge: settings.thumbnail_max_edge.max(1),
            ..Self::new()
        }
    }

    /// Swap the glyph backend used for text layers.
    pub fn with_text_rasterizer(mut self, rasterizer: Box<dyn TextRasterizer>) -> Self {
        self.text = rasterizer;
        self
    }

    // ========================================================================
    // DOCUMENT LIFECYCLE
    // ========================================================================

    /// Drop every layer and all history.
    pub fn reset(&mut self) {
        self.layers.clear();
        self.active = None;
        self.history.clear();
        crate::log_info!("document reset");
    }

    /// Start a new document from decoded RGBA pixels.
    pub fn import_image(&mut self, width: u32, height: u32, rgba: &[u8]) -> EditorResult<LayerId> {
        let buffer = PixelBuffer::from_raw_rgba(width, height, rgba)?;
        Ok(self.import_buffer(buffer))
    }

    /// Start a new document whose single base layer holds `buffer`.
    pub fn import_buffer(&mut self, buffer: PixelBuffer) -> LayerId {
        self.reset();
        let (w, h) = buffer.dimensions();
        let mut layer = Layer::from_buffer("Layer 1", buffer);
        layer.refresh_thumbnail(self.thumbnail_edge);
        let id = layer.id();
        self.history.save_state(id, &layer.buffer);
        self.layers.push(layer);
        self.active = Some(id);
        crate::log_info!("imported {}x{} image", w, h);
        id
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Size of the base layer, which defines the document size.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.layers.first().map(|l| l.buffer.dimensions())
    }

    pub fn thumbnail_edge(&self) -> u32 {
        self.thumbnail_edge
    }

    // ========================================================================
    // LAYER ACCESS
    // ========================================================================

    /// Layers bottom-to-top.
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn layer(&self, id: LayerId) -> Option<&Layer> {
        self.layers.iter().find(|l| l.id() == id)
    }

    pub fn layer_mut(&mut self, id: LayerId) -> Option<&mut Layer> {
        self.layers.iter_mut().find(|l| l.id() == id)
    }

    fn require_layer(&mut self, id: LayerId) -> EditorResult<&mut Layer> {
        self.layer_mut(id).ok_or(EditorError::LayerNotFound(id))
    }

    pub fn active_layer_id(&self) -> Option<LayerId> {
        self.active
    }

    pub fn active_layer(&self) -> Option<&Layer> {
        self.active.and_then(|id| self.layer(id))
    }

    pub fn set_active_layer(&mut self, id: LayerId) -> EditorResult<()> {
        if self.layer(id).is_none() {
            return Err(EditorError::LayerNotFound(id));
        }
        self.active = Some(id);
        Ok(())
    }

    // ========================================================================
    // LAYER OPERATIONS
    // ========================================================================

    /// Append a transparent raster layer the size of the base layer and make
    /// it active.
    pub fn add_layer(&mut self) -> EditorResult<LayerId> {
        let (w, h) = self.dimensions().ok_or(EditorError::MissingActiveLayer)?;
        let name = format!("Layer {}", self.layers.len() + 1);
        let layer = Layer::new(name, w, h)?;
        Ok(self.push_layer(layer))
    }

    /// Append a text layer rendered from `data` and make it active.
    pub fn add_text_layer(&mut self, data: TextData) -> EditorResult<LayerId> {
        let (w, h) = self.dimensions().ok_or(EditorError::MissingActiveLayer)?;
        let mut layer = Layer::new(text_layer_name(&data), w, h)?;
        render_text(&mut layer.buffer, &data, self.text.as_mut())?;
        layer.kind = LayerKind::Text(data);
        Ok(self.push_layer(layer))
    }

    fn push_layer(&mut self, mut layer: Layer) -> LayerId {
        layer.refresh_thumbnail(self.thumbnail_edge);
        let id = layer.id();
        // baseline so the first edit on this layer can be undone
        self.history.save_state(id, &layer.buffer);
        crate::log_info!("added layer '{}'", layer.name);
        self.layers.push(layer);
        self.active = Some(id);
        id
    }

    /// Re-render a text layer from new parameters.  Not recorded in history.
    pub fn update_text_layer(&mut self, id: LayerId, data: TextData) -> EditorResult<()> {
        let edge = self.thumbnail_edge;
        let text = self.text.as_mut();
        let layer = self
            .layers
            .iter_mut()
            .find(|l| l.id() == id)
            .ok_or(EditorError::LayerNotFound(id))?;
        if !layer.is_text() {
            return Err(EditorError::NotATextLayer(id));
        }
        render_text(&mut layer.buffer, &data, text)?;
        layer.kind = LayerKind::Text(data);
        layer.refresh_thumbnail(edge);
        Ok(())
    }

    /// Remove a layer.  The last remaining layer cannot be deleted; deleting
    /// the active layer makes the topmost remaining layer active.
    pub fn delete_layer(&mut self, id: LayerId) -> EditorResult<()> {
        if self.layers.len() <= 1 {
            crate::log_info!("refused to delete the last layer");
            return Err(EditorError::LastLayerDeleteRejected);
        }
        let index = self
            .layers
            .iter()
            .position(|l| l.id() == id)
            .ok_or(EditorError::LayerNotFound(id))?;
        let removed = self.layers.remove(index);
        if self.active == Some(id) {
            self.active = self.layers.last().map(|l| l.id());
        }
        crate::log_info!("deleted layer '{}'", removed.name);
        Ok(())
    }

    /// Flip visibility, returning the new state.
    pub fn toggle_visibility(&mut self, id: LayerId) -> EditorResult<bool> {
        let layer = self.require_layer(id)?;
        layer.visible = !layer.visible;
        Ok(layer.visible)
    }

    pub fn set_visibility(&mut self, id: LayerId, visible: bool) -> EditorResult<()> {
        self.require_layer(id)?.visible = visible;
        Ok(())
    }

    pub fn set_opacity(&mut self, id: LayerId, opacity: f32) -> EditorResult<()> {
        self.require_layer(id)?.set_opacity(opacity);
        Ok(())
    }

    pub fn rename_layer(&mut self, id: LayerId, name: impl Into<String>) -> EditorResult<()> {
        self.require_layer(id)?.name = name.into();
        Ok(())
    }

    pub fn set_position(&mut self, id: LayerId, position: Position) -> EditorResult<()> {
        self.require_layer(id)?.position = position;
        Ok(())
    }

    /// Shift a layer's composite offset.  Pixels are untouched.
    pub fn translate_layer(&mut self, id: LayerId, dx: f32, dy: f32) -> EditorResult<()> {
        let layer = self.require_layer(id)?;
        layer.position.x += dx;
        layer.position.y += dy;
        Ok(())
    }

    pub fn set_transform(&mut self, id: LayerId, transform: LayerTransform) -> EditorResult<()> {
        self.require_layer(id)?.transform = transform;
        Ok(())
    }

    pub fn refresh_thumbnail(&mut self, id: LayerId) -> EditorResult<()> {
        let edge = self.thumbnail_edge;
        self.require_layer(id)?.refresh_thumbnail(edge);
        Ok(())
    }

    // ========================================================================
    // FILTERS & HISTORY
    // ========================================================================

    /// Apply a filter to the active layer.  The pre-filter pixels are saved
    /// first, so undo restores them.
    pub fn apply_filter(&mut self, spec: &FilterSpec) -> EditorResult<LayerId> {
        let id = self.active.ok_or(EditorError::MissingActiveLayer)?;
        self.snapshot_layer(id)?;
        let edge = self.thumbnail_edge;
        let layer = self.require_layer(id)?;
        apply_filter(&mut layer.buffer, spec);
        layer.refresh_thumbnail(edge);
        crate::log_info!("applied {} to layer '{}'", spec, layer.name);
        Ok(id)
    }

    /// Record the current pixels of `id` in history.
    pub fn snapshot_layer(&mut self, id: LayerId) -> EditorResult<()> {
        let layer = self
            .layers
            .iter()
            .find(|l| l.id() == id)
            .ok_or(EditorError::LayerNotFound(id))?;
        self.history.save_state(id, &layer.buffer);
        Ok(())
    }

    /// Step history back and restore the layer it names.
    pub fn undo(&mut self) -> EditorResult<LayerId> {
        let edge = self.thumbnail_edge;
        let Some(entry) = self.history.undo() else {
            crate::log_info!("nothing to undo");
            return Err(EditorError::EmptyHistory("undo"));
        };
        Ok(restore_entry(&mut self.layers, entry, edge))
    }

    /// Step history forward and restore the layer it names.
    pub fn redo(&mut self) -> EditorResult<LayerId> {
        let edge = self.thumbnail_edge;
        let Some(entry) = self.history.redo() else {
            crate::log_info!("nothing to redo");
            return Err(EditorError::EmptyHistory("redo"));
        };
        Ok(restore_entry(&mut self.layers, entry, edge))
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    // ========================================================================
    // RENDERING
    // ========================================================================

    /// Flatten the visible stack.  `None` when the document has no layers.
    pub fn render(&self) -> Option<PixelBuffer> {
        composite(&self.layers)
    }

    /// `#rrggbb` of the composited pixel under (`x`, `y`), clamped to the canvas.
    pub fn pick_color(&self, x: f32, y: f32) -> Option<String> {
        let flat = self.render()?;
        let px = flat.get_pixel_clamped(x.floor() as i64, y.floor() as i64);
        Some(to_hex(px))
    }
}

/// Write a history snapshot back into its layer without touching history.
fn restore_entry(layers: &mut [Layer], entry: &HistoryEntry, thumbnail_edge: u32) -> LayerId {
    match layers.iter_mut().find(|l| l.id() == entry.layer_id) {
        Some(layer) => {
            layer.buffer.copy_from(&entry.snapshot);
            layer.refresh_thumbnail(thumbnail_edge);
            crate::log_info!("restored layer '{}' from history", layer.name);
        }
        None => {
            crate::log_warn!("history entry for deleted layer {} skipped", entry.layer_id);
        }
    }
    entry.layer_id
}

fn text_layer_name(data: &TextData) -> String {
    let first = data.content.lines().next().unwrap_or("").trim();
    if first.is_empty() {
        return "Text".to_string();
    }
    let mut name: String = first.chars().take(24).collect();
    if first.chars().count() > 24 {
        name.push('…');
    }
    name
}
