use crate::canvas::LayerId;
use crate::document::Document;
use crate::ops::brush::{stamp, stroke_segment, StrokeMode};
use crate::settings::EditorSettings;

pub use crate::ops::brush::BrushSettings;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Tool {
    #[default]
    Brush,
    Eraser,
    Eyedropper,
    Text,
    Move,
}

impl Tool {
    fn stroke_mode(self) -> Option<StrokeMode> {
        match self {
            Tool::Brush => Some(StrokeMode::Paint),
            Tool::Eraser => Some(StrokeMode::Erase),
            _ => None,
        }
    }
}

/// Where the controller is in a pointer gesture.  Positions are document space.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub enum StrokeState {
    #[default]
    Idle,
    Drawing {
        layer: LayerId,
        mode: StrokeMode,
        last: (f32, f32),
    },
    Dragging {
        layer: LayerId,
        last: (f32, f32),
    },
}

/// What the caller should do after a pointer event.
#[derive(Clone, Debug, PartialEq)]
pub enum ToolOutcome {
    Nothing,
    /// Pixels or positions changed; re-composite.
    Repaint,
    /// Eyedropper sample as `#rrggbb`.  The brush colour is left alone;
    /// adopting the sample is up to the caller.
    ColorPicked(String),
    /// Text tool click; the caller collects the text and calls
    /// `Document::add_text_layer` at this position.
    PlaceText { x: f32, y: f32 },
    /// A brush/eraser stroke ended on this layer.
    StrokeCommitted(LayerId),
}

/// Turns pointer events into edits on a [`Document`].
///
/// A brush or eraser stroke snapshots the active layer once on pointer-down,
/// before the first stamp; moves and the final release add nothing to history.
#[derive(Clone, Debug, Default)]
pub struct ToolController {
    tool: Tool,
    pub brush: BrushSettings,
    state: StrokeState,
}

impl ToolController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_settings(settings: &EditorSettings) -> Self {
        Self {
            brush: BrushSettings {
                size: settings.brush_size,
                color: settings.brush_color,
                opacity: settings.brush_opacity,
                ..BrushSettings::default()
            },
            ..Self::default()
        }
    }

    pub fn tool(&self) -> Tool {
        self.tool
    }

    pub fn state(&self) -> StrokeState {
        self.state
    }

    pub fn is_drawing(&self) -> bool {
        matches!(self.state, StrokeState::Drawing { .. })
    }

    /// Switch tools, finishing any gesture in progress.
    pub fn set_tool(&mut self, doc: &mut Document, tool: Tool) -> ToolOutcome {
        let outcome = self.pointer_up(doc);
        self.tool = tool;
        outcome
    }

    pub fn pointer_down(&mut self, doc: &mut Document, x: f32, y: f32) -> ToolOutcome {
        if self.state != StrokeState::Idle || !is_finite_point(x, y) {
            return ToolOutcome::Nothing;
        }
        match self.tool {
            Tool::Brush | Tool::Eraser => self.begin_stroke(doc, x, y),
            Tool::Eyedropper => doc.pick_color(x, y).map_or(ToolOutcome::Nothing, ToolOutcome::ColorPicked),
            Tool::Text => {
                if doc.is_empty() {
                    return ToolOutcome::Nothing;
                }
                ToolOutcome::PlaceText { x, y }
            }
            Tool::Move => {
                let Some(layer) = doc.active_layer_id() else {
                    crate::log_info!("move ignored: no active layer");
                    return ToolOutcome::Nothing;
                };
                self.state = StrokeState::Dragging { layer, last: (x, y) };
                ToolOutcome::Nothing
            }
        }
    }

    fn begin_stroke(&mut self, doc: &mut Document, x: f32, y: f32) -> ToolOutcome {
        let Some(mode) = self.tool.stroke_mode() else {
            return ToolOutcome::Nothing;
        };
        let Some(layer_id) = doc.active_layer_id() else {
            crate::log_info!("stroke ignored: no active layer");
            return ToolOutcome::Nothing;
        };
        match doc.layer(layer_id) {
            Some(layer) if !layer.is_text() => {}
            Some(_) => {
                crate::log_info!("stroke ignored: active layer is a text layer");
                return ToolOutcome::Nothing;
            }
            None => return ToolOutcome::Nothing,
        }

        if doc.snapshot_layer(layer_id).is_err() {
            return ToolOutcome::Nothing;
        }
        let brush = self.brush;
        if let Some(layer) = doc.layer_mut(layer_id)
            && let Some((lx, ly)) = layer.to_local(x, y)
        {
            stamp(&mut layer.buffer, lx, ly, &brush, mode);
        }
        self.state = StrokeState::Drawing {
            layer: layer_id,
            mode,
            last: (x, y),
        };
        ToolOutcome::Repaint
    }

    /// Non-finite coordinates are dropped without ending the gesture.
    pub fn pointer_move(&mut self, doc: &mut Document, x: f32, y: f32) -> ToolOutcome {
        if !is_finite_point(x, y) {
            return ToolOutcome::Nothing;
        }
        match self.state {
            StrokeState::Idle => ToolOutcome::Nothing,
            StrokeState::Drawing { layer, mode, last } => {
                let brush = self.brush;
                let Some(target) = doc.layer_mut(layer) else {
                    self.state = StrokeState::Idle;
                    return ToolOutcome::Nothing;
                };
                if let (Some(from), Some(to)) = (target.to_local(last.0, last.1), target.to_local(x, y)) {
                    stroke_segment(&mut target.buffer, from, to, &brush, mode);
                }
                self.state = StrokeState::Drawing {
                    layer,
                    mode,
                    last: (x, y),
                };
                ToolOutcome::Repaint
            }
            StrokeState::Dragging { layer, last } => {
                if doc.translate_layer(layer, x - last.0, y - last.1).is_err() {
                    self.state = StrokeState::Idle;
                    return ToolOutcome::Nothing;
                }
                self.state = StrokeState::Dragging { layer, last: (x, y) };
                ToolOutcome::Repaint
            }
        }
    }

    pub fn pointer_up(&mut self, doc: &mut Document) -> ToolOutcome {
        let state = std::mem::take(&mut self.state);
        match state {
            StrokeState::Drawing { layer, .. } => {
                if doc.refresh_thumbnail(layer).is_err() {
                    return ToolOutcome::Nothing;
                }
                ToolOutcome::StrokeCommitted(layer)
            }
            StrokeState::Idle | StrokeState::Dragging { .. } => ToolOutcome::Nothing,
        }
    }

    /// Leaving the canvas ends the gesture exactly like a release.
    pub fn pointer_leave(&mut self, doc: &mut Document) -> ToolOutcome {
        self.pointer_up(doc)
    }
}

fn is_finite_point(x: f32, y: f32) -> bool {
    x.is_finite() && y.is_finite()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::{parse_hex_color, PixelBuffer, Position};
    use crate::ops::text::TextData;
    use image::Rgba;

    fn blank_doc() -> Document {
        let mut doc = Document::new();
        doc.import_buffer(PixelBuffer::new(10, 10).unwrap());
        doc
    }

    fn brush(size: f32, hex: &str) -> ToolController {
        let mut t = ToolController::new();
        t.brush.size = size;
        t.brush.color = parse_hex_color(hex).unwrap();
        t
    }

    #[test]
    fn stroke_snapshots_once_before_painting() {
        let mut doc = blank_doc();
        let mut tools = brush(2.0, "#ff0000");
        let before = doc.history().len();

        assert_eq!(tools.pointer_down(&mut doc, 1.0, 1.0), ToolOutcome::Repaint);
        assert!(tools.is_drawing());
        tools.pointer_move(&mut doc, 5.0, 1.0);
        tools.pointer_move(&mut doc, 8.0, 1.0);
        let id = doc.active_layer_id().unwrap();
        assert_eq!(tools.pointer_up(&mut doc), ToolOutcome::StrokeCommitted(id));

        assert_eq!(doc.history().len(), before + 1);
        let buf = &doc.layer(id).unwrap().buffer;
        for x in 1..=8 {
            assert_eq!(buf.get_pixel(x, 1).unwrap(), Rgba([255, 0, 0, 255]));
        }

        // the snapshot was taken before the stamp
        doc.undo().unwrap();
        assert!(doc.layer(id).unwrap().buffer.as_raw().iter().all(|&c| c == 0));
    }

    #[test]
    fn leave_ends_stroke_like_release() {
        let mut doc = blank_doc();
        let mut tools = brush(2.0, "#000000");
        tools.pointer_down(&mut doc, 2.0, 2.0);
        let id = doc.active_layer_id().unwrap();
        assert_eq!(tools.pointer_leave(&mut doc), ToolOutcome::StrokeCommitted(id));
        assert_eq!(tools.state(), StrokeState::Idle);
        assert_eq!(tools.pointer_move(&mut doc, 6.0, 6.0), ToolOutcome::Nothing);
        assert_eq!(doc.layer(id).unwrap().buffer.get_pixel(6, 6).unwrap()[3], 0);
    }

    #[test]
    fn eraser_clears_active_layer() {
        let mut doc = Document::new();
        doc.import_buffer(PixelBuffer::new_filled(10, 10, Rgba([9, 9, 9, 255])).unwrap());
        let mut tools = ToolController::new();
        tools.set_tool(&mut doc, Tool::Eraser);
        tools.brush.size = 4.0;
        tools.pointer_down(&mut doc, 5.0, 5.0);
        tools.pointer_up(&mut doc);

        let buf = &doc.active_layer().unwrap().buffer;
        assert_eq!(buf.get_pixel(5, 5).unwrap(), Rgba([0, 0, 0, 0]));
        assert_eq!(buf.get_pixel(0, 0).unwrap(), Rgba([9, 9, 9, 255]));
    }

    #[test]
    fn strokes_follow_layer_offset() {
        let mut doc = blank_doc();
        let id = doc.active_layer_id().unwrap();
        doc.set_position(id, Position { x: 3.0, y: 0.0 }).unwrap();
        let mut tools = brush(1.0, "#ffffff");
        tools.pointer_down(&mut doc, 5.0, 4.0);
        tools.pointer_up(&mut doc);
        assert_eq!(doc.layer(id).unwrap().buffer.get_pixel(2, 4).unwrap()[3], 255);
    }

    #[test]
    fn brush_does_nothing_without_document_or_on_text() {
        let mut empty = Document::new();
        let mut tools = brush(3.0, "#000000");
        assert_eq!(tools.pointer_down(&mut empty, 1.0, 1.0), ToolOutcome::Nothing);
        assert_eq!(tools.state(), StrokeState::Idle);

        let mut doc = blank_doc().with_text_rasterizer(Box::new(
            crate::ops::text::tests::DotRasterizer::default(),
        ));
        doc.add_text_layer(TextData::new("t", 1.0, 1.0)).unwrap();
        let before = doc.history().len();
        assert_eq!(tools.pointer_down(&mut doc, 1.0, 1.0), ToolOutcome::Nothing);
        assert_eq!(doc.history().len(), before);
    }

    #[test]
    fn eyedropper_only_reports_color() {
        let mut doc = Document::new();
        doc.import_buffer(PixelBuffer::new_filled(3, 3, Rgba([0x12, 0x34, 0x56, 255])).unwrap());
        let mut tools = ToolController::new();
        tools.set_tool(&mut doc, Tool::Eyedropper);
        let brush_before = tools.brush;
        assert_eq!(
            tools.pointer_down(&mut doc, -4.0, 99.0),
            ToolOutcome::ColorPicked("#123456".into())
        );
        assert_eq!(tools.brush, brush_before);
        assert_eq!(tools.state(), StrokeState::Idle);
        assert_eq!(tools.pointer_down(&mut Document::new(), 1.0, 1.0), ToolOutcome::Nothing);
    }

    #[test]
    fn non_finite_pointer_is_ignored() {
        let mut doc = blank_doc();
        let id = doc.active_layer_id().unwrap();
        let mut tools = brush(2.0, "#ff0000");
        assert_eq!(tools.pointer_down(&mut doc, f32::NAN, 1.0), ToolOutcome::Nothing);
        assert_eq!(tools.state(), StrokeState::Idle);

        tools.pointer_down(&mut doc, 5.0, 5.0);
        let painted = |doc: &Document| {
            doc.layer(id).unwrap().buffer.as_raw().chunks_exact(4).filter(|px| px[3] > 0).count()
        };
        let after_down = painted(&doc);
        assert_eq!(tools.pointer_move(&mut doc, f32::NAN, f32::NAN), ToolOutcome::Nothing);
        assert_eq!(tools.pointer_move(&mut doc, f32::INFINITY, 5.0), ToolOutcome::Nothing);
        assert_eq!(painted(&doc), after_down);
        assert!(tools.is_drawing());

        // the gesture continues from the last finite point
        tools.pointer_move(&mut doc, 8.0, 5.0);
        assert_eq!(doc.layer(id).unwrap().buffer.get_pixel(7, 5).unwrap()[3], 255);
    }

    #[test]
    fn stroke_release_refreshes_thumbnail() {
        let mut doc = blank_doc();
        let id = doc.active_layer_id().unwrap();
        let blank_thumb = doc.layer(id).unwrap().thumbnail.clone();
        assert!(blank_thumb.is_some());

        let mut tools = brush(6.0, "#0000ff");
        tools.pointer_down(&mut doc, 5.0, 5.0);
        // mid-stroke the thumbnail still shows the pre-stroke pixels
        assert_eq!(doc.layer(id).unwrap().thumbnail, blank_thumb);
        tools.pointer_up(&mut doc);

        let layer = doc.layer(id).unwrap();
        let expected = crate::canvas::encode_thumbnail(&layer.buffer, doc.thumbnail_edge()).unwrap();
        assert_ne!(layer.thumbnail, blank_thumb);
        assert_eq!(layer.thumbnail.as_deref(), Some(expected.as_slice()));
    }

    #[test]
    fn move_accumulates_offset_without_history() {
        let mut doc = blank_doc();
        let id = doc.active_layer_id().unwrap();
        let pixels = doc.layer(id).unwrap().buffer.clone();
        let history = doc.history().len();

        let mut tools = ToolController::new();
        tools.set_tool(&mut doc, Tool::Move);
        tools.pointer_down(&mut doc, 1.0, 1.0);
        tools.pointer_move(&mut doc, 3.0, 2.0);
        tools.pointer_move(&mut doc, 4.0, 6.0);
        tools.pointer_up(&mut doc);

        let layer = doc.layer(id).unwrap();
        assert_eq!(layer.position, Position { x: 3.0, y: 5.0 });
        assert_eq!(layer.buffer, pixels);
        assert_eq!(doc.history().len(), history);
    }

    #[test]
    fn text_tool_requests_placement() {
        let mut doc = blank_doc();
        let mut tools = ToolController::new();
        tools.set_tool(&mut doc, Tool::Text);
        assert_eq!(
            tools.pointer_down(&mut doc, 4.0, 7.5),
            ToolOutcome::PlaceText { x: 4.0, y: 7.5 }
        );
    }
}
