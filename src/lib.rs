//! EpiGimp raster core: layered pixel buffers, filters, compositing and
//! snapshot undo/redo, driven by pointer-level tool events.

pub mod logger;

pub mod canvas;
pub mod cli;
pub mod components;
pub mod compositor;
pub mod document;
pub mod error;
pub mod io;
pub mod ops;
pub mod settings;

pub use canvas::{Layer, LayerId, LayerKind, LayerTransform, PixelBuffer, Position};
pub use components::history::{HistoryEntry, HistoryStore};
pub use components::tools::{BrushSettings, StrokeState, Tool, ToolController, ToolOutcome};
pub use document::Document;
pub use error::{EditorError, EditorResult};
pub use io::ExportFormat;
pub use ops::filters::FilterSpec;
pub use ops::text::TextData;
pub use settings::EditorSettings;
