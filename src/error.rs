// ============================================================================
// ERRORS — one taxonomy for the whole raster core
// ============================================================================

use crate::canvas::LayerId;

/// Errors surfaced by the editing core.
///
/// Most of these are expected steady-state conditions (empty history, no
/// active layer, deleting the last layer) rather than failures; callers are
/// free to ignore them.
#[derive(Debug, thiserror::Error)]
pub enum EditorError {
    #[error("pixel ({x}, {y}) is outside the {width}x{height} buffer")]
    OutOfBounds {
        x: i64,
        y: i64,
        width: u32,
        height: u32,
    },

    #[error("invalid buffer dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("nothing to {0}")]
    EmptyHistory(&'static str),

    #[error("no active layer")]
    MissingActiveLayer,

    #[error("the last remaining layer cannot be deleted")]
    LastLayerDeleteRejected,

    #[error("layer {0} does not exist")]
    LayerNotFound(LayerId),

    #[error("layer {0} is not a text layer")]
    NotATextLayer(LayerId),

    #[error("unsupported import format: {0}")]
    UnsupportedImportFormat(String),

    #[error("invalid color '{0}' (expected #rrggbb)")]
    InvalidColor(String),

    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    #[error("no usable font for family '{0}'")]
    FontUnavailable(String),

    #[error("encode failed: {0}")]
    Encode(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<image::ImageError> for EditorError {
    fn from(e: image::ImageError) -> Self {
        EditorError::Encode(e.to_string())
    }
}

pub type EditorResult<T> = Result<T, EditorError>;
