pub mod brush;
pub mod filters;
pub mod text;
