// Pixel-level tool engines. Each module is a set of pure functions plus the
// parameter bundle the session owns for that tool.

pub mod adjustments;
pub mod crop;
pub mod filters;
pub mod text;
pub mod transform;
