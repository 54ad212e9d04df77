pub mod artifact;
mod mask;

pub use mask::{MaskFilter, SelectionMask};
