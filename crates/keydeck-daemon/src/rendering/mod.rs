//! Rendering module for key faces.

mod key;
mod text;

pub use key::KeyRenderer;
