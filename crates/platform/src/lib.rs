//! Windowing, surface creation and input handling.

pub mod input;
pub mod window;

pub use input::{InputState, KeyCode, MouseButton};
pub use window::{Surface, Window};
