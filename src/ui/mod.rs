// Live worker status display

pub mod render;
pub mod status;

pub use render::{RenderMode, Renderer, clamp_interval, restore_terminal};
pub use status::{PaneHandle, PaneSnapshot, StatusBoard};
