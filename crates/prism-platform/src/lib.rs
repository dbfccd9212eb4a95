// SPDX-License-Identifier: CEPL-1.0
pub use winit;

pub mod window;

pub use window::{create_window, window_attributes, DrawableSize, PauseChange};
