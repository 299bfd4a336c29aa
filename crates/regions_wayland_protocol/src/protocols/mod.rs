//! Opcodes, enum values and request encoders of the protocols the overlay speaks

pub mod wayland;
pub mod wlr_layer_shell;
