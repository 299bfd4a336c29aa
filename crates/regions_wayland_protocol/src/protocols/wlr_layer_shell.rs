use crate::{ObjectId, Opcode, buffer::Writer};

// zwlr_layer_shell_v1
pub const ZWLR_LAYER_SHELL_V1_GET_LAYER_SURFACE: Opcode = 0;
pub const ZWLR_LAYER_SHELL_V1_DESTROY: Opcode = 1;
pub const ZWLR_LAYER_SHELL_V1_LAYER_TOP: u32 = 2;

// zwlr_layer_surface_v1
pub const ZWLR_LAYER_SURFACE_V1_SET_SIZE: Opcode = 0;
pub const ZWLR_LAYER_SURFACE_V1_SET_ANCHOR: Opcode = 1;
pub const ZWLR_LAYER_SURFACE_V1_SET_EXCLUSIVE_ZONE: Opcode = 2;
pub const ZWLR_LAYER_SURFACE_V1_SET_KEYBOARD_INTERACTIVITY: Opcode = 4;
pub const ZWLR_LAYER_SURFACE_V1_ACK_CONFIGURE: Opcode = 6;
pub const ZWLR_LAYER_SURFACE_V1_DESTROY: Opcode = 7;
pub const ZWLR_LAYER_SURFACE_V1_CONFIGURE: Opcode = 0;
pub const ZWLR_LAYER_SURFACE_V1_CLOSED: Opcode = 1;

pub const ZWLR_LAYER_SURFACE_V1_ANCHOR_TOP: u32 = 1;
pub const ZWLR_LAYER_SURFACE_V1_ANCHOR_BOTTOM: u32 = 2;
pub const ZWLR_LAYER_SURFACE_V1_ANCHOR_LEFT: u32 = 4;
pub const ZWLR_LAYER_SURFACE_V1_ANCHOR_RIGHT: u32 = 8;
pub const ZWLR_LAYER_SURFACE_V1_KEYBOARD_INTERACTIVITY_EXCLUSIVE: u32 = 1;

impl Writer {
    /// `output` 0 lets the compositor pick the output
    pub fn zwlr_layer_shell_v1_get_layer_surface(
        &mut self,
        layer_shell: ObjectId,
        layer_surface: ObjectId,
        surface: ObjectId,
        output: ObjectId,
        layer: u32,
        namespace: &str,
    ) {
        self.start_message(layer_shell, ZWLR_LAYER_SHELL_V1_GET_LAYER_SURFACE);
        self.write_u32(layer_surface);
        self.write_u32(surface);
        self.write_u32(output);
        self.write_u32(layer);
        self.write_str(namespace);
        self.write_message_length();
    }

    pub fn zwlr_layer_shell_v1_destroy(&mut self, layer_shell: ObjectId) {
        self.start_message(layer_shell, ZWLR_LAYER_SHELL_V1_DESTROY);
        self.write_message_length();
    }

    pub fn zwlr_layer_surface_v1_set_size(&mut self, layer_surface: ObjectId, width: u32, height: u32) {
        self.start_message(layer_surface, ZWLR_LAYER_SURFACE_V1_SET_SIZE);
        self.write_u32(width);
        self.write_u32(height);
        self.write_message_length();
    }

    pub fn zwlr_layer_surface_v1_set_anchor(&mut self, layer_surface: ObjectId, anchor: u32) {
        self.start_message(layer_surface, ZWLR_LAYER_SURFACE_V1_SET_ANCHOR);
        self.write_u32(anchor);
        self.write_message_length();
    }

    pub fn zwlr_layer_surface_v1_set_exclusive_zone(&mut self, layer_surface: ObjectId, zone: i32) {
        self.start_message(layer_surface, ZWLR_LAYER_SURFACE_V1_SET_EXCLUSIVE_ZONE);
        self.write_i32(zone);
        self.write_message_length();
    }

    pub fn zwlr_layer_surface_v1_set_keyboard_interactivity(
        &mut self,
        layer_surface: ObjectId,
        keyboard_interactivity: u32,
    ) {
        self.start_message(
            layer_surface,
            ZWLR_LAYER_SURFACE_V1_SET_KEYBOARD_INTERACTIVITY,
        );
        self.write_u32(keyboard_interactivity);
        self.write_message_length();
    }

    pub fn zwlr_layer_surface_v1_ack_configure(&mut self, layer_surface: ObjectId, serial: u32) {
        self.start_message(layer_surface, ZWLR_LAYER_SURFACE_V1_ACK_CONFIGURE);
        self.write_u32(serial);
        self.write_message_length();
    }

    pub fn zwlr_layer_surface_v1_destroy(&mut self, layer_surface: ObjectId) {
        self.start_message(layer_surface, ZWLR_LAYER_SURFACE_V1_DESTROY);
        self.write_message_length();
    }
}
