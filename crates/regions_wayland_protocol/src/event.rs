use std::{collections::VecDeque, os::fd::OwnedFd};

use anyhow::Context;

use crate::{
    ObjectId, Opcode,
    buffer::Arguments,
    protocols::{wayland::*, wlr_layer_shell::*},
    registry::Interface,
};

/// A decoded event from the compositor
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    DisplayError {
        object_id: ObjectId,
        code: u32,
        message: String,
    },
    DeleteId {
        id: ObjectId,
    },
    Global {
        name: u32,
        interface: String,
        version: u32,
    },
    GlobalRemove {
        name: u32,
    },
    CallbackDone {
        callback: ObjectId,
        data: u32,
    },
    SurfaceEnter {
        surface: ObjectId,
        output: ObjectId,
    },
    SurfaceLeave {
        surface: ObjectId,
        output: ObjectId,
    },
    ShmFormat {
        format: u32,
    },
    BufferRelease {
        buffer: ObjectId,
    },
    SeatCapabilities {
        seat: ObjectId,
        capabilities: u32,
    },
    SeatName {
        seat: ObjectId,
        name: String,
    },
    PointerEnter {
        serial: u32,
        surface: ObjectId,
        x: f64,
        y: f64,
    },
    PointerLeave {
        serial: u32,
        surface: ObjectId,
    },
    PointerMotion {
        time: u32,
        x: f64,
        y: f64,
    },
    PointerButton {
        serial: u32,
        time: u32,
        button: u32,
        state: u32,
    },
    PointerFrame,
    /// The keymap file descriptor is closed right away, keys are read as evdev codes
    KeyboardKeymap {
        format: u32,
        size: u32,
    },
    KeyboardEnter {
        serial: u32,
        surface: ObjectId,
    },
    KeyboardLeave {
        serial: u32,
        surface: ObjectId,
    },
    KeyboardKey {
        serial: u32,
        time: u32,
        key: u32,
        state: u32,
    },
    KeyboardModifiers {
        serial: u32,
        depressed: u32,
        latched: u32,
        locked: u32,
        group: u32,
    },
    KeyboardRepeatInfo {
        rate: i32,
        delay: i32,
    },
    OutputGeometry {
        output: ObjectId,
        x: i32,
        y: i32,
        make: String,
        model: String,
        transform: i32,
    },
    OutputMode {
        output: ObjectId,
        flags: u32,
        width: i32,
        height: i32,
        refresh: i32,
    },
    OutputDone {
        output: ObjectId,
    },
    OutputScale {
        output: ObjectId,
        factor: i32,
    },
    OutputName {
        output: ObjectId,
        name: String,
    },
    OutputDescription {
        output: ObjectId,
        description: String,
    },
    LayerSurfaceConfigure {
        layer_surface: ObjectId,
        serial: u32,
        width: u32,
        height: u32,
    },
    LayerSurfaceClosed {
        layer_surface: ObjectId,
    },
    /// An event the overlay has no use for, e.g. scrolling
    Other {
        object_id: ObjectId,
        interface: Interface,
        opcode: Opcode,
    },
}

impl Event {
    /// Decodes the arguments of a message sent to an object of the given interface
    pub fn decode(
        interface: Interface,
        object_id: ObjectId,
        opcode: Opcode,
        data: &[u8],
        fds: &mut VecDeque<OwnedFd>,
    ) -> anyhow::Result<Self> {
        let mut args = Arguments::new(data);
        let event = match (interface, opcode) {
            (Interface::WlDisplay, WL_DISPLAY_ERROR) => Event::DisplayError {
                object_id: args.object()?,
                code: args.u32()?,
                message: args.string()?,
            },
            (Interface::WlDisplay, WL_DISPLAY_DELETE_ID) => Event::DeleteId { id: args.u32()? },
            (Interface::WlRegistry, WL_REGISTRY_GLOBAL) => Event::Global {
                name: args.u32()?,
                interface: args.string()?,
                version: args.u32()?,
            },
            (Interface::WlRegistry, WL_REGISTRY_GLOBAL_REMOVE) => {
                Event::GlobalRemove { name: args.u32()? }
            }
            (Interface::WlCallback, WL_CALLBACK_DONE) => Event::CallbackDone {
                callback: object_id,
                data: args.u32()?,
            },
            (Interface::WlSurface, WL_SURFACE_ENTER) => Event::SurfaceEnter {
                surface: object_id,
                output: args.object()?,
            },
            (Interface::WlSurface, WL_SURFACE_LEAVE) => Event::SurfaceLeave {
                surface: object_id,
                output: args.object()?,
            },
            (Interface::WlShm, WL_SHM_FORMAT) => Event::ShmFormat {
                format: args.u32()?,
            },
            (Interface::WlBuffer, WL_BUFFER_RELEASE) => Event::BufferRelease { buffer: object_id },
            (Interface::WlSeat, WL_SEAT_CAPABILITIES) => Event::SeatCapabilities {
                seat: object_id,
                capabilities: args.u32()?,
            },
            (Interface::WlSeat, WL_SEAT_NAME) => Event::SeatName {
                seat: object_id,
                name: args.string()?,
            },
            (Interface::WlPointer, WL_POINTER_ENTER) => Event::PointerEnter {
                serial: args.u32()?,
                surface: args.object()?,
                x: args.fixed()?,
                y: args.fixed()?,
            },
            (Interface::WlPointer, WL_POINTER_LEAVE) => Event::PointerLeave {
                serial: args.u32()?,
                surface: args.object()?,
            },
            (Interface::WlPointer, WL_POINTER_MOTION) => Event::PointerMotion {
                time: args.u32()?,
                x: args.fixed()?,
                y: args.fixed()?,
            },
            (Interface::WlPointer, WL_POINTER_BUTTON) => Event::PointerButton {
                serial: args.u32()?,
                time: args.u32()?,
                button: args.u32()?,
                state: args.u32()?,
            },
            (Interface::WlPointer, WL_POINTER_FRAME) => Event::PointerFrame,
            (Interface::WlKeyboard, WL_KEYBOARD_KEYMAP) => {
                let format = args.u32()?;
                let size = args.u32()?;
                let keymap = fds
                    .pop_front()
                    .context("wl_keyboard.keymap arrived without a file descriptor")?;
                drop(keymap);
                Event::KeyboardKeymap { format, size }
            }
            (Interface::WlKeyboard, WL_KEYBOARD_ENTER) => {
                let serial = args.u32()?;
                let surface = args.object()?;
                args.array()?;
                Event::KeyboardEnter { serial, surface }
            }
            (Interface::WlKeyboard, WL_KEYBOARD_LEAVE) => Event::KeyboardLeave {
                serial: args.u32()?,
                surface: args.object()?,
            },
            (Interface::WlKeyboard, WL_KEYBOARD_KEY) => Event::KeyboardKey {
                serial: args.u32()?,
                time: args.u32()?,
                key: args.u32()?,
                state: args.u32()?,
            },
            (Interface::WlKeyboard, WL_KEYBOARD_MODIFIERS) => Event::KeyboardModifiers {
                serial: args.u32()?,
                depressed: args.u32()?,
                latched: args.u32()?,
                locked: args.u32()?,
                group: args.u32()?,
            },
            (Interface::WlKeyboard, WL_KEYBOARD_REPEAT_INFO) => Event::KeyboardRepeatInfo {
                rate: args.i32()?,
                delay: args.i32()?,
            },
            (Interface::WlOutput, WL_OUTPUT_GEOMETRY) => {
                let x = args.i32()?;
                let y = args.i32()?;
                let _physical_width = args.i32()?;
                let _physical_height = args.i32()?;
                let _subpixel = args.i32()?;
                Event::OutputGeometry {
                    output: object_id,
                    x,
                    y,
                    make: args.string()?,
                    model: args.string()?,
                    transform: args.i32()?,
                }
            }
            (Interface::WlOutput, WL_OUTPUT_MODE) => Event::OutputMode {
                output: object_id,
                flags: args.u32()?,
                width: args.i32()?,
                height: args.i32()?,
                refresh: args.i32()?,
            },
            (Interface::WlOutput, WL_OUTPUT_DONE) => Event::OutputDone { output: object_id },
            (Interface::WlOutput, WL_OUTPUT_SCALE) => Event::OutputScale {
                output: object_id,
                factor: args.i32()?,
            },
            (Interface::WlOutput, WL_OUTPUT_NAME) => Event::OutputName {
                output: object_id,
                name: args.string()?,
            },
            (Interface::WlOutput, WL_OUTPUT_DESCRIPTION) => Event::OutputDescription {
                output: object_id,
                description: args.string()?,
            },
            (Interface::ZwlrLayerSurfaceV1, ZWLR_LAYER_SURFACE_V1_CONFIGURE) => {
                Event::LayerSurfaceConfigure {
                    layer_surface: object_id,
                    serial: args.u32()?,
                    width: args.u32()?,
                    height: args.u32()?,
                }
            }
            (Interface::ZwlrLayerSurfaceV1, ZWLR_LAYER_SURFACE_V1_CLOSED) => {
                Event::LayerSurfaceClosed {
                    layer_surface: object_id,
                }
            }
            (interface, opcode) => Event::Other {
                object_id,
                interface,
                opcode,
            },
        };

        Ok(event)
    }
}
