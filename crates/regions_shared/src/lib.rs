//! Types shared between the crates of the region editor

mod args;
mod input_event;
mod output;
mod reactor;
mod region;

pub use args::GlobalArgs;
pub use input_event::{InputEvent, InputResponse, Key};
pub use output::OutputSize;
pub use reactor::{Reactor, Readiness, TimerHandle, Timers};
pub use region::{
    Axis, FieldRef, FieldRefs, Geometry, Region, Unit, Units, regions_to_percent,
    regions_to_pixels,
};
