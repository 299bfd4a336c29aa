use log::{debug, info};
use regions_shared::{InputEvent, InputResponse, Key, Region};

/// What the pointer is currently doing with the regions
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum EditorState {
    #[default]
    Idle,
    /// A region is grabbed and follows the pointer
    Dragging {
        /// Index of the grabbed region
        region: usize,
        /// Pointer position of the last processed event
        anchor: (f64, f64),
    },
}

/// Turns pointer and keyboard input into region moves and the end of the session
#[derive(Debug, Default)]
pub struct Editor {
    state: EditorState,
    ended: bool,
}

impl Editor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> EditorState {
        self.state
    }

    /// Whether the end of the session was already requested
    pub fn has_ended(&self) -> bool {
        self.ended
    }

    /// Handles a single input event. Every event requests a redraw.
    pub fn handle(&mut self, event: InputEvent, regions: &mut [Region]) -> InputResponse {
        let end_session = match (event, self.state) {
            (InputEvent::ButtonPress { x, y }, EditorState::Idle) => {
                if let Some(region) = regions
                    .iter()
                    .position(|region| region.geometry.contains(x, y))
                {
                    debug!("Grabbed region {}", regions[region].name);
                    self.state = EditorState::Dragging {
                        region,
                        anchor: (x, y),
                    };
                }
                false
            }
            (
                InputEvent::PointerMotion { x, y },
                EditorState::Dragging { region, anchor },
            ) => {
                if let Some(grabbed) = regions.get_mut(region) {
                    grabbed.geometry.translate(x - anchor.0, y - anchor.1);
                }
                self.state = EditorState::Dragging {
                    region,
                    anchor: (x, y),
                };
                false
            }
            (InputEvent::ButtonRelease { .. }, EditorState::Dragging { region, .. }) => {
                if let Some(released) = regions.get(region) {
                    debug!(
                        "Released region {} at {:?}",
                        released.name, released.geometry
                    );
                }
                self.state = EditorState::Idle;
                false
            }
            (InputEvent::ButtonRelease { .. }, EditorState::Idle) => true,
            (InputEvent::Key(Key::Escape), _) => true,
            _ => false,
        };

        InputResponse {
            redraw: true,
            end_session: end_session && self.end(),
        }
    }

    /// Latches the end of the session. Returns `false` if it was already requested.
    fn end(&mut self) -> bool {
        if self.ended {
            return false;
        }
        info!("Ending the session");
        self.ended = true;
        true
    }
}
