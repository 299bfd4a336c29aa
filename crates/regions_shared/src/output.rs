/// Size of the overlay surface spanning an output, in surface-local pixels
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutputSize {
    /// The width of the output
    pub width: u32,
    /// The height of the output
    pub height: u32,
}

impl OutputSize {
    /// Creates a new instance from the given width and height
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Whether the size is still unknown, i.e. the surface has not been configured yet
    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}
