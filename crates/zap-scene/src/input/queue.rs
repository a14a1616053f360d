use glam::Vec2;

/// Input event types the scene understands.
///
/// Hosts push pointer positions in frame pixels; listeners receive them in
/// world meters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    /// A touch/click began.
    PointerDown { pos: Vec2, button: u8 },
    /// A touch/click ended.
    PointerUp { pos: Vec2, button: u8 },
    /// A touch/cursor moved.
    PointerMove { pos: Vec2 },
    /// Scroll wheel, in lines. Positive scrolls up.
    Wheel { delta: f32 },
    KeyDown { key_code: u32 },
    KeyUp { key_code: u32 },
}

impl InputEvent {
    pub fn pointer(&self) -> Option<Vec2> {
        match *self {
            InputEvent::PointerDown { pos, .. }
            | InputEvent::PointerUp { pos, .. }
            | InputEvent::PointerMove { pos } => Some(pos),
            _ => None,
        }
    }

    /// Same event with its pointer position mapped through `f`.
    pub fn map_pointer(self, f: impl FnOnce(Vec2) -> Vec2) -> Self {
        match self {
            InputEvent::PointerDown { pos, button } => InputEvent::PointerDown { pos: f(pos), button },
            InputEvent::PointerUp { pos, button } => InputEvent::PointerUp { pos: f(pos), button },
            InputEvent::PointerMove { pos } => InputEvent::PointerMove { pos: f(pos) },
            other => other,
        }
    }
}

/// A queue of input events.
/// The host writes events into the queue; the scene drains it once per frame.
#[derive(Debug)]
pub struct InputQueue {
    events: Vec<InputEvent>,
}

impl InputQueue {
    pub fn new() -> Self {
        Self {
            events: Vec::with_capacity(32),
        }
    }

    pub fn push(&mut self, event: InputEvent) {
        self.events.push(event);
    }

    /// Drain all pending events. Returns a Vec and clears the queue.
    pub fn drain(&mut self) -> Vec<InputEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }
}

impl Default for InputQueue {
    fn default() -> Self {
        Self::new()
    }
}
