//! Maps pointer, touch and keyboard gestures onto the two gate operations.
//!
//! All sources feed one logical "held" gesture: the first press starts it,
//! the first release from a held source ends it for every source.

use crate::keys::PttKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    PointerDown,
    PointerUp,
    /// The pointer left the control's bounds.
    PointerLeave,
    TouchStart,
    TouchEnd,
    KeyDown { key: PttKey, repeat: bool },
    KeyUp { key: PttKey },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputSource {
    Pointer,
    Touch,
    Keyboard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateCommand {
    Start,
    Stop,
}

/// What the host should do with an event after the binding has seen it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Disposition {
    pub command: Option<GateCommand>,
    /// Suppress the platform's default handling (scrolling, synthesized
    /// mouse events).
    pub prevent_default: bool,
}

impl Disposition {
    fn ignored() -> Self {
        Self::default()
    }

    fn consumed(command: Option<GateCommand>) -> Self {
        Self {
            command,
            prevent_default: true,
        }
    }

    fn passive(command: Option<GateCommand>) -> Self {
        Self {
            command,
            prevent_default: false,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct HeldSources {
    pointer: bool,
    touch: bool,
    keyboard: bool,
}

impl HeldSources {
    fn any(&self) -> bool {
        self.pointer || self.touch || self.keyboard
    }

    fn slot(&mut self, source: InputSource) -> &mut bool {
        match source {
            InputSource::Pointer => &mut self.pointer,
            InputSource::Touch => &mut self.touch,
            InputSource::Keyboard => &mut self.keyboard,
        }
    }
}

#[derive(Debug)]
pub struct InputBinding {
    key: PttKey,
    attached: bool,
    held: HeldSources,
    gestures: u64,
}

impl InputBinding {
    pub fn new(key: PttKey) -> Self {
        Self {
            key,
            attached: true,
            held: HeldSources::default(),
            gestures: 0,
        }
    }

    /// Number of distinct press-and-hold gestures seen.
    pub fn gestures(&self) -> u64 {
        self.gestures
    }

    /// Stops routing events. A detached binding ignores everything.
    pub fn detach(&mut self) {
        self.attached = false;
        self.held = HeldSources::default();
    }

    pub fn handle(&mut self, event: InputEvent) -> Disposition {
        if !self.attached {
            return Disposition::ignored();
        }

        match event {
            InputEvent::PointerDown => Disposition::passive(self.press(InputSource::Pointer)),
            InputEvent::PointerUp | InputEvent::PointerLeave => {
                Disposition::passive(self.release(InputSource::Pointer))
            }
            InputEvent::TouchStart => Disposition::consumed(self.press(InputSource::Touch)),
            InputEvent::TouchEnd => Disposition::consumed(self.release(InputSource::Touch)),
            InputEvent::KeyDown { key, .. } if key != self.key => Disposition::ignored(),
            InputEvent::KeyDown { repeat, .. } => {
                if repeat || self.held.keyboard {
                    return Disposition::consumed(None);
                }
                Disposition::consumed(self.press(InputSource::Keyboard))
            }
            InputEvent::KeyUp { key } if key != self.key => Disposition::ignored(),
            InputEvent::KeyUp { .. } => Disposition::consumed(self.release(InputSource::Keyboard)),
        }
    }

    fn press(&mut self, source: InputSource) -> Option<GateCommand> {
        if *self.held.slot(source) {
            return None;
        }
        if !self.held.any() {
            self.gestures += 1;
            log::debug!("push-to-talk gesture {} started ({source:?})", self.gestures);
        }
        *self.held.slot(source) = true;
        Some(GateCommand::Start)
    }

    fn release(&mut self, source: InputSource) -> Option<GateCommand> {
        if !*self.held.slot(source) {
            return None;
        }
        log::debug!("push-to-talk gesture {} released ({source:?})", self.gestures);
        self.held = HeldSources::default();
        Some(GateCommand::Stop)
    }
}
