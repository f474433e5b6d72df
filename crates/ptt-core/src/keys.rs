use crate::input::InputEvent;
use std::sync::mpsc;

/// The designated alternate control for push-to-talk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PttKey {
    Space,
    Enter,
    Tab,
    CapsLock,
    RightCtrl,
    RightAlt,
    Letter(char),
    Function(u8),
}

const LETTER_KEYS: [(char, rdev::Key); 26] = [
    ('A', rdev::Key::KeyA),
    ('B', rdev::Key::KeyB),
    ('C', rdev::Key::KeyC),
    ('D', rdev::Key::KeyD),
    ('E', rdev::Key::KeyE),
    ('F', rdev::Key::KeyF),
    ('G', rdev::Key::KeyG),
    ('H', rdev::Key::KeyH),
    ('I', rdev::Key::KeyI),
    ('J', rdev::Key::KeyJ),
    ('K', rdev::Key::KeyK),
    ('L', rdev::Key::KeyL),
    ('M', rdev::Key::KeyM),
    ('N', rdev::Key::KeyN),
    ('O', rdev::Key::KeyO),
    ('P', rdev::Key::KeyP),
    ('Q', rdev::Key::KeyQ),
    ('R', rdev::Key::KeyR),
    ('S', rdev::Key::KeyS),
    ('T', rdev::Key::KeyT),
    ('U', rdev::Key::KeyU),
    ('V', rdev::Key::KeyV),
    ('W', rdev::Key::KeyW),
    ('X', rdev::Key::KeyX),
    ('Y', rdev::Key::KeyY),
    ('Z', rdev::Key::KeyZ),
];

const FUNCTION_KEYS: [rdev::Key; 12] = [
    rdev::Key::F1,
    rdev::Key::F2,
    rdev::Key::F3,
    rdev::Key::F4,
    rdev::Key::F5,
    rdev::Key::F6,
    rdev::Key::F7,
    rdev::Key::F8,
    rdev::Key::F9,
    rdev::Key::F10,
    rdev::Key::F11,
    rdev::Key::F12,
];

impl PttKey {
    pub const F9: PttKey = PttKey::Function(9);

    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim().to_ascii_lowercase();
        match name.as_str() {
            "space" => return Some(PttKey::Space),
            "enter" | "return" => return Some(PttKey::Enter),
            "tab" => return Some(PttKey::Tab),
            "capslock" | "caps_lock" => return Some(PttKey::CapsLock),
            "rctrl" | "right_ctrl" => return Some(PttKey::RightCtrl),
            "ralt" | "right_alt" | "altgr" => return Some(PttKey::RightAlt),
            _ => {}
        }

        let mut chars = name.chars();
        match (chars.next(), chars.next()) {
            (Some(letter), None) if letter.is_ascii_alphabetic() => {
                return Some(PttKey::Letter(letter.to_ascii_uppercase()))
            }
            _ => {}
        }

        let number = name.strip_prefix('f')?.parse::<u8>().ok()?;
        (1..=12).contains(&number).then_some(PttKey::Function(number))
    }

    pub fn label(&self) -> String {
        match self {
            PttKey::Space => "Space".to_string(),
            PttKey::Enter => "Enter".to_string(),
            PttKey::Tab => "Tab".to_string(),
            PttKey::CapsLock => "Caps Lock".to_string(),
            PttKey::RightCtrl => "Right Ctrl".to_string(),
            PttKey::RightAlt => "Right Alt".to_string(),
            PttKey::Letter(letter) => letter.to_string(),
            PttKey::Function(number) => format!("F{number}"),
        }
    }

    fn from_rdev(key: rdev::Key) -> Option<Self> {
        match key {
            rdev::Key::Space => Some(PttKey::Space),
            rdev::Key::Return => Some(PttKey::Enter),
            rdev::Key::Tab => Some(PttKey::Tab),
            rdev::Key::CapsLock => Some(PttKey::CapsLock),
            rdev::Key::ControlRight => Some(PttKey::RightCtrl),
            rdev::Key::AltGr => Some(PttKey::RightAlt),
            other => LETTER_KEYS
                .iter()
                .find(|(_, raw)| *raw == other)
                .map(|(letter, _)| PttKey::Letter(*letter))
                .or_else(|| {
                    FUNCTION_KEYS
                        .iter()
                        .position(|raw| *raw == other)
                        .map(|index| PttKey::Function(index as u8 + 1))
                }),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum KeyListenerError {
    #[error("key listener error: {0}")]
    Listener(String),
}

pub struct KeyListenerHandle {
    join_handle: std::thread::JoinHandle<Result<(), KeyListenerError>>,
}

impl KeyListenerHandle {
    pub fn join(self) -> Result<(), KeyListenerError> {
        match self.join_handle.join() {
            Ok(result) => result,
            Err(_) => Err(KeyListenerError::Listener(
                "listener thread panicked".to_string(),
            )),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.join_handle.is_finished()
    }
}

/// System-wide listener for the push-to-talk key.
pub struct KeyListener {
    key: PttKey,
}

impl KeyListener {
    pub fn new(key: PttKey) -> Self {
        Self { key }
    }

    /// Forwards key events into `sender`, converted to whatever the receiving
    /// loop consumes.
    pub fn start<T>(&self, sender: mpsc::Sender<T>) -> KeyListenerHandle
    where
        T: From<InputEvent> + Send + 'static,
    {
        spawn_listener(self.key, sender, |mut handler| {
            rdev::listen(move |event| handler(event))
                .map_err(|error| KeyListenerError::Listener(format!("{error:?}")))
        })
    }
}

fn spawn_listener<T>(
    key: PttKey,
    sender: mpsc::Sender<T>,
    listen: impl FnOnce(Box<dyn FnMut(rdev::Event) + Send>) -> Result<(), KeyListenerError>
        + Send
        + 'static,
) -> KeyListenerHandle
where
    T: From<InputEvent> + Send + 'static,
{
    let join_handle = std::thread::spawn(move || {
        let mut held = false;
        let handler = move |event: rdev::Event| match event.event_type {
            rdev::EventType::KeyPress(raw) if PttKey::from_rdev(raw) == Some(key) => {
                // the OS re-sends presses while the key is held
                let repeat = held;
                held = true;
                let _ = sender.send(InputEvent::KeyDown { key, repeat }.into());
            }
            rdev::EventType::KeyRelease(raw) if PttKey::from_rdev(raw) == Some(key) => {
                if !held {
                    return;
                }
                held = false;
                let _ = sender.send(InputEvent::KeyUp { key }.into());
            }
            _ => {}
        };

        listen(Box::new(handler))
    });

    KeyListenerHandle { join_handle }
}

#[cfg(test)]
mod tests {
    use super::{spawn_listener, KeyListenerError, PttKey};
    use crate::input::InputEvent;
    use std::sync::mpsc;
    use std::time::SystemTime;

    fn key_event(event_type: rdev::EventType) -> rdev::Event {
        rdev::Event {
            time: SystemTime::now(),
            name: None,
            event_type,
        }
    }

    #[test]
    fn parses_key_names() {
        assert_eq!(PttKey::parse(" Space "), Some(PttKey::Space));
        assert_eq!(PttKey::parse("v"), Some(PttKey::Letter('V')));
        assert_eq!(PttKey::parse("F12"), Some(PttKey::Function(12)));
        assert_eq!(PttKey::parse("altgr"), Some(PttKey::RightAlt));
        assert_eq!(PttKey::parse("f13"), None);
        assert_eq!(PttKey::parse("7"), None);
        assert_eq!(PttKey::parse(""), None);
    }

    #[test]
    fn labels_are_human_readable() {
        assert_eq!(PttKey::Space.label(), "Space");
        assert_eq!(PttKey::F9.label(), "F9");
        assert_eq!(PttKey::Letter('T').label(), "T");
    }

    #[test]
    fn maps_rdev_keys() {
        assert_eq!(PttKey::from_rdev(rdev::Key::KeyQ), Some(PttKey::Letter('Q')));
        assert_eq!(PttKey::from_rdev(rdev::Key::F1), Some(PttKey::Function(1)));
        assert_eq!(PttKey::from_rdev(rdev::Key::ShiftLeft), None);
    }

    #[test]
    fn listener_marks_auto_repeat_presses() {
        let (sender, receiver) = mpsc::channel::<InputEvent>();
        let handle = spawn_listener(PttKey::Space, sender, |mut handler| {
            handler(key_event(rdev::EventType::KeyPress(rdev::Key::Space)));
            handler(key_event(rdev::EventType::KeyPress(rdev::Key::Space)));
            handler(key_event(rdev::EventType::KeyPress(rdev::Key::KeyA)));
            handler(key_event(rdev::EventType::KeyRelease(rdev::Key::Space)));
            handler(key_event(rdev::EventType::KeyRelease(rdev::Key::Space)));
            Ok(())
        });

        handle.join().expect("listener join");

        let events = receiver.try_iter().collect::<Vec<_>>();
        assert_eq!(
            events,
            vec![
                InputEvent::KeyDown {
                    key: PttKey::Space,
                    repeat: false
                },
                InputEvent::KeyDown {
                    key: PttKey::Space,
                    repeat: true
                },
                InputEvent::KeyUp { key: PttKey::Space },
            ]
        );
    }

    #[derive(Debug, PartialEq)]
    enum LoopMessage {
        Input(InputEvent),
    }

    impl From<InputEvent> for LoopMessage {
        fn from(event: InputEvent) -> Self {
            LoopMessage::Input(event)
        }
    }

    #[test]
    fn listener_feeds_a_shared_loop_channel() {
        let (sender, receiver) = mpsc::channel::<LoopMessage>();
        let handle = spawn_listener(PttKey::F9, sender, |mut handler| {
            handler(key_event(rdev::EventType::KeyPress(rdev::Key::F9)));
            handler(key_event(rdev::EventType::KeyRelease(rdev::Key::F9)));
            Ok(())
        });

        handle.join().expect("listener join");

        let messages = receiver.try_iter().collect::<Vec<_>>();
        assert_eq!(
            messages,
            vec![
                LoopMessage::Input(InputEvent::KeyDown {
                    key: PttKey::F9,
                    repeat: false
                }),
                LoopMessage::Input(InputEvent::KeyUp { key: PttKey::F9 }),
            ]
        );
    }

    #[test]
    fn listener_propagates_listen_error() {
        let (sender, _receiver) = mpsc::channel::<InputEvent>();
        let handle = spawn_listener(PttKey::Space, sender, |_handler| {
            Err(KeyListenerError::Listener("listen failed".to_string()))
        });

        let result = handle.join();

        assert!(
            matches!(result, Err(KeyListenerError::Listener(message)) if message == "listen failed")
        );
    }
}
