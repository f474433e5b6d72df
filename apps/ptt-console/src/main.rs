mod logging;
mod state;

use logging::{MeterLine, METER_LINE};
use ptt_core::{
    level_bar, status_label, CaptureBackend, CpalCaptureBackend, EngineConfig,
    IntervalFrameScheduler, InputEvent, KeyListener, KeyListenerHandle, MeterVisual, PttEngine,
    PttEventSink, PttKey,
};
use shared_types::{ConnectionState, PttEvent, PttSnapshot};
use signal_hook::consts::signal::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use std::io::{self, BufRead, Write};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

const IDLE_WAIT: Duration = Duration::from_millis(50);
const LEVEL_BAR_WIDTH: usize = 24;
const LOG_TAIL: usize = 20;

type ConsoleEngine = PttEngine<CpalCaptureBackend, IntervalFrameScheduler>;

#[derive(Debug, Clone, PartialEq)]
enum HostCommand {
    Join(String),
    Leave,
    Input(InputEvent),
    Devices,
    Status,
    Logs,
    Set { field: String, value: String },
    Help,
    Quit,
}

impl From<InputEvent> for HostCommand {
    fn from(event: InputEvent) -> Self {
        HostCommand::Input(event)
    }
}

fn parse_command(line: &str) -> Option<HostCommand> {
    let mut parts = line.split_whitespace();
    let command = parts.next()?;
    let command = match command {
        "join" => HostCommand::Join(parts.next()?.to_string()),
        "leave" => HostCommand::Leave,
        "down" => HostCommand::Input(InputEvent::PointerDown),
        "up" => HostCommand::Input(InputEvent::PointerUp),
        "out" => HostCommand::Input(InputEvent::PointerLeave),
        "devices" => HostCommand::Devices,
        "status" => HostCommand::Status,
        "logs" => HostCommand::Logs,
        "set" => HostCommand::Set {
            field: parts.next()?.to_string(),
            value: parts.next()?.to_string(),
        },
        "help" | "?" => HostCommand::Help,
        "quit" | "exit" => HostCommand::Quit,
        _ => return None,
    };
    Some(command)
}

/// Prints engine notifications to stdout.
struct ConsoleSink {
    key: PttKey,
    line: &'static MeterLine,
}

impl ConsoleSink {
    fn write_event(&self, out: &mut impl Write, event: &PttEvent) -> io::Result<()> {
        match event {
            PttEvent::Level { channel_id, level } => {
                let visual = MeterVisual::from_snapshot(&PttSnapshot {
                    channel_id: Some(channel_id.clone()),
                    connection: ConnectionState::Connected,
                    transmitting: true,
                    audio_level: *level,
                });
                write!(
                    out,
                    "\r[{channel_id}] {} {level:.2} x{:.2} glow {:>2}",
                    level_bar(*level, LEVEL_BAR_WIDTH),
                    visual.scale,
                    visual.glow_radius
                )?;
                self.line.mark_open();
                Ok(())
            }
            PttEvent::StateChanged { snapshot } => {
                self.end_line(out)?;
                let channel = snapshot.channel_id.as_deref().unwrap_or("-");
                writeln!(out, "[{channel}] {}", status_label(snapshot, self.key))
            }
            PttEvent::DeviceError {
                channel_id,
                kind,
                message,
            } => {
                self.end_line(out)?;
                writeln!(out, "[{channel_id}] device error ({kind:?}): {message}")
            }
        }
    }

    fn end_line(&self, out: &mut impl Write) -> io::Result<()> {
        if self.line.take() {
            writeln!(out)?;
        }
        Ok(())
    }
}

impl PttEventSink for ConsoleSink {
    fn emit(&self, event: &PttEvent) {
        let mut out = io::stdout().lock();
        if let Err(err) = self.write_event(&mut out, event).and_then(|()| out.flush()) {
            log::debug!("failed to write event: {err}");
        }
    }
}

fn main() {
    logging::init_logging();

    let mut store = state::SettingsStore::new(state::default_settings_path());
    log::info!("settings: {}", store.path().display());
    let config = match EngineConfig::from_settings(&store.settings()) {
        Ok(config) => config,
        Err(err) => {
            log::warn!("invalid settings, using defaults: {err}");
            EngineConfig::default()
        }
    };

    let (commands, command_receiver) = mpsc::channel::<HostCommand>();
    spawn_stdin_reader(commands.clone());
    let listener = KeyListener::new(config.ptt_key).start(commands.clone());
    spawn_signal_listener(commands);

    let sink = Arc::new(ConsoleSink {
        key: config.ptt_key,
        line: &METER_LINE,
    });
    let scheduler = IntervalFrameScheduler::new(config.frame_interval);
    let mut engine =
        PttEngine::new(CpalCaptureBackend::default(), scheduler, config).with_sink(sink);

    if let Ok(channel) = std::env::var("PTT_CONSOLE_JOIN") {
        if !channel.trim().is_empty() {
            engine.open(channel.trim());
        }
    }

    log::info!("ptt console running; type `help` for commands");
    run_loop(&mut engine, &mut store, &command_receiver, listener);

    engine.close();
    log::info!("ptt console stopped");
}

fn run_loop(
    engine: &mut ConsoleEngine,
    store: &mut state::SettingsStore,
    commands: &mpsc::Receiver<HostCommand>,
    listener: KeyListenerHandle,
) {
    let mut listener = Some(listener);
    loop {
        let wait = engine
            .scheduler()
            .next_deadline()
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
            .unwrap_or(IDLE_WAIT)
            .min(IDLE_WAIT);

        match commands.recv_timeout(wait) {
            Ok(HostCommand::Quit) => return,
            Ok(command) => handle_command(engine, store, command),
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => return,
        }

        if listener.as_ref().is_some_and(KeyListenerHandle::is_finished) {
            if let Some(Err(err)) = listener.take().map(KeyListenerHandle::join) {
                log::warn!("keyboard push-to-talk unavailable: {err}");
            }
        }

        engine.poll();
    }
}

fn handle_command(
    engine: &mut ConsoleEngine,
    store: &mut state::SettingsStore,
    command: HostCommand,
) {
    if !matches!(command, HostCommand::Input(_)) {
        logging::end_meter_line();
    }
    match command {
        HostCommand::Join(channel) => engine.open(channel),
        HostCommand::Leave => engine.close(),
        HostCommand::Input(event) => {
            engine.handle_input(event);
        }
        HostCommand::Devices => match engine.backend().list_input_devices() {
            Ok(devices) => {
                for device in devices {
                    println!("{}: {}", device.id, device.name);
                }
            }
            Err(err) => log::warn!("failed to list input devices: {err}"),
        },
        HostCommand::Status => {
            let snapshot = engine.snapshot();
            println!(
                "{} {} gestures: {}",
                status_label(&snapshot, engine.config().ptt_key),
                level_bar(snapshot.audio_level, LEVEL_BAR_WIDTH),
                engine.gestures()
            );
            if let Some(err) = engine.failure() {
                println!("last failure: {err}");
            }
            if snapshot.channel_id.is_some() && snapshot.connection.is_terminal() {
                println!("use `join <channel>` to reopen the microphone");
            }
            match serde_json::to_string(&snapshot) {
                Ok(json) => println!("{json}"),
                Err(err) => log::warn!("failed to encode snapshot: {err}"),
            }
        }
        HostCommand::Logs => {
            for entry in logging::recent_entries(LOG_TAIL) {
                if let Ok(json) = serde_json::to_string(&entry) {
                    println!("{json}");
                }
            }
        }
        HostCommand::Set { field, value } => apply_setting(engine, store, &field, &value),
        HostCommand::Help => print_help(),
        HostCommand::Quit => {}
    }
}

fn apply_setting(
    engine: &mut ConsoleEngine,
    store: &mut state::SettingsStore,
    field: &str,
    value: &str,
) {
    let Some(update) = state::parse_setting(field, value) else {
        log::warn!("unknown setting `{field} {value}`");
        return;
    };

    let candidate = store.settings().apply_update(update.clone());
    let config = match EngineConfig::from_settings(&candidate) {
        Ok(config) => config,
        Err(err) => {
            log::warn!("rejected setting: {err}");
            return;
        }
    };

    if let Err(err) = store.update(update) {
        log::warn!("failed to save settings: {err}");
    }
    let current = engine.config();
    let (ptt_key, frame_interval) = (current.ptt_key, current.frame_interval);
    if config.ptt_key != ptt_key || config.frame_interval != frame_interval {
        log::info!("key and frame interval changes take effect after restart");
    }
    engine.set_config(EngineConfig {
        ptt_key,
        frame_interval,
        ..config
    });
    log::info!("setting saved; applies to the next `join`");
}

fn print_help() {
    println!("join <channel>   open the microphone for a channel");
    println!("leave            close the current channel");
    println!("down | up | out  press, release or leave the talk button");
    println!("devices          list input devices");
    println!("status           show the current snapshot");
    println!("logs             show recent log records");
    println!("set <k> <v>      device, key, gain, fft, interval");
    println!("quit             close and exit");
}

fn spawn_stdin_reader(sender: mpsc::Sender<HostCommand>) {
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else {
                break;
            };
            if line.trim().is_empty() {
                continue;
            }
            match parse_command(&line) {
                Some(command) => {
                    if sender.send(command).is_err() {
                        return;
                    }
                }
                None => log::warn!("unrecognized command: {}", line.trim()),
            }
        }
        let _ = sender.send(HostCommand::Quit);
    });
}

fn spawn_signal_listener(sender: mpsc::Sender<HostCommand>) {
    thread::spawn(move || {
        let mut signals = match Signals::new([SIGINT, SIGTERM]) {
            Ok(signals) => signals,
            Err(err) => {
                log::warn!("failed to register signal handler: {err}");
                return;
            }
        };
        if let Some(signal) = signals.forever().next() {
            log::info!("signal {signal} received, shutting down");
            let _ = sender.send(HostCommand::Quit);
        }
    });
}
