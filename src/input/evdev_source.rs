//! evdev-based input source
//!
//! Reads the rotary encoder (relative axis from the `rotary-encoder`
//! overlay) and the two buttons (key codes from `gpio-keys`). Devices are
//! polled in non-blocking mode on a blocking task; decoded events are
//! posted straight onto the coordinator queue.
//!
//! The user must be in the 'input' group to access /dev/input/* devices.

use super::{InputDecoder, InputSource, RawInput};
use crate::config::InputConfig;
use crate::error::InputError;
use crate::event::EventSender;
use evdev::{Device, InputEventKind, Key, RelativeAxisType};
use std::os::unix::io::AsRawFd;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// The evdev codes the controls are mapped to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bindings {
    pub encoder_axis: RelativeAxisType,
    pub encoder_left: Option<Key>,
    pub encoder_right: Option<Key>,
    pub encoder_button: Key,
    pub record_button: Key,
}

impl Bindings {
    pub fn from_config(config: &InputConfig) -> Result<Self, InputError> {
        Ok(Self {
            encoder_axis: parse_axis_name(&config.encoder_axis)?,
            encoder_left: config
                .encoder_left_key
                .as_deref()
                .map(parse_key_name)
                .transpose()?,
            encoder_right: config
                .encoder_right_key
                .as_deref()
                .map(parse_key_name)
                .transpose()?,
            encoder_button: parse_key_name(&config.encoder_button_key)?,
            record_button: parse_key_name(&config.record_button_key)?,
        })
    }

    /// Translate one evdev event into a raw edge, if it is one of ours
    fn translate(&self, kind: InputEventKind, value: i32) -> Option<RawInput> {
        match kind {
            InputEventKind::RelAxis(axis) if axis == self.encoder_axis && value != 0 => {
                Some(RawInput::Rotate(value))
            }
            InputEventKind::Key(key) => {
                // 2 is autorepeat
                if value == 2 {
                    return None;
                }
                let down = value == 1;
                if Some(key) == self.encoder_left {
                    down.then_some(RawInput::Rotate(-1))
                } else if Some(key) == self.encoder_right {
                    down.then_some(RawInput::Rotate(1))
                } else if key == self.encoder_button {
                    Some(RawInput::EncoderButton(down))
                } else if key == self.record_button {
                    Some(RawInput::RecordButton(down))
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    fn device_matches(&self, device: &Device) -> bool {
        let has_axis = device
            .supported_relative_axes()
            .map(|axes| axes.contains(self.encoder_axis))
            .unwrap_or(false);
        let has_buttons = device
            .supported_keys()
            .map(|keys| keys.contains(self.encoder_button) || keys.contains(self.record_button))
            .unwrap_or(false);
        has_axis || has_buttons
    }
}

/// Input source reading the encoder and buttons through evdev
pub struct EvdevSource {
    bindings: Bindings,
    config: InputConfig,
    device_paths: Vec<PathBuf>,
    stop_signal: Option<oneshot::Sender<()>>,
    started: bool,
}

impl EvdevSource {
    pub fn new(config: &InputConfig) -> Result<Self, InputError> {
        let bindings = Bindings::from_config(config)?;

        let device_paths = if config.device == "auto" {
            find_input_devices(&bindings)?
        } else {
            vec![PathBuf::from(&config.device)]
        };

        if device_paths.is_empty() {
            return Err(InputError::NoDevice);
        }

        tracing::debug!(
            "Found {} input device(s): {:?}",
            device_paths.len(),
            device_paths
        );

        Ok(Self {
            bindings,
            config: config.clone(),
            device_paths,
            stop_signal: None,
            started: false,
        })
    }
}

#[async_trait::async_trait]
impl InputSource for EvdevSource {
    async fn start(&mut self, events: EventSender) -> Result<(), InputError> {
        if self.started {
            return Err(InputError::AlreadyStarted);
        }
        self.started = true;

        let (stop_tx, stop_rx) = oneshot::channel();
        self.stop_signal = Some(stop_tx);

        let bindings = self.bindings;
        let decoder = InputDecoder::from_config(&self.config);
        let device_paths = self.device_paths.clone();

        tokio::task::spawn_blocking(move || {
            input_loop(device_paths, bindings, decoder, events, stop_rx);
        });

        Ok(())
    }

    async fn stop(&mut self) {
        if let Some(stop) = self.stop_signal.take() {
            let _ = stop.send(());
        }
    }
}

/// Polling loop running in a blocking task
fn input_loop(
    device_paths: Vec<PathBuf>,
    bindings: Bindings,
    mut decoder: InputDecoder,
    events: EventSender,
    mut stop_rx: oneshot::Receiver<()>,
) {
    let mut devices: Vec<Device> = device_paths
        .iter()
        .filter_map(|path| match Device::open(path) {
            Ok(device) => {
                // fetch_events must not block the loop
                let fd = device.as_raw_fd();
                unsafe {
                    let flags = libc::fcntl(fd, libc::F_GETFL);
                    if flags != -1 {
                        libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK);
                    }
                }
                tracing::debug!("Opened input device (non-blocking): {:?}", path);
                Some(device)
            }
            Err(e) => {
                tracing::warn!("Failed to open {:?}: {}", path, e);
                None
            }
        })
        .collect();

    if devices.is_empty() {
        tracing::error!("No input devices could be opened");
        return;
    }

    tracing::info!(
        "Listening for encoder {:?}, buttons {:?}/{:?}",
        bindings.encoder_axis,
        bindings.encoder_button,
        bindings.record_button
    );

    loop {
        match stop_rx.try_recv() {
            Ok(_) | Err(oneshot::error::TryRecvError::Closed) => {
                tracing::debug!("Input source stopping");
                return;
            }
            Err(oneshot::error::TryRecvError::Empty) => {}
        }

        let mut raw = Vec::new();
        for device in &mut devices {
            if let Ok(batch) = device.fetch_events() {
                raw.extend(
                    batch.filter_map(|event| bindings.translate(event.kind(), event.value())),
                );
            }
        }

        let now = Instant::now();
        let mut decoded = Vec::new();
        for edge in raw {
            decoded.extend(decoder.feed(edge, now));
        }
        decoded.extend(decoder.poll(now));

        for kind in decoded {
            tracing::debug!("Input: {}", kind);
            if !events.blocking_post(kind) {
                return; // Coordinator gone
            }
        }

        std::thread::sleep(POLL_INTERVAL);
    }
}

/// Find input devices exposing the configured encoder axis or button keys
fn find_input_devices(bindings: &Bindings) -> Result<Vec<PathBuf>, InputError> {
    let mut found = Vec::new();

    let input_dir = std::fs::read_dir("/dev/input")
        .map_err(|e| InputError::DeviceAccess(format!("/dev/input: {}", e)))?;

    for entry in input_dir {
        let entry = entry.map_err(|e| InputError::DeviceAccess(e.to_string()))?;
        let path = entry.path();

        let is_event_device = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with("event"))
            .unwrap_or(false);

        if !is_event_device {
            continue;
        }

        match Device::open(&path) {
            Ok(device) => {
                if bindings.device_matches(&device) {
                    tracing::debug!(
                        "Found input device: {:?} ({:?})",
                        path,
                        device.name().unwrap_or("unknown")
                    );
                    found.push(path);
                }
            }
            Err(e) => {
                if e.kind() == std::io::ErrorKind::PermissionDenied {
                    return Err(InputError::DeviceAccess(path.display().to_string()));
                }
                tracing::trace!("Skipping {:?}: {}", path, e);
            }
        }
    }

    Ok(found)
}

/// Normalise a code name: uppercase, `-`/space to `_`, add `prefix` if missing
fn normalise(name: &str, prefix: &str) -> String {
    let normalized: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '-' | ' ' => '_',
            c => c.to_ascii_uppercase(),
        })
        .collect();
    if normalized.starts_with(prefix) || normalized.starts_with("BTN_") {
        normalized
    } else {
        format!("{}{}", prefix, normalized)
    }
}

/// Parse a relative axis name (`REL_X`, `dial`, `wheel`)
pub fn parse_axis_name(name: &str) -> Result<RelativeAxisType, InputError> {
    let axis = match normalise(name, "REL_").as_str() {
        "REL_X" => RelativeAxisType::REL_X,
        "REL_Y" => RelativeAxisType::REL_Y,
        "REL_Z" => RelativeAxisType::REL_Z,
        "REL_DIAL" => RelativeAxisType::REL_DIAL,
        "REL_WHEEL" => RelativeAxisType::REL_WHEEL,
        "REL_HWHEEL" => RelativeAxisType::REL_HWHEEL,
        "REL_MISC" => RelativeAxisType::REL_MISC,
        _ => {
            return Err(InputError::UnknownCode(format!(
                "{}. Try: REL_X, REL_Y, REL_DIAL, REL_WHEEL",
                name
            )))
        }
    };
    Ok(axis)
}

/// Parse a key or button name (`ENTER`, `KEY_SPACE`, `BTN_0`)
pub fn parse_key_name(name: &str) -> Result<Key, InputError> {
    let key = match normalise(name, "KEY_").as_str() {
        // gpio-keys overlays commonly use these
        "KEY_ENTER" => Key::KEY_ENTER,
        "KEY_SPACE" => Key::KEY_SPACE,
        "KEY_SELECT" => Key::KEY_SELECT,
        "KEY_OK" => Key::KEY_OK,
        "KEY_RECORD" => Key::KEY_RECORD,
        "KEY_PLAYPAUSE" => Key::KEY_PLAYPAUSE,
        "KEY_POWER" => Key::KEY_POWER,
        "BTN_0" => Key::BTN_0,
        "BTN_1" => Key::BTN_1,
        "BTN_2" => Key::BTN_2,
        "BTN_3" => Key::BTN_3,
        "BTN_LEFT" => Key::BTN_LEFT,
        "BTN_RIGHT" => Key::BTN_RIGHT,

        // Arrow keys (development keyboard standing in for the encoder)
        "KEY_LEFT" => Key::KEY_LEFT,
        "KEY_RIGHT" => Key::KEY_RIGHT,
        "KEY_UP" => Key::KEY_UP,
        "KEY_DOWN" => Key::KEY_DOWN,

        "KEY_VOLUMEDOWN" => Key::KEY_VOLUMEDOWN,
        "KEY_VOLUMEUP" => Key::KEY_VOLUMEUP,
        "KEY_NEXTSONG" => Key::KEY_NEXTSONG,
        "KEY_PREVIOUSSONG" => Key::KEY_PREVIOUSSONG,

        "KEY_F1" => Key::KEY_F1,
        "KEY_F2" => Key::KEY_F2,
        "KEY_F3" => Key::KEY_F3,
        "KEY_F4" => Key::KEY_F4,
        "KEY_F13" => Key::KEY_F13,
        "KEY_F14" => Key::KEY_F14,
        "KEY_F15" => Key::KEY_F15,
        "KEY_F16" => Key::KEY_F16,

        "KEY_A" => Key::KEY_A,
        "KEY_R" => Key::KEY_R,
        "KEY_TAB" => Key::KEY_TAB,
        "KEY_ESC" | "KEY_ESCAPE" => Key::KEY_ESC,

        _ => {
            return Err(InputError::UnknownCode(format!(
                "{}. Try: ENTER, SPACE, BTN_0..BTN_3, or run 'evtest' to find key names",
                name
            )));
        }
    };

    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bindings() -> Bindings {
        Bindings::from_config(&InputConfig::default()).unwrap()
    }

    #[test]
    fn test_parse_key_name() {
        assert_eq!(parse_key_name("ENTER").unwrap(), Key::KEY_ENTER);
        assert_eq!(parse_key_name("key_space").unwrap(), Key::KEY_SPACE);
        assert_eq!(parse_key_name("BTN_0").unwrap(), Key::BTN_0);
        assert_eq!(parse_key_name("Escape").unwrap(), Key::KEY_ESC);
        assert!(parse_key_name("NOT_A_KEY").is_err());
    }

    #[test]
    fn test_parse_axis_name() {
        assert_eq!(parse_axis_name("REL_X").unwrap(), RelativeAxisType::REL_X);
        assert_eq!(parse_axis_name("dial").unwrap(), RelativeAxisType::REL_DIAL);
        assert!(parse_axis_name("ABS_X").is_err());
    }

    #[test]
    fn test_default_bindings() {
        let b = bindings();
        assert_eq!(b.encoder_axis, RelativeAxisType::REL_X);
        assert_eq!(b.encoder_left, Some(Key::KEY_LEFT));
        assert_eq!(b.record_button, Key::KEY_SPACE);
    }

    #[test]
    fn test_translate_events() {
        let b = bindings();
        assert_eq!(
            b.translate(InputEventKind::RelAxis(RelativeAxisType::REL_X), -1),
            Some(RawInput::Rotate(-1))
        );
        assert_eq!(
            b.translate(InputEventKind::RelAxis(RelativeAxisType::REL_Y), 1),
            None
        );
        assert_eq!(
            b.translate(InputEventKind::Key(Key::KEY_SPACE), 1),
            Some(RawInput::RecordButton(true))
        );
        assert_eq!(
            b.translate(InputEventKind::Key(Key::KEY_SPACE), 2),
            None
        );
        assert_eq!(
            b.translate(InputEventKind::Key(Key::KEY_ENTER), 0),
            Some(RawInput::EncoderButton(false))
        );
        assert_eq!(
            b.translate(InputEventKind::Key(Key::KEY_RIGHT), 1),
            Some(RawInput::Rotate(1))
        );
        assert_eq!(b.translate(InputEventKind::Key(Key::KEY_RIGHT), 0), None);
    }
}
