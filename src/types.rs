use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Transition effect applied to property changes
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Effect {
    /// Gradual change over the transition duration
    #[default]
    Smooth,
    /// Immediate change
    Sudden,
}

impl Effect {
    /// Wire string sent in command params
    pub fn as_str(&self) -> &'static str {
        match self {
            Effect::Smooth => "smooth",
            Effect::Sudden => "sudden",
        }
    }
}

/// Mode the bulb switches to when powered on with parameters
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Mode {
    /// Resume whatever mode was active before power-off
    Last = 0,
    Normal = 1,
    Rgb = 2,
    Hsv = 3,
    ColorFlow = 4,
    Moonlight = 5,
}

/// Power state reported in the `power` property
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Power {
    On,
    Off,
}

impl Power {
    pub fn as_str(&self) -> &'static str {
        match self {
            Power::On => "on",
            Power::Off => "off",
        }
    }
}

/// RGB color triple
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Device-native integer encoding (`r * 65536 + g * 256 + b`)
    pub fn to_device_value(self) -> u32 {
        (self.r as u32) << 16 | (self.g as u32) << 8 | self.b as u32
    }
}

/// What the bulb does once a color flow finishes
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FlowAction {
    /// Return to the state before the flow started
    Recover = 0,
    /// Stay at the last flow step
    Stay = 1,
    /// Turn off
    Off = 2,
}

/// Mode of a single flow step
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FlowMode {
    Color = 1,
    Temperature = 2,
    Sleep = 7,
}

/// One step of a color flow
///
/// `value` is an RGB device value in [`FlowMode::Color`], a color
/// temperature in kelvin in [`FlowMode::Temperature`], ignored in
/// [`FlowMode::Sleep`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FlowTransition {
    /// Step duration in milliseconds (the bulb enforces a 50ms minimum)
    pub duration: u32,
    pub mode: FlowMode,
    pub value: u32,
    /// Target brightness 1-100, or -1 to leave brightness unchanged
    pub brightness: i8,
}

impl FlowTransition {
    pub fn new(duration: u32, mode: FlowMode, value: u32, brightness: i8) -> Self {
        Self {
            duration,
            mode,
            value,
            brightness,
        }
    }
}

/// Color flow program for the `start_cf` command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flow {
    /// Number of times to run the transitions; 0 loops forever
    pub count: u32,
    pub action: FlowAction,
    pub transitions: Vec<FlowTransition>,
}

impl Flow {
    pub fn new(count: u32, action: FlowAction, transitions: Vec<FlowTransition>) -> Self {
        Self {
            count,
            action,
            transitions,
        }
    }

    /// Build the `start_cf` params: total state count, end action, and the
    /// flow expression as comma-joined duration,mode,value,brightness tuples
    pub fn as_start_params(&self) -> Vec<Value> {
        let expression = self
            .transitions
            .iter()
            .map(|t| {
                format!(
                    "{},{},{},{}",
                    t.duration, t.mode as u8, t.value, t.brightness
                )
            })
            .collect::<Vec<_>>()
            .join(",");

        // Widen before multiplying; count alone can be u32::MAX.
        let states = self.count as u64 * self.transitions.len() as u64;

        vec![
            Value::from(states),
            Value::from(self.action as u8),
            Value::from(expression),
        ]
    }
}

/// Result of a `get_prop` call, with values keyed by the requested names
#[derive(Debug, Clone)]
pub struct PropsResult {
    pub id: u64,
    pub props: HashMap<String, String>,
}

impl PropsResult {
    /// Look up one property value
    pub fn get(&self, name: &str) -> Option<&str> {
        self.props.get(name).map(String::as_str)
    }
}
