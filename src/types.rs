use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Last known state of a Secomat as reported by the cloud API
///
/// The client enforces no schema: every field of the response is kept
/// verbatim, including ones this crate does not know about.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateSnapshot {
    fields: Map<String, Value>,
}

impl StateSnapshot {
    pub const SERIAL_NUMBER: &'static str = "serial_number";
    pub const AMBIENT_TEMPERATURE: &'static str = "ambient_temperature";
    pub const HUMIDITY: &'static str = "humidity";
    pub const SECOMAT_STATE: &'static str = "secomat_state";
    pub const OPERATING_MODE: &'static str = "operating_mode";
    pub const TARGET_HUMIDITY_LEVEL: &'static str = "target_humidity_level";
    pub const ROOM_DRYING_ENABLED: &'static str = "room_drying_enabled";
    pub const FW_VERSION: &'static str = "fw_version";

    pub fn new(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Get a raw field
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// All fields as received
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn into_fields(self) -> Map<String, Value> {
        self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn code(&self, key: &str) -> Option<i64> {
        self.fields.get(key).and_then(Value::as_i64)
    }

    fn rounded(&self, key: &str) -> Option<f64> {
        self.fields
            .get(key)
            .and_then(Value::as_f64)
            .map(|v| (v * 10.0).round() / 10.0)
    }

    /// Serial number, rendered as a string whatever its JSON type
    pub fn serial_number(&self) -> Option<String> {
        match self.fields.get(Self::SERIAL_NUMBER)? {
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }

    /// Ambient temperature in °C, rounded to one decimal
    pub fn ambient_temperature(&self) -> Option<f64> {
        self.rounded(Self::AMBIENT_TEMPERATURE)
    }

    /// Relative humidity in %, rounded to one decimal
    pub fn humidity(&self) -> Option<f64> {
        self.rounded(Self::HUMIDITY)
    }

    pub fn secomat_state(&self) -> Option<SecomatState> {
        self.code(Self::SECOMAT_STATE).and_then(SecomatState::from_code)
    }

    /// Human label of the device state, `unknown (<code>)` for unmapped codes
    pub fn secomat_state_label(&self) -> String {
        match self.secomat_state() {
            Some(state) => state.label().to_string(),
            None => unknown_label(self.fields.get(Self::SECOMAT_STATE)),
        }
    }

    pub fn operating_mode(&self) -> Option<OperatingMode> {
        self.code(Self::OPERATING_MODE).and_then(OperatingMode::from_code)
    }

    /// Human label of the operating mode, `unknown (<code>)` for unmapped codes
    pub fn operating_mode_label(&self) -> String {
        match self.operating_mode() {
            Some(mode) => mode.label().to_string(),
            None => unknown_label(self.fields.get(Self::OPERATING_MODE)),
        }
    }

    /// Target humidity level; `dry` when absent or unmapped
    pub fn target_humidity_level(&self) -> HumidityLevel {
        self.code(Self::TARGET_HUMIDITY_LEVEL)
            .and_then(HumidityLevel::from_code)
            .unwrap_or(HumidityLevel::Dry)
    }

    pub fn room_drying_enabled(&self) -> bool {
        self.code(Self::ROOM_DRYING_ENABLED) == Some(1)
    }

    /// Whether a laundry drying program is running
    pub fn laundry_drying_active(&self) -> bool {
        let state = self.code(Self::SECOMAT_STATE).unwrap_or(0);
        let mode = self.code(Self::OPERATING_MODE).unwrap_or(0);
        state > 0 && matches!(mode, 1 | 2)
    }

    pub fn fw_version(&self) -> Option<&str> {
        self.fields.get(Self::FW_VERSION).and_then(Value::as_str)
    }
}

impl From<Map<String, Value>> for StateSnapshot {
    fn from(fields: Map<String, Value>) -> Self {
        Self::new(fields)
    }
}

fn unknown_label(raw: Option<&Value>) -> String {
    match raw {
        Some(Value::Null) | None => "unknown (None)".to_string(),
        Some(value) => format!("unknown ({})", value),
    }
}

/// Device state codes reported in `secomat_state`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SecomatState {
    Off,
    Standby,
    Running,
    Drying,
    Cooling,
    Pause,
    Ready,
}

impl SecomatState {
    pub fn from_code(code: i64) -> Option<Self> {
        Some(match code {
            0 => Self::Off,
            1 => Self::Standby,
            2 => Self::Running,
            3 => Self::Drying,
            4 => Self::Cooling,
            5 => Self::Pause,
            6 => Self::Ready,
            _ => return None,
        })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Standby => "standby",
            Self::Running => "running",
            Self::Drying => "drying",
            Self::Cooling => "cooling",
            Self::Pause => "pause",
            Self::Ready => "ready",
        }
    }
}

/// Operating mode codes reported in `operating_mode`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperatingMode {
    Off,
    LaundryDrying,
    RoomDrying,
    Ventilation,
}

impl OperatingMode {
    pub fn from_code(code: i64) -> Option<Self> {
        Some(match code {
            0 => Self::Off,
            1 => Self::LaundryDrying,
            2 => Self::RoomDrying,
            3 => Self::Ventilation,
            _ => return None,
        })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::LaundryDrying => "laundry_drying",
            Self::RoomDrying => "room_drying",
            Self::Ventilation => "ventilation",
        }
    }
}

/// Target humidity level, the `level` argument of `SET_TARGET_HUMIDITY`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HumidityLevel {
    Wet,
    Dry,
    ExtraDry,
}

impl HumidityLevel {
    /// All levels in code order, as offered by a select control
    pub const ALL: [HumidityLevel; 3] = [Self::Wet, Self::Dry, Self::ExtraDry];

    pub fn from_code(code: i64) -> Option<Self> {
        Some(match code {
            0 => Self::Wet,
            1 => Self::Dry,
            2 => Self::ExtraDry,
            _ => return None,
        })
    }

    pub fn code(&self) -> u8 {
        match self {
            Self::Wet => 0,
            Self::Dry => 1,
            Self::ExtraDry => 2,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Wet => "wet",
            Self::Dry => "dry",
            Self::ExtraDry => "extra_dry",
        }
    }
}

impl fmt::Display for HumidityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for HumidityLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|level| level.label() == s)
            .ok_or_else(|| format!("unknown humidity level: {}", s))
    }
}

/// Device registry information derived from a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub serial_number: String,
    pub name: String,
    pub manufacturer: String,
    pub model: String,
    #[serde(default)]
    pub sw_version: Option<String>,
}

impl DeviceInfo {
    pub fn from_snapshot(snapshot: &StateSnapshot) -> Self {
        let serial_number = snapshot
            .serial_number()
            .unwrap_or_else(|| "unknown".to_string());

        Self {
            name: format!("Secomat {}", serial_number),
            serial_number,
            manufacturer: "Krüger".to_string(),
            model: "Secomat".to_string(),
            sw_version: snapshot.fw_version().map(str::to_string),
        }
    }
}
