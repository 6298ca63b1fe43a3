use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_ENCODER: &str = "v4l2h264enc";
pub const DEFAULT_WIDTH: u32 = 1280;
pub const DEFAULT_HEIGHT: u32 = 720;
pub const DEFAULT_FRAMERATE: u32 = 30;

pub const WIDTH_RANGE: (u32, u32) = (320, 4608);
pub const HEIGHT_RANGE: (u32, u32) = (240, 2592);
pub const FRAMERATE_RANGE: (u32, u32) = (1, 120);
pub const LENS_POSITION_RANGE: (f64, f64) = (0.0, 32.0);

/// H.264 encoder elements the transmitter knows how to drive.
pub const SUPPORTED_ENCODERS: &[&str] = &[
  "v4l2h264enc",
  "omxh264enc",
  "x264enc",
  "nvh264enc",
  "vaapih264enc",
  "qsvh264enc",
  "vtenc_h264",
  "mfh264enc",
];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CaptureSource {
  /// libcamera stack, device field names a camera id
  #[default]
  Libcamera,
  /// V4L2 node, device field is a path such as /dev/video0
  V4l2,
}

impl CaptureSource {
  pub fn as_str(&self) -> &'static str {
    match self {
      CaptureSource::Libcamera => "libcamera",
      CaptureSource::V4l2 => "v4l2",
    }
  }
}

impl fmt::Display for CaptureSource {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for CaptureSource {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "libcamera" | "camera" => Ok(CaptureSource::Libcamera),
      "v4l2" | "device" => Ok(CaptureSource::V4l2),
      other => Err(format!("unknown capture source '{other}' (expected libcamera or v4l2)")),
    }
  }
}

/// Desired pipeline configuration. Always handed out as a full snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Configuration {
  pub host: String,
  pub port: u16,
  pub source: CaptureSource,
  pub device: String,
  pub encoder: String,
  pub width: u32,
  pub height: u32,
  pub framerate: u32,
  pub autofocus: bool,
  pub lens_position: f32,
}

impl Default for Configuration {
  fn default() -> Self {
    Self {
      host: DEFAULT_HOST.to_string(),
      port: DEFAULT_PORT,
      source: CaptureSource::default(),
      device: String::new(),
      encoder: DEFAULT_ENCODER.to_string(),
      width: DEFAULT_WIDTH,
      height: DEFAULT_HEIGHT,
      framerate: DEFAULT_FRAMERATE,
      autofocus: true,
      lens_position: 0.0,
    }
  }
}

impl Configuration {
  /// Device to open, `None` when the backend should auto-detect.
  pub fn device_hint(&self) -> Option<&str> {
    let device = self.device.trim();
    if device.is_empty() || device.eq_ignore_ascii_case("auto-detect") {
      None
    } else {
      Some(device)
    }
  }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ConfigField {
  Host,
  Port,
  Source,
  Device,
  Encoder,
  Width,
  Height,
  Framerate,
  Autofocus,
  LensPosition,
}

impl ConfigField {
  pub const ALL: [ConfigField; 10] = [
    ConfigField::Host,
    ConfigField::Port,
    ConfigField::Source,
    ConfigField::Device,
    ConfigField::Encoder,
    ConfigField::Width,
    ConfigField::Height,
    ConfigField::Framerate,
    ConfigField::Autofocus,
    ConfigField::LensPosition,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      ConfigField::Host => "host",
      ConfigField::Port => "port",
      ConfigField::Source => "source",
      ConfigField::Device => "device",
      ConfigField::Encoder => "encoder",
      ConfigField::Width => "width",
      ConfigField::Height => "height",
      ConfigField::Framerate => "framerate",
      ConfigField::Autofocus => "autofocus",
      ConfigField::LensPosition => "lens_position",
    }
  }
}

impl fmt::Display for ConfigField {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A field of an update that was not merged, and why.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldRejection {
  pub field: ConfigField,
  pub reason: String,
}

impl FieldRejection {
  pub fn new(field: ConfigField, reason: impl Into<String>) -> Self {
    Self {
      field,
      reason: reason.into(),
    }
  }
}

#[derive(Debug, Error)]
pub enum UpdateParseError {
  #[error("body is not valid JSON: {0}")]
  Malformed(#[from] serde_json::Error),
  #[error("body must be a JSON object")]
  NotAnObject,
}

/// Partial configuration document as received on the wire.
///
/// Fields carry JSON-typed values; bounds are checked when the update is
/// applied. Values of the wrong JSON type are recorded in `type_rejections`
/// and otherwise dropped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigUpdate {
  pub host: Option<String>,
  pub port: Option<i64>,
  pub source: Option<String>,
  pub device: Option<String>,
  pub encoder: Option<String>,
  pub width: Option<i64>,
  pub height: Option<i64>,
  pub framerate: Option<i64>,
  pub autofocus: Option<bool>,
  pub lens_position: Option<f64>,
  pub type_rejections: Vec<FieldRejection>,
}

impl ConfigUpdate {
  pub fn from_json(body: &[u8]) -> Result<Self, UpdateParseError> {
    let value: Value = serde_json::from_slice(body)?;
    Self::from_value(value)
  }

  pub fn from_value(value: Value) -> Result<Self, UpdateParseError> {
    match value {
      Value::Object(map) => Ok(Self::from_map(&map)),
      _ => Err(UpdateParseError::NotAnObject),
    }
  }

  fn from_map(map: &Map<String, Value>) -> Self {
    let mut update = ConfigUpdate::default();

    update.host = update.take_string(map, "host", ConfigField::Host);
    update.port = update.take_integer(map, "port", ConfigField::Port);
    update.source = update.take_string(map, "source", ConfigField::Source);
    // older clients address the camera by name under "camera"
    update.device = update
      .take_string(map, "device", ConfigField::Device)
      .or_else(|| update.take_string(map, "camera", ConfigField::Device));
    update.encoder = update.take_string(map, "encoder", ConfigField::Encoder);
    update.width = update.take_integer(map, "width", ConfigField::Width);
    update.height = update.take_integer(map, "height", ConfigField::Height);
    update.framerate = update.take_integer(map, "framerate", ConfigField::Framerate);
    update.autofocus = match map.get("autofocus") {
      None => None,
      Some(Value::Bool(b)) => Some(*b),
      Some(other) => {
        update.reject_type(ConfigField::Autofocus, "boolean", other);
        None
      }
    };
    update.lens_position = match map.get("lens_position") {
      None => None,
      Some(Value::Number(n)) => n.as_f64(),
      Some(other) => {
        update.reject_type(ConfigField::LensPosition, "number", other);
        None
      }
    };

    update
  }

  fn take_string(&mut self, map: &Map<String, Value>, key: &str, field: ConfigField) -> Option<String> {
    match map.get(key) {
      None => None,
      Some(Value::String(s)) => Some(s.clone()),
      Some(other) => {
        self.reject_type(field, "string", other);
        None
      }
    }
  }

  fn take_integer(&mut self, map: &Map<String, Value>, key: &str, field: ConfigField) -> Option<i64> {
    match map.get(key) {
      None => None,
      Some(Value::Number(n)) => match n.as_i64() {
        Some(v) => Some(v),
        None => {
          self.reject_type(field, "integer", &Value::Number(n.clone()));
          None
        }
      },
      Some(other) => {
        self.reject_type(field, "integer", other);
        None
      }
    }
  }

  fn reject_type(&mut self, field: ConfigField, expected: &str, got: &Value) {
    let kind = match got {
      Value::Null => "null",
      Value::Bool(_) => "boolean",
      Value::Number(_) => "number",
      Value::String(_) => "string",
      Value::Array(_) => "array",
      Value::Object(_) => "object",
    };
    self
      .type_rejections
      .push(FieldRejection::new(field, format!("expected {expected}, got {kind}")));
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn default_configuration_matches_device_defaults() {
    let cfg = Configuration::default();
    assert_eq!(cfg.host, "127.0.0.1");
    assert_eq!(cfg.port, 5000);
    assert_eq!(cfg.encoder, "v4l2h264enc");
    assert_eq!((cfg.width, cfg.height, cfg.framerate), (1280, 720, 30));
    assert_eq!(cfg.device_hint(), None);
  }

  #[test]
  fn configuration_serializes_with_snake_case_source() {
    let cfg = Configuration {
      source: CaptureSource::V4l2,
      device: "/dev/video2".into(),
      ..Configuration::default()
    };
    let value = serde_json::to_value(&cfg).unwrap();
    assert_eq!(value["source"], "v4l2");
    assert_eq!(value["device"], "/dev/video2");
    assert_eq!(value["lens_position"], 0.0);
  }

  #[test]
  fn update_collects_present_fields_only() {
    let update = ConfigUpdate::from_json(br#"{"host":"10.0.0.5","width":1920}"#).unwrap();
    assert_eq!(update.host.as_deref(), Some("10.0.0.5"));
    assert_eq!(update.width, Some(1920));
    assert!(update.port.is_none());
    assert!(update.type_rejections.is_empty());
  }

  #[test]
  fn update_accepts_camera_alias_for_device() {
    let update = ConfigUpdate::from_value(json!({"camera": "imx708"})).unwrap();
    assert_eq!(update.device.as_deref(), Some("imx708"));
  }

  #[test]
  fn wrong_types_become_rejections() {
    let update = ConfigUpdate::from_value(json!({
      "port": "5000",
      "framerate": 29.97,
      "autofocus": "yes",
      "host": "10.0.0.9"
    }))
    .unwrap();
    assert_eq!(update.host.as_deref(), Some("10.0.0.9"));
    assert!(update.port.is_none());
    let fields: Vec<_> = update.type_rejections.iter().map(|r| r.field).collect();
    assert_eq!(
      fields,
      vec![ConfigField::Port, ConfigField::Framerate, ConfigField::Autofocus]
    );
    assert_eq!(update.type_rejections[0].reason, "expected integer, got string");
  }

  #[test]
  fn malformed_and_non_object_bodies_fail() {
    assert!(matches!(
      ConfigUpdate::from_json(b"{not json"),
      Err(UpdateParseError::Malformed(_))
    ));
    assert!(matches!(
      ConfigUpdate::from_json(b"[1,2,3]"),
      Err(UpdateParseError::NotAnObject)
    ));
  }

  #[test]
  fn capture_source_parses_aliases() {
    assert_eq!("V4L2".parse::<CaptureSource>().unwrap(), CaptureSource::V4l2);
    assert_eq!("camera".parse::<CaptureSource>().unwrap(), CaptureSource::Libcamera);
    assert!("usb".parse::<CaptureSource>().is_err());
  }
}
