use crate::delta::ConfigDelta;
use common::config::{
  CaptureSource, ConfigField, ConfigUpdate, Configuration, FieldRejection, FRAMERATE_RANGE,
  HEIGHT_RANGE, LENS_POSITION_RANGE, SUPPORTED_ENCODERS, WIDTH_RANGE,
};
use common::validation;
use telemetry::metrics::TX_REJECTED_FIELDS;
use tracing::{debug, warn};

/// Result of merging one update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplyOutcome {
  pub delta: ConfigDelta,
  pub rejections: Vec<FieldRejection>,
}

/// The authoritative desired configuration.
///
/// Not synchronized on its own; the supervisor keeps it under its lock.
#[derive(Debug, Clone, Default)]
pub struct ConfigStore {
  current: Configuration,
}

impl ConfigStore {
  pub fn new(initial: Configuration) -> Self {
    Self { current: initial }
  }

  pub fn read(&self) -> Configuration {
    self.current.clone()
  }

  pub fn apply(&mut self, update: &ConfigUpdate) -> ApplyOutcome {
    let (merged, rejections) = merge(&self.current, update);
    let delta = ConfigDelta::between(&self.current, &merged);
    for rejection in &rejections {
      TX_REJECTED_FIELDS
        .with_label_values(&[rejection.field.as_str()])
        .inc();
      warn!(field = %rejection.field, reason = %rejection.reason, "configuration field rejected");
    }
    if !delta.is_empty() {
      debug!(changed = ?delta.fields().collect::<Vec<_>>(), "configuration merged");
    }
    self.current = merged;
    ApplyOutcome { delta, rejections }
  }
}

/// Validate each present field of `update` and overlay the accepted ones on `base`.
pub fn merge(base: &Configuration, update: &ConfigUpdate) -> (Configuration, Vec<FieldRejection>) {
  let mut next = base.clone();
  let mut rejections = update.type_rejections.clone();
  let mut reject = |field: ConfigField, err: anyhow::Error| {
    rejections.push(FieldRejection::new(field, err.to_string()));
  };

  if let Some(host) = &update.host {
    match validation::validate_host(host) {
      Ok(()) => next.host = host.clone(),
      Err(e) => reject(ConfigField::Host, e),
    }
  }
  if let Some(port) = update.port {
    match validation::validate_port(port) {
      Ok(port) => next.port = port,
      Err(e) => reject(ConfigField::Port, e),
    }
  }
  if let Some(source) = &update.source {
    match source.parse::<CaptureSource>() {
      Ok(source) => next.source = source,
      Err(e) => reject(ConfigField::Source, anyhow::anyhow!(e)),
    }
  }
  if let Some(device) = &update.device {
    match validation::validate_device(device) {
      Ok(()) => next.device = device.trim().to_string(),
      Err(e) => reject(ConfigField::Device, e),
    }
  }
  if let Some(encoder) = &update.encoder {
    match validation::validate_encoder(encoder, SUPPORTED_ENCODERS) {
      Ok(()) => next.encoder = encoder.clone(),
      Err(e) => reject(ConfigField::Encoder, e),
    }
  }
  if let Some(width) = update.width {
    match validation::validate_dimension(width, WIDTH_RANGE.0, WIDTH_RANGE.1, "width") {
      Ok(width) => next.width = width,
      Err(e) => reject(ConfigField::Width, e),
    }
  }
  if let Some(height) = update.height {
    match validation::validate_dimension(height, HEIGHT_RANGE.0, HEIGHT_RANGE.1, "height") {
      Ok(height) => next.height = height,
      Err(e) => reject(ConfigField::Height, e),
    }
  }
  if let Some(framerate) = update.framerate {
    match validation::validate_dimension(framerate, FRAMERATE_RANGE.0, FRAMERATE_RANGE.1, "framerate") {
      Ok(framerate) => next.framerate = framerate,
      Err(e) => reject(ConfigField::Framerate, e),
    }
  }
  if let Some(autofocus) = update.autofocus {
    next.autofocus = autofocus;
  }
  if let Some(lens) = update.lens_position {
    match validation::validate_finite_range(lens, LENS_POSITION_RANGE.0, LENS_POSITION_RANGE.1, "lens_position") {
      Ok(()) => next.lens_position = lens as f32,
      Err(e) => reject(ConfigField::LensPosition, e),
    }
  }

  (next, rejections)
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn update(value: serde_json::Value) -> ConfigUpdate {
    ConfigUpdate::from_value(value).unwrap()
  }

  #[test]
  fn accepted_fields_are_merged_and_reported() {
    let mut store = ConfigStore::default();
    let outcome = store.apply(&update(json!({"width": 1920, "height": 1080})));
    assert!(outcome.rejections.is_empty());
    assert!(outcome.delta.contains(ConfigField::Width));
    assert!(outcome.delta.contains(ConfigField::Height));
    let cfg = store.read();
    assert_eq!((cfg.width, cfg.height), (1920, 1080));
  }

  #[test]
  fn out_of_range_field_keeps_previous_value() {
    let mut store = ConfigStore::default();
    let outcome = store.apply(&update(json!({"framerate": 500, "host": "10.0.0.5"})));
    assert_eq!(outcome.rejections.len(), 1);
    assert_eq!(outcome.rejections[0].field, ConfigField::Framerate);
    assert_eq!(outcome.rejections[0].reason, "framerate must be between 1 and 120, got 500");
    let cfg = store.read();
    assert_eq!(cfg.framerate, 30);
    assert_eq!(cfg.host, "10.0.0.5");
    assert!(outcome.delta.is_sink_only());
  }

  #[test]
  fn unchanged_values_produce_no_delta() {
    let mut store = ConfigStore::default();
    let outcome = store.apply(&update(json!({"host": "127.0.0.1", "port": 5000, "device": ""})));
    assert!(outcome.delta.is_empty());
    assert!(outcome.rejections.is_empty());
  }

  #[test]
  fn type_rejections_are_carried_through() {
    let mut store = ConfigStore::default();
    let outcome = store.apply(&update(json!({"port": "6000", "autofocus": false})));
    assert_eq!(outcome.rejections[0].field, ConfigField::Port);
    assert_eq!(store.read().port, 5000);
    assert!(!store.read().autofocus);
  }

  #[test]
  fn every_bounded_field_is_checked() {
    let base = Configuration::default();
    let (merged, rejections) = merge(
      &base,
      &update(json!({
        "host": "bad host",
        "port": 0,
        "source": "usb",
        "device": "/dev/video0 ! fakesink",
        "encoder": "vp8enc",
        "width": 100,
        "height": 9999,
        "lens_position": 40.0
      })),
    );
    assert_eq!(merged, base);
    let fields: Vec<_> = rejections.iter().map(|r| r.field).collect();
    assert_eq!(
      fields,
      vec![
        ConfigField::Host,
        ConfigField::Port,
        ConfigField::Source,
        ConfigField::Device,
        ConfigField::Encoder,
        ConfigField::Width,
        ConfigField::Height,
        ConfigField::LensPosition,
      ]
    );
  }

  #[test]
  fn source_and_lens_are_converted() {
    let (merged, rejections) = merge(
      &Configuration::default(),
      &update(json!({"source": "v4l2", "camera": "/dev/video1", "lens_position": 2.5})),
    );
    assert!(rejections.is_empty());
    assert_eq!(merged.source, CaptureSource::V4l2);
    assert_eq!(merged.device, "/dev/video1");
    assert_eq!(merged.lens_position, 2.5);
  }
}
