use common::config::{ConfigField, Configuration};
use std::collections::BTreeSet;

/// How a changed field reaches the running pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
  /// Property update on the live sink element
  SinkPatch,
  /// Teardown and rebuild
  Rebuild,
}

pub fn classify(field: ConfigField) -> ChangeKind {
  match field {
    ConfigField::Host | ConfigField::Port => ChangeKind::SinkPatch,
    ConfigField::Source
    | ConfigField::Device
    | ConfigField::Encoder
    | ConfigField::Width
    | ConfigField::Height
    | ConfigField::Framerate
    | ConfigField::Autofocus
    | ConfigField::LensPosition => ChangeKind::Rebuild,
  }
}

/// Fields whose value differs between two configuration snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigDelta {
  changed: BTreeSet<ConfigField>,
}

impl ConfigDelta {
  pub fn between(old: &Configuration, new: &Configuration) -> Self {
    let changed = ConfigField::ALL
      .into_iter()
      .filter(|field| field_differs(old, new, *field))
      .collect();
    Self { changed }
  }

  pub fn is_empty(&self) -> bool {
    self.changed.is_empty()
  }

  pub fn contains(&self, field: ConfigField) -> bool {
    self.changed.contains(&field)
  }

  pub fn fields(&self) -> impl Iterator<Item = ConfigField> + '_ {
    self.changed.iter().copied()
  }

  /// Non-empty and every change can be patched on the live sink.
  pub fn is_sink_only(&self) -> bool {
    !self.is_empty() && self.changed.iter().all(|f| classify(*f) == ChangeKind::SinkPatch)
  }

  pub fn requires_rebuild(&self) -> bool {
    self.changed.iter().any(|f| classify(*f) == ChangeKind::Rebuild)
  }
}

fn field_differs(old: &Configuration, new: &Configuration, field: ConfigField) -> bool {
  match field {
    ConfigField::Host => old.host != new.host,
    ConfigField::Port => old.port != new.port,
    ConfigField::Source => old.source != new.source,
    ConfigField::Device => old.device != new.device,
    ConfigField::Encoder => old.encoder != new.encoder,
    ConfigField::Width => old.width != new.width,
    ConfigField::Height => old.height != new.height,
    ConfigField::Framerate => old.framerate != new.framerate,
    ConfigField::Autofocus => old.autofocus != new.autofocus,
    ConfigField::LensPosition => old.lens_position.to_bits() != new.lens_position.to_bits(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn identical_snapshots_produce_empty_delta() {
    let cfg = Configuration::default();
    let delta = ConfigDelta::between(&cfg, &cfg.clone());
    assert!(delta.is_empty());
    assert!(!delta.is_sink_only());
    assert!(!delta.requires_rebuild());
  }

  #[test]
  fn host_and_port_are_sink_only() {
    let old = Configuration::default();
    let new = Configuration {
      host: "10.0.0.5".into(),
      port: 6000,
      ..old.clone()
    };
    let delta = ConfigDelta::between(&old, &new);
    assert_eq!(delta.fields().collect::<Vec<_>>(), vec![ConfigField::Host, ConfigField::Port]);
    assert!(delta.is_sink_only());
  }

  #[test]
  fn any_structural_field_forces_rebuild() {
    let old = Configuration::default();
    let new = Configuration {
      host: "10.0.0.5".into(),
      device: "/dev/video2".into(),
      ..old.clone()
    };
    let delta = ConfigDelta::between(&old, &new);
    assert!(delta.contains(ConfigField::Device));
    assert!(!delta.is_sink_only());
    assert!(delta.requires_rebuild());
  }

  #[test]
  fn every_field_has_a_classification() {
    let rebuilds = ConfigField::ALL
      .into_iter()
      .filter(|f| classify(*f) == ChangeKind::Rebuild)
      .count();
    assert_eq!(rebuilds, 8);
  }
}
