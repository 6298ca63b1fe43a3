//! H.264 encoder selection.
//!
//! Boards differ in which hardware encoder they expose, so a build walks an
//! ordered candidate list until one encoder links and starts.

/// Tried, in order, after the requested encoder.
pub const FALLBACK_ENCODERS: [&str; 5] = [
  "v4l2h264enc",
  "omxh264enc",
  "x264enc",
  "nvh264enc",
  "vaapih264enc",
];

/// Requested encoder first, then the fallbacks, without duplicates.
pub fn candidates(requested: &str) -> Vec<String> {
  let mut out: Vec<String> = Vec::with_capacity(FALLBACK_ENCODERS.len() + 1);
  for name in std::iter::once(requested).chain(FALLBACK_ENCODERS) {
    let name = name.trim();
    if !name.is_empty() && !out.iter().any(|n| n == name) {
      out.push(name.to_string());
    }
  }
  out
}

/// Low-latency property settings for a given encoder element, as
/// `(property, value)` strings.
pub fn tuning(encoder: &str) -> &'static [(&'static str, &'static str)] {
  match encoder {
    "x264enc" => &[
      ("tune", "zerolatency"),
      ("speed-preset", "superfast"),
      ("bitrate", "2048"),
      ("threads", "1"),
      ("key-int-max", "30"),
    ],
    "v4l2h264enc" => &[("extra-controls", "controls,repeat_sequence_header=1")],
    "omxh264enc" => &[("target-bitrate", "2048000"), ("control-rate", "variable")],
    "nvh264enc" => &[("bitrate", "2048"), ("gop-size", "30"), ("preset", "low-latency")],
    "vaapih264enc" => &[("bitrate", "2048"), ("keyframe-period", "30")],
    _ => &[],
  }
}

/// Whether an element path names an encoder, used to hint at switching encoders.
pub fn is_encoder_element(element: &str) -> bool {
  let name = element.rsplit('/').next().unwrap_or(element);
  name.contains("enc") || FALLBACK_ENCODERS.contains(&name)
}
