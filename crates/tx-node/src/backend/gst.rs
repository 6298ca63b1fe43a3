//! GStreamer backend.
//!
//! Graph: source → capsfilter(raw) → videoconvert → encoder →
//! capsfilter(h264) → h264parse → rtph264pay → udpsink.

use super::{
    EventKind, EventStream, FrameProbe, HandleId, PipelineBackend, PipelineEvent, PipelineHandle,
    StopOutcome,
};
use crate::encoders;
use crate::error::BackendError;
use common::config::{CaptureSource, Configuration};
use common::status::{DeviceInfo, VideoMode};
use gstreamer as gst;
use gstreamer::glib;
use gstreamer::prelude::*;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const PIPELINE_NAME: &str = "camera-tx";
const SINK_NAME: &str = "sink";
const BUS_POLL_MS: u64 = 100;
const RTP_PAYLOAD_TYPE: u32 = 96;

pub struct GstBackend;

impl GstBackend {
    pub fn new() -> Result<Self, BackendError> {
        gst::init().map_err(|e| BackendError::Other(format!("gstreamer init failed: {e}")))?;
        info!(version = %gst::version_string(), "gstreamer initialized");
        Ok(Self)
    }
}

fn make(factory: &str, name: &str) -> Result<gst::Element, BackendError> {
    gst::ElementFactory::make(factory)
        .name(name)
        .build()
        .map_err(|_| BackendError::ElementMissing(factory.to_string()))
}

/// Set a property from its string form when the element has it.
fn set_from_str(element: &gst::Element, property: &str, value: &str) -> bool {
    let Some(pspec) = element.find_property(property) else {
        return false;
    };
    match glib::Value::deserialize(value, pspec.value_type()) {
        Ok(v) => {
            element.set_property_from_value(property, &v);
            true
        }
        Err(e) => {
            warn!(element = %element.name(), property, value, error = %e, "property value rejected");
            false
        }
    }
}

fn source_element(cfg: &Configuration) -> Result<gst::Element, BackendError> {
    match cfg.source {
        CaptureSource::Libcamera => {
            let src = make("libcamerasrc", "source")?;
            if let Some(camera) = cfg.device_hint() {
                set_from_str(&src, "camera-name", camera);
            }
            set_from_str(&src, "af-mode", if cfg.autofocus { "continuous" } else { "manual" });
            if !cfg.autofocus {
                set_from_str(&src, "lens-position", &cfg.lens_position.to_string());
            }
            Ok(src)
        }
        CaptureSource::V4l2 => {
            let src = make("v4l2src", "source")?;
            if let Some(device) = cfg.device_hint() {
                set_from_str(&src, "device", device);
            }
            Ok(src)
        }
    }
}

fn capsfilter(name: &str, caps: &gst::Caps) -> Result<gst::Element, BackendError> {
    gst::ElementFactory::make("capsfilter")
        .name(name)
        .property("caps", caps)
        .build()
        .map_err(|_| BackendError::ElementMissing("capsfilter".to_string()))
}

impl PipelineBackend for GstBackend {
    fn name(&self) -> &'static str {
        "gstreamer"
    }

    fn build(&self, cfg: &Configuration, encoder: &str) -> Result<Box<dyn PipelineHandle>, BackendError> {
        let pipeline = gst::Pipeline::with_name(PIPELINE_NAME);

        let source = source_element(cfg)?;
        let raw_caps = gst::Caps::builder("video/x-raw")
            .field("width", cfg.width as i32)
            .field("height", cfg.height as i32)
            .field("framerate", gst::Fraction::new(cfg.framerate as i32, 1))
            .build();
        let raw_filter = capsfilter("rawcaps", &raw_caps)?;
        let convert = make("videoconvert", "convert")?;

        let enc = gst::ElementFactory::make(encoder)
            .name("encoder")
            .build()
            .map_err(|_| BackendError::EncoderUnavailable(encoder.to_string()))?;
        for (property, value) in encoders::tuning(encoder) {
            set_from_str(&enc, property, value);
        }

        let h264_caps = gst::Caps::builder("video/x-h264").field("level", "4").build();
        let h264_filter = capsfilter("h264caps", &h264_caps)?;
        let parse = make("h264parse", "parse")?;
        let pay = make("rtph264pay", "pay")?;
        pay.set_property("config-interval", -1i32);
        pay.set_property("pt", RTP_PAYLOAD_TYPE);

        let sink = make("udpsink", SINK_NAME)?;
        sink.set_property("host", cfg.host.as_str());
        sink.set_property("port", i32::from(cfg.port));
        sink.set_property("sync", false);
        sink.set_property("async", false);

        let elements = [
            &source,
            &raw_filter,
            &convert,
            &enc,
            &h264_filter,
            &parse,
            &pay,
            &sink,
        ];
        pipeline
            .add_many(elements)
            .map_err(|e| BackendError::Other(e.to_string()))?;
        gst::Element::link_many(elements)
            .map_err(|e| BackendError::Link(format!("{encoder} chain: {e}")))?;

        let probe: Arc<Mutex<Option<FrameProbe>>> = Arc::new(Mutex::new(None));
        let sink_pad = sink.static_pad("sink").ok_or(BackendError::SinkMissing)?;
        let slot = probe.clone();
        sink_pad.add_probe(gst::PadProbeType::BUFFER, move |_pad, info| {
            if let Some(gst::PadProbeData::Buffer(buffer)) = &info.data {
                if let Some(probe) = slot.lock().as_ref() {
                    probe(buffer.size());
                }
            }
            gst::PadProbeReturn::Ok
        });

        let (tx, rx) = mpsc::unbounded_channel();
        let id = HandleId::next();
        debug!(handle = %id, encoder, width = cfg.width, height = cfg.height, "pipeline constructed");

        Ok(Box::new(GstHandle {
            id,
            encoder: encoder.to_string(),
            pipeline,
            probe,
            events_tx: tx,
            events_rx: Some(rx),
            pumping: Arc::new(AtomicBool::new(false)),
            pump: None,
        }))
    }

    fn encoder_available(&self, encoder: &str) -> bool {
        gst::ElementFactory::find(encoder).is_some()
    }

    fn devices(&self) -> Vec<DeviceInfo> {
        video_sources().iter().map(describe).collect()
    }

    fn device_modes(&self, device: &str) -> Vec<VideoMode> {
        let Some(found) = video_sources().into_iter().find(|d| describe(d).id == device) else {
            return Vec::new();
        };
        let Some(caps) = found.caps() else {
            return Vec::new();
        };

        let mut modes: Vec<VideoMode> = Vec::new();
        for s in caps.iter() {
            let (Ok(width), Ok(height)) = (s.get::<i32>("width"), s.get::<i32>("height")) else {
                continue;
            };
            let fps = s
                .get::<gst::Fraction>("framerate")
                .ok()
                .filter(|f| f.denom() > 0)
                .map(|f| (f.numer() / f.denom()).max(0) as u32)
                .unwrap_or(0);
            let (width, height) = (width.max(0) as u32, height.max(0) as u32);
            match modes.iter_mut().find(|m| m.width == width && m.height == height) {
                Some(existing) => existing.max_framerate = existing.max_framerate.max(fps),
                None => modes.push(VideoMode {
                    width,
                    height,
                    max_framerate: fps,
                    description: None,
                }),
            }
        }
        modes.sort_by_key(|m| std::cmp::Reverse(u64::from(m.width) * u64::from(m.height)));
        modes
    }
}

fn video_sources() -> Vec<gst::Device> {
    let monitor = gst::DeviceMonitor::new();
    monitor.add_filter(Some("Video/Source"), None);
    if let Err(e) = monitor.start() {
        warn!(error = %e, "device monitor failed to start");
        return Vec::new();
    }
    let devices = monitor.devices().into_iter().collect();
    monitor.stop();
    devices
}

fn describe(device: &gst::Device) -> DeviceInfo {
    let props = device.properties();
    let get = |key: &str| props.as_ref().and_then(|p| p.get::<String>(key).ok());
    let path = get("api.v4l2.path").or_else(|| get("device.path"));
    let source = match get("device.api").as_deref() {
        Some("libcamera") => CaptureSource::Libcamera,
        Some("v4l2") => CaptureSource::V4l2,
        _ if path.is_some() => CaptureSource::V4l2,
        _ => CaptureSource::Libcamera,
    };
    let name = device.display_name().to_string();
    DeviceInfo {
        id: path.clone().unwrap_or_else(|| name.clone()),
        name,
        source,
        path,
    }
}

fn translate(msg: &gst::Message, pipeline: &gst::Object) -> Option<EventKind> {
    let source = msg
        .src()
        .map(|s| s.path_string().to_string())
        .unwrap_or_default();
    match msg.view() {
        gst::MessageView::Error(err) => Some(EventKind::Error {
            source,
            message: err.error().to_string(),
            debug: err.debug().map(|d| d.to_string()),
        }),
        gst::MessageView::Warning(w) => Some(EventKind::Warning {
            source,
            message: w.error().to_string(),
        }),
        gst::MessageView::Info(i) => Some(EventKind::Info {
            source,
            message: i.error().to_string(),
        }),
        gst::MessageView::Eos(_) => Some(EventKind::EndOfStream),
        gst::MessageView::StateChanged(sc) => Some(EventKind::StateChanged {
            source,
            from: format!("{:?}", sc.old()),
            to: format!("{:?}", sc.current()),
            is_pipeline: msg.src().map_or(false, |s| s == pipeline),
        }),
        _ => None,
    }
}

struct GstHandle {
    id: HandleId,
    encoder: String,
    pipeline: gst::Pipeline,
    probe: Arc<Mutex<Option<FrameProbe>>>,
    events_tx: mpsc::UnboundedSender<PipelineEvent>,
    events_rx: Option<EventStream>,
    pumping: Arc<AtomicBool>,
    pump: Option<JoinHandle<()>>,
}

impl GstHandle {
    fn spawn_bus_pump(&mut self) -> Result<(), BackendError> {
        let bus = self
            .pipeline
            .bus()
            .ok_or_else(|| BackendError::Other("pipeline has no bus".to_string()))?;
        let pipeline: gst::Object = self.pipeline.clone().upcast();
        let tx = self.events_tx.clone();
        let id = self.id;
        let pumping = self.pumping.clone();
        pumping.store(true, Ordering::SeqCst);

        let pump = thread::Builder::new()
            .name(format!("gst-bus-{}", id.0))
            .spawn(move || {
                let types = [
                    gst::MessageType::Error,
                    gst::MessageType::Warning,
                    gst::MessageType::Info,
                    gst::MessageType::Eos,
                    gst::MessageType::StateChanged,
                ];
                while pumping.load(Ordering::SeqCst) {
                    let Some(msg) = bus.timed_pop_filtered(gst::ClockTime::from_mseconds(BUS_POLL_MS), &types)
                    else {
                        continue;
                    };
                    if let Some(kind) = translate(&msg, &pipeline) {
                        if tx.send(PipelineEvent { handle: id, kind }).is_err() {
                            break;
                        }
                    }
                }
            })
            .map_err(|e| BackendError::Other(format!("failed to spawn bus thread: {e}")))?;
        self.pump = Some(pump);
        Ok(())
    }

    fn stop_bus_pump(&mut self) {
        self.pumping.store(false, Ordering::SeqCst);
        if let Some(pump) = self.pump.take() {
            let _ = pump.join();
        }
    }
}

impl PipelineHandle for GstHandle {
    fn id(&self) -> HandleId {
        self.id
    }

    fn encoder(&self) -> &str {
        &self.encoder
    }

    fn start(&mut self) -> Result<(), BackendError> {
        self.spawn_bus_pump()?;
        self.pipeline
            .set_state(gst::State::Playing)
            .map_err(|e| BackendError::StateChange(format!("failed to start pipeline: {e}")))?;
        info!(handle = %self.id, encoder = %self.encoder, "pipeline playing");
        Ok(())
    }

    fn patch_sink(&mut self, host: &str, port: u16) -> Result<(), BackendError> {
        let sink = self
            .pipeline
            .by_name(SINK_NAME)
            .ok_or(BackendError::SinkMissing)?;
        sink.set_property("host", host);
        sink.set_property("port", i32::from(port));
        Ok(())
    }

    fn stop(&mut self, timeout: Duration) -> Result<StopOutcome, BackendError> {
        self.pipeline
            .set_state(gst::State::Null)
            .map_err(|e| BackendError::StateChange(format!("failed to stop pipeline: {e}")))?;
        let wait = gst::ClockTime::from_mseconds(timeout.as_millis() as u64);
        let (result, current, _pending) = self.pipeline.state(wait);
        self.stop_bus_pump();
        if result.is_ok() && current == gst::State::Null {
            Ok(StopOutcome::Graceful)
        } else {
            Ok(StopOutcome::TimedOut)
        }
    }

    fn take_events(&mut self) -> Option<EventStream> {
        self.events_rx.take()
    }

    fn attach_frame_probe(&mut self, probe: FrameProbe) {
        *self.probe.lock() = Some(probe);
    }
}

impl Drop for GstHandle {
    fn drop(&mut self) {
        let _ = self.pipeline.set_state(gst::State::Null);
        self.stop_bus_pump();
    }
}
