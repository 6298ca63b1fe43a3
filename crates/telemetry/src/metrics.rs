use lazy_static::lazy_static;
use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // ==== Controller ====
    pub static ref TX_CONTROLLER_STATE: IntGauge = {
        let metric = IntGauge::new(
            "tx_controller_state",
            "Controller state (0=stopped 1=building 2=running 3=restarting 4=degraded 5=terminating)",
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref TX_CONFIG_UPDATES: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new("tx_config_updates_total", "Configuration updates by resulting action"),
            &["action"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref TX_REJECTED_FIELDS: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new("tx_rejected_fields_total", "Configuration fields rejected by validation"),
            &["field"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref TX_RUNTIME_FAULTS: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new("tx_runtime_faults_total", "Pipeline runtime faults"),
            &["kind"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    // ==== Pipeline lifecycle ====
    pub static ref TX_PIPELINE_BUILDS: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new("tx_pipeline_builds_total", "Pipeline build attempts"),
            &["result"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref TX_ENCODER_FALLBACKS: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new("tx_encoder_fallbacks_total", "Encoders skipped during fallback"),
            &["encoder"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref TX_HOT_PATCHES: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new("tx_hot_patches_total", "Sink address patches on a live pipeline"),
            &["result"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref TX_TEARDOWNS: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new("tx_teardowns_total", "Pipeline teardowns"),
            &["outcome"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref TX_BUILD_DURATION: Histogram = {
        let metric = Histogram::with_opts(
            HistogramOpts::new("tx_build_duration_seconds", "Time from teardown start to a playing pipeline")
                .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.0, 5.0, 10.0]),
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    // ==== Transmission ====
    pub static ref TX_FRAMES: IntCounter = {
        let metric = IntCounter::new("tx_frames_total", "Encoded frames handed to the sink")
            .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref TX_BYTES: IntCounter = {
        let metric = IntCounter::new("tx_bytes_total", "Payload bytes handed to the sink")
            .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    // ==== HTTP ====
    pub static ref TX_HTTP_REQUESTS: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new("tx_http_requests_total", "Control API requests"),
            &["method", "status"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };
}

/// Render every registered metric in the Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    use prometheus::Encoder;
    // Touch the lazies so a scrape before the first event still lists them
    lazy_static::initialize(&TX_CONTROLLER_STATE);
    lazy_static::initialize(&TX_FRAMES);
    lazy_static::initialize(&TX_BYTES);

    let encoder = prometheus::TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_controller_state_gauge() {
        TX_CONTROLLER_STATE.set(2);
        assert_eq!(TX_CONTROLLER_STATE.get(), 2);
    }

    #[test]
    fn test_labelled_counters() {
        let before = TX_PIPELINE_BUILDS.with_label_values(&["success"]).get();
        TX_PIPELINE_BUILDS.with_label_values(&["success"]).inc();
        assert_eq!(TX_PIPELINE_BUILDS.with_label_values(&["success"]).get(), before + 1);

        TX_REJECTED_FIELDS.with_label_values(&["framerate"]).inc();
        assert!(TX_REJECTED_FIELDS.with_label_values(&["framerate"]).get() >= 1);
    }

    #[test]
    fn test_encode_metrics_lists_transmission_counters() {
        TX_FRAMES.inc_by(3);
        let encoded = encode_metrics().expect("metrics should encode");
        assert!(encoded.contains("tx_frames_total"));
        assert!(encoded.contains("tx_controller_state"));
    }
}
