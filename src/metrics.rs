use lazy_static::lazy_static;
use prometheus::{Counter, Histogram, IntCounter, IntGauge, Registry};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // Request metrics
    pub static ref REQUEST_TOTAL: Counter =
        Counter::new("layerfs_requests_total", "Total number of manager requests").unwrap();

    pub static ref REQUEST_ERRORS: Counter =
        Counter::new("layerfs_request_errors_total", "Total number of failed manager requests").unwrap();

    pub static ref REQUEST_DURATION: Histogram = Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "layerfs_request_duration_seconds",
            "Manager request duration in seconds"
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0])
    ).unwrap();

    // Write/read volume
    pub static ref BYTES_WRITTEN_TOTAL: IntCounter =
        IntCounter::new("layerfs_bytes_written_total", "Total bytes appended to active layers").unwrap();

    pub static ref BYTES_READ_TOTAL: IntCounter =
        IntCounter::new("layerfs_bytes_read_total", "Total bytes returned by read").unwrap();

    // Checkpoint metrics
    pub static ref CHECKPOINTS_TOTAL: IntCounter =
        IntCounter::new("layerfs_checkpoints_total", "Total number of completed checkpoints").unwrap();

    pub static ref CHECKPOINT_ERRORS: IntCounter =
        IntCounter::new("layerfs_checkpoint_errors_total", "Total number of failed checkpoints").unwrap();

    pub static ref ACTIVE_LAYERS: IntGauge =
        IntGauge::new("layerfs_active_layers", "Number of files with a non-empty active layer").unwrap();
}

pub fn init() {
    REGISTRY.register(Box::new(REQUEST_TOTAL.clone())).unwrap();
    REGISTRY.register(Box::new(REQUEST_ERRORS.clone())).unwrap();
    REGISTRY.register(Box::new(REQUEST_DURATION.clone())).unwrap();
    REGISTRY.register(Box::new(BYTES_WRITTEN_TOTAL.clone())).unwrap();
    REGISTRY.register(Box::new(BYTES_READ_TOTAL.clone())).unwrap();
    REGISTRY.register(Box::new(CHECKPOINTS_TOTAL.clone())).unwrap();
    REGISTRY.register(Box::new(CHECKPOINT_ERRORS.clone())).unwrap();
    REGISTRY.register(Box::new(ACTIVE_LAYERS.clone())).unwrap();
}
