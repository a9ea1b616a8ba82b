use anyhow::Result;

/// Process configuration for the `layerfs-server` binary. The library
/// (`StorageManager`, `SqliteCatalog`, `S3ObjectStore`) reads no environment
/// of its own (only this binary-level wiring does).
#[derive(Clone)]
pub struct Config {
    pub db_path: String,

    pub s3_endpoint: String,
    pub s3_region: String,
    pub s3_bucket: String,
    pub s3_access_key: String,
    pub s3_secret_key: String,

    pub server_host: String,
    pub server_port: u16,
    #[allow(dead_code)]
    pub metrics_port: u16,
}

/// Hand-rolled `Debug` so logging `config` never writes the S3 credentials
/// to the log stream; every field but the two key fields prints as usual.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("db_path", &self.db_path)
            .field("s3_endpoint", &self.s3_endpoint)
            .field("s3_region", &self.s3_region)
            .field("s3_bucket", &self.s3_bucket)
            .field("s3_access_key", &"[redacted]")
            .field("s3_secret_key", &"[redacted]")
            .field("server_host", &self.server_host)
            .field("server_port", &self.server_port)
            .field("metrics_port", &self.metrics_port)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            db_path: std::env::var("LAYERFS_DB_PATH").unwrap_or_else(|_| "layerfs.db".to_string()),

            s3_endpoint: std::env::var("LAYERFS_S3_ENDPOINT")
                .unwrap_or_else(|_| "http://localhost:9000".to_string()),
            s3_region: std::env::var("LAYERFS_S3_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
            s3_bucket: std::env::var("LAYERFS_S3_BUCKET").unwrap_or_else(|_| "layerfs".to_string()),
            s3_access_key: std::env::var("LAYERFS_S3_ACCESS_KEY").unwrap_or_default(),
            s3_secret_key: std::env::var("LAYERFS_S3_SECRET_KEY").unwrap_or_default(),

            server_host: std::env::var("LAYERFS_SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: std::env::var("LAYERFS_SERVER_PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()?,
            metrics_port: std::env::var("LAYERFS_METRICS_PORT")
                .unwrap_or_else(|_| "9090".to_string())
                .parse()?,
        })
    }
}
