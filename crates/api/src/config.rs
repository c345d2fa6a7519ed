use std::path::PathBuf;
use std::time::Duration;

use gatewatch_core::counting::{LineConfig, ReversalPolicy};
use gatewatch_pipeline::PipelineConfig;

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `8080`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS`.
    /// The single value `*` allows any origin.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// SQLite database URL.
    pub database_url: String,
    /// Processing-plane configuration.
    pub pipeline: PipelineConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                   | Default                         |
    /// |---------------------------|---------------------------------|
    /// | `HOST`                    | `0.0.0.0`                       |
    /// | `PORT`                    | `8080`                          |
    /// | `CORS_ORIGINS`            | `*`                             |
    /// | `REQUEST_TIMEOUT_SECS`    | `30`                            |
    /// | `DATABASE_URL`            | `sqlite://gatewatch.db?mode=rwc`|
    /// | `MEDIA_DIR`               | `media`                         |
    /// | `MAX_CONCURRENT_JOBS`     | `4`                             |
    /// | `RTSP_RECONNECT_ATTEMPTS` | `3`                             |
    /// | `RTSP_RECONNECT_DELAY_S`  | `5`                             |
    /// | `RTSP_FPS_CAP`            | `15`                            |
    /// | `JPEG_QUALITY`            | `85`                            |
    /// | `TRACK_IOU_MIN`           | `0.3`                           |
    /// | `TRACK_MISS_MAX`          | `30`                            |
    /// | `TRACK_HISTORY_LEN`       | `30`                            |
    /// | `CROSSING_THRESHOLD_PX`   | `5`                             |
    /// | `MIN_DET_CONF`            | `0.3`                           |
    /// | `TARGET_CLASS_ID`         | unset (all classes)             |
    /// | `ENTRY_LINE`              | `50,0,50,100` (percent coords)  |
    /// | `REVERSAL_POLICY`         | `first_only`                    |
    /// | `JOB_RETENTION_MINUTES`   | `30`                            |
    /// | `CONTROL_QUEUE_CAP`       | `8`                             |
    /// | `STOP_GRACE_SECS`         | `10`                            |
    /// | `DRAIN_TIMEOUT_SECS`      | `15`                            |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port: u16 = parsed_env("PORT", 8080);

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "*".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = parsed_env("REQUEST_TIMEOUT_SECS", 30);
        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://gatewatch.db?mode=rwc".into());

        let defaults = PipelineConfig::default();
        let pipeline = PipelineConfig {
            max_concurrent_jobs: parsed_env("MAX_CONCURRENT_JOBS", defaults.max_concurrent_jobs),
            rtsp_reconnect_attempts: parsed_env(
                "RTSP_RECONNECT_ATTEMPTS",
                defaults.rtsp_reconnect_attempts,
            ),
            rtsp_reconnect_delay: Duration::from_secs(parsed_env("RTSP_RECONNECT_DELAY_S", 5)),
            rtsp_fps_cap: parsed_env("RTSP_FPS_CAP", defaults.rtsp_fps_cap),
            jpeg_quality: parsed_env("JPEG_QUALITY", defaults.jpeg_quality),
            track_iou_min: parsed_env("TRACK_IOU_MIN", defaults.track_iou_min),
            track_miss_max: parsed_env("TRACK_MISS_MAX", defaults.track_miss_max),
            track_history_len: parsed_env("TRACK_HISTORY_LEN", defaults.track_history_len),
            crossing_threshold_px: parsed_env(
                "CROSSING_THRESHOLD_PX",
                defaults.crossing_threshold_px,
            ),
            min_det_conf: parsed_env("MIN_DET_CONF", defaults.min_det_conf),
            target_class_id: std::env::var("TARGET_CLASS_ID")
                .ok()
                .map(|v| v.parse().expect("TARGET_CLASS_ID must be a valid u32")),
            reversal_policy: reversal_policy_from_env(),
            entry_line: entry_line_from_env(),
            job_retention: Duration::from_secs(parsed_env("JOB_RETENTION_MINUTES", 30u64) * 60),
            control_queue_cap: parsed_env("CONTROL_QUEUE_CAP", defaults.control_queue_cap),
            stop_grace: Duration::from_secs(parsed_env("STOP_GRACE_SECS", 10)),
            drain_timeout: Duration::from_secs(parsed_env("DRAIN_TIMEOUT_SECS", 15)),
            media_dir: PathBuf::from(std::env::var("MEDIA_DIR").unwrap_or_else(|_| "media".into())),
        };

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            database_url,
            pipeline,
        }
    }
}

/// Parse `name` from the environment, panicking on malformed values.
/// Misconfiguration should fail fast at startup.
fn parsed_env<T: std::str::FromStr>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .unwrap_or_else(|_| panic!("{name} has an invalid value: {raw:?}")),
        Err(_) => default,
    }
}

fn reversal_policy_from_env() -> ReversalPolicy {
    match std::env::var("REVERSAL_POLICY").as_deref() {
        Ok("allow_reversal") => ReversalPolicy::AllowReversal,
        Ok("first_only") | Err(_) => ReversalPolicy::FirstOnly,
        Ok(other) => panic!("REVERSAL_POLICY must be first_only or allow_reversal, got {other:?}"),
    }
}

/// Parse `ENTRY_LINE` as four comma-separated percentages `x1,y1,x2,y2`.
fn entry_line_from_env() -> LineConfig {
    let raw = std::env::var("ENTRY_LINE").unwrap_or_else(|_| "50,0,50,100".into());
    let parts: Vec<f64> = raw
        .split(',')
        .map(|p| {
            p.trim()
                .parse()
                .unwrap_or_else(|_| panic!("ENTRY_LINE has an invalid coordinate: {p:?}"))
        })
        .collect();
    if parts.len() != 4 {
        panic!("ENTRY_LINE must be x1,y1,x2,y2 in percent, got {raw:?}");
    }
    LineConfig::new(parts[0], parts[1], parts[2], parts[3])
        .unwrap_or_else(|e| panic!("ENTRY_LINE is invalid: {e}"))
}
