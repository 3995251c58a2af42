use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:8290"). Optional for worker processes.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Redis connection string for the job queue and result backend
    pub redis_url: String,

    /// OBS bucket name
    pub obs_bucket: String,

    /// OBS endpoint URL (S3-compatible)
    #[serde(default = "default_obs_endpoint")]
    pub obs_endpoint: String,

    /// OBS region name
    #[serde(default = "default_obs_region")]
    pub obs_region: String,

    /// OBS access key ID
    pub obs_access_key: String,

    /// OBS secret access key
    pub obs_secret_key: String,

    /// Key template for per-case input artifacts; must contain {uid} and {cid}
    #[serde(default = "default_input_prefix_template")]
    pub input_prefix_template: String,

    /// Key template for per-case output artifacts; must contain {uid} and {cid}
    #[serde(default = "default_output_prefix_template")]
    pub output_prefix_template: String,

    /// Local directory where input volumes and model outputs are staged
    #[serde(default = "default_staging_dir")]
    pub staging_dir: String,

    /// Segmentation model command; the worker appends input and output paths
    #[serde(default = "default_segment_command")]
    pub segment_command: String,

    /// Landmark/plane model command; the worker appends the input path and
    /// reads the report as JSON from stdout
    #[serde(default = "default_plane_command")]
    pub plane_command: String,

    /// Deadline for downloading the input volume, in seconds
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// Deadline for the model invocation, in seconds
    #[serde(default = "default_compute_timeout_secs")]
    pub compute_timeout_secs: u64,

    /// Deadline for uploading computed artifacts, in seconds
    #[serde(default = "default_upload_timeout_secs")]
    pub upload_timeout_secs: u64,

    /// How long terminal job records are retained in the result backend, in seconds
    #[serde(default = "default_result_ttl_secs")]
    pub result_ttl_secs: u64,

    /// Worker sleep between polls when the queue is empty, in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8290".to_string()
}

fn default_obs_endpoint() -> String {
    "https://obs.cn-east-3.myhuaweicloud.com".to_string()
}

fn default_obs_region() -> String {
    "cn-east-3".to_string()
}

fn default_input_prefix_template() -> String {
    "doctor/{uid}/ct/{cid}/models/images".to_string()
}

fn default_output_prefix_template() -> String {
    "doctor/{uid}/ct/{cid}/models/custom".to_string()
}

fn default_staging_dir() -> String {
    "/tmp/ct-inference".to_string()
}

fn default_segment_command() -> String {
    "nnUNet_predict -t Task501 -m 3d_fullres".to_string()
}

fn default_plane_command() -> String {
    "predict_landmarks".to_string()
}

fn default_fetch_timeout_secs() -> u64 {
    60
}

fn default_compute_timeout_secs() -> u64 {
    1800
}

fn default_upload_timeout_secs() -> u64 {
    120
}

fn default_result_ttl_secs() -> u64 {
    7 * 24 * 3600
}

fn default_poll_interval_ms() -> u64 {
    1000
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }
}
