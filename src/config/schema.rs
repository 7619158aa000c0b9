//! Application configuration tree.
//!
//! Every field here is resolved once at startup by [`crate::config::precedence`]
//! through CLI > env (`SELKIES_<NAME>`) > legacy env > built-in default, then
//! wrapped by [`crate::config::store::ConfigStore`] for the small mutable
//! subset that the running server is allowed to change on its own (bitrate,
//! framerate, and similar knobs explicitly whitelisted below).

use serde::{Deserialize, Serialize};

/// A boolean setting that can additionally be locked against client-side
/// (runtime, `set_*`) mutation. Locked settings still honor CLI/env/default
/// resolution; only the *running* mutation path is rejected (`RESOURCE_BUSY`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockableBool {
    pub value: bool,
    pub locked: bool,
}

impl LockableBool {
    pub const fn new(value: bool, locked: bool) -> Self {
        Self { value, locked }
    }
}

impl Default for LockableBool {
    fn default() -> Self {
        Self {
            value: true,
            locked: false,
        }
    }
}

/// Top-level streaming mode the Supervisor starts in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamMode {
    Websockets,
    Webrtc,
}

impl Default for StreamMode {
    fn default() -> Self {
        Self::Webrtc
    }
}

impl std::fmt::Display for StreamMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamMode::Websockets => write!(f, "websockets"),
            StreamMode::Webrtc => write!(f, "webrtc"),
        }
    }
}

impl std::str::FromStr for StreamMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "websockets" => Ok(Self::Websockets),
            "webrtc" => Ok(Self::Webrtc),
            other => Err(format!("unknown stream mode '{other}'")),
        }
    }
}

/// Media Pipeline back-end selection (§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PipelineBackend {
    GraphStream,
    DirectCapture,
}

impl Default for PipelineBackend {
    fn default() -> Self {
        Self::GraphStream
    }
}

/// Video encoder kind. GPU/CPU variant selection lives in the encoder
/// registry's capability probe, not in this config value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoEncoder {
    H264,
    H265,
    Vp8,
    Vp9,
    Av1,
}

impl Default for VideoEncoder {
    fn default() -> Self {
        Self::H264
    }
}

impl VideoEncoder {
    /// The RTP MIME type this encoder forces on the video sender (§4.4 step 5).
    pub fn mime_type(&self) -> &'static str {
        match self {
            VideoEncoder::H264 => "video/H264",
            VideoEncoder::H265 => "video/H265",
            VideoEncoder::Vp8 => "video/VP8",
            VideoEncoder::Vp9 => "video/VP9",
            VideoEncoder::Av1 => "video/AV1",
        }
    }
}

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub mode: StreamMode,
    pub supervisor: SupervisorConfig,
    pub signaling: SignalingConfig,
    pub pipeline: PipelineConfig,
    pub rtc: RtcSettingsConfig,
    pub features: FeatureToggles,
    pub display: DisplayConfig,
    pub stats: StatsConfig,
    pub logging: LoggingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            mode: StreamMode::default(),
            supervisor: SupervisorConfig::default(),
            signaling: SignalingConfig::default(),
            pipeline: PipelineConfig::default(),
            rtc: RtcSettingsConfig::default(),
            features: FeatureToggles::default(),
            display: DisplayConfig::default(),
            stats: StatsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Supervisor control-plane settings (§4.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Whether `POST /switch` is accepted at all; disabled => always 403.
    pub enable_dual_mode: bool,
    /// Loopback control-plane port. Configurable, never hard-coded (§9).
    pub control_port: u16,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            enable_dual_mode: true,
            control_port: 8082,
        }
    }
}

/// Signaling Server settings (§4.2 / §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalingConfig {
    pub bind_addresses: Vec<String>,
    pub http_port: u16,
    pub https_enabled: bool,
    pub ssl_cert_path: Option<String>,
    pub ssl_key_path: Option<String>,
    pub web_root: Option<String>,
    pub basic_auth_enabled: bool,
    pub basic_auth_user: String,
    /// Argon2 hash of the Basic-auth password; never the plaintext.
    pub basic_auth_password_hash: Option<String>,
    pub turn_rest_username_auth_header: String,
    pub keepalive_timeout_secs: u64,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            bind_addresses: vec!["0.0.0.0".to_string()],
            http_port: 8080,
            https_enabled: false,
            ssl_cert_path: None,
            ssl_key_path: None,
            web_root: None,
            basic_auth_enabled: false,
            basic_auth_user: "selkies".to_string(),
            basic_auth_password_hash: None,
            turn_rest_username_auth_header: "x-turn-username".to_string(),
            keepalive_timeout_secs: 30,
        }
    }
}

/// Media Pipeline settings (§3 PipelineSettings, §4.3).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    pub backend: PipelineBackend,
    pub encoder: VideoEncoder,
    pub framerate: u32,
    pub video_bitrate_kbps: u32,
    pub audio_bitrate_bps: u32,
    /// Seconds between forced keyframes, or `-1` for infinite (rely on PLI).
    pub keyframe_distance_s: i64,
    pub audio_channels: u8,
    pub video_packetloss_pct: f64,
    pub audio_packetloss_pct: f64,
    /// PulseAudio monitor source name for capture.
    pub audio_device: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            backend: PipelineBackend::default(),
            encoder: VideoEncoder::default(),
            framerate: 30,
            video_bitrate_kbps: 4000,
            audio_bitrate_bps: 64_000,
            keyframe_distance_s: -1,
            audio_channels: 2,
            video_packetloss_pct: 0.0,
            audio_packetloss_pct: 0.0,
            audio_device: "default".to_string(),
        }
    }
}

/// RTC-Config Resolver & Monitors settings (§4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RtcSettingsConfig {
    pub enable_cloudflare_turn: bool,
    pub cloudflare_turn_token_id: Option<String>,
    pub cloudflare_turn_api_token: Option<String>,
    pub rtc_config_json_path: Option<String>,
    pub turn_rest_uri: Option<String>,
    pub turn_rest_username: String,
    pub turn_rest_username_auth_header: String,
    pub turn_rest_protocol_header: String,
    pub turn_rest_tls_header: String,
    pub long_term_turn_username: Option<String>,
    pub long_term_turn_password: Option<String>,
    pub turn_shared_secret: Option<String>,
    pub turn_host: String,
    pub turn_port: u16,
    pub turn_protocol: String,
    pub turn_tls: bool,
    pub turn_username: String,
    pub stun_host: String,
    pub stun_port: u16,
    /// Seconds between monitor refresh attempts for HMAC/REST sources.
    pub monitor_interval_secs: u64,
}

impl Default for RtcSettingsConfig {
    fn default() -> Self {
        Self {
            enable_cloudflare_turn: false,
            cloudflare_turn_token_id: None,
            cloudflare_turn_api_token: None,
            rtc_config_json_path: None,
            turn_rest_uri: None,
            turn_rest_username: "selkies".to_string(),
            turn_rest_username_auth_header: "x-auth-user".to_string(),
            turn_rest_protocol_header: "x-turn-protocol".to_string(),
            turn_rest_tls_header: "x-turn-tls".to_string(),
            long_term_turn_username: None,
            long_term_turn_password: None,
            turn_shared_secret: None,
            turn_host: String::new(),
            turn_port: 3478,
            turn_protocol: "udp".to_string(),
            turn_tls: false,
            turn_username: "selkies".to_string(),
            stun_host: "stun.l.google.com".to_string(),
            stun_port: 19302,
            monitor_interval_secs: 60,
        }
    }
}

/// Client-facing feature toggles (§6 Configuration surface).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureToggles {
    pub audio: LockableBool,
    pub microphone: LockableBool,
    pub gamepad: LockableBool,
    pub clipboard: LockableBool,
    pub file_transfer_upload: LockableBool,
    pub file_transfer_download: LockableBool,
}

impl Default for FeatureToggles {
    fn default() -> Self {
        Self {
            audio: LockableBool::new(true, false),
            microphone: LockableBool::new(false, false),
            gamepad: LockableBool::new(true, false),
            clipboard: LockableBool::new(true, false),
            file_transfer_upload: LockableBool::new(true, false),
            file_transfer_download: LockableBool::new(true, false),
        }
    }
}

/// Display resize / DPI collaborator settings (§4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub manual_resolution: Option<(u32, u32)>,
    pub dpi: u32,
    pub cursor_size_px: u32,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            manual_resolution: None,
            dpi: 96,
            cursor_size_px: 24,
        }
    }
}

/// Statistics persistence (§6 Persisted state).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    pub enable_stats_csv: bool,
    pub stats_dir: Option<String>,
    pub config_json_path: String,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            enable_stats_csv: false,
            stats_dir: None,
            config_json_path: "/tmp/selkies_config.json".to_string(),
        }
    }
}

/// Logging configuration (§10.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter`-compatible directive.
    pub filter: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
        }
    }
}
