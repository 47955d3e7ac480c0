// =============================================================================
// Application Identity
// =============================================================================

#[allow(dead_code)]
pub const APP_NAME: &str = "Hub";
pub const APP_NAME_LOWER: &str = "hub";
pub const APP_DOT_FOLDER: &str = ".hub";

// =============================================================================
// Configuration Files
// =============================================================================

pub const CONFIG_FILE_NAME: &str = "hub.toml";
pub const ENV_CONFIG: &str = "HUB_CONFIG";

// =============================================================================
// Environment Variables - Debug & Logging
// =============================================================================

#[allow(dead_code)]
pub const ENV_DEBUG: &str = "HUB_DEBUG";
pub const ENV_LOG: &str = "HUB_LOG";

// =============================================================================
// Environment Variables - Server
// =============================================================================

pub const ENV_HOST: &str = "HUB_HOST";
pub const ENV_PORT: &str = "HUB_PORT";

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 6969;

/// WebSocket upgrade path
pub const WS_UPGRADE_PATH: &str = "/api/v69/ws";

// =============================================================================
// Environment Variables - Storage
// =============================================================================

pub const ENV_DATA_DIR: &str = "HUB_DATA_DIR";

// =============================================================================
// Auth
// =============================================================================

/// Session cookie name carrying the signed JWT.
pub const SESSION_COOKIE_NAME: &str = "hub_session";
/// Header carrying the service-to-service HMAC credential.
pub const SERVICE_AUTH_HEADER: &str = "X-Service-Auth";
/// Allowed clock skew for service HMAC credentials
pub const SERVICE_AUTH_SKEW_SECS: i64 = 300;
pub const DEFAULT_SESSION_TTL_DAYS: u64 = 7;
#[allow(dead_code)]
pub const DEFAULT_USER_ID: &str = "guest";

// =============================================================================
// Payload limits
// =============================================================================

/// Default maximum inbound frame size ("~5 MiB").
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 5 * 1024 * 1024;

// =============================================================================
// Rate limiting
// =============================================================================

/// Default connection token bucket capacity.
pub const DEFAULT_BUCKET_CAPACITY: u32 = 40;
/// Default connection token bucket refill rate, tokens/sec.
pub const DEFAULT_BUCKET_REFILL_PER_SEC: f64 = 10.0;
/// Default chat messages allowed per window.
pub const DEFAULT_CHAT_WINDOW_MAX: u32 = 10;
/// Default chat sliding window length, seconds.
pub const DEFAULT_CHAT_WINDOW_SECS: u64 = 30;

// =============================================================================
// Rooms / presence
// =============================================================================

/// Default bound on a room's chat history ring buffer.
pub const DEFAULT_CHAT_HISTORY_LEN: usize = 200;
/// Default maximum chat message length in characters.
pub const DEFAULT_CHAT_MESSAGE_MAX_CHARS: usize = 500;

// =============================================================================
// Circuit breaker
// =============================================================================

pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
pub const DEFAULT_RECOVERY_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_REQUEST_LIMIT: u32 = 1;
pub const DEFAULT_MONITORING_WINDOW_SECS: u64 = 60;
pub const DEFAULT_MINIMUM_REQUESTS: u32 = 10;

// =============================================================================
// Shutdown
// =============================================================================

pub const SHUTDOWN_TIMEOUT_SECS: u64 = 15;
/// Grace period given to connections between `server_shutdown` and force-close.
pub const SHUTDOWN_GRACE_SECS: u64 = 5;

// =============================================================================
// Connections
// =============================================================================

/// Idle timeout (no inbound message or PONG) before a connection is closed.
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 90;
/// Default deadline for a single request before the dispatcher emits a timeout error.
pub const DEFAULT_REQUEST_DEADLINE_SECS: u64 = 30;
/// Bounded depth of a connection's outbound queue.
pub const DEFAULT_OUTBOUND_QUEUE_DEPTH: usize = 256;
/// Consecutive drops before a subscriber is disconnected as a slow consumer.
pub const DEFAULT_SLOW_CONSUMER_THRESHOLD: u32 = 20;

// =============================================================================
// Event bus
// =============================================================================

pub const DEFAULT_BUS_CHANNEL_CAPACITY: usize = 1024;

// =============================================================================
// WebSocket close codes — private range per RFC 6455 §7.4.2
// =============================================================================

pub const CLOSE_CODE_NORMAL: u16 = 1000;
pub const CLOSE_CODE_PAYLOAD_TOO_LARGE: u16 = 4001;
pub const CLOSE_CODE_SLOW_CONSUMER: u16 = 4002;
pub const CLOSE_CODE_AUTH_FAILED: u16 = 4003;
pub const CLOSE_CODE_SERVER_SHUTDOWN: u16 = 4004;
