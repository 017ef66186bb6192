/// Broker and API base URL used when no configuration provides one
pub const DEFAULT_HOST: &str = "https://netpass.mars-cloud.com";

/// Broker publish/subscribe port (MQTT over TLS)
pub const BROKER_PORT: u16 = 18883;

/// Broker streaming tunnel port (secure WebSocket), one above the pub/sub port
pub const TUNNEL_PORT: u16 = BROKER_PORT + 1;

/// Path of the streaming tunnel endpoint on the broker
pub const TUNNEL_PATH: &str = "/tunnel";

/// Topic prefix for forwarded requests addressed to this client
pub const REQUEST_TOPIC_PREFIX: &str = "http/request";

/// Topic prefix for relay responses published by this client
pub const RESPONSE_TOPIC_PREFIX: &str = "http/response";

/// Path prefix of the public gateway URL for a client
pub const PUBLIC_PATH_PREFIX: &str = "pass";

/// Identity assignment endpoint, relative to the configured host
pub const IDENTITY_ENDPOINT_PATH: &str = "/api/getID";

/// Length of the locally derived client identifier (hex characters)
pub const LOCAL_ID_LEN: usize = 12;

/// Timeout for every local HTTP relay call (10 seconds)
pub const LOCAL_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Timeout for the identity assignment call (10 seconds)
pub const IDENTITY_TIMEOUT_SECS: u64 = 10;

/// Bounded wait for the topic subscription request (10 seconds)
pub const SUBSCRIBE_TIMEOUT_SECS: u64 = 10;

/// Bounded wait for handing a response to the broker connection (10 seconds)
pub const PUBLISH_TIMEOUT_SECS: u64 = 10;

/// Time allowed for a close handshake on a torn-down tunnel leg
pub const TUNNEL_CLOSE_TIMEOUT_SECS: u64 = 5;

/// Time allowed to flush the DISCONNECT packet on shutdown
pub const DISCONNECT_FLUSH_SECS: u64 = 2;

/// MQTT keep-alive interval
pub const KEEP_ALIVE_SECS: u64 = 30;

/// Largest MQTT packet accepted or sent (16 MB); bodies travel inline
pub const MAX_PACKET_SIZE_BYTES: usize = 16 * 1024 * 1024;

/// Capacity of the broker request queue shared by publishers
pub const BROKER_CHANNEL_CAPACITY: usize = 64;

/// Initial delay before reconnecting to the broker (5 seconds)
pub const RECONNECT_MIN_DELAY_MS: u64 = 5000;

/// Upper bound on the broker reconnect delay (30 seconds)
pub const RECONNECT_MAX_DELAY_MS: u64 = 30000;

/// Multiplier for exponential backoff reconnection
pub const RECONNECT_MULTIPLIER: f64 = 2.0;

/// Status code reported when the local call fails
pub const LOCAL_FAILURE_STATUS: u16 = 502;
