// Protocol constants for the pacemaker serial link

use std::time::Duration;

/// Baud rate the device firmware listens on
pub const BAUD_RATE: u32 = 115_200;

/// First prologue byte of a parameter (program / echo) frame
pub const PARAMETER_SYNC: u8 = 0x16;

/// Wire schema version, sent as the second prologue byte of a parameter frame
pub const SCHEMA_VERSION: u8 = 0x01;

/// Prologue of a parameter frame (sync marker + schema version)
pub const PARAMETER_PROLOGUE: [u8; 2] = [PARAMETER_SYNC, SCHEMA_VERSION];

/// Prologue byte of a telemetry (egram) frame
pub const TELEMETRY_PROLOGUE: u8 = 0xAA;

/// Total size of a parameter frame, prologue included (42 bytes)
pub const PARAMETER_FRAME_SIZE: usize = 42;

/// Samples per channel carried by one telemetry frame
pub const TELEMETRY_SAMPLES_PER_CHANNEL: usize = 10;

/// Floats carried by one telemetry frame (atrial half then ventricular half)
pub const TELEMETRY_FLOATS: usize = 2 * TELEMETRY_SAMPLES_PER_CHANNEL;

/// Total size of a telemetry frame, prologue included (81 bytes)
pub const TELEMETRY_FRAME_SIZE: usize = 1 + TELEMETRY_FLOATS * 4;

/// Default number of samples retained by a sink
pub const DEFAULT_SINK_CAPACITY: usize = 1000;

/// Default receive loop polling interval
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Default bound on waiting for a parameter echo
pub const DEFAULT_ECHO_TIMEOUT: Duration = Duration::from_secs(2);

/// Default timeout applied when opening a port
pub const DEFAULT_OPEN_TIMEOUT: Duration = Duration::from_millis(100);

/// Read chunk size used when draining the serial input buffer
pub const READ_CHUNK_SIZE: usize = 256;
