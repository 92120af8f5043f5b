//! Internal constants for diagram rendering.

use std::time::Duration;

/// Default DPI for diagram rendering (192 = 2x for retina displays).
pub const DEFAULT_DPI: u32 = 192;

/// Standard display DPI (96 = CSS reference pixel).
pub const STANDARD_DPI: u32 = 96;

/// Default per-render timeout enforced by the session pool.
pub const DEFAULT_RENDER_TIMEOUT: Duration = Duration::from_secs(30);

/// Default number of pooled rendering sessions.
pub const DEFAULT_MAX_SESSIONS: usize = 4;

/// Default number of consecutive failures before a session is retired.
pub const DEFAULT_MAX_FAILURES_BEFORE_RETIRE: u32 = 3;

/// Fingerprint domain for diagram cache keys. Bump the suffix when the key
/// layout changes.
pub(crate) const DIAGRAM_KEY_DOMAIN: &str = "mdfig/diagram/v1";
