//! Logging setup and helpers for compact, colour-coded identifiers.
//!
//! Log lines are emitted through `tracing`. [`init`] installs a subscriber
//! with an env filter (`RUST_LOG` wins over the configured default).
//!
//! When stderr is a terminal, user IDs get a consistent colour derived from
//! their content so the same user is easy to follow across interleaved
//! connection logs:
//!
//! ```text
//! 2026-02-11T21:33:12.000Z  INFO chatline::presence: presence: u-1GDfZUqa online
//! ```

use std::io::IsTerminal;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static COLOUR_ENABLED: AtomicBool = AtomicBool::new(false);

/// Install the global subscriber. Later calls are no-ops.
pub fn init(default_filter: &str) {
    let is_terminal = std::io::stderr().is_terminal();
    COLOUR_ENABLED.store(is_terminal, Ordering::Relaxed);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(is_terminal),
        )
        .try_init();
}

pub fn colour_enabled() -> bool {
    COLOUR_ENABLED.load(Ordering::Relaxed)
}

const RESET: &str = "\x1b[0m";

const ID_COLOURS: &[&str] = &[
    "\x1b[91m", "\x1b[92m", "\x1b[93m", "\x1b[94m", "\x1b[95m", "\x1b[96m", "\x1b[31m",
    "\x1b[32m", "\x1b[33m", "\x1b[34m", "\x1b[35m", "\x1b[36m",
];

fn hash_colour(id: &str) -> &'static str {
    let hash: u32 = id
        .bytes()
        .fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u32));
    ID_COLOURS[(hash as usize) % ID_COLOURS.len()]
}

const LOG_ID_TRUNCATE_LEN: usize = 8;

fn truncate_id(id: &str) -> &str {
    let end = id
        .char_indices()
        .nth(LOG_ID_TRUNCATE_LEN)
        .map(|(i, _)| i)
        .unwrap_or(id.len());
    &id[..end]
}

/// Format a user ID for logs, e.g. `u-1GDfZUqa`.
pub fn user_id(id: &str) -> String {
    let short = truncate_id(id);
    if colour_enabled() {
        let colour = hash_colour(id);
        format!("{colour}u-{short}{RESET}")
    } else {
        format!("u-{short}")
    }
}

const MSG_ID_COLOUR: &str = "\x1b[93m";

/// Format a message ID for logs, e.g. `m-42`.
pub fn msg_id(id: i64) -> String {
    if colour_enabled() {
        format!("{MSG_ID_COLOUR}m-{id}{RESET}")
    } else {
        format!("m-{id}")
    }
}
