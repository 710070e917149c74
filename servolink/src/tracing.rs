//! Log output for servolink programs.
//!
//! The library only emits events. A binary picks where they go by calling
//! [`init_journald_or_stderr`] once before touching a transport. Under
//! systemd, events go to the journal with their structured fields intact.
//! Anywhere else they are rendered as text on stderr, because stdout
//! belongs to command output such as hex dumps and bridge instructions.
//!
//! Modules bring the event macros in with `use crate::tracing::prelude::*`.

use std::env;
use time::{macros::format_description, OffsetDateTime};
use tracing_subscriber::{
    filter::{EnvFilter, LevelFilter},
    fmt::{format::Writer, time::FormatTime},
    prelude::*,
};

pub mod prelude {
    #[allow(unused_imports)]
    pub use tracing::{debug, error, info, trace, warn};
}

use prelude::*;

/// Set by systemd when a unit's stdout/stderr is connected to the journal.
const JOURNAL_STREAM: &str = "JOURNAL_STREAM";

/// Install the process-wide subscriber.
///
/// Falls back to stderr if the journal socket cannot be reached.
pub fn init_journald_or_stderr() {
    if env::var_os(JOURNAL_STREAM).is_none() {
        init_stderr();
        return;
    }

    match tracing_journald::layer() {
        Ok(journal) => tracing_subscriber::registry().with(journal).init(),
        Err(e) => {
            init_stderr();
            error!(error = %e, "Journald unavailable, logging to stderr.");
        }
    }
}

fn init_stderr() {
    tracing_subscriber::registry()
        .with(level_filter())
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_timer(LocalTimer),
        )
        .init();
}

/// `RUST_LOG` if set, INFO otherwise. Traffic dumps are INFO events.
fn level_filter() -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy()
}

/// Wall-clock `hh:mm:ss`, local offset when the platform reports one.
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
        let stamp = now
            .format(format_description!("[hour]:[minute]:[second]"))
            .map_err(|_| std::fmt::Error)?;
        write!(w, "{stamp}")
    }
}
