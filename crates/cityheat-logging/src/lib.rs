//! ---
//! cityheat_section: "03-logging"
//! cityheat_subsection: "module"
//! cityheat_type: "source"
//! cityheat_scope: "code"
//! cityheat_description: "Structured logging adapters and subscriber bootstrap."
//! cityheat_version: "v0.1.0"
//! cityheat_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Logging helpers shared by the cityheat crates.

use tracing::Level;
use tracing_subscriber::{fmt as subscriber_fmt, prelude::*, Registry};

pub mod macros;
pub mod setup;

pub use setup::{init_tracing, LogFormat, LoggingConfig};

/// Initialize a console-only subscriber on stderr, filtered like the [`init_tracing`] console.
pub fn init() {
    let _ = Registry::default()
        .with(setup::console_filter())
        .with(subscriber_fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

/// Structured logging context propagated by the convenience macros.
#[derive(Debug, Default, Clone)]
pub struct LogContext<'a> {
    /// Heating network identifier associated with the log event.
    pub network: Option<usize>,
    /// Building node identifier.
    pub building: Option<u32>,
    /// Simulation timestep index.
    pub timestep: Option<usize>,
    /// Ranking or dispatch mode in effect.
    pub mode: Option<&'a str>,
}

impl<'a> LogContext<'a> {
    /// Create an empty logging context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a network identifier.
    pub fn with_network(mut self, network: usize) -> Self {
        self.network = Some(network);
        self
    }

    /// Attach a building node identifier.
    pub fn with_building(mut self, building: u32) -> Self {
        self.building = Some(building);
        self
    }

    /// Attach a timestep index.
    pub fn with_timestep(mut self, timestep: usize) -> Self {
        self.timestep = Some(timestep);
        self
    }

    /// Attach a mode descriptor.
    pub fn with_mode(mut self, mode: &'a str) -> Self {
        self.mode = Some(mode);
        self
    }
}

/// Outcome attached to run lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The run completed.
    Success,
    /// The run was rejected or aborted.
    Rejected,
}

impl RunOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            RunOutcome::Success => "success",
            RunOutcome::Rejected => "rejected",
        }
    }

    fn level(&self) -> Level {
        match self {
            RunOutcome::Success => Level::INFO,
            RunOutcome::Rejected => Level::ERROR,
        }
    }
}

/// Emit a standardized run lifecycle event.
pub fn log_run_event(context: Option<&LogContext>, event: &str, message: &str, outcome: RunOutcome) {
    let default_ctx = LogContext::default();
    let ctx = context.unwrap_or(&default_ctx);
    match outcome.level() {
        Level::ERROR => tracing::event!(
            Level::ERROR,
            event,
            outcome = outcome.as_str(),
            network = ctx.network.unwrap_or_default(),
            building = ctx.building.unwrap_or_default(),
            timestep = ctx.timestep.unwrap_or_default(),
            mode = ctx.mode.unwrap_or(""),
            message = %message
        ),
        _ => tracing::event!(
            Level::INFO,
            event,
            outcome = outcome.as_str(),
            network = ctx.network.unwrap_or_default(),
            building = ctx.building.unwrap_or_default(),
            timestep = ctx.timestep.unwrap_or_default(),
            mode = ctx.mode.unwrap_or(""),
            message = %message
        ),
    }
}
