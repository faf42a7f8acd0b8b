use crate::event_bus::{EventBus, EventSink, MemorySink, StdOutSink};

use super::CheckpointerType;

/// Default superstep budget per run. A conversational turn rarely needs more
/// than a handful of steps; the loop-shaped task workflow stays well under
/// this unless a router misbehaves.
pub const DEFAULT_RECURSION_LIMIT: u64 = 25;

/// Execution-time settings carried by a compiled graph.
#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    /// Stable session identifier; `None` means a fresh random id per invoke.
    pub session_id: Option<String>,
    /// Persistence backend. `None` falls back to in-memory.
    pub checkpointer: Option<CheckpointerType>,
    /// Postgres connection string for the durable backend.
    pub database_url: Option<String>,
    /// Maximum supersteps per run before the run is aborted.
    pub recursion_limit: u64,
    /// Bound on concurrently running frontier nodes within a superstep.
    pub concurrency_limit: usize,
    pub event_bus: EventBusConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            session_id: None,
            checkpointer: Some(CheckpointerType::InMemory),
            database_url: Self::resolve_database_url(None),
            recursion_limit: DEFAULT_RECURSION_LIMIT,
            concurrency_limit: default_concurrency_limit(),
            event_bus: EventBusConfig::default(),
        }
    }
}

fn default_concurrency_limit() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

impl RuntimeConfig {
    fn resolve_database_url(provided: Option<String>) -> Option<String> {
        if provided.is_some() {
            return provided;
        }
        dotenvy::dotenv().ok();
        std::env::var("DATABASE_URL").ok()
    }

    pub fn new(
        session_id: Option<String>,
        checkpointer: Option<CheckpointerType>,
        database_url: Option<String>,
    ) -> Self {
        Self {
            session_id,
            checkpointer,
            database_url: Self::resolve_database_url(database_url),
            recursion_limit: DEFAULT_RECURSION_LIMIT,
            concurrency_limit: default_concurrency_limit(),
            event_bus: EventBusConfig::default(),
        }
    }

    #[must_use]
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    #[must_use]
    pub fn with_recursion_limit(mut self, limit: u64) -> Self {
        self.recursion_limit = limit.max(1);
        self
    }

    #[must_use]
    pub fn with_concurrency_limit(mut self, limit: usize) -> Self {
        self.concurrency_limit = limit.max(1);
        self
    }

    #[must_use]
    pub fn with_event_bus(mut self, event_bus: EventBusConfig) -> Self {
        self.event_bus = event_bus;
        self
    }

    #[must_use]
    pub fn with_memory_event_bus(self) -> Self {
        self.with_event_bus(EventBusConfig::with_memory_sink())
    }
}

/// Declarative sink selection for the runtime event bus.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SinkConfig {
    StdOut,
    Memory,
}

#[derive(Clone, Debug)]
pub struct EventBusConfig {
    pub sinks: Vec<SinkConfig>,
}

impl EventBusConfig {
    #[must_use]
    pub fn new(sinks: Vec<SinkConfig>) -> Self {
        Self { sinks }
    }

    #[must_use]
    pub fn with_stdout_only() -> Self {
        Self::new(vec![SinkConfig::StdOut])
    }

    #[must_use]
    pub fn with_memory_sink() -> Self {
        Self::new(vec![SinkConfig::StdOut, SinkConfig::Memory])
    }

    #[must_use]
    pub fn add_sink(mut self, sink: SinkConfig) -> Self {
        if !self.sinks.contains(&sink) {
            self.sinks.push(sink);
        }
        self
    }

    /// Materialize an [`EventBus`] from this configuration.
    #[must_use]
    pub fn build_event_bus(&self) -> EventBus {
        let sinks: Vec<Box<dyn EventSink>> = self
            .sinks
            .iter()
            .map(|s| match s {
                SinkConfig::StdOut => Box::new(StdOutSink::default()) as Box<dyn EventSink>,
                SinkConfig::Memory => Box::new(MemorySink::new()) as Box<dyn EventSink>,
            })
            .collect();
        EventBus::with_sinks(sinks)
    }
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self::with_stdout_only()
    }
}
