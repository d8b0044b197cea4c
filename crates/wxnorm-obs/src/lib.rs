use serde::{Deserialize, Serialize};
use std::fmt;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize logging.
/// - JSON logs, one object per line
/// - RUST_LOG respected; default to "info,wxnorm=debug"
pub fn init(service_name: &str) {
    let default_filter = "info,wxnorm=debug";
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.to_string());

    tracing_subscriber::registry()
        .with(EnvFilter::new(env_filter))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    tracing::info!(service = %service_name, "Observability initialized");
}

/// Severity of an operational event. `Notice` and `Critical` have no tracing
/// level of their own and are emitted at INFO and ERROR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Debug,
    Notice,
    Warning,
    Error,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Debug => "debug",
            Severity::Notice => "notice",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Critical => "critical",
        }
    }

    pub fn tracing_level(self) -> tracing::Level {
        match self {
            Severity::Debug => tracing::Level::DEBUG,
            Severity::Notice => tracing::Level::INFO,
            Severity::Warning => tracing::Level::WARN,
            Severity::Error | Severity::Critical => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured operational event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub facility: String,
    pub service: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module_id: Option<String>,
    pub code: u32,
    pub message: String,
}

impl Event {
    pub fn new(
        facility: impl Into<String>,
        service: impl Into<String>,
        code: u32,
        message: impl Into<String>,
    ) -> Self {
        Self {
            facility: facility.into(),
            service: service.into(),
            device_id: None,
            module_id: None,
            code,
            message: message.into(),
        }
    }

    pub fn device(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    pub fn module(mut self, module_id: impl Into<String>) -> Self {
        self.module_id = Some(module_id.into());
        self
    }

    /// Write the event through `tracing`
    pub fn emit(&self, severity: Severity) {
        let device_id = self.device_id.as_deref().unwrap_or("");
        let module_id = self.module_id.as_deref().unwrap_or("");

        macro_rules! emit_at {
            ($level:expr) => {
                tracing::event!(
                    $level,
                    severity = severity.as_str(),
                    facility = %self.facility,
                    service = %self.service,
                    device_id,
                    module_id,
                    code = self.code,
                    "{}",
                    self.message
                )
            };
        }

        match severity {
            Severity::Debug => emit_at!(tracing::Level::DEBUG),
            Severity::Notice => emit_at!(tracing::Level::INFO),
            Severity::Warning => emit_at!(tracing::Level::WARN),
            Severity::Error | Severity::Critical => emit_at!(tracing::Level::ERROR),
        }
    }

    pub fn debug(&self) {
        self.emit(Severity::Debug)
    }

    pub fn notice(&self) {
        self.emit(Severity::Notice)
    }

    pub fn warning(&self) {
        self.emit(Severity::Warning)
    }

    pub fn error(&self) {
        self.emit(Severity::Error)
    }

    pub fn critical(&self) {
        self.emit(Severity::Critical)
    }
}
