//! Tracing setup shared by the binaries: fmt output filtered by `RUST_LOG`,
//! plus an OTLP span exporter when an endpoint is configured.

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use opentelemetry::trace::TracerProvider;
use opentelemetry_otlp::{Protocol, SpanExporter, WithExportConfig};
use opentelemetry_sdk::{Resource, trace::SdkTracerProvider};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: OnceCell<()> = OnceCell::new();

const DEFAULT_FILTER: &str = "info,tower_http=warn,sqlx=warn";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObsConfig {
    pub service_name: &'static str,
    pub env_filter: String,
    pub otlp_endpoint: Option<String>,
}

impl Default for ObsConfig {
    fn default() -> Self {
        Self::for_service("records-server")
    }
}

impl ObsConfig {
    pub fn for_service(service_name: &'static str) -> Self {
        Self {
            service_name,
            env_filter: DEFAULT_FILTER.to_string(),
            otlp_endpoint: None,
        }
    }

    pub fn from_env(service_name: &'static str) -> Self {
        Self::from_lookup(service_name, |key| std::env::var(key).ok())
    }

    /// Reads `RUST_LOG` and `OTLP_ENDPOINT`; blank values count as unset.
    pub fn from_lookup(
        service_name: &'static str,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let set = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        Self {
            service_name,
            env_filter: set("RUST_LOG").unwrap_or_else(|| DEFAULT_FILTER.to_string()),
            otlp_endpoint: set("OTLP_ENDPOINT"),
        }
    }
}

/// Keeps the span exporter alive; dropping it flushes pending batches.
#[must_use = "dropping the guard stops span export"]
pub struct TracingGuard {
    provider: Option<SdkTracerProvider>,
}

impl Drop for TracingGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.provider.take() {
            if let Err(err) = provider.shutdown() {
                eprintln!("span exporter shutdown failed: {err}");
            }
        }
    }
}

/// Install the global subscriber. Later calls install nothing and return an
/// inert guard.
pub fn init_tracing(config: ObsConfig) -> Result<TracingGuard> {
    if INIT.get().is_some() {
        return Ok(TracingGuard { provider: None });
    }

    let env_filter = EnvFilter::try_new(&config.env_filter)
        .with_context(|| format!("invalid log filter `{}`", config.env_filter))?;
    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(false));

    let provider = match config.otlp_endpoint {
        Some(endpoint) => {
            let provider = span_provider(config.service_name, endpoint)?;
            let tracer = provider.tracer(config.service_name);
            registry
                .with(tracing_opentelemetry::layer().with_tracer(tracer))
                .try_init()?;
            Some(provider)
        }
        None => {
            registry.try_init()?;
            None
        }
    };

    // A racing caller may have won; the subscriber above would have failed.
    let _ = INIT.set(());
    Ok(TracingGuard { provider })
}

fn span_provider(service_name: &'static str, endpoint: String) -> Result<SdkTracerProvider> {
    let exporter = SpanExporter::builder()
        .with_http()
        .with_protocol(Protocol::HttpBinary)
        .with_endpoint(endpoint.clone())
        .build()
        .with_context(|| format!("failed to build OTLP exporter for {endpoint}"))?;
    Ok(SdkTracerProvider::builder()
        .with_resource(Resource::builder().with_service_name(service_name).build())
        .with_batch_exporter(exporter)
        .build())
}
