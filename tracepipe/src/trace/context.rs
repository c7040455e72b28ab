//! Trace context construction and destruction (spec §4.3). The embedded
//! sub-pipeline itself is modeled as an `engine::Engine` instance, never
//! registered with any outer registry — this module is only responsible
//! for standing one up, wiring it, and installing it into the gate.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::engine::{Engine, NullOutput, Output, RecordingOutput};
use crate::trace::error::TraceError;
use crate::trace::registry::{TraceContextInner, TraceRegistry};

/// Arguments to `new_context`, mirroring spec §4.3 `new`'s parameter list.
pub struct NewContextArgs<'a> {
    pub host_input: &'a str,
    pub output_kind: &'a str,
    pub trace_prefix: &'a str,
    /// Opaque caller-supplied data the output is "bound to" (spec §4.3 step
    /// 4). The upstream engine hangs this off the output instance as private
    /// plugin data; there is no such concept in this crate's trait-object
    /// `Output`, so it is carried through as a `user_data` property instead,
    /// visible the same way any other output property would be.
    pub output_user_data: &'a str,
    pub output_properties: HashMap<String, String>,
}

/// Resolve the property map a new output should be configured with (spec
/// §4.3 step 5): credential propagation from a recognized sink instance in
/// the outer engine, falling back to the caller-supplied properties, with
/// `output_user_data` folded in under a `user_data` key either way (see
/// `NewContextArgs::output_user_data`). Caller-supplied `user_data` never
/// overwrites a same-named property already present in the source map.
fn resolve_output_properties(
    mut properties: HashMap<String, String>,
    output_user_data: &str,
) -> HashMap<String, String> {
    if !output_user_data.is_empty() {
        properties
            .entry("user_data".to_string())
            .or_insert_with(|| output_user_data.to_string());
    }
    properties
}

/// Build an output instance of the requested kind. This crate ships no
/// real network sinks (the binary serialization and telemetry sink
/// libraries are external collaborators per spec §1); `"null"` discards
/// everything, anything else is recorded in-memory so tests and the demo
/// control surface can inspect what a context would have sent.
fn build_output(kind: &str, name: String, properties: HashMap<String, String>) -> Arc<dyn Output> {
    if kind == "null" {
        Arc::new(NullOutput::new(name, properties))
    } else {
        Arc::new(RecordingOutput::new(name, properties))
    }
}

/// spec §4.3 `new`. Returns `Ok(())` once the context is installed on
/// `host_input` in `registry`.
///
/// Everything past the `enable_trace` check — building the embedded engine,
/// registering its emitter and output, routing between them, and starting
/// it — runs inside `registry.install_with`'s closure, which only invokes it
/// once this host input's gate is confirmed empty and holds the gate for
/// the whole call (spec §4.1: "every context-mutating operation acquires
/// the gate for the entire critical region"). Two racing calls for the same
/// host input can therefore never both stand up an engine: the loser's
/// `install_with` returns `ResourceExhaustion` before `build` runs at all,
/// so there is nothing left over to `stop()`. Any failure inside `build`
/// (a missing credential source, a routing failure) unwinds automatically
/// — every intermediate value (`engine`, its emitter input, its output) is
/// a local that simply drops on an early `return`, so no manual
/// reverse-order rewind is needed the way the original's `goto`-style
/// cleanup required (see DESIGN.md). This is safe specifically because
/// those failures are all detected *before* `engine.start()` runs; nothing
/// in `build` can fail after the engine's drain task is spawned.
pub fn new_context(
    registry: &Arc<TraceRegistry>,
    config: &Config,
    outer_outputs: &[Arc<dyn Output>],
    args: NewContextArgs<'_>,
) -> Result<(), TraceError> {
    if !config.enable_trace {
        return Err(TraceError::Disabled);
    }

    let host_input = args.host_input;
    let flush_interval = Duration::from_secs(config.flush_interval_secs);
    let grace_period = Duration::from_secs(config.grace_period_secs);
    let telemetry_sink_name = config.telemetry_sink_name.clone();

    registry.install_with(host_input, move || {
        let engine = Engine::new(format!("{host_input}-trace"), flush_interval, grace_period);

        let emitter = engine.register_emitter_input("trace-emitter", Some("trace-emitter".to_string()));

        let output_name = format!("{host_input}-trace-output");
        let source_properties = if args.output_kind == telemetry_sink_name {
            let source = outer_outputs
                .iter()
                .find(|o| o.name() == telemetry_sink_name)
                .ok_or_else(|| {
                    TraceError::ConfigurationMissing(format!(
                        "no outer output instance named {telemetry_sink_name} to copy credentials from"
                    ))
                })?;
            source.properties().clone()
        } else {
            args.output_properties
        };
        let properties = resolve_output_properties(source_properties, args.output_user_data);
        let output = build_output(args.output_kind, output_name.clone(), properties);
        engine.register_output(output);
        engine
            .route(emitter.name(), &output_name)
            .map_err(|e| TraceError::RoutingFailure(e.to_string()))?;

        let engine = Arc::new(engine);
        engine.start();

        Ok(TraceContextInner::new(engine, args.trace_prefix.to_string()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn config(enable_trace: bool) -> Config {
        Config {
            enable_trace,
            ..Config::default()
        }
    }

    #[test]
    fn output_user_data_is_folded_into_properties() {
        let props = resolve_output_properties(HashMap::new(), "tenant-42");
        assert_eq!(props.get("user_data"), Some(&"tenant-42".to_string()));
    }

    #[test]
    fn empty_user_data_adds_nothing() {
        let props = resolve_output_properties(HashMap::new(), "");
        assert!(props.is_empty());
    }

    #[test]
    fn user_data_never_overwrites_an_existing_property() {
        let mut source = HashMap::new();
        source.insert("user_data".to_string(), "from-caller".to_string());
        let props = resolve_output_properties(source, "tenant-42");
        assert_eq!(props.get("user_data"), Some(&"from-caller".to_string()));
    }

    #[test]
    fn disabled_globally_returns_without_allocating() {
        let registry = Arc::new(TraceRegistry::new());
        let cfg = config(false);
        let err = new_context(
            &registry,
            &cfg,
            &[],
            NewContextArgs {
                host_input: "in",
                output_kind: "null",
                trace_prefix: "t",
                output_user_data: "",
                output_properties: HashMap::new(),
            },
        )
        .unwrap_err();
        assert!(matches!(err, TraceError::Disabled));
        assert!(!registry.has_live_context("in"));
    }

    #[test]
    fn happy_path_installs_a_live_context() {
        let registry = Arc::new(TraceRegistry::new());
        let cfg = config(true);
        new_context(
            &registry,
            &cfg,
            &[],
            NewContextArgs {
                host_input: "in",
                output_kind: "null",
                trace_prefix: "t",
                output_user_data: "",
                output_properties: HashMap::new(),
            },
        )
        .unwrap();
        assert!(registry.has_live_context("in"));
    }

    #[test]
    fn recognized_sink_without_an_outer_instance_fails() {
        let registry = Arc::new(TraceRegistry::new());
        let cfg = config(true);
        let err = new_context(
            &registry,
            &cfg,
            &[],
            NewContextArgs {
                host_input: "in",
                output_kind: &cfg.telemetry_sink_name.clone(),
                trace_prefix: "t",
                output_user_data: "",
                output_properties: HashMap::new(),
            },
        )
        .unwrap_err();
        assert!(matches!(err, TraceError::ConfigurationMissing(_)));
        assert!(!registry.has_live_context("in"));
    }

    #[test]
    fn recognized_sink_copies_credentials_from_the_outer_instance() {
        let registry = Arc::new(TraceRegistry::new());
        let cfg = config(true);
        let mut props = HashMap::new();
        props.insert("api_key".to_string(), "secret".to_string());
        let outer: Vec<Arc<dyn Output>> =
            vec![Arc::new(RecordingOutput::new(cfg.telemetry_sink_name.clone(), props))];
        new_context(
            &registry,
            &cfg,
            &outer,
            NewContextArgs {
                host_input: "in",
                output_kind: &cfg.telemetry_sink_name.clone(),
                trace_prefix: "t",
                output_user_data: "",
                output_properties: HashMap::new(),
            },
        )
        .unwrap();
        assert!(registry.has_live_context("in"));
    }
}
