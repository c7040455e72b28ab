//! The per-input trace sub-pipeline: lifecycle-managed, refcounted,
//! concurrently-teardown-safe tracing attached to a host data-processing
//! input. See `crate::engine` for the embeddable pipeline this module
//! plugs into, and `SPEC_FULL.md` / `DESIGN.md` at the repository root for
//! the design this crate implements.

pub mod context;
pub mod encoder;
pub mod error;
pub mod event;
pub mod hooks;
pub mod registry;

pub use context::{new_context, NewContextArgs};
pub use encoder::{encode_envelope, EnvelopeFields, EnvelopeKind};
pub use error::TraceError;
pub use event::TraceEvent;
pub use hooks::{on_filter, on_input, on_pre_output, TRACE_TAG};
pub use registry::{LimitKind, TraceRegistry};
