use thiserror::Error;

/// The six error kinds the spec's §7 error handling design names. Control
/// surface entry points return these as `Result::Err`; stage entry points
/// never propagate them to the host data path (see `trace::hooks`) — a
/// failed trace emission must never fail the host data path.
#[derive(Debug, Error)]
pub enum TraceError {
    #[error("tracing is disabled globally")]
    Disabled,
    #[error("failed to allocate trace context: {0}")]
    ResourceExhaustion(String),
    #[error("recognized sink has no matching instance in the outer engine: {0}")]
    ConfigurationMissing(String),
    #[error("could not route the trace emitter to its output: {0}")]
    RoutingFailure(String),
    #[error("malformed packed-records buffer: {0}")]
    DecodeFailure(#[from] rmpv::decode::Error),
    #[error("context is being torn down")]
    RaceWithDestroy,
}
