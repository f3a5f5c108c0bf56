pub mod capability;
pub mod catalog;
pub mod compiler;
pub mod error;
pub mod executor;
pub mod identity;
pub mod probe;
pub mod render;
pub mod summary;

pub use capability::{AvailabilityChecker, Capability, CapabilityKind, SystemChecker};
pub use catalog::{referenced_capabilities, standard_groups};
pub use compiler::{
    check_sink_location, validate_sink, CompileOptions, ProgressEvent, ReportCompiler, RunState,
};
pub use error::CompileError;
pub use executor::ProbeExecutor;
pub use identity::{collect_run_identity, RunIdentity};
pub use probe::{
    declared_probe_count, Operation, OutcomeKind, Precondition, PreconditionCheck,
    ProbeDefinition, ProbeGroup, ProbeOutcome, ProbeResult, FAILED_SENTINEL, NO_OUTPUT_SENTINEL,
};
pub use render::Layout;
pub use summary::{write_summary, CompileSummary};
