pub mod complete_relocation;
pub mod emit_stubs;
pub mod start_build;
pub mod transform_sources;

/// Represents a phase in the relocation process.
pub trait RelocationPhase: Sized {}

pub use {
    complete_relocation::CompleteRelocation,
    emit_stubs::EmitStubs,
    start_build::StartBuild,
    transform_sources::TransformSources,
};
