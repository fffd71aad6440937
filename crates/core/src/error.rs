//! Error types shared across the pipeline runtime.
//!
//! Every failure mode the engine can surface is a variant here; nothing is
//! recovered in-core. Frontends decide how to present them.

use thiserror::Error;

/// Convenience result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Error type for the pipeline runtime.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A kind name did not resolve against the registry.
    #[error("Unknown kind '{0}'")]
    UnknownKind(String),

    /// A rank name did not resolve against the registry.
    #[error("Unknown rank '{0}'")]
    UnknownRank(String),

    /// A container name did not resolve against the pipeline schema.
    #[error("Unknown container '{0}'")]
    UnknownContainer(String),

    /// A pipe type name did not resolve against the registry.
    #[error("Unknown pipe '{0}'")]
    UnknownPipe(String),

    /// A step name did not resolve against the pipeline.
    #[error("Unknown step '{0}'")]
    UnknownStep(String),

    /// A pipe declaration was recognized but internally inconsistent
    /// (wrong container count, unknown inner pass, ...).
    #[error("Invalid pipe '{pipe}': {reason}")]
    InvalidPipe { pipe: String, reason: String },

    /// An extension library name did not resolve against the registry's
    /// bundles.
    #[error("Unknown extension library '{0}'")]
    UnknownLibrary(String),

    /// An inner pass of a compound pipe failed at run time.
    #[error("Pass '{pass}' failed: {reason}")]
    PassFailed { pass: String, reason: String },

    /// A contract rule whose path arity or kinds are internally inconsistent.
    #[error("Invalid contract: {0}")]
    InvalidContract(String),

    /// A target string could not be parsed, or its path arity does not match
    /// its kind's rank.
    #[error("Invalid target '{spec}': {reason}")]
    InvalidTarget { spec: String, reason: String },

    /// The planner could not derive a needed input.
    #[error("Unsatisfiable goal: missing '{target}' in container '{container}' at step '{step}'")]
    UnsatisfiableGoal { step: String, container: String, target: String },

    /// A pipe reported an error; the cause is passed through untouched.
    #[error("Pipe '{pipe}' failed: {cause}")]
    PipeFailed {
        pipe: String,
        #[source]
        cause: Box<PipelineError>,
    },

    /// A pipe referenced a container whose type does not accept the kinds its
    /// contract predicts, or an artifact of an unaccepted kind was inserted.
    #[error("Container '{container}' of type '{container_type}' does not accept kind '{kind}'")]
    ContainerTypeMismatch { container: String, container_type: String, kind: String },

    /// A global was not registered under that name, or its stored type does
    /// not match the requested one.
    #[error("Global '{0}' not found or has an unexpected type")]
    GlobalNotFound(String),

    /// A container or global failed to serialize.
    #[error("Serialization of '{subject}' failed: {reason}")]
    SerializationFailed { subject: String, reason: String },

    /// A container or global failed to deserialize.
    #[error("Deserialization of '{subject}' failed: {reason}")]
    DeserializationFailed { subject: String, reason: String },

    /// A pipe produced containers that contradict its own contract.
    /// Fatal in debug builds; downgraded to a run warning in release.
    #[error("Pipe '{pipe}' violated its contract: {reason}")]
    PipeContractViolation { pipe: String, reason: String },

    /// The run was cancelled through the cooperative cancel token.
    #[error("Run cancelled")]
    Cancelled,
}
