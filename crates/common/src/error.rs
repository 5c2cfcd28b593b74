use thiserror::Error;

/// Canonical nexec error taxonomy used across crates.
///
/// Every variant is a conversion-time failure: the whole conversion is
/// aborted and no partial plan is returned. None of them is retryable without
/// the caller correcting its inputs (registering a connector, fixing the
/// shuffle config, ...).
///
/// Classification guidance:
/// - [`NexecError::UnsupportedPlanNode`] / [`NexecError::UnsupportedType`] /
///   [`NexecError::UnresolvedFunction`]: the fragment uses something the native
///   runtime cannot express
/// - [`NexecError::ConnectorNotFound`]: scan references an unregistered connector
/// - [`NexecError::ColumnArityMismatch`]: column lists disagree with child layout
/// - [`NexecError::NoExchangeBoundary`] / [`NexecError::InvalidShuffleConfig`] /
///   [`NexecError::PartitionCountMismatch`]: batch-mode preconditions violated
/// - [`NexecError::InvalidConfig`]: converter/session configuration problems
/// - [`NexecError::Planning`]: malformed fragment shape discovered while converting
/// - [`NexecError::Unsupported`]: valid shape intentionally not handled
#[derive(Debug, Error)]
pub enum NexecError {
    /// No converter is registered for the node kind.
    #[error("unsupported plan node kind '{kind}' (node {node_id})")]
    UnsupportedPlanNode {
        /// Kind tag of the offending node.
        kind: String,
        /// Identifier of the offending node.
        node_id: String,
    },

    /// Type signature outside the supported type set.
    #[error("unsupported type: {0}")]
    UnsupportedType(String),

    /// No function in the catalog accepts the given argument types.
    #[error("unresolved function: {name}({signature})")]
    UnresolvedFunction {
        /// Normalized function name.
        name: String,
        /// Comma separated argument type signatures.
        signature: String,
    },

    /// Scan references a connector name missing from the registry.
    #[error("connector not found: '{connector}' (node {node_id})")]
    ConnectorNotFound {
        /// Connector name as referenced by the handle.
        connector: String,
        /// Scan node referencing it.
        node_id: String,
    },

    /// Column list length disagrees with the layout it has to match.
    #[error(
        "column arity mismatch at node {node_id}: expected {expected} columns, got {actual}"
    )]
    ColumnArityMismatch {
        /// Node whose column list is inconsistent.
        node_id: String,
        /// Arity required by the child/layout.
        expected: usize,
        /// Arity found on the node.
        actual: usize,
    },

    /// Batch conversion found no outermost repartitioning exchange.
    #[error("no exchange boundary to replace: fragment root {node_id} is a {kind} node")]
    NoExchangeBoundary {
        /// Root node id.
        node_id: String,
        /// Root node name.
        kind: String,
    },

    /// Shuffle configuration absent, malformed, or naming an unknown backend.
    #[error("invalid shuffle config: {0}")]
    InvalidShuffleConfig(String),

    /// Exchange and shuffle config disagree on the partition count.
    #[error(
        "partition count mismatch at exchange {node_id}: exchange declares {exchange}, shuffle config declares {config}"
    )]
    PartitionCountMismatch {
        /// Exchange node id.
        node_id: String,
        /// Partition count declared by the exchange.
        exchange: u32,
        /// Partition count declared by the shuffle config.
        config: u32,
    },

    /// Invalid or inconsistent converter/session configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Malformed fragment discovered during conversion.
    ///
    /// Examples:
    /// - exchange `inputs` not paired with its sources
    /// - filter predicate that is not boolean
    /// - reference to a column the child does not produce
    #[error("planning error: {0}")]
    Planning(String),

    /// Valid shape not implemented by the native runtime.
    #[error("unsupported: {0}")]
    Unsupported(String),
}

/// Standard nexec result alias.
pub type Result<T> = std::result::Result<T, NexecError>;
