//! Kind-tag dispatch from protocol plan nodes to native plan nodes.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

use nexec_common::{ConverterConfig, NexecError, PlanNodeId, QueryId, Result};
use nexec_protocol as proto;
use nexec_protocol::SessionContext;
use tracing::debug;

use crate::batch::synthesize_id;
use crate::connectors::ConnectorRegistry;
use crate::expressions::ExpressionTranslator;
use crate::functions::FunctionCatalog;
use crate::plan_node::PlanNode;

/// Converts one protocol node kind into a native node.
///
/// Implementations convert their sources through
/// [`ConversionContext::convert`] first and must return a node carrying the
/// input node's id.
pub trait NodeConverter: Send + Sync {
    fn convert(&self, node: &proto::PlanNode, ctx: &mut ConversionContext<'_>)
        -> Result<PlanNode>;
}

impl<F> NodeConverter for F
where
    F: Fn(&proto::PlanNode, &mut ConversionContext<'_>) -> Result<PlanNode> + Send + Sync,
{
    fn convert(
        &self,
        node: &proto::PlanNode,
        ctx: &mut ConversionContext<'_>,
    ) -> Result<PlanNode> {
        self(node, ctx)
    }
}

/// Registry mapping protocol kind tags to converters.
#[derive(Default)]
pub struct NodeConverterRegistry {
    inner: RwLock<HashMap<String, Arc<dyn NodeConverter>>>,
}

impl std::fmt::Debug for NodeConverterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeConverterRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

impl NodeConverterRegistry {
    /// Registry with converters for every built-in protocol node kind.
    pub fn with_builtins() -> Self {
        let registry = Self::default();
        crate::converters::register_builtins(&registry);
        registry
    }

    /// Register or replace the converter for `kind`.
    ///
    /// Returns `true` when an existing converter was replaced.
    pub fn register(&self, kind: impl Into<String>, converter: Arc<dyn NodeConverter>) -> bool {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(kind.into(), converter)
            .is_some()
    }

    /// Register a converter function for `kind`.
    pub fn register_fn<F>(&self, kind: impl Into<String>, f: F) -> bool
    where
        F: Fn(&proto::PlanNode, &mut ConversionContext<'_>) -> Result<PlanNode>
            + Send
            + Sync
            + 'static,
    {
        self.register(kind, Arc::new(f))
    }

    /// Remove the converter for `kind`.
    ///
    /// Returns `true` when a converter was removed.
    pub fn deregister(&self, kind: &str) -> bool {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(kind)
            .is_some()
    }

    pub fn resolve(&self, kind: &str) -> Option<Arc<dyn NodeConverter>> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(kind)
            .cloned()
    }

    /// Registered kinds in sorted order.
    pub fn kinds(&self) -> Vec<String> {
        let mut kinds = self
            .inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect::<Vec<_>>();
        kinds.sort();
        kinds
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Pipelined execution reading remote sources over the exchange protocol.
    Streaming,
    /// Stage-at-a-time execution over a shuffle backend.
    Batch,
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionMode::Streaming => write!(f, "streaming"),
            ExecutionMode::Batch => write!(f, "batch"),
        }
    }
}

/// State of one fragment conversion.
pub struct ConversionContext<'a> {
    query_id: &'a QueryId,
    session: &'a SessionContext,
    config: &'a ConverterConfig,
    converters: &'a NodeConverterRegistry,
    connectors: &'a ConnectorRegistry,
    functions: &'a FunctionCatalog,
    mode: ExecutionMode,
    scan_node_ids: Vec<PlanNodeId>,
    /// Ids of the fragment plus every id synthesized so far.
    taken_ids: HashSet<String>,
    depth: usize,
}

impl<'a> ConversionContext<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        query_id: &'a QueryId,
        session: &'a SessionContext,
        config: &'a ConverterConfig,
        converters: &'a NodeConverterRegistry,
        connectors: &'a ConnectorRegistry,
        functions: &'a FunctionCatalog,
        mode: ExecutionMode,
    ) -> Self {
        Self {
            query_id,
            session,
            config,
            converters,
            connectors,
            functions,
            mode,
            scan_node_ids: Vec::new(),
            taken_ids: HashSet::new(),
            depth: 0,
        }
    }

    /// Convert `node` with the converter registered for its kind.
    pub fn convert(&mut self, node: &proto::PlanNode) -> Result<PlanNode> {
        let kind = node.kind();
        let converter =
            self.converters
                .resolve(kind)
                .ok_or_else(|| NexecError::UnsupportedPlanNode {
                    kind: kind.to_string(),
                    node_id: node.id().to_string(),
                })?;

        if self.depth >= self.config.max_plan_depth {
            return Err(NexecError::Planning(format!(
                "plan nesting exceeds {} levels at node '{}'",
                self.config.max_plan_depth,
                node.id()
            )));
        }
        if self.depth == 0 {
            self.taken_ids
                .extend(node.node_ids().into_iter().map(str::to_string));
        }
        self.depth += 1;
        let converted = converter.convert(node, self);
        self.depth -= 1;
        let converted = converted?;

        if converted.id().as_str() != node.id() {
            return Err(NexecError::Planning(format!(
                "converter for '{kind}' returned node '{}' for input node '{}'",
                converted.id(),
                node.id()
            )));
        }
        debug!(
            query_id = %self.query_id,
            node_id = %node.id(),
            kind,
            operator = converted.name(),
            "converted plan node"
        );
        Ok(converted)
    }

    /// Convert `nodes` in order.
    pub fn convert_all<'n>(
        &mut self,
        nodes: impl IntoIterator<Item = &'n proto::PlanNode>,
    ) -> Result<Vec<PlanNode>> {
        nodes.into_iter().map(|n| self.convert(n)).collect()
    }

    pub fn translator(&self) -> ExpressionTranslator<'a> {
        ExpressionTranslator::new(self.functions, &self.config.function_namespace)
    }

    /// Fresh `<base>.<suffix>` id for a node with no protocol counterpart.
    pub fn synthesize_id(&mut self, base: &PlanNodeId, suffix: &str) -> PlanNodeId {
        synthesize_id(base, suffix, &mut self.taken_ids)
    }

    /// Record a scan needing split assignment.
    pub fn record_scan(&mut self, id: PlanNodeId) {
        self.scan_node_ids.push(id);
    }

    /// Scans recorded so far, in post-order.
    pub fn scan_node_ids(&self) -> &[PlanNodeId] {
        &self.scan_node_ids
    }

    pub fn into_scan_node_ids(self) -> Vec<PlanNodeId> {
        self.scan_node_ids
    }

    pub fn query_id(&self) -> &QueryId {
        self.query_id
    }

    pub fn session(&self) -> &'a SessionContext {
        self.session
    }

    pub fn config(&self) -> &'a ConverterConfig {
        self.config
    }

    pub fn connectors(&self) -> &'a ConnectorRegistry {
        self.connectors
    }

    pub fn functions(&self) -> &'a FunctionCatalog {
        self.functions
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// Current recursion depth; the root converts at depth 1.
    pub fn depth(&self) -> usize {
        self.depth
    }
}
