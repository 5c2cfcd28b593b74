use std::sync::Arc;

use nexec_common::{ConverterConfig, PlanNodeId, QueryId, Result};
use nexec_protocol::{PlanFragment, SessionContext};
use nexec_shuffle::{global_shuffle_backend_registry, ShuffleBackendRegistry, ShuffleConfig};
use tracing::{debug, info_span, warn};

use crate::batch::{augment_batch_plan, BatchShuffleSpec};
use crate::connectors::{global_connector_registry, ConnectorRegistry};
use crate::dispatch::{ConversionContext, ExecutionMode, NodeConverter, NodeConverterRegistry};
use crate::explain::explain_native;
use crate::functions::FunctionCatalog;
use crate::plan_node::PlanNode;

/// Result of converting one fragment.
#[derive(Debug, Clone, PartialEq)]
pub struct NativeQueryPlan {
    /// Root of the native tree.
    pub plan: PlanNode,
    /// Scan node the task's splits are assigned to, if the fragment scans.
    pub scan_node_id: Option<PlanNodeId>,
    /// Every converted scan, in post-order.
    pub scan_node_ids: Vec<PlanNodeId>,
}

/// Converts protocol plan fragments into native plans.
///
/// Holds read-only registries; one converter can serve concurrent
/// conversions from several threads.
#[derive(Debug)]
pub struct NativePlanConverter {
    config: ConverterConfig,
    converters: NodeConverterRegistry,
    functions: FunctionCatalog,
    connectors: Arc<ConnectorRegistry>,
    shuffle_backends: Arc<ShuffleBackendRegistry>,
}

impl Default for NativePlanConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl NativePlanConverter {
    /// Converter with built-in converters and functions over the
    /// process-wide connector and shuffle backend registries.
    pub fn new() -> Self {
        Self {
            config: ConverterConfig::default(),
            converters: NodeConverterRegistry::with_builtins(),
            functions: FunctionCatalog::with_builtins(),
            connectors: global_connector_registry(),
            shuffle_backends: global_shuffle_backend_registry(),
        }
    }

    pub fn with_config(mut self, config: ConverterConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_connector_registry(mut self, connectors: Arc<ConnectorRegistry>) -> Self {
        self.connectors = connectors;
        self
    }

    pub fn with_shuffle_backend_registry(
        mut self,
        shuffle_backends: Arc<ShuffleBackendRegistry>,
    ) -> Self {
        self.shuffle_backends = shuffle_backends;
        self
    }

    pub fn with_function_catalog(mut self, functions: FunctionCatalog) -> Self {
        self.functions = functions;
        self
    }

    /// Register or replace the converter for a protocol node kind.
    ///
    /// Returns `true` when an existing converter was replaced.
    pub fn register_converter(&self, kind: &str, converter: Arc<dyn NodeConverter>) -> bool {
        self.converters.register(kind, converter)
    }

    pub fn config(&self) -> &ConverterConfig {
        &self.config
    }

    pub fn converters(&self) -> &NodeConverterRegistry {
        &self.converters
    }

    pub fn connectors(&self) -> &Arc<ConnectorRegistry> {
        &self.connectors
    }

    pub fn shuffle_backends(&self) -> &Arc<ShuffleBackendRegistry> {
        &self.shuffle_backends
    }

    /// Convert a fragment for streaming execution.
    pub fn to_native_query_plan(
        &self,
        fragment: &PlanFragment,
        session: &SessionContext,
        query_id: &str,
    ) -> Result<NativeQueryPlan> {
        let query_id = QueryId::new(query_id);
        let _span = info_span!(
            "fragment_conversion",
            fragment_id = %fragment.id,
            query_id = %query_id,
            query = query_id.query_part(),
            mode = %ExecutionMode::Streaming
        )
        .entered();
        self.convert(fragment, session, &query_id, ExecutionMode::Streaming)
            .map(|(plan, _)| plan)
            .map_err(|e| {
                warn!(fragment_id = %fragment.id, error = %e, "fragment conversion failed");
                e
            })
    }

    /// Convert a fragment for batch execution, replacing its root
    /// repartitioning exchange with a shuffle write through `shuffle_name`.
    pub fn to_batch_native_query_plan(
        &self,
        fragment: &PlanFragment,
        session: &SessionContext,
        query_id: &str,
        shuffle_name: &str,
        shuffle_config: Option<&ShuffleConfig>,
    ) -> Result<NativeQueryPlan> {
        let query_id = QueryId::new(query_id);
        let _span = info_span!(
            "fragment_conversion",
            fragment_id = %fragment.id,
            query_id = %query_id,
            query = query_id.query_part(),
            mode = %ExecutionMode::Batch,
            shuffle = shuffle_name
        )
        .entered();
        self.convert(fragment, session, &query_id, ExecutionMode::Batch)
            .and_then(|(mut converted, config)| {
                let spec = BatchShuffleSpec {
                    shuffle_name,
                    shuffle_config,
                    local_partitions: config.local_shuffle_partitions,
                };
                converted.plan =
                    augment_batch_plan(converted.plan, spec, &self.shuffle_backends)?;
                debug!(plan = %explain_native(&converted.plan), "augmented batch plan");
                Ok(converted)
            })
            .map_err(|e| {
                warn!(fragment_id = %fragment.id, error = %e, "fragment conversion failed");
                e
            })
    }

    fn convert(
        &self,
        fragment: &PlanFragment,
        session: &SessionContext,
        query_id: &QueryId,
        mode: ExecutionMode,
    ) -> Result<(NativeQueryPlan, ConverterConfig)> {
        let config = self.config.with_overrides(
            session
                .system_properties
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str())),
        )?;
        let mut ctx = ConversionContext::new(
            query_id,
            session,
            &config,
            &self.converters,
            &self.connectors,
            &self.functions,
            mode,
        );
        let plan = ctx.convert(&fragment.root)?;
        let scan_node_ids = ctx.into_scan_node_ids();
        let scan_node_id = fragment
            .table_scan_scheduling_order
            .iter()
            .find_map(|id| scan_node_ids.iter().find(|s| s.as_str() == id.as_str()))
            .or_else(|| scan_node_ids.first())
            .cloned();
        debug!(
            plan = %explain_native(&plan),
            scan_node_id = ?scan_node_id,
            "converted fragment"
        );
        Ok((
            NativeQueryPlan {
                plan,
                scan_node_id,
                scan_node_ids,
            },
            config,
        ))
    }
}
