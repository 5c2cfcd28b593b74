//! Connector registry and resolved connector handles.
//!
//! A connector is registered under a name and maps to a connector type; two
//! names may share a type (`hive` and `hive-plus` both resolving to `hive`).
//! Scans resolve their handles here and fail hard when a name is unknown.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use arrow_schema::DataType;
use nexec_common::{NexecError, PlanNodeId, Result};
use nexec_protocol::{ColumnHandle, SessionContext, TableHandle};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::parse_type;

/// Registry mapping connector names to connector types.
///
/// Registration and removal take the write lock and must be ordered against
/// conversions by the caller; conversions only read.
#[derive(Default)]
pub struct ConnectorRegistry {
    inner: RwLock<HashMap<String, String>>,
}

impl std::fmt::Debug for ConnectorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectorRegistry")
            .field("connectors", &self.names())
            .finish()
    }
}

impl ConnectorRegistry {
    /// Register or re-point a connector name.
    ///
    /// Returns `true` when an existing registration was replaced.
    pub fn register_connector(
        &self,
        name: impl Into<String>,
        connector_type: impl Into<String>,
    ) -> bool {
        let name = name.into();
        let connector_type = connector_type.into();
        debug!(connector = %name, %connector_type, "registering connector");
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, connector_type)
            .is_some()
    }

    /// Remove a connector name.
    ///
    /// Returns `true` when the name was registered.
    pub fn unregister_connector(&self, name: &str) -> bool {
        debug!(connector = %name, "unregistering connector");
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .is_some()
    }

    /// Connector type registered under `name`.
    pub fn resolve(&self, name: &str) -> Option<String> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Like [`ConnectorRegistry::resolve`] but fails with
    /// [`NexecError::ConnectorNotFound`] naming the referencing node.
    pub fn require(&self, name: &str, node_id: &PlanNodeId) -> Result<String> {
        self.resolve(name)
            .ok_or_else(|| NexecError::ConnectorNotFound {
                connector: name.to_string(),
                node_id: node_id.to_string(),
            })
    }

    /// Registered connector names in sorted order.
    pub fn names(&self) -> Vec<String> {
        let mut names = self
            .inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect::<Vec<_>>();
        names.sort();
        names
    }
}

fn global_registry() -> &'static Arc<ConnectorRegistry> {
    static REGISTRY: OnceLock<Arc<ConnectorRegistry>> = OnceLock::new();
    REGISTRY.get_or_init(|| Arc::new(ConnectorRegistry::default()))
}

/// Return the process-wide connector registry.
pub fn global_connector_registry() -> Arc<ConnectorRegistry> {
    Arc::clone(global_registry())
}

/// Register a connector in the process-wide registry.
///
/// Returns `true` when an existing registration was replaced.
pub fn register_global_connector(
    name: impl Into<String>,
    connector_type: impl Into<String>,
) -> bool {
    global_registry().register_connector(name, connector_type)
}

/// Remove a connector from the process-wide registry.
///
/// Returns `true` when the name was registered.
pub fn unregister_global_connector(name: &str) -> bool {
    global_registry().unregister_connector(name)
}

/// Table handle with its connector resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NativeTableHandle {
    /// Catalog the table belongs to; keys the session's catalog properties.
    pub connector_id: String,
    /// Name the fragment referenced, possibly an alias.
    pub connector_name: String,
    /// Registered connector type.
    pub connector_type: String,
    pub schema_name: String,
    pub table_name: String,
    /// Connector specific fields, forwarded untouched.
    pub properties: serde_json::Map<String, serde_json::Value>,
    /// Session properties set for `connector_id`.
    pub session_properties: BTreeMap<String, String>,
}

impl NativeTableHandle {
    pub fn resolve(
        handle: &TableHandle,
        node_id: &PlanNodeId,
        registry: &ConnectorRegistry,
        session: &SessionContext,
    ) -> Result<Self> {
        let connector = &handle.connector_handle;
        let connector_type = registry.require(&connector.connector_name, node_id)?;
        Ok(Self {
            connector_id: handle.connector_id.clone(),
            connector_name: connector.connector_name.clone(),
            connector_type,
            schema_name: connector.schema_name.clone(),
            table_name: connector.table_name.clone(),
            properties: connector.properties.clone(),
            session_properties: session.catalog_properties(&handle.connector_id),
        })
    }

    /// `schema.table` for logs and explain output.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema_name, self.table_name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NativeColumnHandle {
    pub connector_name: String,
    pub connector_type: String,
    pub name: String,
    pub data_type: DataType,
    pub properties: serde_json::Map<String, serde_json::Value>,
}

impl NativeColumnHandle {
    pub fn resolve(
        handle: &ColumnHandle,
        node_id: &PlanNodeId,
        registry: &ConnectorRegistry,
    ) -> Result<Self> {
        Ok(Self {
            connector_type: registry.require(&handle.connector_name, node_id)?,
            connector_name: handle.connector_name.clone(),
            name: handle.name.clone(),
            data_type: parse_type(&handle.type_signature)?,
            properties: handle.properties.clone(),
        })
    }
}
