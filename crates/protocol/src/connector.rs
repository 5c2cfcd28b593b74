use serde::{Deserialize, Serialize};

/// Table reference carried by a scan node.
///
/// `connector_id` is the catalog the table belongs to; the connector handle's
/// `@type` names the connector implementation the coordinator used, which the
/// worker resolves through its connector registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableHandle {
    pub connector_id: String,
    pub connector_handle: ConnectorTableHandle,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorTableHandle {
    /// Registered connector name (may be an alias such as `hive-plus`).
    #[serde(rename = "@type")]
    pub connector_name: String,
    pub schema_name: String,
    pub table_name: String,
    /// Connector specific payload, passed through untouched.
    #[serde(flatten)]
    pub properties: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnHandle {
    #[serde(rename = "@type")]
    pub connector_name: String,
    pub name: String,
    #[serde(rename = "type")]
    pub type_signature: String,
    #[serde(flatten)]
    pub properties: serde_json::Map<String, serde_json::Value>,
}
