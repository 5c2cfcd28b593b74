use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Session state shipped with a task.
///
/// System properties tune the worker (see `nexec_common::config`); catalog
/// properties are forwarded to the connector whose id matches the catalog.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionContext {
    pub user: String,
    pub source: Option<String>,
    pub catalog: Option<String>,
    pub schema: Option<String>,
    pub time_zone_id: Option<String>,
    pub language: Option<String>,
    pub system_properties: BTreeMap<String, String>,
    pub catalog_properties: BTreeMap<String, BTreeMap<String, String>>,
}

impl SessionContext {
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            ..Self::default()
        }
    }

    pub fn with_catalog(mut self, catalog: impl Into<String>, schema: impl Into<String>) -> Self {
        self.catalog = Some(catalog.into());
        self.schema = Some(schema.into());
        self
    }

    pub fn with_time_zone(mut self, time_zone_id: impl Into<String>) -> Self {
        self.time_zone_id = Some(time_zone_id.into());
        self
    }

    pub fn with_system_property(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.system_properties.insert(name.into(), value.into());
        self
    }

    pub fn with_catalog_property(
        mut self,
        catalog: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.catalog_properties
            .entry(catalog.into())
            .or_default()
            .insert(name.into(), value.into());
        self
    }

    pub fn system_property(&self, name: &str) -> Option<&str> {
        self.system_properties.get(name).map(String::as_str)
    }

    /// Properties set for one catalog; empty when none were set.
    pub fn catalog_properties(&self, catalog: &str) -> BTreeMap<String, String> {
        self.catalog_properties
            .get(catalog)
            .cloned()
            .unwrap_or_default()
    }
}
