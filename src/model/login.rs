//! Connection mapping supplied by the plan compiler for each server.

use serde::{Deserialize, Serialize};

use super::table::ServerKey;
use crate::driver::{ConnectionKey, Dialect};

/// How a plan reaches one server: the datasource to request from the pool, the key
/// the connection is registered under, and the dialect its driver speaks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Login {
    pub key: ConnectionKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datasource: Option<String>,
    pub server: ServerKey,
    pub dialect: Dialect,
}

impl Login {
    pub fn new(key: ConnectionKey, server: ServerKey) -> Self {
        let dialect = Dialect::from_driver_name(&server.driver);
        Self {
            key,
            datasource: None,
            server,
            dialect,
        }
    }

    pub fn with_datasource(mut self, datasource: &str) -> Self {
        self.datasource = Some(datasource.to_string());
        self
    }
}
