//! Back-end tables and the server identity used to group them onto connections.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of a physical database server: driver plus server name.
///
/// Tables with equal keys can be reached through one connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServerKey {
    pub driver: String,
    pub server: String,
}

impl ServerKey {
    pub fn new(driver: &str, server: &str) -> Self {
        Self {
            driver: driver.to_string(),
            server: server.to_string(),
        }
    }
}

impl fmt::Display for ServerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.driver, self.server)
    }
}

/// A back-end table as described by the object-store mapping.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    /// Schema/owner qualifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    pub server: ServerKey,
}

impl Table {
    pub fn new(name: &str, server: ServerKey) -> Self {
        Self {
            name: name.to_string(),
            origin: None,
            alias: None,
            server,
        }
    }

    pub fn with_origin(mut self, origin: &str) -> Self {
        self.origin = Some(origin.to_string());
        self
    }

    pub fn with_alias(mut self, alias: &str) -> Self {
        self.alias = Some(alias.to_string());
        self
    }

    /// Name as written in a FROM/INTO clause, schema-qualified when known.
    pub fn qualified_name(&self) -> String {
        match &self.origin {
            Some(origin) => format!("{}.{}", origin, self.name),
            None => self.name.clone(),
        }
    }

    /// Name used to qualify column references (alias when present).
    pub fn reference(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    /// FROM-clause entry: qualified name followed by the alias, if any.
    pub fn from_clause_entry(&self) -> String {
        match &self.alias {
            Some(alias) => format!("{} {}", self.qualified_name(), alias),
            None => self.qualified_name(),
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.from_clause_entry())
    }
}
