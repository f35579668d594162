//! Compile-time entry points used by the declarative model loader.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::builder::{
    select_statement_builder, BuildContext, OperationType, StatementBuilder, StatementRequest,
    WriteSpec,
};
use crate::config::EngineConfig;
use crate::driver::ConnectionPool;
use crate::error::{PlanError, PlanResult};
use crate::exec::{ConnectStep, ExecutionStep};
use crate::extract::ExtensionRegistry;
use crate::join_tree::JoinTree;
use crate::model::{ColumnMetadataCache, Join, Login, ServerKey, Table};
use crate::rules::{RuleDefinition, RuleEvaluator};
use crate::statement::{LobColumnInitializer, OracleLobInitializer};

/// Owns everything plan compilation shares: configuration, the extension
/// registry, the LOB initializer, column metadata and the server-to-login mapping.
///
/// Compiled steps keep no reference to the compiler.
pub struct PlanCompiler {
    config: EngineConfig,
    pool: Arc<dyn ConnectionPool>,
    registry: ExtensionRegistry,
    lob_initializer: Arc<dyn LobColumnInitializer>,
    metadata: ColumnMetadataCache,
    logins: HashMap<ServerKey, Login>,
}

impl fmt::Debug for PlanCompiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlanCompiler")
            .field("config", &self.config)
            .field("logins", &self.logins)
            .field("cached_tables", &self.metadata.len())
            .finish()
    }
}

impl PlanCompiler {
    pub fn new(config: EngineConfig, pool: Arc<dyn ConnectionPool>) -> Self {
        let metadata = ColumnMetadataCache::new(config.metadata_cache_capacity);
        Self {
            config,
            pool,
            registry: ExtensionRegistry::with_builtins(),
            lob_initializer: Arc::new(OracleLobInitializer),
            metadata,
            logins: HashMap::new(),
        }
    }

    pub fn with_registry(mut self, registry: ExtensionRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_lob_initializer(mut self, initializer: Arc<dyn LobColumnInitializer>) -> Self {
        self.lob_initializer = initializer;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &ExtensionRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ExtensionRegistry {
        &mut self.registry
    }

    pub fn metadata(&self) -> &ColumnMetadataCache {
        &self.metadata
    }

    /// Map the login's server to it. Logins without a datasource get the
    /// configured default.
    pub fn register_login(&mut self, mut login: Login) {
        if login.datasource.is_none() {
            login.datasource = self.config.default_datasource.clone();
        }
        tracing::debug!("Registered {} for server {}", login.key, login.server);
        self.logins.insert(login.server.clone(), login);
    }

    /// Login of the server `table` lives on.
    pub fn login_for(&self, table: &Table) -> PlanResult<&Login> {
        self.logins.get(&table.server).ok_or_else(|| {
            PlanError::Config(format!(
                "no connection mapping for server {} (table {})",
                table.server, table.name
            ))
        })
    }

    pub fn build_join_tree(&self, joins: &[Join]) -> JoinTree {
        JoinTree::build(joins)
    }

    pub fn compile_rule_evaluator(&self, rules: &[RuleDefinition]) -> PlanResult<RuleEvaluator> {
        RuleEvaluator::compile(rules, &self.registry)
    }

    pub fn select_statement_builder(
        &self,
        op: OperationType,
        table: &Table,
        allow_inserts: bool,
    ) -> PlanResult<StatementBuilder> {
        select_statement_builder(op, table, self.login_for(table)?, allow_inserts)
    }

    pub fn connect_step(&self, table: &Table) -> PlanResult<ConnectStep> {
        Ok(ConnectStep::new(self.login_for(table)?.clone()))
    }

    pub fn build_context(&self) -> BuildContext<'_> {
        BuildContext {
            pool: self.pool.as_ref(),
            metadata: &self.metadata,
            config: &self.config,
            lob_initializer: Arc::clone(&self.lob_initializer),
        }
    }

    /// Select a builder for `op` on `table` and compile `request` with it.
    pub fn compile(
        &self,
        op: OperationType,
        table: &Table,
        allow_inserts: bool,
        request: impl Into<StatementRequest>,
    ) -> PlanResult<ExecutionStep> {
        let builder = self.select_statement_builder(op, table, allow_inserts)?;
        let step = builder.build(&request.into(), &self.build_context())?;
        tracing::info!("Compiled {} step for {}", step.name(), table.name);
        Ok(step)
    }

    /// Compile a positioned UPDATE or DELETE on `table`.
    pub fn compile_positioned(
        &self,
        op: OperationType,
        table: &Table,
        spec: &WriteSpec,
    ) -> PlanResult<ExecutionStep> {
        let builder = self.select_statement_builder(op, table, false)?;
        let step = builder.build_positioned(spec, &self.build_context())?;
        tracing::info!("Compiled positioned {:?} for {}", op, table.name);
        Ok(step)
    }
}
