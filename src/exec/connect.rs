use crate::error::PlanResult;
use crate::model::Login;

use super::ExecutionData;

/// Opens (or reuses) the pooled connection a login maps to.
#[derive(Debug, Clone)]
pub struct ConnectStep {
    login: Login,
}

impl ConnectStep {
    pub fn new(login: Login) -> Self {
        Self { login }
    }

    pub fn login(&self) -> &Login {
        &self.login
    }

    pub(crate) fn execute(&self, data: &mut ExecutionData) -> PlanResult<()> {
        data.open_connection(self.login.key, self.login.datasource.as_deref())
    }
}
