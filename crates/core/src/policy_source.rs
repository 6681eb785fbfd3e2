use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::policy::PolicyTables;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("policy source unavailable: {0}")]
pub struct PolicySourceError(pub String);

/// Supplier of the SLA policy and escalation rule tables. Read at least once per sweep.
#[async_trait]
pub trait PolicySource: Send + Sync {
    async fn load(&self) -> Result<PolicyTables, PolicySourceError>;
}

/// Tables held in process, replaceable at runtime.
#[derive(Clone)]
pub struct StaticPolicySource {
    tables: Arc<RwLock<PolicyTables>>,
}

impl StaticPolicySource {
    pub fn new(tables: PolicyTables) -> Self {
        Self { tables: Arc::new(RwLock::new(tables)) }
    }

    pub fn replace(&self, tables: PolicyTables) {
        match self.tables.write() {
            Ok(mut current) => *current = tables,
            Err(poisoned) => *poisoned.into_inner() = tables,
        }
    }
}

#[async_trait]
impl PolicySource for StaticPolicySource {
    async fn load(&self) -> Result<PolicyTables, PolicySourceError> {
        match self.tables.read() {
            Ok(tables) => Ok(tables.clone()),
            Err(poisoned) => Ok(poisoned.into_inner().clone()),
        }
    }
}
