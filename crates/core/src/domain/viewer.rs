use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Manager,
    Agent,
    Customer,
    /// Any role the auth collaborator hands us that this service does not know.
    Other(String),
}

impl Role {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Admin => "admin",
            Self::Manager => "manager",
            Self::Agent => "agent",
            Self::Customer => "customer",
            Self::Other(value) => value.as_str(),
        }
    }

    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "admin" => Self::Admin,
            "manager" => Self::Manager,
            "agent" => Self::Agent,
            "customer" => Self::Customer,
            _ => Self::Other(value.trim().to_string()),
        }
    }
}

/// The caller of a read path. Immutable for the duration of a request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewer {
    pub id: String,
    pub role: Role,
    pub zone: String,
    pub name: String,
    pub customer_identity: Option<String>,
}

impl Viewer {
    pub fn new(
        id: impl Into<String>,
        role: Role,
        zone: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            role,
            zone: zone.into(),
            name: name.into(),
            customer_identity: None,
        }
    }

    pub fn with_customer_identity(mut self, identity: impl Into<String>) -> Self {
        self.customer_identity = Some(identity.into());
        self
    }
}
