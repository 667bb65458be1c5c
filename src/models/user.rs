use serde::{Deserialize, Serialize};

/// Caller role as asserted by the identity service. The core trusts it
/// verbatim; credential checks happen before the token is minted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Passenger,
    Driver,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub name: String,
    pub phone: String,
    pub role: Role,
    pub exp: usize,
}

impl Claims {
    pub fn is_driver(&self) -> bool {
        self.role == Role::Driver
    }
}
