use serde::{Deserialize, Serialize};

/// Platform-wide role carried by every account. Stored as text; any value
/// outside this set fails authentication rather than mapping to a default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Patient,
    Doctor,
    Operator,
    Admin,
    Superadmin,
}

impl Role {
    pub fn parse(value: &str) -> Option<Role> {
        match value {
            "patient" => Some(Role::Patient),
            "doctor" => Some(Role::Doctor),
            "operator" => Some(Role::Operator),
            "admin" => Some(Role::Admin),
            "superadmin" => Some(Role::Superadmin),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Patient => "patient",
            Role::Doctor => "doctor",
            Role::Operator => "operator",
            Role::Admin => "admin",
            Role::Superadmin => "superadmin",
        }
    }

    /// Staff roles may close conversations and act across rooms they
    /// did not create.
    pub fn is_staff(&self) -> bool {
        matches!(self, Role::Operator | Role::Admin | Role::Superadmin)
    }
}

/// The authenticated caller, resolved from a verified token plus a live
/// row in `users`.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub role: Role,
}

/// Compact user view embedded in message and attachment payloads.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserTiny {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
}
