use datalink_activity::Actor;
use datalink_auth::Principal;
use datalink_core::UserId;

/// The authenticated caller, resolved from storage for every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    principal: Principal,
    department: Option<String>,
}

impl CurrentUser {
    pub fn new(principal: Principal, department: Option<String>) -> Self {
        Self { principal, department }
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn user_id(&self) -> UserId {
        self.principal.user_id
    }

    pub fn name(&self) -> &str {
        &self.principal.name
    }

    /// Department name, for display and activity attribution.
    pub fn department(&self) -> Option<&str> {
        self.department.as_deref()
    }

    pub fn actor(&self) -> Actor {
        Actor {
            user_id: Some(self.principal.user_id),
            name: Some(self.principal.name.clone()),
            department: self.department.clone(),
        }
    }
}

/// Correlation id of the current request (`x-request-id`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);
