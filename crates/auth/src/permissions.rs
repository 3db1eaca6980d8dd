//! Permission model: a (module, level) pair, optionally scoped to a department.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use datalink_core::{DepartmentId, DomainError, PermissionId};

/// Operation level. Levels are cumulative: a higher level satisfies any lower one.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PermissionLevel {
    Read = 1,
    Write = 2,
    Admin = 3,
    SuperAdmin = 4,
}

impl PermissionLevel {
    pub const ALL: [PermissionLevel; 4] = [
        PermissionLevel::Read,
        PermissionLevel::Write,
        PermissionLevel::Admin,
        PermissionLevel::SuperAdmin,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionLevel::Read => "READ",
            PermissionLevel::Write => "WRITE",
            PermissionLevel::Admin => "ADMIN",
            PermissionLevel::SuperAdmin => "SUPER_ADMIN",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            PermissionLevel::Read => "View/list",
            PermissionLevel::Write => "Create/update/delete",
            PermissionLevel::Admin => "Administer",
            PermissionLevel::SuperAdmin => "Unrestricted",
        }
    }
}

impl FromStr for PermissionLevel {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "READ" => Ok(PermissionLevel::Read),
            "WRITE" => Ok(PermissionLevel::Write),
            "ADMIN" => Ok(PermissionLevel::Admin),
            "SUPER_ADMIN" => Ok(PermissionLevel::SuperAdmin),
            other => Err(DomainError::validation(format!(
                "unknown permission level '{other}' (expected READ, WRITE, ADMIN or SUPER_ADMIN)"
            ))),
        }
    }
}

impl core::fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Business module a permission applies to. `All` matches every module.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Module {
    User,
    Department,
    Ehs,
    Qa,
    Event,
    Maint,
    Activity,
    Route,
    Assy,
    Pcl,
    All,
}

impl Module {
    /// Every concrete module (excludes the `All` wildcard).
    pub const CONCRETE: [Module; 10] = [
        Module::User,
        Module::Department,
        Module::Ehs,
        Module::Qa,
        Module::Event,
        Module::Maint,
        Module::Activity,
        Module::Route,
        Module::Assy,
        Module::Pcl,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Module::User => "USER",
            Module::Department => "DEPARTMENT",
            Module::Ehs => "EHS",
            Module::Qa => "QA",
            Module::Event => "EVENT",
            Module::Maint => "MAINT",
            Module::Activity => "ACTIVITY",
            Module::Route => "ROUTE",
            Module::Assy => "ASSY",
            Module::Pcl => "PCL",
            Module::All => "ALL",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Module::User => "user accounts",
            Module::Department => "departments",
            Module::Ehs => "EHS lost-workday data",
            Module::Qa => "quality data",
            Module::Event => "calendar events",
            Module::Maint => "maintenance data",
            Module::Activity => "activity log",
            Module::Route => "navigation routes",
            Module::Assy => "assembly output",
            Module::Pcl => "logistics downtime",
            Module::All => "all modules",
        }
    }

    pub fn covers(&self, other: Module) -> bool {
        *self == Module::All || *self == other
    }
}

impl FromStr for Module {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        Module::CONCRETE
            .iter()
            .chain(core::iter::once(&Module::All))
            .find(|m| m.as_str() == upper)
            .copied()
            .ok_or_else(|| DomainError::validation(format!("unknown module '{upper}'")))
    }
}

impl core::fmt::Display for Module {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The grant carried by a permission, independent of its storage id.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Grant {
    pub module: Module,
    pub level: PermissionLevel,
    #[serde(default)]
    pub department_id: Option<DepartmentId>,
}

impl Grant {
    pub const fn new(module: Module, level: PermissionLevel) -> Self {
        Self {
            module,
            level,
            department_id: None,
        }
    }

    pub fn scoped(mut self, department_id: DepartmentId) -> Self {
        self.department_id = Some(department_id);
        self
    }

    /// Whether this grant satisfies `level` on `module`.
    ///
    /// A department-scoped grant only applies inside its department: the
    /// request's target department when one is given, otherwise the
    /// principal's own department.
    pub fn grants(
        &self,
        module: Module,
        level: PermissionLevel,
        target_department: Option<DepartmentId>,
        principal_department: Option<DepartmentId>,
    ) -> bool {
        if !self.module.covers(module) || self.level < level {
            return false;
        }
        match self.department_id {
            None => true,
            Some(scope) => target_department.or(principal_department) == Some(scope),
        }
    }

    /// Canonical `MODULE:LEVEL` form (department scope is not part of it).
    pub fn code(&self) -> String {
        format!("{}:{}", self.module, self.level)
    }

    pub fn parse(code: &str) -> Result<Self, DomainError> {
        let (module, level) = code
            .split_once(':')
            .ok_or_else(|| DomainError::validation(format!("permission '{code}' must be MODULE:LEVEL")))?;
        Ok(Self::new(module.parse()?, level.parse()?))
    }

    pub fn description(&self) -> String {
        format!("{} {}", self.level.description(), self.module.description())
    }
}

impl core::fmt::Display for Grant {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.code())
    }
}

/// A stored permission row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub id: PermissionId,
    #[serde(flatten)]
    pub grant: Grant,
}

impl Permission {
    pub fn code(&self) -> String {
        self.grant.code()
    }
}
