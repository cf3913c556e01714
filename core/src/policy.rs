//! Role-based lookback policy.
//!
//! A static lookup: the ceiling for each role is fixed at compile time and
//! cannot be changed while the console runs.

use soc_protocol::Role;
use soc_protocol::TimeRange;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RolePolicy {
    role: Role,
    max_lookback: Option<TimeRange>,
}

const ANALYST: RolePolicy = RolePolicy {
    role: Role::Analyst,
    max_lookback: Some(TimeRange::TwentyFourHours),
};

const ADMIN: RolePolicy = RolePolicy {
    role: Role::Admin,
    max_lookback: None,
};

impl RolePolicy {
    pub const fn for_role(role: Role) -> RolePolicy {
        match role {
            Role::Analyst => ANALYST,
            Role::Admin => ADMIN,
        }
    }

    pub const fn role(&self) -> Role {
        self.role
    }

    /// `None` means unrestricted.
    pub const fn max_lookback(&self) -> Option<TimeRange> {
        self.max_lookback
    }

    pub fn permits(&self, time_range: TimeRange) -> bool {
        self.max_lookback.is_none_or(|max| time_range <= max)
    }

    pub fn ceiling_message(&self) -> Option<String> {
        let max = self.max_lookback?;
        let who = match self.role {
            Role::Analyst => "Analysts",
            Role::Admin => "Admins",
        };
        Some(format!(
            "{who} are limited to {max} lookback. Contact admin for extended access."
        ))
    }
}
