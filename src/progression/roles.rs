//! Authorization for admin operations

use std::collections::HashSet;

/// Decides which actors may perform admin operations
pub trait RoleProvider: Send + Sync {
    fn can_adjust_xp(&self, actor_id: &str) -> bool;
}

/// Fixed list of admin actor ids, from `[settings] admins`
#[derive(Debug, Clone, Default)]
pub struct AdminList {
    admins: HashSet<String>,
}

impl AdminList {
    pub fn new(admins: impl IntoIterator<Item = String>) -> Self {
        Self {
            admins: admins.into_iter().collect(),
        }
    }
}

impl RoleProvider for AdminList {
    fn can_adjust_xp(&self, actor_id: &str) -> bool {
        self.admins.contains(actor_id)
    }
}
