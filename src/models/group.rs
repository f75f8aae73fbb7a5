use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Group membership snapshot, read from storage at fanout time and treated
/// as immutable for the duration of one operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub id: Uuid,
    pub name: String,
    pub members: Vec<Uuid>,
    pub admins: Vec<Uuid>,
    pub only_admins_can_post: bool,
}

impl Group {
    pub fn is_member(&self, user_id: Uuid) -> bool {
        self.members.contains(&user_id)
    }

    pub fn is_admin(&self, user_id: Uuid) -> bool {
        self.admins.contains(&user_id)
    }
}
