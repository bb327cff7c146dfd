//! Local user bookkeeping behind the `InitialUserSetter` port.

use car_types::{user_flags, UserId, UserInfo, UsersInfo};
use cs_02_power_management::{InitialUserBehavior, InitialUserSetter};
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::container::config::UsersConfig;

/// First id handed to a newly created user.
const MIN_CREATED_USER_ID: UserId = 10;

struct Users {
    current: UserInfo,
    existing: Vec<UserInfo>,
    applied: Vec<InitialUserBehavior>,
}

impl Users {
    fn next_user_id(&self) -> UserId {
        self.existing
            .iter()
            .map(|u| u.user_id + 1)
            .max()
            .unwrap_or(MIN_CREATED_USER_ID)
            .max(MIN_CREATED_USER_ID)
    }

    fn add(&mut self, flags: i32) -> UserInfo {
        let user = UserInfo::new(self.next_user_id(), flags);
        self.existing.push(user);
        user
    }

    fn replace_guest(&mut self) {
        if !self.current.is_guest() {
            return;
        }
        let old = self.current;
        self.existing.retain(|u| u.user_id != old.user_id);
        self.current = self.add(old.flags);
        info!(old = old.user_id, new = self.current.user_id, "Guest user replaced");
    }
}

/// The users on this head unit, and the policy applying initial user choices.
pub struct LocalUserManager {
    users: Mutex<Users>,
}

impl LocalUserManager {
    /// Start from the configured users. The current user is added to the
    /// existing list if missing.
    #[must_use]
    pub fn new(config: &UsersConfig) -> Self {
        let mut existing = config.other_users.clone();
        if !existing.iter().any(|u| u.user_id == config.current_user.user_id) {
            existing.push(config.current_user);
        }
        Self {
            users: Mutex::new(Users {
                current: config.current_user,
                existing,
                applied: Vec::new(),
            }),
        }
    }

    /// Snapshot sent along with user HAL requests.
    #[must_use]
    pub fn users_info(&self) -> UsersInfo {
        let users = self.users.lock();
        UsersInfo {
            current_user: users.current,
            existing_users: users.existing.clone(),
        }
    }

    /// The foreground user.
    #[must_use]
    pub fn current_user(&self) -> UserInfo {
        self.users.lock().current
    }

    /// Every behavior applied so far, oldest first.
    #[must_use]
    pub fn applied(&self) -> Vec<InitialUserBehavior> {
        self.users.lock().applied.clone()
    }
}

impl InitialUserSetter for LocalUserManager {
    fn set(&self, behavior: InitialUserBehavior) {
        let mut users = self.users.lock();
        match &behavior {
            InitialUserBehavior::DefaultBehavior { replace_guest } => {
                if *replace_guest {
                    users.replace_guest();
                }
            }
            InitialUserBehavior::Switch {
                user_id,
                replace_guest,
            } => {
                let target = users.existing.iter().find(|u| u.user_id == *user_id).copied();
                match target {
                    Some(target) => {
                        info!(from = users.current.user_id, to = target.user_id, "Switching user");
                        users.current = target;
                    }
                    None => warn!(user_id, "Switch target does not exist, keeping current user"),
                }
                if *replace_guest {
                    users.replace_guest();
                }
            }
            InitialUserBehavior::Create { name, flags } => {
                let created = users.add(*flags & !user_flags::SYSTEM);
                info!(user_id = created.user_id, name = %name, "Created user");
                users.current = created;
            }
            InitialUserBehavior::ReplaceGuestIfNeeded => users.replace_guest(),
        }
        users.applied.push(behavior);
    }
}
