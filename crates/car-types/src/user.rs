//! # User Management Vocabulary
//!
//! Requests and responses exchanged with the Vehicle HAL over the user
//! management properties, plus the callback status delivered to callers.

use crate::hal_code_enum;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Android-style user identifier.
pub type UserId = i32;

/// Bit flags describing a user.
pub mod user_flags {
    /// No flags.
    pub const NONE: i32 = 0x0;
    /// The system user.
    pub const SYSTEM: i32 = 0x01;
    /// A guest user.
    pub const GUEST: i32 = 0x02;
    /// An ephemeral user.
    pub const EPHEMERAL: i32 = 0x04;
    /// An admin user.
    pub const ADMIN: i32 = 0x08;
    /// A disabled user.
    pub const DISABLED: i32 = 0x10;
    /// A profile user.
    pub const PROFILE: i32 = 0x20;
}

/// A user as seen by the HAL.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserInfo {
    /// User identifier.
    pub user_id: UserId,
    /// Combination of [`user_flags`].
    pub flags: i32,
}

impl UserInfo {
    /// Create a user description.
    #[must_use]
    pub fn new(user_id: UserId, flags: i32) -> Self {
        Self { user_id, flags }
    }

    /// Whether the guest flag is set.
    #[must_use]
    pub fn is_guest(&self) -> bool {
        self.flags & user_flags::GUEST != 0
    }
}

/// Snapshot of the current and existing users sent with most requests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsersInfo {
    /// The foreground user.
    pub current_user: UserInfo,
    /// All users on the device, including the current one.
    pub existing_users: Vec<UserInfo>,
}

/// Why the initial user is being requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum InitialUserInfoRequestType {
    /// First boot of the device.
    FirstBoot = 1,
    /// First boot after a system update.
    FirstBootAfterOta = 2,
    /// Regular cold boot.
    ColdBoot = 3,
    /// Resume from suspend.
    Resume = 4,
}

hal_code_enum!(InitialUserInfoRequestType {
    FirstBoot = 1,
    FirstBootAfterOta = 2,
    ColdBoot = 3,
    Resume = 4,
});

/// What the HAL wants done with the initial user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum InitialUserInfoResponseAction {
    /// Let the platform apply its own policy.
    Default = 0,
    /// Switch to an existing user.
    Switch = 1,
    /// Create a new user and switch to it.
    Create = 2,
}

hal_code_enum!(InitialUserInfoResponseAction {
    Default = 0,
    Switch = 1,
    Create = 2,
});

/// Response to an `INITIAL_USER_INFO` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitialUserInfoResponse {
    /// Request this responds to.
    pub request_id: i32,
    /// Requested action.
    pub action: InitialUserInfoResponseAction,
    /// Target user for `Switch`, or flags for `Create`.
    pub user_to_switch_or_create: UserInfo,
    /// Locales to apply, `,` separated.
    pub user_locales: String,
    /// Name for the created user.
    pub user_name_to_create: String,
}

/// Kind of message carried by the `SWITCH_USER` property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum SwitchUserMessageType {
    /// Switch initiated through the legacy path; HAL is only notified.
    LegacyAndroidSwitch = 1,
    /// Switch initiated by the platform; HAL must approve.
    AndroidSwitch = 2,
    /// HAL answer to `AndroidSwitch`.
    VehicleResponse = 3,
    /// Switch initiated by the vehicle.
    VehicleRequest = 4,
    /// Platform notification that the switch finished.
    AndroidPostSwitch = 5,
}

hal_code_enum!(SwitchUserMessageType {
    LegacyAndroidSwitch = 1,
    AndroidSwitch = 2,
    VehicleResponse = 3,
    VehicleRequest = 4,
    AndroidPostSwitch = 5,
});

/// Outcome reported by the HAL for switch/create operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum UserOperationStatus {
    /// Operation approved / succeeded.
    Success = 1,
    /// Operation rejected / failed.
    Failure = 2,
}

hal_code_enum!(UserOperationStatus {
    Success = 1,
    Failure = 2,
});

/// A user switch request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchUserRequest {
    /// Request id; assigned by the service for correlated requests.
    pub request_id: i32,
    /// Message kind.
    pub message_type: SwitchUserMessageType,
    /// User being switched to.
    pub target_user: UserInfo,
    /// Current users snapshot.
    pub users_info: UsersInfo,
}

impl SwitchUserRequest {
    /// Platform-initiated switch awaiting HAL approval.
    #[must_use]
    pub fn android_switch(target_user: UserInfo, users_info: UsersInfo) -> Self {
        Self {
            request_id: 0,
            message_type: SwitchUserMessageType::AndroidSwitch,
            target_user,
            users_info,
        }
    }
}

/// HAL answer to a switch request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchUserResponse {
    /// Request this responds to.
    pub request_id: i32,
    /// Always `VehicleResponse` for answers.
    pub message_type: SwitchUserMessageType,
    /// Whether the switch is approved.
    pub status: UserOperationStatus,
    /// Optional diagnostic from the HAL.
    pub error_message: String,
}

/// A user creation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateUserRequest {
    /// The user that was just created on the platform side.
    pub new_user_info: UserInfo,
    /// Its name.
    pub new_user_name: String,
    /// Current users snapshot.
    pub users_info: UsersInfo,
}

/// HAL answer to a create request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateUserResponse {
    /// Request this responds to.
    pub request_id: i32,
    /// Whether the HAL accepted the user.
    pub status: UserOperationStatus,
    /// Optional diagnostic from the HAL.
    pub error_message: String,
}

/// Notification that a user was removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveUserRequest {
    /// The removed user.
    pub removed_user_info: UserInfo,
    /// Users snapshot after the removal.
    pub users_info: UsersInfo,
}

/// Query for the identification associations of a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentificationGetRequest {
    /// User being queried.
    pub user_info: UserInfo,
    /// Association types of interest (e.g. key fob).
    pub association_types: Vec<i32>,
}

/// One association of a user with an identification mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentificationAssociation {
    /// Association type.
    pub association_type: i32,
    /// Association value (associated / not associated / unknown).
    pub value: i32,
}

/// Answer to an identification query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentificationResponse {
    /// Request this responds to.
    pub request_id: i32,
    /// One entry per requested type.
    pub associations: Vec<UserIdentificationAssociation>,
    /// Optional diagnostic from the HAL.
    pub error_message: String,
}

/// Terminal status delivered to an asynchronous HAL request callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HalCallbackStatus {
    /// The HAL answered and the answer was decoded.
    Ok,
    /// The request could not be written to the HAL.
    HalSetTimeout,
    /// The HAL never answered within the deadline.
    HalResponseTimeout,
    /// Another request of the same kind is still outstanding.
    ConcurrentOperation,
    /// The HAL answered with something that could not be understood.
    WrongHalResponse,
}

impl fmt::Display for HalCallbackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ok => "STATUS_OK",
            Self::HalSetTimeout => "STATUS_HAL_SET_TIMEOUT",
            Self::HalResponseTimeout => "STATUS_HAL_RESPONSE_TIMEOUT",
            Self::ConcurrentOperation => "STATUS_CONCURRENT_OPERATION",
            Self::WrongHalResponse => "STATUS_WRONG_HAL_RESPONSE",
        };
        f.write_str(name)
    }
}

/// One-shot callback for an asynchronous HAL request.
///
/// The response is `Some` only when the status is [`HalCallbackStatus::Ok`].
pub type HalCallback<R> = Box<dyn FnOnce(HalCallbackStatus, Option<R>) + Send + 'static>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_conversion() {
        assert_eq!(
            InitialUserInfoResponseAction::try_from(1),
            Ok(InitialUserInfoResponseAction::Switch)
        );
        assert!(InitialUserInfoResponseAction::try_from(3).is_err());
        assert_eq!(i32::from(InitialUserInfoRequestType::Resume), 4);
    }

    #[test]
    fn test_guest_flag() {
        assert!(UserInfo::new(11, user_flags::GUEST | user_flags::EPHEMERAL).is_guest());
        assert!(!UserInfo::new(10, user_flags::ADMIN).is_guest());
    }

    #[test]
    fn test_callback_status_display() {
        assert_eq!(
            HalCallbackStatus::ConcurrentOperation.to_string(),
            "STATUS_CONCURRENT_OPERATION"
        );
    }
}
