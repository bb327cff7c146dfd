//! `UserHalGateway` port over the user HAL service.

use std::sync::Arc;

use async_trait::async_trait;
use car_types::{HalCallback, InitialUserInfoRequestType, InitialUserInfoResponse};
use cs_01_user_hal::UserHalService;
use cs_02_power_management::{PowerError, PowerResult, UserHalGateway};
use tracing::warn;

use super::users::LocalUserManager;

/// Lets power management ask the user HAL for the resume user.
///
/// Every request carries a fresh snapshot of the local users.
pub struct UserHalGatewayAdapter {
    service: UserHalService,
    users: Arc<LocalUserManager>,
}

impl UserHalGatewayAdapter {
    pub fn new(service: UserHalService, users: Arc<LocalUserManager>) -> Self {
        Self { service, users }
    }
}

#[async_trait]
impl UserHalGateway for UserHalGatewayAdapter {
    fn is_supported(&self) -> bool {
        self.service.is_supported()
    }

    async fn get_initial_user_info(
        &self,
        request_type: InitialUserInfoRequestType,
        timeout_ms: i64,
        callback: HalCallback<InitialUserInfoResponse>,
    ) -> PowerResult<()> {
        let users = self.users.users_info();
        self.service
            .get_initial_user_info(request_type, timeout_ms, &users, callback)
            .await
            .map_err(|err| {
                warn!(?request_type, error = %err, "INITIAL_USER_INFO not sent");
                PowerError::UserHal {
                    reason: err.to_string(),
                }
            })
    }
}
