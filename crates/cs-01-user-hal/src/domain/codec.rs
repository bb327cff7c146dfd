//! # User Property Codec
//!
//! Layout of the user management properties. Every payload starts with the
//! request id in `int32_values[0]`.
//!
//! ```text
//! INITIAL_USER_INFO  req: [id, type, cur.id, cur.flags, n, (id, flags)*]
//!                    rsp: [id, action, user.id, user.flags]  str: locales[||name]
//! SWITCH_USER        req: [id, msg, target.id, target.flags, cur.id, cur.flags, n, ...]
//!                    rsp: [id, msg, status]                  str: error
//! CREATE_USER        req: [id, new.id, new.flags, cur.id, cur.flags, n, ...]  str: name
//!                    rsp: [id, status]                       str: error
//! REMOVE_USER        req: [id, removed.id, removed.flags, cur.id, cur.flags, n, ...]
//! USER_IDENTIFICATION_ASSOCIATION
//!                    get: [id, user.id, user.flags, n, type*]
//!                    rsp: [id, n, (type, value)*]            str: error
//! ```

use car_types::vehicle_property::{
    CREATE_USER, INITIAL_USER_INFO, REMOVE_USER, SWITCH_USER, USER_IDENTIFICATION_ASSOCIATION,
};
use car_types::{
    CreateUserRequest, CreateUserResponse, HalPropValue, InitialUserInfoRequestType,
    InitialUserInfoResponse, InitialUserInfoResponseAction, PropertyId, RemoveUserRequest,
    SwitchUserMessageType, SwitchUserRequest, SwitchUserResponse, UnknownCode, UserInfo,
    UserIdentificationAssociation, UserIdentificationGetRequest, UserIdentificationResponse,
    UserOperationStatus, UsersInfo,
};
use thiserror::Error;

/// Separator between locales and user name in a CREATE response.
const CREATE_STRING_SEPARATOR: &str = "||";

/// A response payload that could not be understood.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Payload shorter than the layout requires.
    #[error("Property 0x{prop:x} payload has no int32 at index {index}")]
    MissingField { prop: PropertyId, index: usize },

    /// A code field held an unknown value.
    #[error(transparent)]
    UnknownCode(#[from] UnknownCode),
}

/// Request id carried by a user management payload.
#[must_use]
pub fn request_id_of(value: &HalPropValue) -> Option<i32> {
    value.int32_at(0)
}

fn field(value: &HalPropValue, index: usize) -> Result<i32, DecodeError> {
    value.int32_at(index).ok_or(DecodeError::MissingField {
        prop: value.prop,
        index,
    })
}

fn push_user(out: &mut Vec<i32>, user: &UserInfo) {
    out.push(user.user_id);
    out.push(user.flags);
}

fn push_users_info(out: &mut Vec<i32>, users: &UsersInfo) {
    push_user(out, &users.current_user);
    out.push(users.existing_users.len() as i32);
    for user in &users.existing_users {
        push_user(out, user);
    }
}

/// Encode an INITIAL_USER_INFO request.
#[must_use]
pub fn encode_initial_user_info(
    request_id: i32,
    request_type: InitialUserInfoRequestType,
    users: &UsersInfo,
) -> HalPropValue {
    let mut ints = vec![request_id, request_type.into()];
    push_users_info(&mut ints, users);
    HalPropValue::with_int32_values(INITIAL_USER_INFO, ints)
}

/// Encode a SWITCH_USER message. The request's own id is replaced.
#[must_use]
pub fn encode_switch_user(request_id: i32, request: &SwitchUserRequest) -> HalPropValue {
    let mut ints = vec![request_id, request.message_type.into()];
    push_user(&mut ints, &request.target_user);
    push_users_info(&mut ints, &request.users_info);
    HalPropValue::with_int32_values(SWITCH_USER, ints)
}

/// Encode a CREATE_USER request.
#[must_use]
pub fn encode_create_user(request_id: i32, request: &CreateUserRequest) -> HalPropValue {
    let mut ints = vec![request_id];
    push_user(&mut ints, &request.new_user_info);
    push_users_info(&mut ints, &request.users_info);
    HalPropValue::with_int32_values(CREATE_USER, ints).string(request.new_user_name.clone())
}

/// Encode a REMOVE_USER notification.
#[must_use]
pub fn encode_remove_user(request_id: i32, request: &RemoveUserRequest) -> HalPropValue {
    let mut ints = vec![request_id];
    push_user(&mut ints, &request.removed_user_info);
    push_users_info(&mut ints, &request.users_info);
    HalPropValue::with_int32_values(REMOVE_USER, ints)
}

/// Encode a USER_IDENTIFICATION_ASSOCIATION query.
#[must_use]
pub fn encode_user_identification_get(
    request_id: i32,
    request: &UserIdentificationGetRequest,
) -> HalPropValue {
    let mut ints = vec![request_id];
    push_user(&mut ints, &request.user_info);
    ints.push(request.association_types.len() as i32);
    ints.extend_from_slice(&request.association_types);
    HalPropValue::with_int32_values(USER_IDENTIFICATION_ASSOCIATION, ints)
}

/// Decode an INITIAL_USER_INFO response.
pub fn decode_initial_user_info(value: &HalPropValue) -> Result<InitialUserInfoResponse, DecodeError> {
    let request_id = field(value, 0)?;
    let action = InitialUserInfoResponseAction::try_from(field(value, 1)?)?;
    let mut response = InitialUserInfoResponse {
        request_id,
        action,
        user_to_switch_or_create: UserInfo::default(),
        user_locales: String::new(),
        user_name_to_create: String::new(),
    };
    match action {
        InitialUserInfoResponseAction::Default => {
            response.user_locales = value.string_value.clone();
        }
        InitialUserInfoResponseAction::Switch => {
            response.user_to_switch_or_create.user_id = field(value, 2)?;
        }
        InitialUserInfoResponseAction::Create => {
            response.user_to_switch_or_create.flags = field(value, 3)?;
            let mut pieces = value.string_value.splitn(2, CREATE_STRING_SEPARATOR);
            response.user_locales = pieces.next().unwrap_or_default().to_string();
            response.user_name_to_create = pieces.next().unwrap_or_default().to_string();
        }
    }
    Ok(response)
}

/// Decode a SWITCH_USER response.
pub fn decode_switch_user(value: &HalPropValue) -> Result<SwitchUserResponse, DecodeError> {
    Ok(SwitchUserResponse {
        request_id: field(value, 0)?,
        message_type: SwitchUserMessageType::try_from(field(value, 1)?)?,
        status: UserOperationStatus::try_from(field(value, 2)?)?,
        error_message: value.string_value.clone(),
    })
}

/// Decode a CREATE_USER response.
pub fn decode_create_user(value: &HalPropValue) -> Result<CreateUserResponse, DecodeError> {
    Ok(CreateUserResponse {
        request_id: field(value, 0)?,
        status: UserOperationStatus::try_from(field(value, 1)?)?,
        error_message: value.string_value.clone(),
    })
}

/// Decode a USER_IDENTIFICATION_ASSOCIATION response.
pub fn decode_user_identification(
    value: &HalPropValue,
) -> Result<UserIdentificationResponse, DecodeError> {
    let request_id = field(value, 0)?;
    let count = field(value, 1)?.max(0) as usize;
    let mut associations = Vec::with_capacity(count);
    for i in 0..count {
        associations.push(UserIdentificationAssociation {
            association_type: field(value, 2 + i * 2)?,
            value: field(value, 3 + i * 2)?,
        });
    }
    Ok(UserIdentificationResponse {
        request_id,
        associations,
        error_message: value.string_value.clone(),
    })
}

/// Message type of a SWITCH_USER payload, if readable.
#[must_use]
pub fn switch_message_type(value: &HalPropValue) -> Option<SwitchUserMessageType> {
    value
        .int32_at(1)
        .and_then(|raw| SwitchUserMessageType::try_from(raw).ok())
}
