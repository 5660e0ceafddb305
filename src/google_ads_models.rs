//! Customer Match configuration, member records and Google Ads wire types.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};

use crate::errors::AppError;

/// Description given to every list created by the connector.
pub const USER_LIST_DESCRIPTION: &str = "This is a list of users uploaded from Tentacles";

/// CRM-based user lists use 10000 to mean "never expires".
pub const UNLIMITED_MEMBERSHIP_LIFE_SPAN: i64 = 10000;

/// Upload key type for hashed email / phone / address members.
pub const CONTACT_INFO_UPLOAD_KEY_TYPE: &str = "CONTACT_INFO";

/// Credentials needed to build an authenticated Google Ads client.
#[derive(Clone, PartialEq, Eq)]
pub struct AdsCredentials {
    pub client_customer_id: String,
    pub developer_token: String,
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    /// Manager account id, required when the customer is accessed through an MCC.
    pub login_customer_id: Option<String>,
}

impl AdsCredentials {
    /// Assemble credentials from their discrete fields. Nothing is validated
    /// here; bad values surface when the client authenticates.
    pub fn new(
        client_customer_id: &str,
        developer_token: &str,
        client_id: &str,
        client_secret: &str,
        refresh_token: &str,
    ) -> Self {
        Self {
            client_customer_id: client_customer_id.to_string(),
            developer_token: developer_token.to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            refresh_token: refresh_token.to_string(),
            login_customer_id: None,
        }
    }

    pub fn with_login_customer_id(mut self, login_customer_id: Option<String>) -> Self {
        self.login_customer_id = login_customer_id;
        self
    }
}

// Secrets stay out of logs.
impl std::fmt::Debug for AdsCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdsCredentials")
            .field("client_customer_id", &self.client_customer_id)
            .field("client_id", &self.client_id)
            .field("login_customer_id", &self.login_customer_id)
            .finish_non_exhaustive()
    }
}

/// Tenant configuration for the Customer Match (`AC`) API, as stored in
/// `tentacles/ApiConfig/AC/<config>`.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerMatchConfig {
    #[serde(deserialize_with = "string_or_number")]
    pub client_customer_id: String,
    pub developer_token: String,
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    pub user_list_name: String,
    #[serde(default, deserialize_with = "optional_string_or_number")]
    pub login_customer_id: Option<String>,
}

impl CustomerMatchConfig {
    pub fn from_value(value: Value) -> Result<Self, AppError> {
        serde_json::from_value(value)
            .map_err(|e| AppError::Config(format!("Invalid Customer Match configuration: {}", e)))
    }

    pub fn credentials(&self) -> AdsCredentials {
        AdsCredentials::new(
            &self.client_customer_id,
            &self.developer_token,
            &self.client_id,
            &self.client_secret,
            &self.refresh_token,
        )
        .with_login_customer_id(self.login_customer_id.clone())
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {}",
            other
        ))),
    }
}

fn optional_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected string or number, got {}",
            other
        ))),
    }
}

/// One hashed member, as published one-per-line in the message body.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hashed_email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hashed_phone_number: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mobile_id: Option<String>,

    /// Advertiser-assigned CRM id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_info: Option<AddressInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hashed_first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hashed_last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "postalCode")]
    pub zip_code: Option<String>,
}

impl AddressInfo {
    fn is_empty(&self) -> bool {
        self.hashed_first_name.is_none()
            && self.hashed_last_name.is_none()
            && self.country_code.is_none()
            && self.zip_code.is_none()
    }
}

impl MemberRecord {
    /// Google Ads `UserIdentifier` entries for this member, one per set field.
    pub fn user_identifiers(&self) -> Vec<Value> {
        let mut identifiers = Vec::new();

        if let Some(email) = &self.hashed_email {
            identifiers.push(json!({ "hashedEmail": email }));
        }
        if let Some(phone) = &self.hashed_phone_number {
            identifiers.push(json!({ "hashedPhoneNumber": phone }));
        }
        if let Some(mobile_id) = &self.mobile_id {
            identifiers.push(json!({ "mobileId": mobile_id }));
        }
        if let Some(user_id) = &self.user_id {
            identifiers.push(json!({ "thirdPartyUserId": user_id }));
        }
        if let Some(address) = self.address_info.as_ref().filter(|a| !a.is_empty()) {
            let mut info = serde_json::Map::new();
            if let Some(v) = &address.hashed_first_name {
                info.insert("hashedFirstName".to_string(), json!(v));
            }
            if let Some(v) = &address.hashed_last_name {
                info.insert("hashedLastName".to_string(), json!(v));
            }
            if let Some(v) = &address.country_code {
                info.insert("countryCode".to_string(), json!(v));
            }
            if let Some(v) = &address.zip_code {
                info.insert("postalCode".to_string(), json!(v));
            }
            identifiers.push(json!({ "addressInfo": info }));
        }

        identifiers
    }
}

/// Parse a message body into member records, one JSON object per line.
///
/// A trailing newline does not produce an extra record and an empty body
/// yields no records. Every line must carry at least one known identifier.
pub fn parse_members(body: &str) -> Result<Vec<MemberRecord>, AppError> {
    body.lines()
        .enumerate()
        .map(|(i, line)| {
            let member: MemberRecord = serde_json::from_str(line).map_err(|e| {
                AppError::BadRequest(format!("Invalid member record on line {}: {}", i + 1, e))
            })?;

            if member.user_identifiers().is_empty() {
                return Err(AppError::BadRequest(format!(
                    "Member record on line {} has no user identifier",
                    i + 1
                )));
            }
            Ok(member)
        })
        .collect()
}

/// A user list as returned by a name lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserListSummary {
    pub id: String,
    pub name: String,
}

/// Definition of a new CRM-based user list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCrmUserList {
    pub name: String,
    pub description: String,
    pub membership_life_span: i64,
    pub upload_key_type: String,
}

impl NewCrmUserList {
    /// The fixed definition used when a list has to be created.
    pub fn contact_info(name: &str) -> Self {
        Self {
            name: name.to_string(),
            description: USER_LIST_DESCRIPTION.to_string(),
            membership_life_span: UNLIMITED_MEMBERSHIP_LIFE_SPAN,
            upload_key_type: CONTACT_INFO_UPLOAD_KEY_TYPE.to_string(),
        }
    }

    /// Body of a `UserListOperation.create`.
    pub fn to_operation(&self) -> Value {
        json!({
            "create": {
                "name": self.name,
                "description": self.description,
                "membershipLifeSpan": self.membership_life_span.to_string(),
                "crmBasedUserList": {
                    "uploadKeyType": self.upload_key_type,
                }
            }
        })
    }
}

/// Confirmation of a member upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembersMutationResult {
    pub user_list_id: String,
    pub user_list_name: String,
    pub member_count: usize,
    /// Offline user data job that carries the upload, when the backend uses one.
    pub job_resource_name: Option<String>,
}
