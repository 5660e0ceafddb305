//! Customer Match (`AC`) handler: find-or-create the user list named in the
//! tenant configuration, then append the message's members to it.

use async_trait::async_trait;
use std::sync::Arc;

use crate::config_store::ApiConfigDocument;
use crate::dispatcher::ApiHandler;
use crate::errors::{AppError, ResultExt};
use crate::google_ads_client::{AdsClientFactory, UserListService};
use crate::google_ads_models::{
    parse_members, CustomerMatchConfig, MemberRecord, MembersMutationResult, NewCrmUserList,
    UserListSummary,
};

/// Tag of the Customer Match API in message attributes.
pub const CUSTOMER_MATCH_API: &str = "AC";

/// Find the list called `name`, creating it when absent.
///
/// The first match wins when several lists share the name. Lookup and
/// create are separate calls, so two concurrent invocations for a new name
/// may both create a list.
pub async fn resolve_user_list(
    service: &dyn UserListService,
    name: &str,
) -> Result<UserListSummary, AppError> {
    let existing = service.get_by_name(name).await?;

    if let Some(list) = existing.into_iter().next() {
        tracing::info!(
            "The user list {} is already created and its info was retrieved (id {})",
            name,
            list.id
        );
        return Ok(list);
    }

    tracing::info!("The user list {} will be created", name);
    let id = service.create(&NewCrmUserList::contact_info(name)).await?;
    tracing::info!("✓ User list {} created with id {}", name, id);

    Ok(UserListSummary {
        id,
        name: name.to_string(),
    })
}

/// Submit all members to `list` as one batch.
pub async fn append_members(
    service: &dyn UserListService,
    list: &UserListSummary,
    members: &[MemberRecord],
) -> Result<MembersMutationResult, AppError> {
    let result = service.add_members(list, members).await?;

    tracing::info!(
        "✓ User list with name \"{}\" and ID \"{}\" was added ({} members)",
        result.user_list_name,
        result.user_list_id,
        result.member_count
    );
    if let Some(job) = &result.job_resource_name {
        tracing::debug!("Members uploaded through {}", job);
    }

    Ok(result)
}

/// Handler for `api = "AC"` messages.
#[derive(Clone)]
pub struct CustomerMatchHandler {
    factory: Arc<dyn AdsClientFactory>,
}

impl CustomerMatchHandler {
    pub fn new(factory: Arc<dyn AdsClientFactory>) -> Self {
        Self { factory }
    }

    /// Full upload flow for one message body.
    pub async fn send_data(
        &self,
        records: &str,
        message_id: &str,
        config: &CustomerMatchConfig,
    ) -> Result<MembersMutationResult, AppError> {
        let members = parse_members(records)?;
        tracing::info!("[{}] Processing {} records", message_id, members.len());

        let service = self
            .factory
            .connect(&config.credentials())
            .await
            .context("Failed to build Google Ads client")?;

        let list = resolve_user_list(service.as_ref(), &config.user_list_name)
            .await
            .with_context(|| format!("Failed to resolve user list {}", config.user_list_name))?;

        // A list created above is left in place if this fails.
        append_members(service.as_ref(), &list, &members)
            .await
            .with_context(|| format!("Failed to add members to user list {}", list.id))
    }
}

#[async_trait]
impl ApiHandler for CustomerMatchHandler {
    async fn handle(
        &self,
        records: &str,
        message_id: &str,
        config: Option<&ApiConfigDocument>,
    ) -> Result<(), AppError> {
        let document = config.ok_or_else(|| {
            AppError::NotFound(format!(
                "No {} configuration for message {}",
                CUSTOMER_MATCH_API, message_id
            ))
        })?;
        let config = CustomerMatchConfig::from_value(document.clone().into_value())?;

        self.send_data(records, message_id, &config).await?;
        Ok(())
    }
}
