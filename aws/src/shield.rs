//! Shield Advanced-backed [`ShieldProtection`] (§4.6 Associations).

use lbc_core::cloud::ShieldProtection;
use lbc_core::{ControllerError, ErrorContext, Result};

pub struct ShieldClient {
    client: aws_sdk_shield::Client,
}

impl ShieldClient {
    pub fn new(client: aws_sdk_shield::Client) -> Self {
        Self { client }
    }
}

fn map_sdk_error(err: impl std::fmt::Display, resource_arn: &str) -> ControllerError {
    let message = err.to_string();
    if message.contains("ResourceNotFoundException") {
        ControllerError::AwsNotFound {
            context: ErrorContext::resource("AWS::Shield::Protection", resource_arn),
        }
    } else if message.contains("OptInRequiredException") {
        // The account has no Shield Advanced subscription; treat as a
        // configuration error rather than something retrying will fix.
        ControllerError::fatal(
            "Shield Advanced protection requested but the account has no subscription",
            ErrorContext::resource("AWS::Shield::Protection", resource_arn),
        )
    } else if message.contains("Throttling") {
        ControllerError::AwsThrottling {
            message,
            context: ErrorContext::resource("AWS::Shield::Protection", resource_arn),
        }
    } else {
        ControllerError::TransientIo {
            message,
            context: ErrorContext::resource("AWS::Shield::Protection", resource_arn),
        }
    }
}

#[async_trait::async_trait]
impl ShieldProtection for ShieldClient {
    async fn is_protected(&self, resource_arn: &str) -> Result<bool> {
        match self
            .client
            .describe_protection()
            .resource_arn(resource_arn)
            .send()
            .await
        {
            Ok(resp) => Ok(resp.protection.is_some()),
            Err(e) if e.to_string().contains("ResourceNotFoundException") => Ok(false),
            Err(e) => Err(map_sdk_error(e, resource_arn)),
        }
    }

    async fn enable_protection(&self, resource_arn: &str) -> Result<()> {
        match self
            .client
            .create_protection()
            .resource_arn(resource_arn)
            .name(resource_arn)
            .send()
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if e.to_string().contains("InvalidResourceException") && e.to_string().contains("already") => Ok(()),
            Err(e) => Err(map_sdk_error(e, resource_arn)),
        }
    }

    async fn disable_protection(&self, resource_arn: &str) -> Result<()> {
        let protection_id = match self
            .client
            .describe_protection()
            .resource_arn(resource_arn)
            .send()
            .await
        {
            Ok(resp) => resp.protection.and_then(|p| p.id),
            Err(e) if e.to_string().contains("ResourceNotFoundException") => None,
            Err(e) => return Err(map_sdk_error(e, resource_arn)),
        };

        let Some(id) = protection_id else {
            return Ok(());
        };

        match self.client.delete_protection().protection_id(id).send().await {
            Ok(_) => Ok(()),
            Err(e) if e.to_string().contains("ResourceNotFoundException") => Ok(()),
            Err(e) => Err(map_sdk_error(e, resource_arn)),
        }
    }
}
