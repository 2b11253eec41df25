//! ACM-backed [`CertificateDiscovery`]: infers certificate ARNs from a
//! listener's host rules when no certificate was named explicitly (§4.4
//! step 5).

use aws_sdk_acm::types::CertificateStatus;
use lbc_core::cloud::CertificateDiscovery;
use lbc_core::{ControllerError, ErrorContext, Result};

pub struct AcmClient {
    client: aws_sdk_acm::Client,
}

impl AcmClient {
    pub fn new(client: aws_sdk_acm::Client) -> Self {
        Self { client }
    }
}

fn map_sdk_error(err: impl std::fmt::Display) -> ControllerError {
    let message = err.to_string();
    if message.contains("Throttling") {
        ControllerError::AwsThrottling {
            message,
            context: ErrorContext::field("certificates"),
        }
    } else {
        ControllerError::TransientIo {
            message,
            context: ErrorContext::field("certificates"),
        }
    }
}

/// `*.example.com` matches `foo.example.com` but not `foo.bar.example.com`
/// or `example.com` itself; an exact SAN match always matches.
fn certificate_matches_host(domain: &str, host: &str) -> bool {
    if domain == host {
        return true;
    }
    if let Some(suffix) = domain.strip_prefix("*.") {
        if let Some(label) = host.strip_suffix(suffix) {
            return label.ends_with('.') && label.matches('.').count() == 1;
        }
    }
    false
}

#[async_trait::async_trait]
impl CertificateDiscovery for AcmClient {
    async fn discover_certificates(&self, hosts: &[String]) -> Result<Vec<String>> {
        let resp = self
            .client
            .list_certificates()
            .certificate_statuses(CertificateStatus::Issued)
            .send()
            .await
            .map_err(map_sdk_error)?;

        let mut matched = Vec::new();
        for summary in resp.certificate_summary_list.unwrap_or_default() {
            let Some(arn) = summary.certificate_arn.clone() else {
                continue;
            };
            let mut domains: Vec<String> = summary.subject_alternative_name_summaries.unwrap_or_default();
            if let Some(d) = summary.domain_name.clone() {
                domains.push(d);
            }
            if hosts.iter().any(|h| domains.iter().any(|d| certificate_matches_host(d, h))) {
                matched.push(arn);
            }
        }
        Ok(matched)
    }
}
