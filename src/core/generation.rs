//! Retry loop that turns an unreliable generator into one valid section.

use tracing::{debug, info, warn};

use crate::core::cancel::{Cancelled, CancellationToken};
use crate::core::executor::{GenerationOptions, Generator};
use crate::core::retry::RetryConfig;
use crate::core::sections::{Section, SectionValidator};

/// How hard to try for one section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionPolicy {
    pub retry: RetryConfig,
    /// Output budget for this section, if any.
    pub max_new_tokens: Option<u32>,
    pub validator: SectionValidator,
}

impl SectionPolicy {
    /// Built-in policy for `section` with `max_attempts` tries.
    #[must_use]
    pub const fn for_section(section: Section, max_attempts: u32) -> Self {
        Self {
            retry: RetryConfig::immediate(max_attempts),
            max_new_tokens: Some(section.default_max_new_tokens()),
            validator: SectionValidator::new(),
        }
    }
}

/// Asks `generator` for `section` until a response passes validation.
///
/// The token, when present, is checked before every attempt; a cancelled job
/// makes no further generator calls. Empty responses, generator errors and
/// responses failing the section's structural check all count as a spent
/// attempt. When every attempt is spent the result is an empty string,
/// which callers treat as "section missing" rather than as an error.
///
/// # Errors
///
/// Returns [`Cancelled`] if the token was cancelled before an attempt.
pub async fn generate_section(
    generator: &dyn Generator,
    section: Section,
    prompt: &str,
    policy: &SectionPolicy,
    token: Option<&CancellationToken>,
) -> Result<String, Cancelled> {
    let options = GenerationOptions {
        max_new_tokens: policy.max_new_tokens,
    };
    let max_attempts = policy.retry.max_attempts;

    for attempt in 1..=max_attempts {
        if let Some(token) = token {
            token.check()?;
        }

        match generator.generate(prompt, options).await {
            Ok(text) if text.trim().is_empty() => {
                warn!(%section, attempt, max_attempts, "empty response");
            }
            Ok(text) if policy.validator.is_valid(section, &text) => {
                info!(%section, attempt, generator = generator.name(), "section generated");
                return Ok(text);
            }
            Ok(text) => {
                warn!(%section, attempt, max_attempts, "response failed validation");
                debug!(%section, response = %text, "rejected response");
            }
            Err(e) => {
                warn!(%section, attempt, max_attempts, "generator error: {e:#}");
            }
        }

        if policy.retry.has_attempts_remaining(attempt) {
            let wait = policy.retry.wait_duration(attempt - 1);
            if !wait.is_zero() {
                tokio::time::sleep(wait).await;
            }
        }
    }

    warn!(%section, max_attempts, "no valid response, leaving section empty");
    Ok(String::new())
}
