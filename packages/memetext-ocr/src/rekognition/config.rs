use aws_config::retry::RetryConfig;
use aws_config::{BehaviorVersion, Region, SdkConfig};

/// Retries attempted after the first failed request.
pub const DEFAULT_RETRIES: u32 = 5;

/// How to reach AWS: which profile, which region, how hard to retry.
#[derive(Debug, Clone)]
pub struct AwsOptions {
    pub profile: Option<String>,
    pub region: Option<String>,
    pub retries: u32,
}

impl Default for AwsOptions {
    fn default() -> Self {
        Self {
            profile: None,
            region: None,
            retries: DEFAULT_RETRIES,
        }
    }
}

impl AwsOptions {
    /// The SDK counts the initial request as an attempt.
    pub fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }

    /// Resolves credentials and region through the standard provider chains,
    /// with the profile and region overridden when set.
    pub async fn load(&self) -> SdkConfig {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .retry_config(RetryConfig::standard().with_max_attempts(self.max_attempts()));

        if let Some(profile) = &self.profile {
            loader = loader.profile_name(profile);
        }
        if let Some(region) = &self.region {
            loader = loader.region(Region::new(region.clone()));
        }

        loader.load().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_attempts_includes_first_request() {
        let options = AwsOptions::default();
        assert_eq!(options.max_attempts(), DEFAULT_RETRIES + 1);

        let options = AwsOptions {
            retries: u32::MAX,
            ..Default::default()
        };
        assert_eq!(options.max_attempts(), u32::MAX);
    }
}
