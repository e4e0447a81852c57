//! Which onboarding step to show before the inbox opens.

use serde::{Deserialize, Serialize};

/// Messaging identity status reported while the client is being set up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnboardingStatus {
    /// No identity exists for the wallet yet.
    New,
    /// Identity exists but has not been enabled on this device.
    Created,
}

/// Step index for the onboarding flow.
///
/// `0` skips onboarding (demo builds), `1` waits for a wallet connection,
/// `2` creates the identity and `3` enables it.
pub fn onboarding_step(demo: bool, status: Option<OnboardingStatus>) -> u8 {
    if demo {
        return 0;
    }
    match status {
        Some(OnboardingStatus::New) => 2,
        Some(OnboardingStatus::Created) => 3,
        None => 1,
    }
}
