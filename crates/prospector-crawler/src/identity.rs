//! Randomized client identities for outgoing requests.
//!
//! Each identity is drawn from a table of internally-consistent browser
//! profiles: the `Sec-CH-UA` brand list, platform hint, and `Sec-Fetch-*`
//! conventions always agree with the claimed user-agent, so a mismatched
//! header set does not betray the client. Identities are ephemeral and never
//! persisted.

use rand::Rng;

/// One coherent browser fingerprint.
struct BrowserProfile {
    user_agent: &'static str,
    /// `None` for engines that do not send client hints (Firefox, Safari).
    sec_ch_ua: Option<&'static str>,
    sec_ch_ua_platform: Option<&'static str>,
    accept_language: &'static str,
}

const PROFILES: &[BrowserProfile] = &[
    BrowserProfile {
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                     (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36",
        sec_ch_ua: Some("\"Not/A)Brand\";v=\"8\", \"Chromium\";v=\"126\", \"Google Chrome\";v=\"126\""),
        sec_ch_ua_platform: Some("\"Windows\""),
        accept_language: "en-US,en;q=0.9",
    },
    BrowserProfile {
        user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
                     (KHTML, like Gecko) Chrome/125.0.0.0 Safari/537.36",
        sec_ch_ua: Some("\"Chromium\";v=\"125\", \"Google Chrome\";v=\"125\", \"Not.A/Brand\";v=\"24\""),
        sec_ch_ua_platform: Some("\"macOS\""),
        accept_language: "en-US,en;q=0.9",
    },
    BrowserProfile {
        user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
                     (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
        sec_ch_ua: Some("\"Chromium\";v=\"124\", \"Google Chrome\";v=\"124\", \"Not-A.Brand\";v=\"99\""),
        sec_ch_ua_platform: Some("\"Linux\""),
        accept_language: "en-US,en;q=0.8",
    },
    BrowserProfile {
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:127.0) \
                     Gecko/20100101 Firefox/127.0",
        sec_ch_ua: None,
        sec_ch_ua_platform: None,
        accept_language: "en-US,en;q=0.5",
    },
    BrowserProfile {
        user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:126.0) \
                     Gecko/20100101 Firefox/126.0",
        sec_ch_ua: None,
        sec_ch_ua_platform: None,
        accept_language: "en-US,en;q=0.5",
    },
    BrowserProfile {
        user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 \
                     (KHTML, like Gecko) Version/17.5 Safari/605.1.15",
        sec_ch_ua: None,
        sec_ch_ua_platform: None,
        accept_language: "en-US,en;q=0.9",
    },
];

/// A generated client identity: user-agent plus a header set consistent with
/// that user-agent's claimed browser.
#[derive(Debug, Clone)]
pub struct Identity {
    pub user_agent: String,
    headers: Vec<(&'static str, String)>,
}

impl Identity {
    fn from_profile(profile: &BrowserProfile) -> Self {
        let mut headers: Vec<(&'static str, String)> = vec![
            ("User-Agent", profile.user_agent.to_string()),
            (
                "Accept",
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8".to_string(),
            ),
            ("Accept-Language", profile.accept_language.to_string()),
            ("Upgrade-Insecure-Requests", "1".to_string()),
            ("Sec-Fetch-Dest", "document".to_string()),
            ("Sec-Fetch-Mode", "navigate".to_string()),
            ("Sec-Fetch-Site", "none".to_string()),
        ];
        if let Some(sec_ch_ua) = profile.sec_ch_ua {
            headers.push(("Sec-CH-UA", sec_ch_ua.to_string()));
            headers.push(("Sec-CH-UA-Mobile", "?0".to_string()));
        }
        if let Some(platform) = profile.sec_ch_ua_platform {
            headers.push(("Sec-CH-UA-Platform", platform.to_string()));
        }
        Self {
            user_agent: profile.user_agent.to_string(),
            headers,
        }
    }

    /// The full request header set, user-agent included.
    #[must_use]
    pub fn headers(&self) -> &[(&'static str, String)] {
        &self.headers
    }
}

/// Pure identity generator. No failure mode; the only side effect is PRNG
/// state advance.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityPool;

impl IdentityPool {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    #[must_use]
    pub fn next_identity(&self) -> Identity {
        let index = rand::rng().random_range(0..PROFILES.len());
        Identity::from_profile(&PROFILES[index])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_identity_has_a_nonempty_user_agent() {
        let pool = IdentityPool::new();
        for _ in 0..32 {
            let identity = pool.next_identity();
            assert!(!identity.user_agent.is_empty());
            assert!(identity.user_agent.starts_with("Mozilla/5.0"));
        }
    }

    #[test]
    fn headers_always_include_the_basics() {
        let pool = IdentityPool::new();
        for _ in 0..32 {
            let identity = pool.next_identity();
            let names: Vec<&str> = identity.headers().iter().map(|(n, _)| *n).collect();
            assert!(names.contains(&"User-Agent"));
            assert!(names.contains(&"Accept-Language"));
            assert!(names.contains(&"Sec-Fetch-Mode"));
        }
    }

    #[test]
    fn client_hints_match_the_claimed_browser() {
        // Chrome UAs must carry Sec-CH-UA; Firefox and Safari must not.
        for profile in PROFILES {
            let identity = Identity::from_profile(profile);
            let has_hints = identity.headers().iter().any(|(n, _)| *n == "Sec-CH-UA");
            if profile.user_agent.contains("Chrome/") {
                assert!(has_hints, "Chrome profile missing client hints");
            } else {
                assert!(!has_hints, "non-Chromium profile must not send Sec-CH-UA");
            }
        }
    }

    #[test]
    fn platform_hint_agrees_with_user_agent() {
        for profile in PROFILES {
            if let Some(platform) = profile.sec_ch_ua_platform {
                let ua = profile.user_agent;
                let consistent = (platform.contains("Windows") && ua.contains("Windows"))
                    || (platform.contains("macOS") && ua.contains("Mac OS X"))
                    || (platform.contains("Linux") && ua.contains("Linux"));
                assert!(consistent, "platform hint {platform} disagrees with UA {ua}");
            }
        }
    }
}
