//! Rate limit key derivation.

use std::net::IpAddr;

use crate::config::KeyGranularity;

/// A key that uniquely identifies a rate-limited subject.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateLimitKey(String);

impl RateLimitKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for RateLimitKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl From<&str> for RateLimitKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

impl std::fmt::Display for RateLimitKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Maps request identity attributes to a [`RateLimitKey`].
///
/// With [`KeyGranularity::Address`] every user behind one address shares a
/// single quota. With [`KeyGranularity::UserAndAddress`] each user id gets its
/// own quota per address, which lets a client that rotates user ids multiply
/// its allowance.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyDeriver {
    granularity: KeyGranularity,
}

impl KeyDeriver {
    pub fn new(granularity: KeyGranularity) -> Self {
        Self { granularity }
    }

    /// Derive the key for a request. Never fails and never returns an empty key.
    pub fn derive(&self, source: IpAddr, user_id: Option<&str>) -> RateLimitKey {
        match self.granularity {
            KeyGranularity::Address => RateLimitKey(source.to_string()),
            KeyGranularity::UserAndAddress => {
                RateLimitKey(format!("{}:{}", user_id.unwrap_or_default(), source))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv6Addr;

    fn addr() -> IpAddr {
        "203.0.113.7".parse().unwrap()
    }

    #[test]
    fn test_address_granularity_ignores_user() {
        let deriver = KeyDeriver::new(KeyGranularity::Address);

        let alice = deriver.derive(addr(), Some("alice"));
        let bob = deriver.derive(addr(), Some("bob"));

        assert_eq!(alice, bob);
        assert_eq!(alice.as_str(), "203.0.113.7");
    }

    #[test]
    fn test_user_and_address_granularity() {
        let deriver = KeyDeriver::new(KeyGranularity::UserAndAddress);

        let alice = deriver.derive(addr(), Some("alice"));
        let bob = deriver.derive(addr(), Some("bob"));

        assert_ne!(alice, bob);
        assert_eq!(alice.to_string(), "alice:203.0.113.7");
    }

    #[test]
    fn test_missing_user_still_yields_key() {
        let deriver = KeyDeriver::new(KeyGranularity::UserAndAddress);

        let key = deriver.derive(addr(), None);
        assert_eq!(key.as_str(), ":203.0.113.7");
        assert!(!key.as_str().is_empty());
    }

    #[test]
    fn test_derivation_is_stable() {
        let deriver = KeyDeriver::new(KeyGranularity::UserAndAddress);
        let v6 = IpAddr::V6(Ipv6Addr::LOCALHOST);

        assert_eq!(deriver.derive(v6, Some("u")), deriver.derive(v6, Some("u")));
        assert_eq!(deriver.derive(v6, Some("u")).as_str(), "u:::1");
    }
}
