//! Authentication utilities for the Coincheck private API
//!
//! Every private request carries three headers:
//! - `ACCESS-KEY`: the API key
//! - `ACCESS-NONCE`: a strictly increasing integer (microseconds since epoch)
//! - `ACCESS-SIGNATURE`: hex HMAC-SHA256 of `nonce + url` keyed by the API secret

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const ACCESS_KEY_HEADER: &str = "ACCESS-KEY";
pub const ACCESS_NONCE_HEADER: &str = "ACCESS-NONCE";
pub const ACCESS_SIGNATURE_HEADER: &str = "ACCESS-SIGNATURE";

/// Compute the request signature for a given nonce and fully built URL.
///
/// # Example
///
/// ```
/// use coincheck_poller::coincheck::auth::signature;
///
/// let sig = signature("secret", "1700000000000000", "https://coincheck.com/api/accounts/balance");
/// assert_eq!(sig.len(), 64);
/// ```
pub fn signature(secret: &str, nonce: &str, url: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(nonce.as_bytes());
    mac.update(url.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Headers attached to one private request. Never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeaders {
    pub access_key: String,
    pub nonce: String,
    pub signature: String,
}

impl SignedHeaders {
    pub fn as_pairs(&self) -> [(&'static str, &str); 3] {
        [
            (ACCESS_KEY_HEADER, self.access_key.as_str()),
            (ACCESS_NONCE_HEADER, self.nonce.as_str()),
            (ACCESS_SIGNATURE_HEADER, self.signature.as_str()),
        ]
    }
}

/// Strictly increasing nonce source.
///
/// Uses wall-clock microseconds and falls back to `last + 1` when the clock
/// has not advanced (or went backwards) since the previous call.
#[derive(Debug, Default)]
pub struct NonceGenerator {
    last: AtomicU64,
}

impl NonceGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> u64 {
        let now = Utc::now().timestamp_micros().max(0) as u64;
        let mut previous = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = now.max(previous + 1);
            match self.last.compare_exchange_weak(
                previous,
                candidate,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return candidate,
                Err(actual) => previous = actual,
            }
        }
    }
}

/// API credentials container
#[derive(Clone)]
pub struct Credentials {
    api_key: String,
    api_secret: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key)
            .field("api_secret", &"***")
            .finish()
    }
}

impl Credentials {
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        }
    }

    /// Looks for `COINCHECK_API_KEY` and `COINCHECK_API_SECRET`
    pub fn from_env() -> Result<Self, std::env::VarError> {
        let api_key = std::env::var("COINCHECK_API_KEY")?;
        let api_secret = std::env::var("COINCHECK_API_SECRET")?;
        Ok(Self::new(api_key, api_secret))
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn api_secret(&self) -> &str {
        &self.api_secret
    }

    pub fn is_empty(&self) -> bool {
        self.api_key.is_empty() || self.api_secret.is_empty()
    }
}

/// Produces [`SignedHeaders`] for private requests.
#[derive(Debug)]
pub struct Signer {
    credentials: Credentials,
    nonces: NonceGenerator,
}

impl Signer {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            nonces: NonceGenerator::new(),
        }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn sign(&self, url: &str) -> SignedHeaders {
        let nonce = self.nonces.next().to_string();
        let signature = signature(self.credentials.api_secret(), &nonce, url);
        SignedHeaders {
            access_key: self.credentials.api_key().to_string(),
            nonce,
            signature,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const URL: &str = "https://coincheck.com/api/accounts/balance";

    #[test]
    fn test_hmac_known_answer() {
        // RFC-style HMAC-SHA256 vector, split across nonce and url
        let sig = signature("key", "The quick brown fox ", "jumps over the lazy dog");
        assert_eq!(
            sig,
            "f7bc83f430538424b13298e6aa6fb143ef4d59a14946175997479dbc2d1a3cd8"
        );
    }

    #[test]
    fn test_signature_deterministic() {
        let sig1 = signature("test_secret", "n1", URL);
        let sig2 = signature("test_secret", "n1", URL);
        assert_eq!(sig1, sig2);
        assert_eq!(sig1.len(), 64);
        assert!(sig1.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_signature_covers_nonce_and_url() {
        let base = signature("test_secret", "1", URL);
        assert_ne!(base, signature("test_secret", "2", URL));
        assert_ne!(base, signature("test_secret", "1", "https://coincheck.com/api/accounts"));
        assert_ne!(base, signature("other_secret", "1", URL));
    }

    #[test]
    fn test_nonce_strictly_increasing() {
        let generator = NonceGenerator::new();
        let mut previous = generator.next();
        for _ in 0..10_000 {
            let next = generator.next();
            assert!(next > previous, "{} <= {}", next, previous);
            previous = next;
        }
    }

    #[test]
    fn test_nonce_unique_across_threads() {
        let generator = Arc::new(NonceGenerator::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let g = Arc::clone(&generator);
                std::thread::spawn(move || (0..1000).map(|_| g.next()).collect::<Vec<_>>())
            })
            .collect();

        let mut all: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        let total = all.len();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), total);
    }

    #[test]
    fn test_signer_headers() {
        let signer = Signer::new(Credentials::new("my_key", "my_secret"));
        let first = signer.sign(URL);
        let second = signer.sign(URL);

        assert_eq!(first.access_key, "my_key");
        assert!(second.nonce.parse::<u64>().unwrap() > first.nonce.parse::<u64>().unwrap());
        assert_eq!(first.signature, signature("my_secret", &first.nonce, URL));

        let pairs = first.as_pairs();
        assert_eq!(pairs[0].0, "ACCESS-KEY");
        assert_eq!(pairs[1].0, "ACCESS-NONCE");
        assert_eq!(pairs[2].0, "ACCESS-SIGNATURE");
    }

    #[test]
    fn test_credentials_debug_hides_secret() {
        let creds = Credentials::new("my_key", "my_secret");
        let rendered = format!("{:?}", creds);
        assert!(rendered.contains("my_key"));
        assert!(!rendered.contains("my_secret"));
    }

    #[test]
    fn test_credentials_is_empty() {
        assert!(Credentials::new("", "secret").is_empty());
        assert!(Credentials::new("key", "").is_empty());
        assert!(!Credentials::new("key", "secret").is_empty());
    }
}
