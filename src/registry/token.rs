//! Booking token issuance
//!
//! Tokens are the first 8 hex characters of a fresh 128-bit random value.
//! Eight characters alone are not collision-free over a long lifetime, so the
//! issuer keeps a ledger of every token it has handed out (seeded from
//! persisted state) and redraws on a hit.

use parking_lot::Mutex;
use std::collections::HashSet;

use super::types::{BookingId, BOOKING_ID_LEN, WIDE_BOOKING_ID_LEN};

/// Redraws before giving up; practically unreachable.
const MAX_DRAWS: usize = 64;

pub struct TokenIssuer {
    issued: Mutex<HashSet<String>>,
}

impl TokenIssuer {
    pub fn new() -> Self {
        Self {
            issued: Mutex::new(HashSet::new()),
        }
    }

    /// Mark tokens as already issued (active bookings, persisted ledger).
    pub fn seed<I, S>(&self, tokens: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut issued = self.issued.lock();
        issued.extend(tokens.into_iter().map(Into::into));
    }

    /// Mint a token this issuer has never returned before.
    pub fn issue(&self) -> BookingId {
        let mut issued = self.issued.lock();
        for _ in 0..MAX_DRAWS {
            let candidate = draw();
            if issued.insert(candidate.clone()) {
                return BookingId::from_raw(candidate);
            }
        }
        // Fall back to the full 128-bit rendering, which cannot realistically collide.
        let wide = hex::encode(rand::random::<[u8; 16]>());
        debug_assert_eq!(wide.len(), WIDE_BOOKING_ID_LEN);
        issued.insert(wide.clone());
        BookingId::from_raw(wide)
    }

    pub fn issued_count(&self) -> usize {
        self.issued.lock().len()
    }
}

impl Default for TokenIssuer {
    fn default() -> Self {
        Self::new()
    }
}

fn draw() -> String {
    let bytes: [u8; 16] = rand::random();
    let mut rendered = hex::encode(bytes);
    rendered.truncate(BOOKING_ID_LEN);
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_shape() {
        let issuer = TokenIssuer::new();
        let token = issuer.issue();
        assert_eq!(token.as_str().len(), BOOKING_ID_LEN);
        assert!(BookingId::is_well_formed(token.as_str()));
    }

    #[test]
    fn test_tokens_unique() {
        let issuer = TokenIssuer::new();
        let mut seen = HashSet::new();
        for _ in 0..10_000 {
            assert!(seen.insert(issuer.issue().as_str().to_string()));
        }
        assert_eq!(issuer.issued_count(), 10_000);
    }

    #[test]
    fn test_seeded_tokens_not_reissued() {
        let issuer = TokenIssuer::new();
        issuer.seed(["aaaaaaaa", "bbbbbbbb"]);
        assert_eq!(issuer.issued_count(), 2);
        for _ in 0..1000 {
            let token = issuer.issue();
            assert_ne!(token.as_str(), "aaaaaaaa");
            assert_ne!(token.as_str(), "bbbbbbbb");
        }
    }
}
