use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use dashmap::DashMap;
use rand::Rng;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Generate a random anti-forgery state parameter (128 bits, base64url)
pub fn generate_state() -> String {
    let random_bytes: [u8; 16] = rand::thread_rng().gen();
    URL_SAFE_NO_PAD.encode(random_bytes)
}

#[derive(Debug, Clone)]
struct PendingState {
    state: String,
    issued_at: i64,
}

/// Most recently issued state per user. Issuing a new one replaces the old.
#[derive(Debug, Default)]
pub struct PendingStates {
    states: DashMap<String, PendingState>,
}

impl PendingStates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue and remember a fresh state for `user_id`
    pub fn issue(&self, user_id: &str, now: i64) -> String {
        let state = generate_state();
        self.states.insert(
            user_id.to_string(),
            PendingState {
                state: state.clone(),
                issued_at: now,
            },
        );
        state
    }

    /// True iff `state` equals the latest issued one and has not expired
    pub fn matches(&self, user_id: &str, state: &str, now: i64, ttl: i64) -> bool {
        let Some(pending) = self.states.get(user_id) else {
            return false;
        };

        if now - pending.issued_at > ttl {
            return false;
        }

        pending.state.as_bytes().ct_eq(state.as_bytes()).into()
    }

    pub fn discard(&self, user_id: &str) {
        self.states.remove(user_id);
    }
}

/// Authorization codes already submitted for exchange. Keeps a UI re-render
/// or a second tab from redeeming the same code twice.
#[derive(Debug, Default)]
pub struct ProcessedCodes {
    codes: DashMap<String, i64>,
}

impl ProcessedCodes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `code`. Returns false when it was already claimed within `ttl`.
    pub fn claim(&self, code: &str, now: i64, ttl: i64) -> bool {
        self.codes.retain(|_, claimed_at| now - *claimed_at <= ttl);

        match self.codes.entry(code_key(code)) {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(now);
                true
            }
        }
    }

    /// Forget a claim so a failed exchange can be retried
    pub fn release(&self, code: &str) {
        self.codes.remove(&code_key(code));
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

// Codes are only kept as digests
fn code_key(code: &str) -> String {
    format!("{:x}", Sha256::digest(code.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_state_unique() {
        let a = generate_state();
        let b = generate_state();
        assert_ne!(a, b);
        assert_eq!(a.len(), 22);
        assert!(!a.contains('='));
    }

    #[test]
    fn test_latest_state_wins() {
        let states = PendingStates::new();
        let first = states.issue("user-1", 0);
        let second = states.issue("user-1", 5);

        assert!(!states.matches("user-1", &first, 10, 600));
        assert!(states.matches("user-1", &second, 10, 600));
    }

    #[test]
    fn test_state_is_per_user() {
        let states = PendingStates::new();
        let state = states.issue("user-1", 0);
        assert!(!states.matches("user-2", &state, 0, 600));
    }

    #[test]
    fn test_state_expires() {
        let states = PendingStates::new();
        let state = states.issue("user-1", 0);
        assert!(states.matches("user-1", &state, 600, 600));
        assert!(!states.matches("user-1", &state, 601, 600));
    }

    #[test]
    fn test_discard() {
        let states = PendingStates::new();
        let state = states.issue("user-1", 0);
        states.discard("user-1");
        assert!(!states.matches("user-1", &state, 0, 600));
    }

    #[test]
    fn test_code_claimed_once() {
        let codes = ProcessedCodes::new();
        assert!(codes.claim("abc123", 0, 600));
        assert!(!codes.claim("abc123", 1, 600));
        assert!(codes.claim("def456", 1, 600));
    }

    #[test]
    fn test_released_code_can_be_claimed_again() {
        let codes = ProcessedCodes::new();
        assert!(codes.claim("abc123", 0, 600));
        codes.release("abc123");
        assert!(codes.claim("abc123", 1, 600));
    }

    #[test]
    fn test_expired_claims_are_pruned() {
        let codes = ProcessedCodes::new();
        assert!(codes.claim("abc123", 0, 600));
        assert!(codes.claim("other", 1_000, 600));
        assert_eq!(codes.len(), 1);
    }
}
