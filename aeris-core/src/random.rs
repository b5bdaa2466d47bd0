use rand::distributions::Alphanumeric;
use rand::Rng;
use std::sync::Mutex;

/// Source of random tokens for coupon redemption codes.
/// Injectable so tests can force collisions.
pub trait RandomSource: Send + Sync {
    /// Draw an uppercase alphanumeric token of the given length
    fn next_token(&self, len: usize) -> String;
}

/// Thread-local RNG backed source used in production wiring
pub struct ThreadRngSource;

impl RandomSource for ThreadRngSource {
    fn next_token(&self, len: usize) -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(len)
            .map(|b| (b as char).to_ascii_uppercase())
            .collect()
    }
}

/// Replays a fixed list of tokens, then falls back to real randomness.
/// Lets tests script a collision followed by a fresh draw.
pub struct ScriptedCodes {
    queued: Mutex<Vec<String>>,
}

impl ScriptedCodes {
    pub fn new(tokens: Vec<&str>) -> Self {
        // Stored reversed so pop() yields them in order
        let mut queued: Vec<String> = tokens.into_iter().map(String::from).collect();
        queued.reverse();
        Self { queued: Mutex::new(queued) }
    }
}

impl RandomSource for ScriptedCodes {
    fn next_token(&self, len: usize) -> String {
        if let Some(token) = self.queued.lock().unwrap().pop() {
            return token;
        }
        ThreadRngSource.next_token(len)
    }
}
