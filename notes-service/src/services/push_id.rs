//! Time-ordered keys in the realtime database's push-id format.
//!
//! An id is 20 characters: 8 encode the creation time in milliseconds, 12 are
//! random. Ids minted within the same millisecond reuse the previous random
//! part incremented by one, so one generator never hands out ids out of order.

use chrono::Utc;
use rand::Rng;
use std::sync::{Mutex, PoisonError};

const PUSH_CHARS: &[u8; 64] = b"-0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ_abcdefghijklmnopqrstuvwxyz";
const TIMESTAMP_LEN: usize = 8;
const RANDOM_LEN: usize = 12;

#[derive(Debug, Default)]
struct GeneratorState {
    last_timestamp: i64,
    last_random: [u8; RANDOM_LEN],
}

#[derive(Debug, Default)]
pub struct PushIdGenerator {
    state: Mutex<GeneratorState>,
}

impl PushIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generate(&self) -> String {
        self.generate_at(Utc::now().timestamp_millis())
    }

    fn generate_at(&self, timestamp_ms: i64) -> String {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        if timestamp_ms == state.last_timestamp {
            for digit in state.last_random.iter_mut().rev() {
                if *digit == 63 {
                    *digit = 0;
                } else {
                    *digit += 1;
                    break;
                }
            }
        } else {
            let mut rng = rand::thread_rng();
            for digit in state.last_random.iter_mut() {
                *digit = rng.gen_range(0..64);
            }
            state.last_timestamp = timestamp_ms;
        }

        let mut timestamp_chars = [0u8; TIMESTAMP_LEN];
        let mut remaining = timestamp_ms.max(0);
        for slot in timestamp_chars.iter_mut().rev() {
            *slot = PUSH_CHARS[(remaining % 64) as usize];
            remaining /= 64;
        }

        let mut id = String::with_capacity(TIMESTAMP_LEN + RANDOM_LEN);
        id.extend(timestamp_chars.iter().map(|&c| c as char));
        id.extend(
            state
                .last_random
                .iter()
                .map(|&digit| PUSH_CHARS[digit as usize] as char),
        );
        id
    }
}
