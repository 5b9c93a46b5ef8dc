use chrono::{DateTime, Utc};
use getrandom::getrandom;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

const BASE36_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

pub fn validate_identifier_value(kind: &str, value: &str) -> Result<(), String> {
    if value.is_empty() {
        return Err(format!("{kind} must be non-empty"));
    }
    if value
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
    {
        return Ok(());
    }
    Err(format!(
        "{kind} must use only ASCII letters, digits, '-' or '_'"
    ))
}

fn base36_encode_u64(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut chars = Vec::new();
    while value > 0 {
        let idx = (value % 36) as usize;
        chars.push(BASE36_ALPHABET[idx] as char);
        value /= 36;
    }
    chars.iter().rev().collect()
}

fn base36_encode_fixed_u64(mut value: u64, width: usize) -> String {
    let mut chars = vec!['0'; width];
    for idx in (0..width).rev() {
        chars[idx] = BASE36_ALPHABET[(value % 36) as usize] as char;
        value /= 36;
    }
    chars.into_iter().collect()
}

fn entropy_sample(counter: u64) -> u64 {
    let mut bytes = [0_u8; 8];
    match getrandom(&mut bytes) {
        Ok(()) => u64::from_le_bytes(bytes),
        // Id generation must never fail; degrade to pid/time entropy.
        Err(_) => {
            let nanos = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_nanos() as u64)
                .unwrap_or(0);
            (u64::from(std::process::id()) << 32) ^ nanos ^ counter.rotate_left(17)
        }
    }
}

/// Fresh `msg-<base36 millis>-<base36 suffix>` identifier for an envelope.
pub fn generate_message_id(now: DateTime<Utc>) -> String {
    let millis = u64::try_from(now.timestamp_millis()).unwrap_or(0);
    let counter = ID_COUNTER.fetch_add(1, Ordering::Relaxed);
    let suffix = base36_encode_fixed_u64(entropy_sample(counter), 6);
    format!("msg-{}-{}", base36_encode_u64(millis), suffix)
}

pub fn random_base36(width: usize) -> String {
    let counter = ID_COUNTER.fetch_add(1, Ordering::Relaxed);
    base36_encode_fixed_u64(entropy_sample(counter), width)
}
