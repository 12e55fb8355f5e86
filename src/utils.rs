//! Hashing and n-gram helpers shared between the index builder and the
//! matcher.

use seahash::hash;

pub type Hash = u64;

/// Size, in bytes, of the n-grams used to bucket rules in the index.
pub const NGRAM_SIZE: usize = 5;

#[inline]
pub fn fast_hash(input: &str) -> Hash {
    hash(input.as_bytes())
}

/// Checksum recorded for rule-list text and for serialized index payloads.
pub fn buffer_checksum(data: &[u8]) -> String {
    format!("{:016x}", hash(data))
}

/// Characters that act as match-time separators in filter patterns. N-grams
/// never straddle them, since the bytes they stand in for are unknown until
/// match time.
#[inline]
pub fn is_ngram_separator(b: u8) -> bool {
    b == b'*' || b == b'^'
}

/// Extracts every fixed-size window of `text` that contains no separator
/// byte, packed into a `u64`. The value 0 (an all-NUL window) cannot occur
/// in list text and is reserved as the "no n-gram" marker.
pub fn each_ngram(text: &str, mut f: impl FnMut(Hash)) {
    let bytes = text.as_bytes();
    if bytes.len() < NGRAM_SIZE {
        return;
    }
    'windows: for window in bytes.windows(NGRAM_SIZE) {
        let mut packed: Hash = 0;
        for &b in window {
            if is_ngram_separator(b) {
                continue 'windows;
            }
            packed = (packed << 8) | Hash::from(b);
        }
        f(packed);
    }
}

pub fn ngrams(text: &str) -> Vec<Hash> {
    let mut out = Vec::new();
    each_ngram(text, |n| out.push(n));
    out
}

/// True when `host` is `domain` itself or a subdomain of it.
pub fn host_matches_domain(host: &str, domain: &str) -> bool {
    if host.len() == domain.len() {
        return host == domain;
    }
    host.len() > domain.len()
        && host.ends_with(domain)
        && host.as_bytes()[host.len() - domain.len() - 1] == b'.'
}
