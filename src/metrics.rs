use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use sha2::{Digest, Sha256};

use crate::util::round_to;

const ELLIPSIS: &str = "...";
const HASH_PREFIX_CHARS: usize = 12;

static HOME_PROJECT_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/home/[^/]+/[^/]+/").expect("valid home prefix regex"));
static REPEATED_SLASHES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/{2,}").expect("valid repeated slash regex"));

/// `ceil(chars / 4)`, never below 1.
pub fn estimate_tokens(text: &str) -> i64 {
    let chars = text.chars().count() as i64;
    ((chars + 3) / 4).max(1)
}

/// Strips workspace and home-project prefixes and collapses repeated slashes.
/// Every rewrite shortens the text, so the loop stops at a fixed point.
pub fn canonicalize_paths(text: &str) -> String {
    let mut current = text.to_string();
    loop {
        let collapsed = REPEATED_SLASHES.replace_all(&current, "/");
        let stripped = collapsed.replace("/workspace/", "");
        let next = HOME_PROJECT_PREFIX.replace_all(&stripped, "").into_owned();
        if next == current {
            return next;
        }
        current = next;
    }
}

pub fn compress_text(text: &str, max_chars: usize) -> String {
    let clean = canonicalize_paths(text);
    if clean.chars().count() <= max_chars {
        return clean;
    }

    let keep = max_chars.saturating_sub(ELLIPSIS.len());
    let mut out = clean.chars().take(keep).collect::<String>();
    out.push_str(ELLIPSIS);
    out
}

pub fn hash_text(text: &str) -> String {
    let digest = format!("{:x}", Sha256::digest(text.as_bytes()));
    digest[..HASH_PREFIX_CHARS].to_string()
}

pub fn word_set_similarity(left: &str, right: &str) -> f64 {
    let left_words = word_set(left);
    let right_words = word_set(right);

    let union = left_words.union(&right_words).count();
    if union == 0 {
        return 1.0;
    }

    let intersection = left_words.intersection(&right_words).count();
    round_to(intersection as f64 / union as f64, 3)
}

fn word_set(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(ToOwned::to_owned)
        .collect()
}
