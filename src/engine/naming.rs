//! Rendering of naming templates into output file stems.

use crate::settings::{BlockKind, NamingConfig, RANDOM_LENGTH_RANGE};
use parking_lot::Mutex;
use rand::Rng;
use regex::Regex;
use std::sync::OnceLock;

const RANDOM_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Render `config` for an input file whose stem is `original_stem`.
///
/// Rendered blocks are joined with `_`; an empty prefix contributes nothing.
/// The result is never empty.
pub fn apply_naming_pipeline(original_stem: &str, config: &NamingConfig) -> String {
    let parts: Vec<String> = config
        .blocks
        .iter()
        .filter_map(|block| match &block.kind {
            BlockKind::Original => Some(original_stem.to_string()),
            BlockKind::Prefix { value } if value.is_empty() => None,
            BlockKind::Prefix { value } => Some(value.clone()),
            BlockKind::Random { length } => Some(random_token(usize::from(
                (*length).clamp(*RANDOM_LENGTH_RANGE.start(), *RANDOM_LENGTH_RANGE.end()),
            ))),
            BlockKind::Date => Some(date_stamp()),
        })
        .collect();

    let mut name = parts.join("_");
    if config.sanitize_enabled {
        name = sanitize_filename(&name);
    }

    if name.is_empty() {
        "unnamed".to_string()
    } else {
        name
    }
}

fn random_token(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| RANDOM_CHARSET[rng.gen_range(0..RANDOM_CHARSET.len())] as char)
        .collect()
}

/// Local time to the millisecond. Repeated calls within the same
/// millisecond get a `_2`, `_3`, ... suffix.
fn date_stamp() -> String {
    static LAST: OnceLock<Mutex<(String, u32)>> = OnceLock::new();
    let last = LAST.get_or_init(|| Mutex::new((String::new(), 0)));

    let stamp = chrono::Local::now().format("%Y%m%d%H%M%S%3f").to_string();
    let mut guard = last.lock();
    if guard.0 == stamp {
        guard.1 += 1;
        format!("{}_{}", stamp, guard.1)
    } else {
        *guard = (stamp.clone(), 1);
        stamp
    }
}

/// Lowercase, spaces to `_`, drop everything outside `[a-zA-Z0-9_-]`,
/// collapse and trim underscores. Falls back to `file`.
pub fn sanitize_filename(name: &str) -> String {
    static INVALID: OnceLock<Regex> = OnceLock::new();
    static UNDERSCORES: OnceLock<Regex> = OnceLock::new();
    let invalid = INVALID.get_or_init(|| Regex::new(r"[^a-zA-Z0-9_-]").expect("valid regex"));
    let underscores = UNDERSCORES.get_or_init(|| Regex::new(r"_+").expect("valid regex"));

    let lowered = name.to_lowercase().replace(' ', "_");
    let stripped = invalid.replace_all(&lowered, "");
    let collapsed = underscores.replace_all(&stripped, "_");
    let trimmed = collapsed.trim_matches('_');

    if trimmed.is_empty() {
        "file".to_string()
    } else {
        trimmed.to_string()
    }
}
