//! Small utility helpers used across modules.

use once_cell::sync::Lazy;
use regex::Regex;

static UNSAFE_FILENAME_CHARS: Lazy<Regex> =
  Lazy::new(|| Regex::new(r#"[<>:"/\\|?*\x00-\x1f]"#).expect("static regex"));

/// Very small and safe string templating.
/// Replaces occurrences of `{key}` in the template with provided values.
/// This is intentionally simple (no nested/conditional logic).
pub fn fill_template(tpl: &str, pairs: &[(&str, &str)]) -> String {
  let mut out = tpl.to_string();
  for (k, v) in pairs {
    let needle = format!("{{{}}}", k);
    out = out.replace(&needle, v);
  }
  out
}

/// Strip characters that are invalid in file names and cap the length (in chars).
pub fn sanitize_filename(name: &str, max_chars: usize) -> String {
  let cleaned = UNSAFE_FILENAME_CHARS.replace_all(name.trim(), "");
  let capped: String = cleaned.chars().take(max_chars).collect();
  capped.trim().replace(' ', "_")
}

/// Log-safe truncation for large strings.
/// Avoids spamming logs with huge request/response payloads.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.len() <= max {
    return s.to_string();
  }
  let mut cut = max;
  while !s.is_char_boundary(cut) {
    cut -= 1;
  }
  format!("{}… ({} bytes total)", &s[..cut], s.len())
}

/// Value or a placeholder, for prompts and document metadata.
pub fn or_placeholder<'a>(value: &'a str, placeholder: &'a str) -> &'a str {
  if value.trim().is_empty() { placeholder } else { value.trim() }
}
