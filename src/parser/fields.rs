use regex::Regex;
use tracing::debug;

/// First capture group of the first match, or `None`. A blank capture is
/// treated as absent.
pub fn first_capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .filter(|s| !s.is_empty())
        .map(decode_entities)
}

/// First capture group of every match, in page order.
pub fn all_captures(re: &Regex, text: &str) -> Vec<String> {
    re.captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|m| decode_entities(m.as_str().trim()))
        .collect()
}

/// Parse an integer with thousands separators. Unparsable input only loses
/// this one field.
pub fn parse_int(raw: Option<String>) -> Option<i64> {
    let raw = raw?;
    let cleaned = raw.replace(',', "");
    match cleaned.parse::<i64>() {
        Ok(v) => Some(v),
        Err(e) => {
            debug!(value = %raw, error = %e, "Dropping unparsable integer field");
            None
        }
    }
}

pub fn parse_float(raw: Option<String>) -> Option<f64> {
    let raw = raw?;
    let cleaned = raw.replace(',', "");
    match cleaned.parse::<f64>() {
        Ok(v) => Some(v),
        Err(e) => {
            debug!(value = %raw, error = %e, "Dropping unparsable float field");
            None
        }
    }
}

/// Decode the handful of HTML entities the site emits in names.
pub fn decode_entities(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#039;", "'")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}
