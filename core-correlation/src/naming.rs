//! Device name improvement
//!
//! Once a device has a known owner, names that only carry the owner's first
//! name (or nothing personal at all) are rewritten to `"First Last's <type>"`:
//!
//! ```text
//! Brandon's iPad   + Brandon Smith -> Brandon Smith's iPad
//! JOHN-MACBOOK-PRO + John Doe      -> John Doe's Macbook Pro
//! LAPTOP-JOHN      + John Doe      -> John Doe's Laptop
//! Unknown Device   + Jane Wilson   -> Jane Wilson's Device
//! ```
//!
//! A name that already contains "First Last" or the owner's full stored name
//! is left alone, which makes the rewrite idempotent.

const GENERIC_NAMES: &[&str] = &["unknown device", "device", "computer", "laptop", "desktop", "workstation"];
const DEVICE_TYPES: &[&str] = &["laptop", "desktop", "workstation", "computer"];

/// Rewrite `current` to carry the owner's first and last name.
///
/// Returns `current` unchanged when the owner has fewer than two name parts
/// or no pattern applies.
pub fn improve_device_name(current: &str, owner_full_name: &str) -> String {
    let mut parts = owner_full_name.split_whitespace();
    let (Some(first), Some(last)) = (parts.next(), parts.last()) else {
        return current.to_string();
    };
    let full = format!("{} {}", first, last);

    let lower = current.to_lowercase();
    let first_lower = first.to_lowercase();

    let stored = owner_full_name.split_whitespace().collect::<Vec<_>>().join(" ");
    if lower.contains(&full.to_lowercase()) || lower.contains(&stored.to_lowercase()) {
        return current.to_string();
    }

    let possessive = format!("{}'s ", first_lower);
    if let Some(at) = find_word(&lower, &possessive) {
        return splice(current, at, possessive.len(), &format!("{}'s ", full));
    }

    let leading = format!("{}-", first_lower);
    if let Some(at) = find_word(&lower, &leading) {
        let rest = current.get(at + leading.len()..).unwrap_or_default();
        return format!("{}'s {}", full, device_part(rest));
    }

    let trailing = format!("-{}", first_lower);
    if let Some(at) = lower.find(&trailing) {
        let head = current.get(..at).unwrap_or_default();
        return format!("{}'s {}", full, device_part(head));
    }

    if GENERIC_NAMES.iter().any(|generic| lower.contains(generic)) {
        let device_type = DEVICE_TYPES
            .iter()
            .find(|kind| lower.contains(*kind))
            .map(|kind| title_case(kind))
            .unwrap_or_else(|| "Device".to_string());
        return format!("{}'s {}", full, device_type);
    }

    let spaced = format!("{} ", first_lower);
    if !lower.contains(&last.to_lowercase()) {
        if let Some(at) = find_word(&lower, &spaced) {
            return splice(current, at, spaced.len(), &format!("{} ", full));
        }
    }

    current.to_string()
}

/// First occurrence of `needle` that starts at a word boundary.
///
/// Offsets index the lower-cased text; callers slice the original with
/// `get` since lower-casing can change byte lengths outside ASCII.
fn find_word(haystack: &str, needle: &str) -> Option<usize> {
    haystack.match_indices(needle).map(|(at, _)| at).find(|&at| {
        haystack[..at]
            .chars()
            .next_back()
            .map_or(true, |c| !c.is_alphanumeric())
    })
}

fn splice(current: &str, at: usize, len: usize, replacement: &str) -> String {
    match (current.get(..at), current.get(at + len..)) {
        (Some(head), Some(tail)) => format!("{}{}{}", head, replacement, tail),
        _ => current.to_string(),
    }
}

/// `"MACBOOK-PRO"` -> `"Macbook Pro"`; empty input becomes `"Device"`.
fn device_part(raw: &str) -> String {
    let words: Vec<String> = raw
        .split(|c: char| c == '-' || c == '_' || c.is_whitespace())
        .filter(|word| !word.is_empty())
        .map(title_case)
        .collect();

    if words.is_empty() {
        "Device".to_string()
    } else {
        words.join(" ")
    }
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_possessive_first_name() {
        assert_eq!(improve_device_name("Brandon's iPad", "Brandon Smith"), "Brandon Smith's iPad");
        assert_eq!(improve_device_name("brandon's iPad", "Brandon Smith"), "Brandon Smith's iPad");
    }

    #[test]
    fn test_hyphenated_names() {
        assert_eq!(improve_device_name("JOHN-MACBOOK-PRO", "John Doe"), "John Doe's Macbook Pro");
        assert_eq!(improve_device_name("LAPTOP-JOHN", "John Doe"), "John Doe's Laptop");
        assert_eq!(improve_device_name("john-", "John Doe"), "John Doe's Device");
    }

    #[test]
    fn test_generic_names() {
        assert_eq!(improve_device_name("Unknown Device 3f9a0c12", "Jane Wilson"), "Jane Wilson's Device");
        assert_eq!(improve_device_name("Dell Workstation", "Jane Wilson"), "Jane Wilson's Workstation");
        assert_eq!(improve_device_name("Shared laptop", "Jane Q Wilson"), "Jane Wilson's Laptop");
    }

    #[test]
    fn test_first_name_followed_by_space() {
        assert_eq!(improve_device_name("Priya iPhone", "Priya Patel"), "Priya Patel iPhone");
    }

    #[test]
    fn test_no_pattern_leaves_name() {
        assert_eq!(improve_device_name("PRINTER-3F", "John Doe"), "PRINTER-3F");
        assert_eq!(improve_device_name("Joann's iPad", "Ann Lee"), "Joann's iPad");
    }

    #[test]
    fn test_single_word_owner_leaves_name() {
        assert_eq!(improve_device_name("Cher's iPad", "Cher"), "Cher's iPad");
        assert_eq!(improve_device_name("Cher's iPad", "  "), "Cher's iPad");
    }

    #[test]
    fn test_middle_name_owner_keeps_full_name() {
        assert_eq!(
            improve_device_name("Jane Q Wilson's Laptop", "Jane Q Wilson"),
            "Jane Q Wilson's Laptop"
        );
        assert_eq!(
            improve_device_name("Unknown Device", "Jane Q Wilson"),
            "Jane Wilson's Device"
        );
    }

    #[test]
    fn test_improvement_is_idempotent() {
        let cases = [
            ("Brandon Smith's iPad", "Brandon Smith"),
            ("Brandon's iPad", "Brandon Smith"),
            ("LAPTOP-JOHN", "John Doe"),
            ("JOHN-MACBOOK-PRO", "John Doe"),
            ("Unknown Device", "Jane Wilson"),
            ("John Doe's Laptop Pro", "John Doe"),
            ("Priya iPhone", "Priya Patel"),
        ];

        for (name, owner) in cases {
            let once = improve_device_name(name, owner);
            let twice = improve_device_name(&once, owner);
            assert_eq!(once, twice, "not idempotent for {:?}", name);
        }
        assert_eq!(
            improve_device_name("Brandon Smith's iPad", "Brandon Smith"),
            "Brandon Smith's iPad"
        );
    }
}
