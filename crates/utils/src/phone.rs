//! Phone number normalization used for duplicate detection.

/// Reduces a phone number to a canonical digit string.
///
/// Separators are dropped, an international `00` prefix becomes `+`, and a
/// national trunk `0` in front of a ten digit subscriber number is replaced by
/// `default_country_code`. Returns `None` when fewer than seven digits remain.
pub fn normalize_phone(raw: &str, default_country_code: &str) -> Option<String> {
    let trimmed = raw.trim();
    let has_plus = trimmed.starts_with('+');
    let mut digits: String = trimmed.chars().filter(|c| c.is_ascii_digit()).collect();

    if digits.len() < 7 {
        return None;
    }

    if has_plus {
        return Some(format!("+{digits}"));
    }

    if let Some(rest) = digits.strip_prefix("00") {
        return Some(format!("+{rest}"));
    }

    if digits.len() == 11 && digits.starts_with('0') {
        digits.remove(0);
    }

    if digits.len() == 10 {
        return Some(format!("+{default_country_code}{digits}"));
    }

    Some(format!("+{digits}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equivalent_forms_collapse() {
        let expected = Some("+905321234567".to_string());
        assert_eq!(normalize_phone("0532 123 45 67", "90"), expected);
        assert_eq!(normalize_phone("(532) 123-4567", "90"), expected);
        assert_eq!(normalize_phone("+90 532 123 45 67", "90"), expected);
        assert_eq!(normalize_phone("0090 532 123 45 67", "90"), expected);
    }

    #[test]
    fn test_too_short_is_rejected() {
        assert_eq!(normalize_phone("12-34", "90"), None);
        assert_eq!(normalize_phone("", "90"), None);
    }
}
