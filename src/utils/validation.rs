use regex::Regex;

pub fn validate_email(email: &str) -> bool {
    let re = Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap();
    re.is_match(email)
}

pub fn validate_telephone(telephone: &str) -> bool {
    let re = Regex::new(r"^\+?[0-9][0-9\-\s]{6,14}$").unwrap();
    re.is_match(telephone)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_and_plus_prefixed_numbers() {
        assert!(validate_telephone("0812345678"));
        assert!(validate_telephone("+66812345678"));
        assert!(validate_telephone("02-123-4567"));
    }

    #[test]
    fn rejects_short_or_alphabetic_numbers() {
        assert!(!validate_telephone("12345"));
        assert!(!validate_telephone("not-a-phone"));
        assert!(!validate_telephone("+"));
    }

    #[test]
    fn validates_emails() {
        assert!(validate_email("user@example.com"));
        assert!(!validate_email("user@localhost"));
        assert!(!validate_email("no-at-sign"));
    }
}
