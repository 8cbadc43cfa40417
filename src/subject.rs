//! Subject validation and inbox generation.
//!
//! Subjects are dotted token sequences. Publish subjects may not contain
//! wildcards; subscribe subjects may use `*` (one token) and `>` (trailing
//! tokens, last position only).

use crate::error::ProtocolError;

const MAX_SUBJECT_LEN: usize = 256;

fn validate_common(subject: &str) -> Result<(), ProtocolError> {
    if subject.is_empty() {
        return Err(invalid(subject, "subject is empty"));
    }
    if subject.len() > MAX_SUBJECT_LEN {
        return Err(invalid(subject, "subject exceeds 256 characters"));
    }
    if subject.chars().any(char::is_whitespace) {
        return Err(invalid(subject, "subject contains whitespace"));
    }
    if subject.starts_with('.') || subject.ends_with('.') {
        return Err(invalid(subject, "subject has a leading or trailing dot"));
    }
    if subject.contains("..") {
        return Err(invalid(subject, "subject contains an empty token"));
    }
    Ok(())
}

fn invalid(subject: &str, reason: &str) -> ProtocolError {
    ProtocolError::InvalidSubject {
        subject: format!("{subject} ({reason})"),
    }
}

/// Validates a subject for use in `PUB`/`HPUB`: no wildcard tokens allowed.
pub fn validate_publish_subject(subject: &str) -> Result<(), ProtocolError> {
    validate_common(subject)?;
    for token in subject.split('.') {
        if token == "*" || token == ">" {
            return Err(invalid(subject, "wildcards are not allowed in publish subjects"));
        }
    }
    Ok(())
}

/// Validates a subject for use in `SUB`: `*` matches exactly one token, `>`
/// matches one-or-more trailing tokens and must be the last token.
pub fn validate_subscribe_subject(subject: &str) -> Result<(), ProtocolError> {
    validate_common(subject)?;
    let tokens: Vec<&str> = subject.split('.').collect();
    for (i, token) in tokens.iter().enumerate() {
        if token.contains('>') && *token != ">" {
            return Err(invalid(subject, "'>' must be a complete token"));
        }
        if token.contains('*') && *token != "*" {
            return Err(invalid(subject, "'*' must be a complete token"));
        }
        if *token == ">" && i != tokens.len() - 1 {
            return Err(invalid(subject, "'>' must be the last token"));
        }
    }
    Ok(())
}

/// Validates a queue group name: non-empty, no whitespace.
pub fn validate_queue_group(name: &str) -> Result<(), ProtocolError> {
    if name.is_empty() || name.chars().any(char::is_whitespace) {
        return Err(ProtocolError::InvalidQueueGroup {
            name: name.to_string(),
        });
    }
    Ok(())
}

/// Reports whether `subject` (a concrete, wildcard-free subject as would
/// appear on an inbound message) matches `pattern` (a subscribe subject that
/// may contain `*`/`>`).
pub fn matches(pattern: &str, subject: &str) -> bool {
    let pattern_tokens: Vec<&str> = pattern.split('.').collect();
    let subject_tokens: Vec<&str> = subject.split('.').collect();

    let mut pi = 0;
    let mut si = 0;
    while pi < pattern_tokens.len() {
        match pattern_tokens[pi] {
            ">" => return si <= subject_tokens.len() && si < subject_tokens.len(),
            "*" => {
                if si >= subject_tokens.len() {
                    return false;
                }
            }
            literal => {
                if si >= subject_tokens.len() || subject_tokens[si] != literal {
                    return false;
                }
            }
        }
        pi += 1;
        si += 1;
    }
    si == subject_tokens.len()
}

/// Generates a unique inbox subject: `<prefix>.<22-character NUID>`.
pub fn new_inbox(prefix: &str) -> String {
    format!("{prefix}.{}", nuid::next())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_rejects_empty_and_malformed() {
        assert!(validate_publish_subject("").is_err());
        assert!(validate_publish_subject(" ").is_err());
        assert!(validate_publish_subject(".foo").is_err());
        assert!(validate_publish_subject("foo.").is_err());
        assert!(validate_publish_subject("foo..bar").is_err());
        assert!(validate_publish_subject("foo.*").is_err());
        assert!(validate_publish_subject("foo.>").is_err());
        assert!(validate_publish_subject(&"a".repeat(257)).is_err());
    }

    #[test]
    fn publish_accepts_plain_subjects() {
        assert!(validate_publish_subject("foo.bar.baz").is_ok());
        assert!(validate_publish_subject("foo").is_ok());
    }

    #[test]
    fn subscribe_accepts_wildcards_as_complete_tokens() {
        assert!(validate_subscribe_subject("foo.*.bar").is_ok());
        assert!(validate_subscribe_subject("foo.>").is_ok());
        assert!(validate_subscribe_subject(">").is_ok());
    }

    #[test]
    fn subscribe_rejects_malformed_wildcards() {
        assert!(validate_subscribe_subject("foo.>.bar").is_err());
        assert!(validate_subscribe_subject("foo*").is_err());
        assert!(validate_subscribe_subject("foo>").is_err());
    }

    #[test]
    fn matches_is_reflexive_on_concrete_subjects() {
        assert!(matches("foo.bar.baz", "foo.bar.baz"));
        assert!(!matches("foo.bar.baz", "foo.bar"));
    }

    #[test]
    fn matches_star_matches_one_token() {
        assert!(matches("foo.*.baz", "foo.bar.baz"));
        assert!(!matches("foo.*.baz", "foo.bar.qux.baz"));
        assert!(!matches("foo.*", "foo"));
    }

    #[test]
    fn matches_gt_matches_one_or_more_trailing_tokens() {
        assert!(matches("foo.>", "foo.bar"));
        assert!(matches("foo.>", "foo.bar.baz"));
        assert!(!matches("foo.>", "foo"));
    }

    #[test]
    fn inbox_has_expected_shape_and_is_unique() {
        let a = new_inbox("_INBOX");
        let b = new_inbox("_INBOX");
        assert!(a.starts_with("_INBOX."));
        let id = a.strip_prefix("_INBOX.").unwrap();
        assert_eq!(id.len(), 22);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }
}
