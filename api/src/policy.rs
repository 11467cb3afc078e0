/// Last hook over subject and body before a message is handed to the
/// transport. Earlier builds of this service hardwired content rewriting
/// here; it is now an explicit seam with a pass-through default.
pub trait ContentPolicy: Send + Sync {
    fn apply(&self, subject: &str, body: &str) -> (String, String);
}

/// Content goes out exactly as the caller wrote it.
pub struct Passthrough;

impl ContentPolicy for Passthrough {
    fn apply(&self, subject: &str, body: &str) -> (String, String) {
        (subject.to_string(), body.to_string())
    }
}

/// Appends a fixed footer to the body. Reapplying the policy to an already
/// footered body changes nothing.
pub struct Footer {
    text: String,
}

impl Footer {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl ContentPolicy for Footer {
    fn apply(&self, subject: &str, body: &str) -> (String, String) {
        if body.ends_with(&self.text) {
            return (subject.to_string(), body.to_string());
        }
        (subject.to_string(), format!("{body}\n\n{}", self.text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passthrough_is_idempotent() {
        let policy = Passthrough;
        let (subject, body) = policy.apply("Offer", "Hello there");
        let (subject2, body2) = policy.apply(&subject, &body);
        assert_eq!((subject, body), (subject2, body2));
    }

    #[test]
    fn footer_applies_once() {
        let policy = Footer::new("You can reply to opt out.");
        let (_, body) = policy.apply("Offer", "Hello there");
        assert!(body.ends_with("You can reply to opt out."));

        let (_, body2) = policy.apply("Offer", &body);
        assert_eq!(body, body2);
    }
}
