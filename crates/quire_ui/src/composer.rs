//! Message composer state: input text, pending attachments, and whether
//! sending is currently allowed.

use quire_ai::types::Attachment;

pub const DEFAULT_PLACEHOLDER: &str = "Type your message here...";

/// What the user sends in one go.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Submission {
    pub text: String,
    pub attachments: Vec<Attachment>,
}

impl Submission {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            attachments: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && self.attachments.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct Composer {
    input: String,
    attachments: Vec<Attachment>,
    disabled: bool,
    placeholder: String,
}

impl Default for Composer {
    fn default() -> Self {
        Self {
            input: String::new(),
            attachments: Vec::new(),
            disabled: false,
            placeholder: DEFAULT_PLACEHOLDER.into(),
        }
    }
}

impl Composer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn set_input(&mut self, text: impl Into<String>) {
        self.input = text.into();
    }

    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    pub fn add_attachment(&mut self, attachment: Attachment) {
        self.attachments.push(attachment);
    }

    /// Remove every pending attachment with this file name.
    pub fn remove_attachment(&mut self, name: &str) -> bool {
        let before = self.attachments.len();
        self.attachments.retain(|a| a.name != name);
        self.attachments.len() != before
    }

    /// Whether the send control should be enabled.
    pub fn can_send(&self) -> bool {
        !self.disabled && (!self.input.trim().is_empty() || !self.attachments.is_empty())
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    pub fn placeholder(&self) -> &str {
        &self.placeholder
    }

    /// Disable input and show `reason` in place of the usual placeholder.
    pub fn disable(&mut self, reason: impl Into<String>) {
        self.disabled = true;
        self.placeholder = reason.into();
    }

    /// Disable input while a reply is streaming; the placeholder is kept.
    pub fn lock(&mut self) {
        self.disabled = true;
    }

    pub fn enable(&mut self) {
        self.disabled = false;
        self.placeholder = DEFAULT_PLACEHOLDER.into();
    }

    /// Clear and return the pending submission. Returns `None` (and leaves
    /// the state untouched) when there is nothing to send.
    pub fn take_submission(&mut self) -> Option<Submission> {
        let text = self.input.trim().to_string();
        if text.is_empty() && self.attachments.is_empty() {
            return None;
        }
        self.input.clear();
        Some(Submission {
            text,
            attachments: std::mem::take(&mut self.attachments),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attachment(name: &str) -> Attachment {
        Attachment {
            id: name.into(),
            name: name.into(),
            mime_type: "text/plain".into(),
            size: 1,
            data_url: "data:text/plain;base64,YQ==".into(),
            text_content: Some("a".into()),
        }
    }

    #[test]
    fn empty_composer_has_nothing_to_send() {
        let mut composer = Composer::new();
        composer.set_input("   \n ");
        assert!(!composer.can_send());
        assert!(composer.take_submission().is_none());
        assert_eq!(composer.input(), "   \n ");
    }

    #[test]
    fn take_submission_trims_and_clears() {
        let mut composer = Composer::new();
        composer.set_input("  hello  ");
        composer.add_attachment(attachment("a.txt"));
        let submission = composer.take_submission().unwrap();
        assert_eq!(submission.text, "hello");
        assert_eq!(submission.attachments.len(), 1);
        assert!(composer.input().is_empty());
        assert!(composer.attachments().is_empty());
    }

    #[test]
    fn attachments_alone_can_be_sent() {
        let mut composer = Composer::new();
        composer.add_attachment(attachment("a.txt"));
        assert!(composer.can_send());
        let submission = composer.take_submission().unwrap();
        assert!(submission.text.is_empty());
        assert!(!submission.is_empty());
    }

    #[test]
    fn remove_attachment_by_name() {
        let mut composer = Composer::new();
        composer.add_attachment(attachment("a.txt"));
        composer.add_attachment(attachment("b.txt"));
        assert!(composer.remove_attachment("a.txt"));
        assert!(!composer.remove_attachment("a.txt"));
        assert_eq!(composer.attachments().len(), 1);
    }

    #[test]
    fn disable_and_enable() {
        let mut composer = Composer::new();
        composer.set_input("hi");
        composer.disable("Limit reached");
        assert!(composer.is_disabled());
        assert!(!composer.can_send());
        assert_eq!(composer.placeholder(), "Limit reached");
        composer.enable();
        assert!(composer.can_send());
        assert_eq!(composer.placeholder(), DEFAULT_PLACEHOLDER);
    }
}
