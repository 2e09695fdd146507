//! The log entry form posted by the index page.
use crate::domain::logging::Severity;
use url::form_urlencoded;

pub const FIELD_LEVEL: &str = "log_level";
pub const FIELD_MESSAGE: &str = "log_msg";

const NOT_A_CHOICE: &str = "Not a valid choice.";
const REQUIRED: &str = "This field is required.";

/// The submitted fields, as sent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogEntryForm {
    pub log_level: String,
    pub log_msg: String,
}

/// Per field validation messages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormErrors {
    pub log_level: Option<&'static str>,
    pub log_msg: Option<&'static str>,
}

/// A form that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub severity: Severity,
    pub message: String,
}

impl LogEntryForm {
    /// Reads an `application/x-www-form-urlencoded` body. Unknown fields are ignored, for repeated
    /// fields the last one wins.
    pub fn parse(body: &[u8]) -> Self {
        let mut form = LogEntryForm::default();
        for (name, value) in form_urlencoded::parse(body) {
            match name.as_ref() {
                FIELD_LEVEL => form.log_level = value.into_owned(),
                FIELD_MESSAGE => form.log_msg = value.into_owned(),
                _ => {}
            }
        }
        form
    }

    pub fn validate(&self) -> Result<LogEntry, FormErrors> {
        let severity = self.log_level.parse::<Severity>().ok();
        let blank = self.log_msg.trim().is_empty();
        match severity {
            Some(severity) if !blank => Ok(LogEntry {
                severity,
                message: self.log_msg.clone(),
            }),
            _ => Err(FormErrors {
                log_level: severity.is_none().then_some(NOT_A_CHOICE),
                log_msg: blank.then_some(REQUIRED),
            }),
        }
    }
}
