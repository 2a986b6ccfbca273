//! Logon prompt detection for automatic sign-in

use std::time::Duration;

/// Pause before answering a prompt, so the BBS finishes drawing it
pub const LOGON_REPLY_DELAY: Duration = Duration::from_millis(500);

/// Which credential a line is asking for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogonPrompt {
    Username,
    Password,
}

/// Recognise the usual BBS sign-in prompts
pub fn detect(line: &str) -> Option<LogonPrompt> {
    let lower = line.to_lowercase();
    if lower.contains("enter your password:") {
        Some(LogonPrompt::Password)
    } else if lower.contains("type it in and press enter")
        || lower.contains("otherwise type \"new\":")
    {
        Some(LogonPrompt::Username)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_prompt() {
        assert_eq!(detect("Enter your password: "), Some(LogonPrompt::Password));
    }

    #[test]
    fn test_username_prompts() {
        assert_eq!(
            detect("If you already have a User-ID, type it in and press ENTER."),
            Some(LogonPrompt::Username)
        );
        assert_eq!(
            detect("Otherwise type \"new\": "),
            Some(LogonPrompt::Username)
        );
    }

    #[test]
    fn test_ordinary_line() {
        assert_eq!(detect("From Bob: hello all"), None);
    }
}
