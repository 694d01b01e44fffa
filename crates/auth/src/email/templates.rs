use crate::error::{Error, Result};
use askama::Template;

/// Link the user follows to pick a new password.
pub fn reset_link(frontend_url: &str, token: &str) -> String {
    format!(
        "{}/reset-password?token={}",
        frontend_url.trim_end_matches('/'),
        token
    )
}

#[derive(Template)]
#[template(path = "email/password_reset.txt")]
struct PasswordResetText<'a> {
    display_name: &'a str,
    reset_link: &'a str,
    expires_in_minutes: i64,
}

/// HTML part. Askama escapes every interpolated value, so a display name
/// carrying markup arrives as text.
#[derive(Template)]
#[template(path = "email/password_reset.html")]
struct PasswordResetHtml<'a> {
    display_name: &'a str,
    reset_link: &'a str,
    expires_in_minutes: i64,
}

/// Password reset template, returns `(subject, text, html)`.
pub fn password_reset(
    display_name: &str,
    reset_link: &str,
    expires_in_minutes: i64,
) -> Result<(String, String, String)> {
    let subject = "Reset your password".to_string();

    let text = PasswordResetText {
        display_name,
        reset_link,
        expires_in_minutes,
    }
    .render()
    .map_err(|e| Error::Internal(format!("Failed to render email text: {}", e)))?;

    let html = PasswordResetHtml {
        display_name,
        reset_link,
        expires_in_minutes,
    }
    .render()
    .map_err(|e| Error::Internal(format!("Failed to render email html: {}", e)))?;

    Ok((subject, text, html))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_link_trims_trailing_slash() {
        assert_eq!(
            reset_link("http://localhost:3000/", "abc"),
            "http://localhost:3000/reset-password?token=abc"
        );
    }

    #[test]
    fn test_password_reset_mentions_link_and_expiry() {
        let (subject, text, html) =
            password_reset("Alice", "http://x/reset-password?token=t", 60).unwrap();

        assert!(!subject.is_empty());
        assert!(text.contains("Hi Alice"));
        assert!(text.contains("http://x/reset-password?token=t"));
        assert!(text.contains("60 minutes"));
        assert!(html.contains("Hi Alice,"));
        assert!(html.contains("reset-password?token=t"));
        assert!(html.contains("60 minutes"));
    }

    #[test]
    fn test_display_name_markup_is_escaped_in_html() {
        let name = "<a href=\"https://evil.example\">Click</a> & 'co'";
        let (_, _, html) = password_reset(name, "http://x/reset-password?token=t", 60).unwrap();

        assert!(!html.contains("<a href=\"https://evil.example\">"));
        assert!(!html.contains("evil.example\">Click</a>"));
        assert!(html.contains("&lt;a href="));
        assert!(html.contains("&amp;"));
        assert!(html.contains("&#x27;co&#x27;") || html.contains("&#39;co&#39;"));
    }
}
