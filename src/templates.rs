// ABOUTME: Static HTML page rendering via named-placeholder substitution
// ABOUTME: Every substituted value is HTML-escaped; templates carry no control flow

//! Page rendering.
//!
//! Pages are static templates compiled in with `include_str!`. Rendering is a
//! map of named `{{placeholder}}` values substituted into the template, each
//! value HTML-escaped. No control flow lives in templates.

const HOME_TEMPLATE: &str = include_str!("../templates/home.html");
const SUCCESS_TEMPLATE: &str = include_str!("../templates/success.html");
const ERROR_TEMPLATE: &str = include_str!("../templates/error.html");

/// Substitute `{{name}}` placeholders, HTML-escaping each value.
fn render(template: &str, values: &[(&str, &str)]) -> String {
    let mut rendered = template.to_owned();
    for (name, value) in values {
        let escaped = html_escape::encode_safe(value);
        rendered = rendered.replace(&format!("{{{{{name}}}}}"), &escaped);
    }
    rendered
}

/// The registration form page.
#[must_use]
pub fn home_page() -> &'static str {
    HOME_TEMPLATE
}

/// Success page showing the freshly created invite link.
#[must_use]
pub fn success_page(user_name: &str, invite_url: &str) -> String {
    render(
        SUCCESS_TEMPLATE,
        &[("userName", user_name), ("inviteUrl", invite_url)],
    )
}

/// Error page with a human-readable title and message.
#[must_use]
pub fn error_page(title: &str, message: &str) -> String {
    render(ERROR_TEMPLATE, &[("title", title), ("message", message)])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_are_html_escaped() {
        let page = error_page("<script>alert(1)</script>", "a & b \"quoted\"");
        assert!(!page.contains("<script>alert(1)</script>"));
        assert!(page.contains("&lt;script&gt;"));
        assert!(page.contains("a &amp; b"));
    }

    #[test]
    fn success_page_substitutes_both_placeholders() {
        let page = success_page("Ada", "https://discord.gg/abc123");
        assert!(page.contains("Ada"));
        assert!(page.contains("https://discord.gg/abc123"));
        assert!(!page.contains("{{userName}}"));
        assert!(!page.contains("{{inviteUrl}}"));
    }

    #[test]
    fn home_page_is_static() {
        assert!(home_page().contains("/api/register"));
        assert!(!home_page().contains("{{"));
    }
}
