//! HTML views
//!
//! Bare fragments the host layout can wrap: the permission-failure page,
//! the login gateway and the profile completion form. Every interpolated
//! value is escaped.

use crate::config::join_path;
use crate::forms::{field_label, ProfileCompletionForm, ValidationErrors};
use crate::member::EMAIL;
use crate::strategy::StrategyRegistry;
use std::fmt::Write;

/// Options for customizing view rendering
#[derive(Debug, Clone)]
pub struct ViewOptions {
    /// CSS class for form groups (wrapper around label + input + errors)
    pub group_class: String,
    /// CSS class for input elements
    pub input_class: String,
    /// CSS class for error messages
    pub error_class: String,
    /// CSS class for buttons and strategy links
    pub button_class: String,
}

impl Default for ViewOptions {
    fn default() -> Self {
        Self {
            group_class: "form-group".into(),
            input_class: "form-input".into(),
            error_class: "form-error".into(),
            button_class: "btn".into(),
        }
    }
}

/// Page shown when a callback or completion fails
///
/// ```rust
/// use acton_social::views::permission_failure;
///
/// let html = permission_failure("Login not possible.", Some("/auth"));
/// assert!(html.contains("Login not possible."));
/// assert!(html.contains(r#"href="/auth""#));
/// ```
#[must_use]
pub fn permission_failure(message: &str, back_link: Option<&str>) -> String {
    let mut html = String::with_capacity(256);
    html.push_str("<section class=\"social-login permission-failure\">\n");
    let _ = writeln!(html, "  <p class=\"message bad\">{}</p>", escape_html(message));
    if let Some(link) = back_link {
        let _ = writeln!(
            html,
            "  <p><a href=\"{}\">Log in again</a></p>",
            escape_attr(link)
        );
    }
    html.push_str("</section>\n");
    html
}

/// One login link per registered strategy
#[must_use]
pub fn gateway(strategies: &StrategyRegistry, base_path: &str, back_url: Option<&str>) -> String {
    let options = ViewOptions::default();
    let query = back_url
        .filter(|url| !url.is_empty())
        .map(|url| format!("?BackURL={}", escape_attr(&encode_query(url))))
        .unwrap_or_default();

    let mut html = String::with_capacity(512);
    html.push_str("<nav class=\"social-login gateway\">\n");
    if strategies.is_empty() {
        html.push_str("  <p>No login providers are configured.</p>\n");
    }
    for strategy in strategies.iter() {
        let _ = writeln!(
            html,
            r#"  <a class="{}" href="{}{}">Log in with {}</a>"#,
            options.button_class,
            escape_attr(&join_path(base_path, strategy.key())),
            query,
            escape_html(strategy.display_name())
        );
    }
    html.push_str("</nav>\n");
    html
}

/// Profile completion form with inline errors
///
/// Renders one input per field the form offers, so provider values that were
/// not asked about are posted back unchanged.
#[must_use]
pub fn completion_form(
    form: &ProfileCompletionForm,
    errors: &ValidationErrors,
    action: &str,
) -> String {
    let options = ViewOptions::default();
    let action = escape_attr(action);

    let mut html = String::with_capacity(1024);
    let _ = writeln!(
        html,
        r#"<form class="social-login completion" action="{action}" method="POST" hx-post="{action}">"#
    );
    html.push_str("  <p>Please complete your profile to finish signing up.</p>\n");

    for name in form.field_names() {
        let input_type = if name == EMAIL { "email" } else { "text" };
        let value = form.value(name).unwrap_or_default();
        render_field(&mut html, &options, name, input_type, value, errors);
    }

    let _ = writeln!(
        html,
        r#"  <button type="submit" class="{}">Complete registration</button>"#,
        options.button_class
    );
    html.push_str("</form>\n");
    html
}

fn render_field(
    html: &mut String,
    options: &ViewOptions,
    name: &str,
    input_type: &str,
    value: &str,
    errors: &ValidationErrors,
) {
    let label = escape_html(&field_label(name));
    let id = escape_attr(name);
    let _ = writeln!(html, r#"  <div class="{}">"#, options.group_class);
    let _ = writeln!(html, r#"    <label for="{id}">{label}</label>"#);
    let _ = writeln!(
        html,
        r#"    <input type="{input_type}" id="{id}" name="{id}" class="{}" value="{}">"#,
        options.input_class,
        escape_attr(value)
    );
    for error in errors.for_field(name) {
        let _ = writeln!(
            html,
            r#"    <span class="{}">{}</span>"#,
            options.error_class,
            escape_html(&error.message)
        );
    }
    html.push_str("  </div>\n");
}

fn encode_query(value: &str) -> String {
    value
        .bytes()
        .fold(String::with_capacity(value.len()), |mut out, byte| {
            if byte.is_ascii_alphanumeric() || b"-_.~/".contains(&byte) {
                out.push(char::from(byte));
            } else {
                let _ = write!(out, "%{byte:02X}");
            }
            out
        })
}

/// Escape a string for use in HTML content
fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Escape a string for use in HTML attribute values
fn escape_attr(s: &str) -> String {
    escape_html(s).replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StrategyConfig;
    use crate::strategy::OAuth2Strategy;

    #[test]
    fn test_permission_failure_escapes() {
        let html = permission_failure("<script>", None);
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("href"));
    }

    #[test]
    fn test_gateway_links() {
        let strategy = OAuth2Strategy::from_config(
            "google",
            &StrategyConfig {
                client_id: "id".to_string(),
                auth_url: "https://provider.example/authorize".to_string(),
                ..StrategyConfig::default()
            },
        )
        .unwrap();
        let registry = StrategyRegistry::new().with(strategy);

        let html = gateway(&registry, "/auth", Some("/members?x=1"));
        assert!(html.contains(r#"href="/auth/google?BackURL=/members%3Fx%3D1""#));
        assert!(html.contains("Log in with Google"));
    }

    #[test]
    fn test_gateway_without_strategies() {
        let html = gateway(&StrategyRegistry::new(), "/auth", None);
        assert!(html.contains("No login providers"));
    }

    #[test]
    fn test_completion_form_keeps_values_and_errors() {
        let form = ProfileCompletionForm::new()
            .with_field("FirstName", "Ada \"A\"")
            .with_field(EMAIL, "");
        let mut errors = ValidationErrors::new();
        errors.add(EMAIL, "Email is required");

        let html = completion_form(&form, &errors, "/auth/profile-completion");
        assert!(html.contains(r#"hx-post="/auth/profile-completion""#));
        assert!(html.contains(r#"value="Ada &quot;A&quot;""#));
        assert!(html.contains(r#"<span class="form-error">Email is required</span>"#));
        assert!(html.contains(r#"<label for="FirstName">First name</label>"#));
        assert!(html.contains(r#"type="email" id="Email""#));
    }

    #[test]
    fn test_completion_form_renders_every_offered_field() {
        let form = ProfileCompletionForm::new()
            .with_field("Locale", "en_NZ")
            .with_field("Email", "")
            .with_field("FirstName", "Ada");

        let html = completion_form(&form, &ValidationErrors::new(), "/auth/profile-completion");
        assert!(html.contains(r#"name="Locale" class="form-input" value="en_NZ""#));
        assert!(!html.contains(r#"name="Surname""#));

        let first = html.find(r#"name="FirstName""#).unwrap();
        let email = html.find(r#"name="Email""#).unwrap();
        let locale = html.find(r#"name="Locale""#).unwrap();
        assert!(first < email && email < locale);
    }
}
