use super::handlers::{auth, health, login, password, profile, root, signup, trade};
use utoipa::{
    openapi::{
        security::{ApiKey, ApiKeyValue, Http, HttpAuthScheme, SecurityScheme},
        Contact, License, Tag,
    },
    Modify, OpenApi,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        root::root,
        health::health,
        signup::signup,
        signup::confirm_signup,
        signup::resend_confirmation_code,
        login::login,
        password::forgot_password,
        password::confirm_forgot_password,
        auth::whoami,
        profile::profile,
        trade::add_trade,
    ),
    modifiers(&SessionSecurity)
)]
struct ApiDoc;

/// Bearer header and `authData` cookie, the two ways to reach protected routes.
struct SessionSecurity;

impl Modify for SessionSecurity {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
        );
        components.add_security_scheme(
            "cookie",
            SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::new(
                crate::session::SESSION_COOKIE_NAME,
            ))),
        );
    }
}

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    let mut openapi = ApiDoc::openapi();

    // Use Cargo.toml metadata instead of the derive defaults.
    openapi.info.title = env!("CARGO_PKG_NAME").to_string();
    openapi.info.version = env!("CARGO_PKG_VERSION").to_string();
    openapi.info.description = optional_str(env!("CARGO_PKG_DESCRIPTION")).map(str::to_string);
    openapi.info.contact = cargo_contact();
    openapi.info.license = cargo_license();

    let mut tradelog_tag = Tag::new("tradelog");
    tradelog_tag.description = Some("Service banner and health".to_string());

    let mut auth_tag = Tag::new("auth");
    auth_tag.description = Some("Sign up, login and password reset".to_string());

    let mut profile_tag = Tag::new("profile");
    profile_tag.description = Some("Stored user profile".to_string());

    let mut trade_tag = Tag::new("trade");
    trade_tag.description = Some("Trade journal entries".to_string());

    openapi.tags = Some(vec![tradelog_tag, auth_tag, profile_tag, trade_tag]);

    openapi
}

fn cargo_contact() -> Option<Contact> {
    // Cargo authors are `;` separated and may include "Name <email>".
    let authors = env!("CARGO_PKG_AUTHORS");
    let primary = authors.split(';').next().map(str::trim)?;
    if primary.is_empty() {
        return None;
    }

    let (name, email) = parse_author(primary);
    if name.is_none() && email.is_none() {
        return None;
    }

    let mut contact = Contact::new();
    contact.name = name.map(str::to_string);
    contact.email = email.map(str::to_string);
    Some(contact)
}

fn cargo_license() -> Option<License> {
    let identifier = optional_str(env!("CARGO_PKG_LICENSE"))?;
    let mut license = License::new(identifier);
    license.identifier = Some(identifier.to_string());
    Some(license)
}

fn optional_str(value: &'static str) -> Option<&'static str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

fn parse_author(author: &str) -> (Option<&str>, Option<&str>) {
    fn non_empty(value: &str) -> Option<&str> {
        (!value.is_empty()).then_some(value)
    }

    match author.split_once('<') {
        Some((name, email)) => (
            non_empty(name.trim()),
            non_empty(email.trim_end_matches('>').trim()),
        ),
        None => (non_empty(author.trim()), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_info_from_cargo() {
        let doc = openapi();
        assert_eq!(doc.info.title, env!("CARGO_PKG_NAME"));
        assert_eq!(doc.info.version, env!("CARGO_PKG_VERSION"));
        assert_eq!(
            doc.info.description.as_deref(),
            Some(env!("CARGO_PKG_DESCRIPTION"))
        );

        let contact = doc.info.contact;
        assert!(contact.is_some());
        if let Some(contact) = contact {
            assert_eq!(contact.name.as_deref(), Some("Team Tradelog"));
            assert_eq!(contact.email.as_deref(), Some("team@tradelog.dev"));
        }

        let license = doc.info.license;
        assert!(license.is_some());
        if let Some(license) = license {
            assert_eq!(license.name, "BSD-3-Clause");
        }
    }

    #[test]
    fn openapi_documents_every_route() {
        let doc = openapi();
        for path in [
            "/",
            "/health",
            "/signup",
            "/confirmsignup",
            "/resendConfirmationCode",
            "/login",
            "/forgotPassword",
            "/confirmForgotPassword",
            "/auth",
            "/profile",
            "/trade",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }

        let schemes = doc
            .components
            .map(|components| components.security_schemes)
            .unwrap_or_default();
        assert!(schemes.contains_key("bearer"));
        assert!(schemes.contains_key("cookie"));
    }

    #[test]
    fn parse_author_variants() {
        assert_eq!(
            parse_author("Jane Doe <jane@example.com>"),
            (Some("Jane Doe"), Some("jane@example.com"))
        );
        assert_eq!(parse_author("Jane Doe"), (Some("Jane Doe"), None));
        assert_eq!(parse_author("<jane@example.com>"), (None, Some("jane@example.com")));
        assert_eq!(parse_author("  "), (None, None));
    }
}
