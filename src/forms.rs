//! Form decoding and validation.
//!
//! Handlers take the raw `application/x-www-form-urlencoded` body as key/value
//! pairs, so repeated keys (multi-selects) survive, then parse it into one of
//! the typed forms below. A form that fails validation is rendered again with
//! its [`FormErrors`]; nothing is written.

use std::{borrow::Cow, collections::BTreeMap};

use validator::{Validate, ValidationError, ValidationErrors};

use crate::res::escape;

#[derive(Debug, Clone, Default)]
pub struct FormData(Vec<(String, String)>);

impl From<Vec<(String, String)>> for FormData {
    fn from(pairs: Vec<(String, String)>) -> Self {
        FormData(pairs)
    }
}

impl FormData {
    pub fn push(&mut self, key: &str, value: impl Into<String>) {
        self.0.push((key.to_owned(), value.into()));
    }

    /// First value for `name`, trimmed; empty when absent.
    pub fn text(&self, name: &str) -> String {
        self.0
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.trim().to_owned())
            .unwrap_or_default()
    }

    /// Like [`FormData::text`] but blank values are `None`.
    pub fn optional(&self, name: &str) -> Option<String> {
        Some(self.text(name)).filter(|v| !v.is_empty())
    }

    pub fn all(&self, name: &str) -> Vec<&str> {
        self.0
            .iter()
            .filter(|(k, _)| k == name)
            .map(|(_, v)| v.trim())
            .filter(|v| !v.is_empty())
            .collect()
    }

    /// Checkbox semantics: unchecked boxes are not submitted at all.
    pub fn flag(&self, name: &str) -> bool {
        matches!(self.text(name).as_str(), "on" | "true" | "True" | "1")
    }
}

#[derive(Debug, Default)]
pub struct FormErrors(BTreeMap<String, Vec<String>>);

impl FormErrors {
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0.entry(field.to_owned()).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn merge(&mut self, errors: ValidationErrors) {
        for (field, errs) in errors.field_errors() {
            for err in errs {
                let message = err
                    .message
                    .clone()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| default_message(&err.code));
                self.add(&field, message);
            }
        }
    }

    /// Error list for one field, empty when the field is fine.
    pub fn render(&self, field: &str) -> String {
        match self.0.get(field) {
            Some(messages) => {
                let items: String = messages
                    .iter()
                    .map(|m| format!("<li>{}</li>", escape(m)))
                    .collect();
                format!("<ul class=\"errors\">{items}</ul>")
            }
            None => String::new(),
        }
    }
}

impl From<ValidationErrors> for FormErrors {
    fn from(errors: ValidationErrors) -> Self {
        let mut out = FormErrors::default();
        out.merge(errors);
        out
    }
}

fn default_message(code: &str) -> String {
    match code {
        "email" => "Enter a valid email address.".to_owned(),
        "url" => "Enter a valid URL.".to_owned(),
        "length" => "Ensure this value has a valid length.".to_owned(),
        other => format!("Invalid value ({other})."),
    }
}

fn error(code: &'static str, message: &'static str) -> ValidationError {
    let mut error = ValidationError::new(code);
    error.message = Some(Cow::from(message));
    error
}

pub fn validate_required(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(error("is_required", "This field is required."))
    } else {
        Ok(())
    }
}

/// Letters, numbers, underscores and hyphens only.
pub fn validate_slug(value: &str) -> Result<(), ValidationError> {
    validate_required(value)?;
    if value.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        Ok(())
    } else {
        Err(error(
            "invalid_slug",
            "Enter a valid 'slug' consisting of letters, numbers, underscores or hyphens.",
        ))
    }
}

/// ISO 3166-1 alpha-2 code, or blank.
pub fn validate_country(value: &str) -> Result<(), ValidationError> {
    if value.is_empty() || (value.len() == 2 && value.chars().all(|c| c.is_ascii_uppercase())) {
        Ok(())
    } else {
        Err(error("invalid_country", "Select a valid country code."))
    }
}

fn parse_ids(data: &FormData, field: &str, errors: &mut FormErrors) -> Vec<i64> {
    let mut ids = Vec::new();
    for raw in data.all(field) {
        match raw.parse::<i64>() {
            Ok(id) => ids.push(id),
            Err(_) => errors.add(field, "Enter a list of values."),
        }
    }
    ids
}

/// Shared by news and resources.
#[derive(Debug, Clone, Default, Validate)]
pub struct ContentForm {
    #[validate(
        custom(function = "validate_required"),
        length(max = 255, message = "Ensure this value has at most 255 characters.")
    )]
    pub title: String,
    #[validate(
        custom(function = "validate_slug"),
        length(max = 150, message = "Ensure this value has at most 150 characters.")
    )]
    pub slug: String,
    #[validate(custom(function = "validate_required"))]
    pub content: String,
    pub is_public: bool,
    pub tags: Vec<i64>,
    pub resource_type: Option<i64>,
}

impl ContentForm {
    /// Empty form as shown on an "add" page.
    pub fn blank() -> Self {
        ContentForm { is_public: true, ..Default::default() }
    }

    pub fn parse(data: &FormData) -> Result<ContentForm, (ContentForm, FormErrors)> {
        let mut errors = FormErrors::default();
        let tags = parse_ids(data, "tags", &mut errors);
        let resource_type = parse_choice(data, "resource_type", &mut errors);

        let form = ContentForm {
            title: data.text("title"),
            slug: data.text("slug"),
            content: data.text("content"),
            is_public: data.flag("is_public"),
            tags,
            resource_type,
        };

        if let Err(e) = form.validate() {
            errors.merge(e);
        }

        if errors.is_empty() { Ok(form) } else { Err((form, errors)) }
    }
}

#[derive(Debug, Clone, Default, Validate)]
pub struct PageForm {
    #[validate(
        custom(function = "validate_required"),
        length(max = 255, message = "Ensure this value has at most 255 characters.")
    )]
    pub title: String,
    #[validate(
        custom(function = "validate_slug"),
        length(max = 150, message = "Ensure this value has at most 150 characters.")
    )]
    pub slug: String,
    pub content: String,
}

impl PageForm {
    pub fn parse(data: &FormData) -> Result<PageForm, (PageForm, FormErrors)> {
        let form = PageForm {
            title: data.text("title"),
            slug: data.text("slug"),
            content: data.text("content"),
        };
        match form.validate() {
            Ok(()) => Ok(form),
            Err(e) => Err((form, e.into())),
        }
    }
}

/// Profile fields a user may edit on their own page. The picture arrives as a
/// separate multipart part.
#[derive(Debug, Clone, Default, Validate)]
pub struct UserForm {
    #[validate(length(max = 30, message = "Ensure this value has at most 30 characters."))]
    pub first_name: String,
    #[validate(length(max = 30, message = "Ensure this value has at most 30 characters."))]
    pub last_name: String,
    #[validate(email(message = "Enter a valid email address."))]
    pub email: Option<String>,
    #[validate(custom(function = "validate_country"))]
    pub country: String,
    #[validate(url(message = "Enter a valid URL."), length(max = 255))]
    pub blog_url: Option<String>,
    #[validate(url(message = "Enter a valid URL."), length(max = 255))]
    pub homepage_url: Option<String>,
}

impl UserForm {
    pub fn parse(data: &FormData) -> Result<UserForm, (UserForm, FormErrors)> {
        let form = UserForm {
            first_name: data.text("first_name"),
            last_name: data.text("last_name"),
            email: data.optional("email"),
            country: data.text("country").to_ascii_uppercase(),
            blog_url: data.optional("blog_url"),
            homepage_url: data.optional("homepage_url"),
        };
        match form.validate() {
            Ok(()) => Ok(form),
            Err(e) => Err((form, e.into())),
        }
    }
}

#[derive(Debug, Clone, Default, Validate)]
pub struct CommunityForm {
    #[validate(
        custom(function = "validate_required"),
        length(max = 255, message = "Ensure this value has at most 255 characters.")
    )]
    pub name: String,
    #[validate(
        custom(function = "validate_slug"),
        length(max = 150, message = "Ensure this value has at most 150 characters.")
    )]
    pub slug: String,
    #[validate(email(message = "Enter a valid email address."), length(max = 255))]
    pub email: Option<String>,
    #[validate(email(message = "Enter a valid email address."), length(max = 255))]
    pub mailing_list: Option<String>,
    #[validate(url(message = "Enter a valid URL."), length(max = 255))]
    pub resource_area: Option<String>,
    pub community_admin: Option<i64>,
    pub parent_community: Option<i64>,
    #[validate(url(message = "Enter a valid URL."), length(max = 255))]
    pub website: Option<String>,
    #[validate(url(message = "Enter a valid URL."), length(max = 255))]
    pub facebook: Option<String>,
    #[validate(url(message = "Enter a valid URL."), length(max = 255))]
    pub googleplus: Option<String>,
    #[validate(url(message = "Enter a valid URL."), length(max = 255))]
    pub twitter: Option<String>,
}

impl CommunityForm {
    pub fn parse(data: &FormData) -> Result<CommunityForm, (CommunityForm, FormErrors)> {
        let mut errors = FormErrors::default();
        let community_admin = parse_choice(data, "community_admin", &mut errors);
        let parent_community = parse_choice(data, "parent_community", &mut errors);

        let form = CommunityForm {
            name: data.text("name"),
            slug: data.text("slug"),
            email: data.optional("email"),
            mailing_list: data.optional("mailing_list"),
            resource_area: data.optional("resource_area"),
            community_admin,
            parent_community,
            website: data.optional("website"),
            facebook: data.optional("facebook"),
            googleplus: data.optional("googleplus"),
            twitter: data.optional("twitter"),
        };

        if let Err(e) = form.validate() {
            errors.merge(e);
        }

        if errors.is_empty() { Ok(form) } else { Err((form, errors)) }
    }
}

fn parse_choice(data: &FormData, field: &str, errors: &mut FormErrors) -> Option<i64> {
    let raw = data.optional(field)?;
    match raw.parse::<i64>() {
        Ok(id) => Some(id),
        Err(_) => {
            errors.add(field, "Select a valid choice.");
            None
        }
    }
}

/// Name of a new tag or resource type.
#[derive(Debug, Clone, Default, Validate)]
pub struct NameForm {
    #[validate(
        custom(function = "validate_required"),
        length(max = 255, message = "Ensure this value has at most 255 characters.")
    )]
    pub name: String,
}

impl NameForm {
    pub fn parse(data: &FormData) -> Result<NameForm, (NameForm, FormErrors)> {
        let form = NameForm { name: data.text("name") };
        match form.validate() {
            Ok(()) => Ok(form),
            Err(e) => Err((form, e.into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(pairs: &[(&str, &str)]) -> FormData {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<Vec<_>>()
            .into()
    }

    #[test]
    fn content_form_requires_title_slug_and_content() {
        let cases: Vec<(Vec<(&str, &str)>, bool)> = vec![
            (vec![], false),
            (vec![("title", "news")], false),
            (vec![("slug", "foo")], false),
            (vec![("content", "This is dummy news")], false),
            (vec![("title", "foo"), ("slug", "foo")], false),
            (vec![("title", "foo"), ("slug", "foo"), ("tags", "foo_tag")], false),
            (
                vec![
                    ("title", "foo"),
                    ("slug", "foo"),
                    ("is_public", "on"),
                    ("tags", "1"),
                    ("content", "This is dummy news"),
                ],
                true,
            ),
            (
                vec![
                    ("title", "foo"),
                    ("slug", "foo"),
                    ("is_public", "on"),
                    ("content", "This is dummy news"),
                ],
                true,
            ),
        ];

        for (i, (pairs, valid)) in cases.into_iter().enumerate() {
            assert_eq!(ContentForm::parse(&data(&pairs)).is_ok(), valid, "case {i}");
        }
    }

    #[test]
    fn bare_tag_identifier_is_a_tags_error() {
        let (_, errors) = ContentForm::parse(&data(&[
            ("title", "foo"),
            ("slug", "foo"),
            ("content", "bar"),
            ("tags", "foo_tag"),
        ]))
        .unwrap_err();
        assert!(errors.contains("tags"));
        assert!(!errors.contains("title"));
    }

    #[test]
    fn repeated_tags_are_collected() {
        let form = ContentForm::parse(&data(&[
            ("title", "foo"),
            ("slug", "foo"),
            ("content", "bar"),
            ("tags", "3"),
            ("tags", "7"),
        ]))
        .unwrap();
        assert_eq!(form.tags, vec![3, 7]);
        assert!(!form.is_public);
    }

    #[test]
    fn slug_rejects_spaces() {
        let (_, errors) = ContentForm::parse(&data(&[
            ("title", "foo"),
            ("slug", "not a slug"),
            ("content", "bar"),
        ]))
        .unwrap_err();
        assert!(errors.contains("slug"));
        assert!(errors.render("slug").contains("valid &#x27;slug&#x27;"));
    }

    #[test]
    fn page_form_allows_empty_content() {
        assert!(PageForm::parse(&data(&[("title", "About"), ("slug", "about")])).is_ok());
        assert!(PageForm::parse(&data(&[("title", "About")])).is_err());
    }

    #[test]
    fn country_codes() {
        assert!(validate_country("").is_ok());
        assert!(validate_country("RO").is_ok());
        assert!(validate_country("Romania").is_err());
        assert!(validate_country("ro").is_err());
    }

    #[test]
    fn community_form_checks_contact_fields() {
        let form = CommunityForm::parse(&data(&[
            ("name", "Systers"),
            ("slug", "systers"),
            ("email", ""),
            ("website", "https://systers.org"),
            ("community_admin", "1"),
        ]))
        .unwrap();
        assert_eq!(form.email, None);
        assert_eq!(form.community_admin, Some(1));
        assert_eq!(form.parent_community, None);

        let (_, errors) = CommunityForm::parse(&data(&[
            ("name", "Systers"),
            ("slug", "systers"),
            ("mailing_list", "not-an-email"),
            ("twitter", "twitter"),
            ("parent_community", "root"),
        ]))
        .unwrap_err();
        assert!(errors.contains("mailing_list"));
        assert!(errors.contains("twitter"));
        assert!(errors.contains("parent_community"));
        assert!(!errors.contains("name"));
    }

    #[test]
    fn user_form_normalises_country() {
        let form = UserForm::parse(&data(&[("first_name", "Ana"), ("country", "ro")])).unwrap();
        assert_eq!(form.country, "RO");
        assert_eq!(form.blog_url, None);

        let (_, errors) = UserForm::parse(&data(&[("email", "nope"), ("homepage_url", "x")])).unwrap_err();
        assert!(errors.contains("email"));
        assert!(errors.contains("homepage_url"));
    }

    #[test]
    fn names_are_required() {
        assert!(NameForm::parse(&data(&[("name", "  ")])).is_err());
        assert_eq!(NameForm::parse(&data(&[("name", " rust ")])).unwrap().name, "rust");
    }
}
