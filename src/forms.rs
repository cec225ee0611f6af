//! Form payloads and their declarative validation rules.
//!
//! Each form lists its fields in a `FieldSpec` table; `Form::validate` walks
//! the table and collects one message per failing field. Handlers call it
//! before touching the database.

use std::collections::BTreeMap;

use serde::Deserialize;

pub const USERNAME_MAX_LEN: usize = 80;
pub const TITLE_MAX_LEN: usize = 80;
pub const CONTENT_MAX_LEN: usize = 280;
/// bcrypt only reads this many bytes of a password.
pub const PASSWORD_MAX_BYTES: usize = 72;

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub label: &'static str,
    pub required: bool,
    /// Upper bound in characters.
    pub max_len: Option<usize>,
    /// Upper bound in UTF-8 bytes.
    pub max_bytes: Option<usize>,
}

impl FieldSpec {
    const fn required(name: &'static str, label: &'static str) -> Self {
        Self {
            name,
            label,
            required: true,
            max_len: None,
            max_bytes: None,
        }
    }

    const fn max_len(mut self, max_len: usize) -> Self {
        self.max_len = Some(max_len);
        self
    }

    const fn max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = Some(max_bytes);
        self
    }

    fn check(&self, value: &str) -> Option<String> {
        if self.required && value.trim().is_empty() {
            return Some("This field is required.".to_string());
        }
        if let Some(max) = self.max_len {
            if value.chars().count() > max {
                return Some(format!(
                    "{} cannot be longer than {max} characters.",
                    self.label
                ));
            }
        }
        match self.max_bytes {
            Some(max) if value.len() > max => Some(format!(
                "{} cannot be longer than {max} bytes.",
                self.label
            )),
            _ => None,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FieldErrors(BTreeMap<&'static str, String>);

impl FieldErrors {
    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

pub trait Form {
    const FIELDS: &'static [FieldSpec];

    fn value(&self, field: &str) -> &str;

    fn validate(&self) -> Result<(), FieldErrors> {
        let errors: BTreeMap<_, _> = Self::FIELDS
            .iter()
            .filter_map(|spec| spec.check(self.value(spec.name)).map(|msg| (spec.name, msg)))
            .collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(FieldErrors(errors))
        }
    }
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct RegisterForm {
    pub username: String,
    pub password: String,
}

impl Form for RegisterForm {
    const FIELDS: &'static [FieldSpec] = &[
        FieldSpec::required("username", "Username").max_len(USERNAME_MAX_LEN),
        FieldSpec::required("password", "Password").max_bytes(PASSWORD_MAX_BYTES),
    ];

    fn value(&self, field: &str) -> &str {
        match field {
            "username" => &self.username,
            "password" => &self.password,
            _ => "",
        }
    }
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

impl Form for LoginForm {
    const FIELDS: &'static [FieldSpec] = &[
        FieldSpec::required("username", "Username"),
        FieldSpec::required("password", "Password").max_bytes(PASSWORD_MAX_BYTES),
    ];

    fn value(&self, field: &str) -> &str {
        match field {
            "username" => &self.username,
            "password" => &self.password,
            _ => "",
        }
    }
}

/// Shared by the create and edit pages.
#[derive(Debug, Default, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TweetForm {
    pub title: String,
    pub content: String,
}

impl Form for TweetForm {
    const FIELDS: &'static [FieldSpec] = &[
        FieldSpec::required("title", "Title").max_len(TITLE_MAX_LEN),
        FieldSpec::required("content", "Content").max_len(CONTENT_MAX_LEN),
    ];

    fn value(&self, field: &str) -> &str {
        match field {
            "title" => &self.title,
            "content" => &self.content,
            _ => "",
        }
    }
}
