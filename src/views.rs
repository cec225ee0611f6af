//! HTML pages.
//!
//! Every page goes through `layout`, which draws the navigation for the
//! caller's login state and any flashed notices. All user-supplied text is
//! passed through `escape`.

use axum::response::Html;

use crate::{
    forms::{FieldErrors, LoginForm, RegisterForm, TweetForm, CONTENT_MAX_LEN},
    models::{Tweet, User},
    session::Session,
};

/// Per-render context taken from the session.
#[derive(Debug, Default)]
pub struct Page {
    pub logged_in: bool,
    pub flashes: Vec<String>,
}

impl Page {
    /// Consumes pending flashes; they are shown exactly once.
    pub async fn from_session(session: &Session) -> Self {
        Page {
            logged_in: session.user_id().await.is_some(),
            flashes: session.take_flashes().await,
        }
    }
}

pub fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            c => out.push(c),
        }
    }
    out
}

fn layout(page: &Page, title: &str, body: &str) -> Html<String> {
    let nav = if page.logged_in {
        r#"<a href="/add-tweet">Add Tweet</a> <a href="/logout">Logout</a>"#
    } else {
        r#"<a href="/login">Login</a> <a href="/api/register">Register</a>"#
    };

    let notices: String = page
        .flashes
        .iter()
        .map(|flash| format!(r#"<div class="flash">{}</div>"#, escape(flash)))
        .collect();

    Html(format!(
        r#"<!doctype html>
<html>
<head><meta charset="utf-8"><title>{title} - Chirp</title></head>
<body>
<nav><a href="/">Home</a> {nav}</nav>
{notices}
<main>
<h1>{title}</h1>
{body}
</main>
</body>
</html>
"#,
        title = escape(title),
    ))
}

fn field_error(errors: &FieldErrors, name: &str) -> String {
    errors
        .get(name)
        .map(|error| format!(r#" <span class="error">{}</span>"#, escape(error)))
        .unwrap_or_default()
}

fn text_input(name: &str, label: &str, kind: &str, value: &str, errors: &FieldErrors) -> String {
    format!(
        r#"<p><label for="{name}">{label}</label> <input id="{name}" name="{name}" type="{kind}" value="{value}">{error}</p>"#,
        value = escape(value),
        error = field_error(errors, name),
    )
}

fn textarea(name: &str, label: &str, value: &str, errors: &FieldErrors) -> String {
    format!(
        r#"<p><label for="{name}">{label}</label> <textarea id="{name}" name="{name}" maxlength="{CONTENT_MAX_LEN}">{value}</textarea>{error}</p>"#,
        value = escape(value),
        error = field_error(errors, name),
    )
}

fn form(action: &str, fields: &[String]) -> String {
    format!(
        r#"<form method="post" action="{action}">
{}
<p><input type="submit" value="Submit"></p>
</form>"#,
        fields.join("\n"),
    )
}

pub fn home(page: &Page, tweets: &[Tweet]) -> Html<String> {
    let body: String = if tweets.is_empty() {
        "<p>No tweets yet.</p>".to_string()
    } else {
        tweets
            .iter()
            .map(|tweet| {
                format!(
                    r#"<article><h2><a href="/tweet/{id}">{title}</a></h2><p>{content}</p></article>"#,
                    id = tweet.id,
                    title = escape(&tweet.title),
                    content = escape(&tweet.content),
                )
            })
            .collect()
    };
    layout(page, "Tweets", &body)
}

pub fn tweet(page: &Page, tweet: &Tweet, author: &User) -> Html<String> {
    let body = format!(
        r#"<article>
<p>{content}</p>
<p class="author">By {author}</p>
<p><a href="/edit/{id}">Edit</a></p>
</article>"#,
        content = escape(&tweet.content),
        author = escape(&author.username),
        id = tweet.id,
    );
    layout(page, &tweet.title, &body)
}

pub fn add_tweet(page: &Page, values: &TweetForm, errors: &FieldErrors) -> Html<String> {
    let body = form(
        "/add-tweet",
        &[
            text_input("title", "Title", "text", &values.title, errors),
            textarea("content", "Content", &values.content, errors),
        ],
    );
    layout(page, "Add Tweet", &body)
}

pub fn edit_tweet(page: &Page, id: i64, values: &TweetForm, errors: &FieldErrors) -> Html<String> {
    let body = form(
        &format!("/edit/{id}"),
        &[
            text_input("title", "Title", "text", &values.title, errors),
            textarea("content", "Content", &values.content, errors),
        ],
    );
    layout(page, "Edit Tweet", &body)
}

/// Password fields are never echoed back.
pub fn login(page: &Page, values: &LoginForm, errors: &FieldErrors) -> Html<String> {
    let body = form(
        "/login",
        &[
            text_input("username", "Username", "text", &values.username, errors),
            text_input("password", "Password", "password", "", errors),
        ],
    );
    layout(page, "Login", &body)
}

pub fn register(page: &Page, values: &RegisterForm, errors: &FieldErrors) -> Html<String> {
    let body = form(
        "/api/register",
        &[
            text_input("username", "Username", "text", &values.username, errors),
            text_input("password", "Password", "password", "", errors),
        ],
    );
    layout(page, "Register", &body)
}

pub fn not_found() -> Html<String> {
    layout(
        &Page::default(),
        "Not Found",
        "<p>The requested page could not be found.</p>",
    )
}

pub fn server_error() -> Html<String> {
    layout(
        &Page::default(),
        "Internal Server Error",
        "<p>Something went wrong. Please try again later.</p>",
    )
}
