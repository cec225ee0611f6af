use std::{str::FromStr, sync::Arc};

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use chirp::{
    config::derive_cookie_key,
    db::{self, NewUser},
    models::Tweet,
    session::MemorySessionStore,
    AppState,
};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use tower::ServiceExt;

struct Response {
    status: StatusCode,
    location: Option<String>,
    body: String,
}

/// A browser stand-in: one router, one cookie.
#[derive(Clone)]
struct Client {
    router: Router,
    cookie: Option<String>,
}

impl Client {
    async fn get(&mut self, uri: &str) -> Response {
        let request = Request::builder().method("GET").uri(uri);
        self.send(request, Body::empty()).await
    }

    async fn post(&mut self, uri: &str, form: &str) -> Response {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        self.send(request, Body::from(form.to_string())).await
    }

    async fn send(&mut self, mut request: axum::http::request::Builder, body: Body) -> Response {
        if let Some(cookie) = &self.cookie {
            request = request.header(header::COOKIE, cookie);
        }
        let response = self
            .router
            .clone()
            .oneshot(request.body(body).unwrap())
            .await
            .unwrap();

        if let Some(set_cookie) = response.headers().get(header::SET_COOKIE) {
            let pair = set_cookie.to_str().unwrap().split(';').next().unwrap();
            let (name, value) = pair.split_once('=').unwrap();
            self.cookie = if value.is_empty() {
                None
            } else {
                Some(format!("{name}={value}"))
            };
        }

        let status = response.status();
        let location = response
            .headers()
            .get(header::LOCATION)
            .map(|l| l.to_str().unwrap().to_string());
        let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();

        Response {
            status,
            location,
            body: String::from_utf8(bytes.to_vec()).unwrap(),
        }
    }
}

struct TestApp {
    router: Router,
    pool: SqlitePool,
}

impl TestApp {
    async fn new() -> Self {
        Self::with_options(SqliteConnectOptions::from_str("sqlite::memory:").unwrap()).await
    }

    /// Lets a test plant rows that the foreign key would normally refuse.
    async fn without_foreign_keys() -> Self {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .unwrap()
            .foreign_keys(false);
        Self::with_options(options).await
    }

    async fn with_options(options: SqliteConnectOptions) -> Self {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .unwrap();
        db::migrate(&pool).await.unwrap();

        let state = AppState {
            pool: pool.clone(),
            sessions: Arc::new(MemorySessionStore::new(3600)),
            cookie_key: derive_cookie_key("test secret"),
        };

        TestApp {
            router: chirp::create_router(state),
            pool,
        }
    }

    fn client(&self) -> Client {
        Client {
            router: self.router.clone(),
            cookie: None,
        }
    }

    /// Seeds a user with a cheap bcrypt cost so tests stay fast.
    async fn seed_user(&self, username: &str, password: &str) -> i64 {
        let hash = bcrypt::hash(password, 4).unwrap();
        match db::insert_user(&self.pool, username, &hash).await.unwrap() {
            NewUser::Created(user) => user.id,
            NewUser::UsernameTaken => panic!("{username} already exists"),
        }
    }

    async fn logged_in(&self, username: &str, password: &str) -> Client {
        let mut client = self.client();
        let res = client
            .post("/login", &format!("username={username}&password={password}"))
            .await;
        assert_eq!(res.status, StatusCode::SEE_OTHER);
        assert_eq!(res.location.as_deref(), Some("/"));
        client
    }

    async fn count(&self, table: &str) -> i64 {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&self.pool)
            .await
            .unwrap()
    }

    async fn tweet(&self, id: i64) -> Tweet {
        db::find_tweet(&self.pool, id).await.unwrap().unwrap()
    }
}

#[tokio::test]
async fn register_creates_one_user_and_reports_taken_names() {
    let app = TestApp::new().await;
    let mut client = app.client();

    let page = client.get("/api/register").await;
    assert_eq!(page.status, StatusCode::OK);
    assert!(page.body.contains(r#"action="/api/register""#));

    let res = client
        .post("/api/register", "username=alice&password=hunter2")
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert!(res.body.contains("User Added Successfully!"));
    assert_eq!(app.count("users").await, 1);

    let stored = db::find_user_by_name(&app.pool, "alice")
        .await
        .unwrap()
        .unwrap();
    assert_ne!(stored.password_hash, "hunter2");
    assert!(bcrypt::verify("hunter2", &stored.password_hash).unwrap());

    let res = client
        .post("/api/register", "username=alice&password=other")
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert!(res.body.contains("Username Already Taken!"));
    assert!(!res.body.contains("User Added Successfully!"));
    assert_eq!(app.count("users").await, 1);
}

#[tokio::test]
async fn register_requires_both_fields() {
    let app = TestApp::new().await;
    let mut client = app.client();

    let res = client.post("/api/register", "username=alice&password=").await;
    assert_eq!(res.status, StatusCode::OK);
    assert!(res.body.contains("This field is required."));
    assert_eq!(app.count("users").await, 0);
}

#[tokio::test]
async fn login_distinguishes_unknown_user_from_wrong_password() {
    let app = TestApp::new().await;
    app.seed_user("alice", "hunter2").await;
    let mut client = app.client();

    let res = client.post("/login", "username=bob&password=x").await;
    assert_eq!(res.status, StatusCode::OK);
    assert!(res.body.contains("That User Doesn&#x27;t Exist! Try Again..."));

    let res = client.post("/login", "username=alice&password=wrong").await;
    assert_eq!(res.status, StatusCode::OK);
    assert!(res.body.contains("Wrong Password - Try Again!"));

    // Neither failure logged anyone in.
    let res = client.get("/add-tweet").await;
    assert_eq!(res.status, StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn session_gates_routes_until_logout() {
    let app = TestApp::new().await;
    app.seed_user("alice", "hunter2").await;

    let mut anonymous = app.client();
    let res = anonymous.get("/add-tweet").await;
    assert_eq!(res.status, StatusCode::SEE_OTHER);
    assert_eq!(res.location.as_deref(), Some("/login"));
    let res = anonymous.get("/login").await;
    assert!(res.body.contains("Please log in to access this page."));

    let res = anonymous.get("/logout").await;
    assert_eq!(res.location.as_deref(), Some("/login"));

    let mut client = app.logged_in("alice", "hunter2").await;
    let res = client.get("/add-tweet").await;
    assert_eq!(res.status, StatusCode::OK);
    assert!(res.body.contains(r#"action="/add-tweet""#));

    let res = client.post("/logout", "").await;
    assert_eq!(res.status, StatusCode::SEE_OTHER);
    assert_eq!(res.location.as_deref(), Some("/login"));

    let res = client.get("/login").await;
    assert!(res.body.contains("You Have Been Logged Out!  Thanks For Stopping By..."));

    let res = client.get("/add-tweet").await;
    assert_eq!(res.status, StatusCode::SEE_OTHER);
    assert_eq!(res.location.as_deref(), Some("/login"));
}

#[tokio::test]
async fn old_session_token_is_dead_after_logout() {
    let app = TestApp::new().await;
    app.seed_user("alice", "hunter2").await;

    let mut client = app.logged_in("alice", "hunter2").await;
    let mut stolen = client.clone();

    client.get("/logout").await;

    let res = stolen.get("/add-tweet").await;
    assert_eq!(res.status, StatusCode::SEE_OTHER);
    assert_eq!(res.location.as_deref(), Some("/login"));
}

#[tokio::test]
async fn login_replaces_the_pre_login_session_token() {
    let app = TestApp::new().await;
    app.seed_user("alice", "hunter2").await;

    let mut client = app.client();
    // Being turned away leaves a flash, and with it a session cookie.
    client.get("/add-tweet").await;
    let pre_login = client.clone();
    assert!(pre_login.cookie.is_some());

    let res = client.post("/login", "username=alice&password=hunter2").await;
    assert_eq!(res.status, StatusCode::SEE_OTHER);
    assert_ne!(client.cookie, pre_login.cookie);
    assert_eq!(client.get("/add-tweet").await.status, StatusCode::OK);

    let mut pre_login = pre_login;
    let res = pre_login.get("/add-tweet").await;
    assert_eq!(res.status, StatusCode::SEE_OTHER);
    assert_eq!(res.location.as_deref(), Some("/login"));
}

#[tokio::test]
async fn passwords_sharing_the_bcrypt_window_do_not_log_in() {
    let app = TestApp::new().await;
    let password = "a".repeat(72);
    app.seed_user("alice", &password).await;
    let mut client = app.client();

    let res = client
        .post("/login", &format!("username=alice&password={password}Y"))
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert!(res.body.contains("Password cannot be longer than 72 bytes."));
    assert_eq!(client.get("/add-tweet").await.status, StatusCode::SEE_OTHER);

    app.logged_in("alice", &password).await;
}

#[tokio::test]
async fn register_refuses_passwords_bcrypt_would_truncate() {
    let app = TestApp::new().await;
    let mut client = app.client();

    let form = format!("username=alice&password={}X", "a".repeat(72));
    let res = client.post("/api/register", &form).await;
    assert_eq!(res.status, StatusCode::OK);
    assert!(res.body.contains("Password cannot be longer than 72 bytes."));
    assert_eq!(app.count("users").await, 0);
}

#[tokio::test]
async fn tampered_cookie_is_ignored() {
    let app = TestApp::new().await;
    let mut client = app.client();
    client.cookie = Some("chirp_session=not-a-signed-value".to_string());

    let res = client.get("/add-tweet").await;
    assert_eq!(res.status, StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn created_tweet_belongs_to_the_session_user() {
    let app = TestApp::new().await;
    let user_id = app.seed_user("alice", "hunter2").await;
    let mut client = app.logged_in("alice", "hunter2").await;

    let res = client.post("/add-tweet", "title=T&content=hello").await;
    assert_eq!(res.status, StatusCode::OK);
    assert!(res.body.contains("Tweet posted Successfully!"));
    // The form is cleared after a successful post.
    assert!(res.body.contains(r#"name="title" type="text" value="""#));

    let tweet = app.tweet(1).await;
    assert_eq!(tweet.user_id, user_id);
    assert_eq!(tweet.title, "T");
    assert_eq!(tweet.content, "hello");

    let res = client.get("/tweet/1").await;
    assert_eq!(res.status, StatusCode::OK);
    assert!(res.body.contains("hello"));
    assert!(res.body.contains("By alice"));

    let res = app.client().get("/").await;
    assert_eq!(res.status, StatusCode::OK);
    assert!(res.body.contains(r#"<a href="/tweet/1">T</a>"#));
}

#[tokio::test]
async fn anonymous_users_cannot_post() {
    let app = TestApp::new().await;
    let mut client = app.client();

    let res = client.post("/add-tweet", "title=T&content=hello").await;
    assert_eq!(res.status, StatusCode::SEE_OTHER);
    assert_eq!(res.location.as_deref(), Some("/login"));
    assert_eq!(app.count("tweets").await, 0);
}

#[tokio::test]
async fn overlong_content_is_rejected() {
    let app = TestApp::new().await;
    app.seed_user("alice", "hunter2").await;
    let mut client = app.logged_in("alice", "hunter2").await;

    let form = format!("title=T&content={}", "a".repeat(281));
    let res = client.post("/add-tweet", &form).await;
    assert_eq!(res.status, StatusCode::OK);
    assert!(res.body.contains("Content cannot be longer than 280 characters."));
    assert!(!res.body.contains("Tweet posted Successfully!"));
    assert_eq!(app.count("tweets").await, 0);

    let form = format!("title=T&content={}", "a".repeat(280));
    client.post("/add-tweet", &form).await;
    assert_eq!(app.count("tweets").await, 1);
}

#[tokio::test]
async fn missing_entities_are_not_found() {
    let app = TestApp::new().await;
    let mut client = app.client();

    assert_eq!(client.get("/tweet/999").await.status, StatusCode::NOT_FOUND);
    assert_eq!(client.get("/no/such/page").await.status, StatusCode::NOT_FOUND);

    app.seed_user("alice", "hunter2").await;
    let mut client = app.logged_in("alice", "hunter2").await;
    assert_eq!(client.get("/edit/999").await.status, StatusCode::NOT_FOUND);
    assert_eq!(
        client.post("/edit/999", "title=T&content=c").await.status,
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn tweet_with_missing_author_is_not_found() {
    let app = TestApp::without_foreign_keys().await;
    let orphan = db::insert_tweet(&app.pool, 42, "orphan", "no author")
        .await
        .unwrap();

    let res = app.client().get(&format!("/tweet/{}", orphan.id)).await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
    assert!(!res.body.contains("no author"));
}

#[tokio::test]
async fn only_the_owner_can_edit() {
    let app = TestApp::new().await;
    let bob_id = app.seed_user("bob", "pw-b").await;
    app.seed_user("alice", "pw-a").await;
    let tweet = db::insert_tweet(&app.pool, bob_id, "bob title", "bob secret draft")
        .await
        .unwrap();

    let mut alice = app.logged_in("alice", "pw-a").await;
    let res = alice.get(&format!("/edit/{}", tweet.id)).await;
    assert_eq!(res.status, StatusCode::OK);
    assert!(res.body.contains("You Aren&#x27;t Authorized To Edit This tweet..."));
    assert!(res.body.contains("<h1>Tweets</h1>"));
    assert!(!res.body.contains("<form"));

    let res = alice
        .post(&format!("/edit/{}", tweet.id), "title=hijacked&content=mine")
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert!(res.body.contains("You Aren&#x27;t Authorized To Edit This tweet..."));
    assert_eq!(app.tweet(tweet.id).await, tweet);

    let mut bob = app.logged_in("bob", "pw-b").await;
    let res = bob.get(&format!("/edit/{}", tweet.id)).await;
    assert_eq!(res.status, StatusCode::OK);
    assert!(res.body.contains(r#"value="bob title""#));
    assert!(res.body.contains("bob secret draft</textarea>"));
}

#[tokio::test]
async fn repeated_edit_is_idempotent() {
    let app = TestApp::new().await;
    let user_id = app.seed_user("alice", "hunter2").await;
    let tweet = db::insert_tweet(&app.pool, user_id, "old", "old content")
        .await
        .unwrap();
    let mut client = app.logged_in("alice", "hunter2").await;
    let uri = format!("/edit/{}", tweet.id);

    let res = client.post(&uri, "title=new&content=new+content").await;
    assert_eq!(res.status, StatusCode::SEE_OTHER);
    assert_eq!(res.location.as_deref(), Some("/"));
    let after_first = app.tweet(tweet.id).await;

    let res = client.post(&uri, "title=new&content=new+content").await;
    assert_eq!(res.status, StatusCode::SEE_OTHER);
    let after_second = app.tweet(tweet.id).await;

    assert_eq!(after_first, after_second);
    assert_eq!(after_second.title, "new");
    assert_eq!(after_second.content, "new content");

    let res = client.get("/").await;
    assert!(res.body.contains("Tweet Has Been Updated!"));
}

#[tokio::test]
async fn invalid_edit_keeps_the_tweet() {
    let app = TestApp::new().await;
    let user_id = app.seed_user("alice", "hunter2").await;
    let tweet = db::insert_tweet(&app.pool, user_id, "keep", "me")
        .await
        .unwrap();
    let mut client = app.logged_in("alice", "hunter2").await;

    let res = client
        .post(&format!("/edit/{}", tweet.id), "title=&content=changed")
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert!(res.body.contains("This field is required."));
    assert_eq!(app.tweet(tweet.id).await, tweet);
}

#[tokio::test]
async fn flashes_show_once() {
    let app = TestApp::new().await;
    let mut client = app.client();

    client.get("/add-tweet").await;
    let first = client.get("/").await;
    assert!(first.body.contains("Please log in to access this page."));
    let second = client.get("/").await;
    assert!(!second.body.contains("Please log in to access this page."));
}
