use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    Form,
};

use crate::{
    auth::{hash_password, verify_password, AppState, CurrentUser},
    db::{self, NewUser},
    error::AppError,
    forms::{FieldErrors, Form as _, LoginForm, RegisterForm, TweetForm},
    session::Session,
    views::{self, Page},
};

const TWEET_POSTED: &str = "Tweet posted Successfully!";
const TWEET_UPDATED: &str = "Tweet Has Been Updated!";
const NOT_AUTHORIZED: &str = "You Aren't Authorized To Edit This tweet...";
const WRONG_PASSWORD: &str = "Wrong Password - Try Again!";
const NO_SUCH_USER: &str = "That User Doesn't Exist! Try Again...";
const LOGGED_OUT: &str = "You Have Been Logged Out!  Thanks For Stopping By...";
const USER_ADDED: &str = "User Added Successfully!";
const USERNAME_TAKEN: &str = "Username Already Taken!";

pub async fn home(
    State(state): State<AppState>,
    session: Session,
) -> Result<Html<String>, AppError> {
    let tweets = db::list_tweets(&state.pool).await?;
    let page = Page::from_session(&session).await;
    Ok(views::home(&page, &tweets))
}

pub async fn show_tweet(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<i64>,
) -> Result<Html<String>, AppError> {
    let tweet = db::find_tweet(&state.pool, id)
        .await?
        .ok_or(AppError::NotFound("tweet"))?;

    // Unreachable while the foreign key holds, but a dangling author is
    // still a 404 rather than a fault.
    let author = db::find_user(&state.pool, tweet.user_id)
        .await?
        .ok_or(AppError::NotFound("user"))?;

    let page = Page::from_session(&session).await;
    Ok(views::tweet(&page, &tweet, &author))
}

pub async fn add_tweet_page(_user: CurrentUser, session: Session) -> Html<String> {
    let page = Page::from_session(&session).await;
    views::add_tweet(&page, &TweetForm::default(), &FieldErrors::default())
}

pub async fn add_tweet(
    State(state): State<AppState>,
    user: CurrentUser,
    session: Session,
    Form(form): Form<TweetForm>,
) -> Result<Html<String>, AppError> {
    if let Err(errors) = form.validate() {
        let page = Page::from_session(&session).await;
        return Ok(views::add_tweet(&page, &form, &errors));
    }

    let tweet = db::insert_tweet(&state.pool, user.user_id, &form.title, &form.content).await?;
    tracing::info!("User {} posted tweet {}", user.user_id, tweet.id);

    session.flash(TWEET_POSTED).await;
    let page = Page::from_session(&session).await;
    Ok(views::add_tweet(&page, &TweetForm::default(), &FieldErrors::default()))
}

/// Non-owners get a notice and the listing instead of the edit form.
async fn deny_edit(state: &AppState, session: &Session) -> Result<Response, AppError> {
    session.flash(NOT_AUTHORIZED).await;
    let tweets = db::list_tweets(&state.pool).await?;
    let page = Page::from_session(session).await;
    Ok(views::home(&page, &tweets).into_response())
}

pub async fn edit_tweet_page(
    State(state): State<AppState>,
    user: CurrentUser,
    session: Session,
    Path(id): Path<i64>,
) -> Result<Response, AppError> {
    let tweet = db::find_tweet(&state.pool, id)
        .await?
        .ok_or(AppError::NotFound("tweet"))?;

    if tweet.user_id != user.user_id {
        return deny_edit(&state, &session).await;
    }

    let values = TweetForm {
        title: tweet.title,
        content: tweet.content,
    };
    let page = Page::from_session(&session).await;
    Ok(views::edit_tweet(&page, id, &values, &FieldErrors::default()).into_response())
}

pub async fn edit_tweet(
    State(state): State<AppState>,
    user: CurrentUser,
    session: Session,
    Path(id): Path<i64>,
    Form(form): Form<TweetForm>,
) -> Result<Response, AppError> {
    let tweet = db::find_tweet(&state.pool, id)
        .await?
        .ok_or(AppError::NotFound("tweet"))?;

    if tweet.user_id != user.user_id {
        tracing::warn!("User {} tried to edit tweet {} owned by {}", user.user_id, id, tweet.user_id);
        return deny_edit(&state, &session).await;
    }

    if let Err(errors) = form.validate() {
        let page = Page::from_session(&session).await;
        return Ok(views::edit_tweet(&page, id, &form, &errors).into_response());
    }

    db::update_tweet(&state.pool, id, &form.title, &form.content).await?;
    session.flash(TWEET_UPDATED).await;
    Ok(Redirect::to("/").into_response())
}

pub async fn login_page(session: Session) -> Html<String> {
    let page = Page::from_session(&session).await;
    views::login(&page, &LoginForm::default(), &FieldErrors::default())
}

pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<LoginForm>,
) -> Result<Response, AppError> {
    if let Err(errors) = form.validate() {
        let page = Page::from_session(&session).await;
        return Ok(views::login(&page, &form, &errors).into_response());
    }

    match db::find_user_by_name(&state.pool, &form.username).await? {
        Some(user) => {
            if verify_password(&form.password, &user.password_hash).await? {
                session.log_in(user.id).await;
                tracing::info!("User {} logged in", user.id);
                return Ok(Redirect::to("/").into_response());
            }
            session.flash(WRONG_PASSWORD).await;
        }
        None => session.flash(NO_SUCH_USER).await,
    }

    let page = Page::from_session(&session).await;
    Ok(views::login(&page, &form, &FieldErrors::default()).into_response())
}

pub async fn logout(user: CurrentUser, session: Session) -> Redirect {
    session.log_out().await;
    session.flash(LOGGED_OUT).await;
    tracing::info!("User {} logged out", user.user_id);
    Redirect::to("/login")
}

pub async fn register_page(session: Session) -> Html<String> {
    let page = Page::from_session(&session).await;
    views::register(&page, &RegisterForm::default(), &FieldErrors::default())
}

pub async fn register(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<RegisterForm>,
) -> Result<Html<String>, AppError> {
    if let Err(errors) = form.validate() {
        let page = Page::from_session(&session).await;
        return Ok(views::register(&page, &form, &errors));
    }

    // Skip the hashing cost for names that are obviously taken; the insert
    // still settles races through the unique constraint.
    let outcome = if db::find_user_by_name(&state.pool, &form.username)
        .await?
        .is_some()
    {
        NewUser::UsernameTaken
    } else {
        let password_hash = hash_password(&form.password).await?;
        db::insert_user(&state.pool, &form.username, &password_hash).await?
    };

    let values = match outcome {
        NewUser::Created(user) => {
            tracing::info!("Registered user {} ({})", user.id, user.username);
            session.flash(USER_ADDED).await;
            RegisterForm::default()
        }
        NewUser::UsernameTaken => {
            session.flash(USERNAME_TAKEN).await;
            RegisterForm {
                username: form.username,
                password: String::new(),
            }
        }
    };

    let page = Page::from_session(&session).await;
    Ok(views::register(&page, &values, &FieldErrors::default()))
}

pub async fn not_found() -> (StatusCode, Html<String>) {
    (StatusCode::NOT_FOUND, views::not_found())
}
