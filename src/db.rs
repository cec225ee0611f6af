use std::{str::FromStr, time::Duration};

use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};

use crate::{
    error::AppError,
    models::{Tweet, User},
};

pub async fn connect(database_url: &str) -> Result<SqlitePool, AppError> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(3))
        .connect_with(options)
        .await?;

    migrate(&pool).await?;
    Ok(pool)
}

pub async fn migrate(pool: &SqlitePool) -> Result<(), AppError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub enum NewUser {
    Created(User),
    UsernameTaken,
}

pub async fn find_user(pool: &SqlitePool, id: i64) -> Result<Option<User>, AppError> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(user)
}

pub async fn find_user_by_name(
    pool: &SqlitePool,
    username: &str,
) -> Result<Option<User>, AppError> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = $1")
        .bind(username)
        .fetch_optional(pool)
        .await?;
    Ok(user)
}

/// Relies on the UNIQUE constraint, so two racing registrations for the same
/// name cannot both succeed.
pub async fn insert_user(
    pool: &SqlitePool,
    username: &str,
    password_hash: &str,
) -> Result<NewUser, AppError> {
    let result = sqlx::query_as::<_, User>(
        "INSERT INTO users (username, password_hash) VALUES ($1, $2) RETURNING *",
    )
    .bind(username)
    .bind(password_hash)
    .fetch_one(pool)
    .await;

    match result {
        Ok(user) => Ok(NewUser::Created(user)),
        Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
            Ok(NewUser::UsernameTaken)
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn list_tweets(pool: &SqlitePool) -> Result<Vec<Tweet>, AppError> {
    let tweets = sqlx::query_as::<_, Tweet>("SELECT * FROM tweets ORDER BY id")
        .fetch_all(pool)
        .await?;
    Ok(tweets)
}

pub async fn find_tweet(pool: &SqlitePool, id: i64) -> Result<Option<Tweet>, AppError> {
    let tweet = sqlx::query_as::<_, Tweet>("SELECT * FROM tweets WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(tweet)
}

pub async fn insert_tweet(
    pool: &SqlitePool,
    user_id: i64,
    title: &str,
    content: &str,
) -> Result<Tweet, AppError> {
    let tweet = sqlx::query_as::<_, Tweet>(
        "INSERT INTO tweets (title, content, user_id) VALUES ($1, $2, $3) RETURNING *",
    )
    .bind(title)
    .bind(content)
    .bind(user_id)
    .fetch_one(pool)
    .await?;
    Ok(tweet)
}

/// Last write wins; there is no version check.
pub async fn update_tweet(
    pool: &SqlitePool,
    id: i64,
    title: &str,
    content: &str,
) -> Result<(), AppError> {
    let result = sqlx::query("UPDATE tweets SET title = $1, content = $2 WHERE id = $3")
        .bind(title)
        .bind(content)
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("tweet"));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) async fn memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    migrate(&pool).await.unwrap();
    pool
}
