use sqlx::FromRow;

#[derive(FromRow, Debug, Clone)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
}

#[derive(FromRow, Debug, Clone, PartialEq, Eq)]
pub struct Tweet {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub user_id: i64,
}
