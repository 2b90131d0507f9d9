use sqlx::{Pool, Postgres};

use crate::{
    authentication::{
        cryptography::{hash_password, verify_password},
        jwt::generate_jwt_session,
    },
    constants::SUBSCRIPTION_COUNT_PER_PAGE,
    error::ApiError,
    form::RegistrationPayload,
    pagination::PageContext,
    schema::{Id, RecipeSummary, Subscription, User, UserProfile},
};

pub async fn get_user_by_email(
    pool: &Pool<Postgres>,
    email: &str,
) -> Result<Option<User>, ApiError> {
    let row: Option<User> = sqlx::query_as("SELECT * FROM users WHERE email = LOWER($1)")
        .bind(email)
        .fetch_optional(pool)
        .await?;

    Ok(row)
}

pub async fn get_user_by_id(pool: &Pool<Postgres>, user_id: Id) -> Result<Option<User>, ApiError> {
    let row: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

    Ok(row)
}

/// Registers a user. Email and username are normalized to lowercase and must
/// be unique; the stored password is the argon2 hash.
pub async fn register_user(
    payload: &RegistrationPayload,
    pool: &Pool<Postgres>,
) -> Result<User, ApiError> {
    payload.validate()?;

    let email = payload.email.to_lowercase();
    let username = payload.username.to_lowercase();

    let (email_taken, username_taken): (bool, bool) = sqlx::query_as(
        "
        SELECT EXISTS(SELECT 1 FROM users WHERE email = $1),
               EXISTS(SELECT 1 FROM users WHERE username = $2)
    ",
    )
    .bind(&email)
    .bind(&username)
    .fetch_one(pool)
    .await?;
    if email_taken {
        return Err(ApiError::validation(
            "email",
            "A user with this email is already registered",
        ));
    }
    if username_taken {
        return Err(ApiError::validation(
            "username",
            "A user with this username is already registered",
        ));
    }

    let password = hash_password(&payload.password)?;

    let user: User = sqlx::query_as(
        "
        INSERT INTO users (username, email, first_name, last_name, password)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
    ",
    )
    .bind(&username)
    .bind(&email)
    .bind(&payload.first_name)
    .bind(&payload.last_name)
    .bind(&password)
    .fetch_one(pool)
    .await?;

    Ok(user)
}

/// Email-based login; returns a signed session token.
pub async fn login_user(
    email: &str,
    password: &str,
    secret: &[u8],
    pool: &Pool<Postgres>,
) -> Result<String, ApiError> {
    let user = get_user_by_email(pool, &email.to_lowercase()).await?;
    let user = match user {
        Some(user) => user,
        None => return Err(ApiError::Unauthenticated(String::from("Invalid credentials"))),
    };

    if !verify_password(password, &user.password) {
        return Err(ApiError::Unauthenticated(String::from("Invalid credentials")));
    }

    generate_jwt_session(&user, secret)
}

pub async fn is_subscribed(
    user_id: Id,
    author_id: Id,
    pool: &Pool<Postgres>,
) -> Result<bool, ApiError> {
    let row: Option<(Id,)> =
        sqlx::query_as("SELECT author_id FROM follows WHERE user_id = $1 AND author_id = $2")
            .bind(user_id)
            .bind(author_id)
            .fetch_optional(pool)
            .await?;

    Ok(row.is_some())
}

/// Public profile with the per-request `is_subscribed` flag; `viewer` is the
/// requesting user, if any.
pub async fn get_user_profile(
    user_id: Id,
    viewer: Option<Id>,
    pool: &Pool<Postgres>,
) -> Result<UserProfile, ApiError> {
    let user = get_user_by_id(pool, user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("user"))?;

    let subscribed = match viewer {
        Some(viewer_id) => is_subscribed(viewer_id, user.id, pool).await?,
        None => false,
    };

    Ok(UserProfile::from_user(user, subscribed))
}

pub async fn subscribe(user_id: Id, author_id: Id, pool: &Pool<Postgres>) -> Result<(), ApiError> {
    if user_id == author_id {
        return Err(ApiError::validation(
            "errors",
            "You cannot subscribe to yourself",
        ));
    }
    if get_user_by_id(pool, author_id).await?.is_none() {
        return Err(ApiError::not_found("user"));
    }

    let result = sqlx::query(
        "INSERT INTO follows (user_id, author_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
    )
    .bind(user_id)
    .bind(author_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::validation(
            "errors",
            "You are already subscribed to this author",
        ));
    }

    Ok(())
}

pub async fn unsubscribe(
    user_id: Id,
    author_id: Id,
    pool: &Pool<Postgres>,
) -> Result<(), ApiError> {
    let result = sqlx::query("DELETE FROM follows WHERE user_id = $1 AND author_id = $2")
        .bind(user_id)
        .bind(author_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("subscription"));
    }

    Ok(())
}

/// Followed authors with their recipes trimmed to `recipes_limit` and a
/// total recipe count, paginated by offset.
pub async fn fetch_subscriptions(
    user_id: Id,
    offset: i64,
    recipes_limit: Option<i64>,
    pool: &Pool<Postgres>,
) -> Result<PageContext<Subscription>, ApiError> {
    let authors: Vec<(Id, i64)> = sqlx::query_as(
        "
        SELECT f.author_id, COUNT(*) OVER()
        FROM follows f
        INNER JOIN users u ON u.id = f.author_id
        WHERE f.user_id = $1
        ORDER BY u.username
        LIMIT $2 OFFSET $3
    ",
    )
    .bind(user_id)
    .bind(SUBSCRIPTION_COUNT_PER_PAGE)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    let total_count = authors.first().map(|a| a.1).unwrap_or(0);

    let mut rows: Vec<Subscription> = Vec::with_capacity(authors.len());
    for (author_id, _) in authors {
        rows.push(subscription_entry(author_id, recipes_limit, pool).await?);
    }

    Ok(PageContext::from_rows(
        rows,
        total_count,
        SUBSCRIPTION_COUNT_PER_PAGE,
        offset,
    ))
}

async fn subscription_entry(
    author_id: Id,
    recipes_limit: Option<i64>,
    pool: &Pool<Postgres>,
) -> Result<Subscription, ApiError> {
    let author = get_user_by_id(pool, author_id)
        .await?
        .ok_or_else(|| ApiError::not_found("user"))?;

    let recipes: Vec<RecipeSummary> = sqlx::query_as(
        "
        SELECT id, name, image, cooking_time
        FROM recipes
        WHERE author_id = $1
        ORDER BY pub_date DESC
        LIMIT $2
    ",
    )
    .bind(author_id)
    .bind(recipes_limit.unwrap_or(i64::MAX))
    .fetch_all(pool)
    .await?;

    let recipes_count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM recipes WHERE author_id = $1")
        .bind(author_id)
        .fetch_one(pool)
        .await?;

    Ok(Subscription {
        id: author.id,
        email: author.email,
        username: author.username,
        first_name: author.first_name,
        last_name: author.last_name,
        is_subscribed: true,
        recipes,
        recipes_count: recipes_count.0,
    })
}
