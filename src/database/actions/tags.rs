use sqlx::{Pool, Postgres};

use crate::{
    error::ApiError,
    form::TagPayload,
    schema::{Id, Tag},
};

pub async fn create_tag(payload: &TagPayload, pool: &Pool<Postgres>) -> Result<Tag, ApiError> {
    payload.validate()?;

    let tag: Tag = sqlx::query_as("INSERT INTO tags (name, color, slug) VALUES ($1, $2, $3) RETURNING *")
        .bind(&payload.name)
        .bind(&payload.color)
        .bind(&payload.slug)
        .fetch_one(pool)
        .await?;

    Ok(tag)
}

pub async fn get_tag(id: Id, pool: &Pool<Postgres>) -> Result<Option<Tag>, ApiError> {
    let tag: Option<Tag> = sqlx::query_as("SELECT * FROM tags WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(tag)
}

pub async fn list_tags(pool: &Pool<Postgres>) -> Result<Vec<Tag>, ApiError> {
    let list: Vec<Tag> = sqlx::query_as("SELECT * FROM tags ORDER BY name")
        .fetch_all(pool)
        .await?;

    Ok(list)
}

pub async fn list_recipe_tags(recipe_id: Id, pool: &Pool<Postgres>) -> Result<Vec<Tag>, ApiError> {
    let list: Vec<Tag> = sqlx::query_as(
        "
        SELECT t.*
        FROM recipe_tags rt
        INNER JOIN tags t ON t.id = rt.tag_id
        WHERE rt.recipe_id = $1
        ORDER BY t.name
    ",
    )
    .bind(recipe_id)
    .fetch_all(pool)
    .await?;

    Ok(list)
}

/// Returns the tag ids from `ids` that do not exist.
pub async fn missing_tag_ids(ids: &[Id], pool: &Pool<Postgres>) -> Result<Vec<Id>, ApiError> {
    let existing: Vec<(Id,)> = sqlx::query_as("SELECT id FROM tags WHERE id = ANY($1)")
        .bind(ids)
        .fetch_all(pool)
        .await?;

    Ok(ids
        .iter()
        .copied()
        .filter(|id| !existing.iter().any(|(e,)| e == id))
        .collect())
}
