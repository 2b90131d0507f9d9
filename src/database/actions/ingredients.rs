use sqlx::{Pool, Postgres};

use crate::{
    constants::INGREDIENT_COUNT_PER_PAGE,
    error::ApiError,
    schema::{Id, Ingredient},
};

pub async fn create_ingredient(
    name: &str,
    measurement_unit: &str,
    pool: &Pool<Postgres>,
) -> Result<Ingredient, ApiError> {
    if name.is_empty() {
        return Err(ApiError::validation("name", "This field is required"));
    }

    let ingredient: Ingredient =
        sqlx::query_as("INSERT INTO ingredients (name, measurement_unit) VALUES ($1, $2) RETURNING *")
            .bind(name)
            .bind(measurement_unit)
            .fetch_one(pool)
            .await?;

    Ok(ingredient)
}

pub async fn get_ingredient(id: Id, pool: &Pool<Postgres>) -> Result<Option<Ingredient>, ApiError> {
    let row: Option<Ingredient> = sqlx::query_as("SELECT * FROM ingredients WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(row)
}

/// Name search with prefix matches ranked before substring matches.
pub async fn search_ingredients(
    search: &str,
    pool: &Pool<Postgres>,
) -> Result<Vec<Ingredient>, ApiError> {
    let rows: Vec<Ingredient> = sqlx::query_as(
        "
        SELECT *
        FROM ingredients
        WHERE name ILIKE $1 OR name ILIKE $2
        ORDER BY (CASE WHEN name ILIKE $1 THEN 0 ELSE 1 END), name
        LIMIT $3
    ",
    )
    .bind(format!("{search}%"))
    .bind(format!("%{search}%"))
    .bind(INGREDIENT_COUNT_PER_PAGE)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Returns the ingredient ids from `ids` that do not exist.
pub async fn missing_ingredient_ids(
    ids: &[Id],
    pool: &Pool<Postgres>,
) -> Result<Vec<Id>, ApiError> {
    let existing: Vec<(Id,)> = sqlx::query_as("SELECT id FROM ingredients WHERE id = ANY($1)")
        .bind(ids)
        .fetch_all(pool)
        .await?;

    Ok(ids
        .iter()
        .copied()
        .filter(|id| !existing.iter().any(|(e,)| e == id))
        .collect())
}
