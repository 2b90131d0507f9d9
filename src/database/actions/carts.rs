use sqlx::{Pool, Postgres};

use crate::{
    error::ApiError,
    report::{merge_by_name, render_shopping_list},
    schema::{CartIngredientRow, Id, RecipeSummary},
};

use super::recipes::get_recipe;

pub async fn is_in_shopping_cart(
    recipe_id: Id,
    user_id: Id,
    pool: &Pool<Postgres>,
) -> Result<bool, ApiError> {
    let row: Option<(Id,)> =
        sqlx::query_as("SELECT recipe_id FROM cart_entries WHERE recipe_id = $1 AND user_id = $2")
            .bind(recipe_id)
            .bind(user_id)
            .fetch_optional(pool)
            .await?;

    Ok(row.is_some())
}

pub async fn add_to_cart(
    recipe_id: Id,
    user_id: Id,
    pool: &Pool<Postgres>,
) -> Result<(), ApiError> {
    if get_recipe(recipe_id, pool).await?.is_none() {
        return Err(ApiError::not_found("recipe"));
    }

    let result = sqlx::query(
        "INSERT INTO cart_entries (user_id, recipe_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
    )
    .bind(user_id)
    .bind(recipe_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::validation(
            "errors",
            "Recipe is already in the shopping cart",
        ));
    }

    Ok(())
}

pub async fn remove_from_cart(
    recipe_id: Id,
    user_id: Id,
    pool: &Pool<Postgres>,
) -> Result<(), ApiError> {
    let result = sqlx::query("DELETE FROM cart_entries WHERE user_id = $1 AND recipe_id = $2")
        .bind(user_id)
        .bind(recipe_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("cart entry"));
    }

    Ok(())
}

pub async fn list_cart(user_id: Id, pool: &Pool<Postgres>) -> Result<Vec<RecipeSummary>, ApiError> {
    let rows: Vec<RecipeSummary> = sqlx::query_as(
        "
        SELECT r.id, r.name, r.image, r.cooking_time
        FROM cart_entries c
        INNER JOIN recipes r ON r.id = c.recipe_id
        WHERE c.user_id = $1
        ORDER BY r.pub_date DESC
    ",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Ingredient lines of every recipe in the user's cart, summed per
/// ingredient id by the storage layer. Rows sharing a display name are merged
/// later by [`merge_by_name`].
pub async fn cart_ingredients(
    user_id: Id,
    pool: &Pool<Postgres>,
) -> Result<Vec<CartIngredientRow>, ApiError> {
    let rows: Vec<CartIngredientRow> = sqlx::query_as(
        "
        SELECT i.name AS name, SUM(ri.amount) AS amount,
               i.measurement_unit AS measurement_unit
        FROM cart_entries c
        INNER JOIN recipe_ingredients ri ON ri.recipe_id = c.recipe_id
        INNER JOIN ingredients i ON i.id = ri.ingredient_id
        WHERE c.user_id = $1
        GROUP BY i.id
        ORDER BY i.name
    ",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// The download endpoint's worker: aggregates the cart and renders the PDF.
/// An empty cart produces a header-only document.
pub async fn export_shopping_list(user_id: Id, pool: &Pool<Postgres>) -> Result<Vec<u8>, ApiError> {
    let rows = cart_ingredients(user_id, pool).await?;
    let merged = merge_by_name(rows);
    render_shopping_list(&merged)
}
