use std::path::Path;

use serde::Deserialize;
use sqlx::{Pool, Postgres, QueryBuilder, Transaction};

use crate::{
    authentication::permissions::ActionType,
    constants::RECIPE_COUNT_PER_PAGE,
    error::ApiError,
    form::{IngredientRef, RecipePayload},
    jwt::SessionData,
    media::store_recipe_image,
    pagination::PageContext,
    schema::{Id, IngredientLine, Recipe, RecipeFull, RecipeRow},
};

use super::carts::is_in_shopping_cart;
use super::ingredients::missing_ingredient_ids;
use super::tags::{list_recipe_tags, missing_tag_ids};
use super::users::get_user_profile;

/// Listing filters; the favorite/cart flags only take effect for an
/// authenticated viewer.
#[derive(Deserialize, Debug, Default, Clone)]
pub struct RecipeFilter {
    #[serde(default)]
    pub tags: Vec<String>,
    pub author: Option<Id>,
    #[serde(default)]
    pub is_favorited: bool,
    #[serde(default)]
    pub is_in_shopping_cart: bool,
}

/// Creates a recipe with its ingredient lines and tag links as one atomic
/// unit. Validation happens before any write; the image is stored inside the
/// transaction scope so an I/O failure rolls everything back.
pub async fn create_recipe(
    author_id: Id,
    payload: &RecipePayload,
    media_root: &Path,
    pool: &Pool<Postgres>,
) -> Result<RecipeFull, ApiError> {
    payload.validate_create()?;
    check_recipe_refs(payload, pool).await?;

    let name = require_field(&payload.name, "name")?;
    let text = require_field(&payload.text, "text")?;
    let cooking_time = payload
        .cooking_time
        .ok_or_else(|| ApiError::validation("cooking_time", "This field is required"))?;
    let image = payload
        .image
        .as_ref()
        .ok_or_else(|| ApiError::validation("image", "This field is required"))?;

    let mut tx = pool.begin().await?;

    let recipe: Recipe = sqlx::query_as(
        "
        INSERT INTO recipes (author_id, name, text, cooking_time, image)
        VALUES ($1, $2, $3, $4, '')
        RETURNING *
    ",
    )
    .bind(author_id)
    .bind(name)
    .bind(text)
    .bind(cooking_time)
    .fetch_one(&mut *tx)
    .await?;

    let image_path = store_recipe_image(media_root, recipe.id, image)?;
    sqlx::query("UPDATE recipes SET image = $1 WHERE id = $2")
        .bind(&image_path)
        .bind(recipe.id)
        .execute(&mut *tx)
        .await?;

    insert_ingredient_lines(&mut tx, recipe.id, &payload.ingredients).await?;
    insert_tag_links(&mut tx, recipe.id, &payload.tags).await?;

    tx.commit().await?;

    get_recipe_full(recipe.id, Some(author_id), pool).await
}

/// Updates a recipe. Scalar fields absent from the payload keep their
/// previous values; ingredient lines and tag links are replaced wholesale.
/// The whole replacement runs in one transaction so a concurrent reader never
/// observes a recipe with zero lines or zero tags.
pub async fn update_recipe(
    recipe_id: Id,
    viewer: Id,
    payload: &RecipePayload,
    media_root: &Path,
    pool: &Pool<Postgres>,
) -> Result<RecipeFull, ApiError> {
    payload.validate_update()?;
    check_recipe_refs(payload, pool).await?;

    let existing = get_recipe(recipe_id, pool)
        .await?
        .ok_or_else(|| ApiError::not_found("recipe"))?;

    let name = payload.name.clone().unwrap_or(existing.name);
    let text = payload.text.clone().unwrap_or(existing.text);
    let cooking_time = payload.cooking_time.unwrap_or(existing.cooking_time);

    let mut tx = pool.begin().await?;

    let image_path = match &payload.image {
        Some(image) => store_recipe_image(media_root, recipe_id, image)?,
        None => existing.image,
    };

    sqlx::query(
        "UPDATE recipes SET name = $1, text = $2, cooking_time = $3, image = $4 WHERE id = $5",
    )
    .bind(&name)
    .bind(&text)
    .bind(cooking_time)
    .bind(&image_path)
    .bind(recipe_id)
    .execute(&mut *tx)
    .await?;

    sqlx::query("DELETE FROM recipe_ingredients WHERE recipe_id = $1")
        .bind(recipe_id)
        .execute(&mut *tx)
        .await?;
    insert_ingredient_lines(&mut tx, recipe_id, &payload.ingredients).await?;

    sqlx::query("DELETE FROM recipe_tags WHERE recipe_id = $1")
        .bind(recipe_id)
        .execute(&mut *tx)
        .await?;
    insert_tag_links(&mut tx, recipe_id, &payload.tags).await?;

    tx.commit().await?;

    get_recipe_full(recipe_id, Some(viewer), pool).await
}

/// Deletes a recipe together with its lines, links, favorites and cart
/// entries. Ownership is checked by the caller via [`get_recipe_mut`].
pub async fn delete_recipe(recipe_id: Id, pool: &Pool<Postgres>) -> Result<(), ApiError> {
    let mut tx = pool.begin().await?;

    for table in [
        "favorites",
        "cart_entries",
        "recipe_ingredients",
        "recipe_tags",
    ] {
        sqlx::query(&format!("DELETE FROM {table} WHERE recipe_id = $1"))
            .bind(recipe_id)
            .execute(&mut *tx)
            .await?;
    }

    let result = sqlx::query("DELETE FROM recipes WHERE id = $1")
        .bind(recipe_id)
        .execute(&mut *tx)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("recipe"));
    }

    tx.commit().await?;
    Ok(())
}

pub async fn get_recipe(id: Id, pool: &Pool<Postgres>) -> Result<Option<Recipe>, ApiError> {
    let row: Option<Recipe> = sqlx::query_as("SELECT * FROM recipes WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(row)
}

/// Resolves a recipe for mutation: the session must own it, unless it may
/// manage all recipes.
pub async fn get_recipe_mut(
    id: Id,
    session: &SessionData,
    pool: &Pool<Postgres>,
) -> Result<Recipe, ApiError> {
    session.authenticate(ActionType::ManageOwnRecipes)?;
    let recipe = get_recipe(id, pool)
        .await?
        .ok_or_else(|| ApiError::not_found("recipe"))?;

    if recipe.author_id != session.user_id {
        session.authenticate(ActionType::ManageAllRecipes)?;
    }
    Ok(recipe)
}

pub async fn list_ingredient_lines(
    recipe_id: Id,
    pool: &Pool<Postgres>,
) -> Result<Vec<IngredientLine>, ApiError> {
    let rows: Vec<IngredientLine> = sqlx::query_as(
        "
        SELECT ri.ingredient_id AS id, i.name AS name,
               i.measurement_unit AS measurement_unit, ri.amount AS amount
        FROM recipe_ingredients ri
        INNER JOIN ingredients i ON i.id = ri.ingredient_id
        WHERE ri.recipe_id = $1
        ORDER BY i.name
    ",
    )
    .bind(recipe_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Assembles the full representation: tags, ingredient lines, author profile
/// and the per-request favorite/cart flags.
pub async fn get_recipe_full(
    id: Id,
    viewer: Option<Id>,
    pool: &Pool<Postgres>,
) -> Result<RecipeFull, ApiError> {
    let recipe = get_recipe(id, pool)
        .await?
        .ok_or_else(|| ApiError::not_found("recipe"))?;

    let tags = list_recipe_tags(recipe.id, pool).await?;
    let ingredients = list_ingredient_lines(recipe.id, pool).await?;
    let author = get_user_profile(recipe.author_id, viewer, pool).await?;

    let (is_favorited, in_cart) = match viewer {
        Some(viewer_id) => (
            is_favorite(recipe.id, viewer_id, pool).await?,
            is_in_shopping_cart(recipe.id, viewer_id, pool).await?,
        ),
        None => (false, false),
    };

    Ok(RecipeFull {
        id: recipe.id,
        tags,
        author,
        ingredients,
        is_favorited,
        is_in_shopping_cart: in_cart,
        name: recipe.name,
        image: recipe.image,
        text: recipe.text,
        cooking_time: recipe.cooking_time,
        pub_date: recipe.pub_date,
    })
}

/// Paginated listing, newest first. Flag filters apply only with a viewer.
pub async fn fetch_recipes(
    filter: &RecipeFilter,
    viewer: Option<Id>,
    offset: i64,
    pool: &Pool<Postgres>,
) -> Result<PageContext<RecipeRow>, ApiError> {
    let rows: Vec<RecipeRow> = sqlx::query_as(
        "
        SELECT r.*, COUNT(*) OVER() AS count
        FROM recipes r
        WHERE ($1::int IS NULL OR r.author_id = $1)
          AND (cardinality($2::text[]) = 0 OR EXISTS (
                SELECT 1 FROM recipe_tags rt
                INNER JOIN tags t ON t.id = rt.tag_id
                WHERE rt.recipe_id = r.id AND t.slug = ANY($2)))
          AND (NOT $3::bool OR EXISTS (
                SELECT 1 FROM favorites f
                WHERE f.recipe_id = r.id AND f.user_id = $4))
          AND (NOT $5::bool OR EXISTS (
                SELECT 1 FROM cart_entries c
                WHERE c.recipe_id = r.id AND c.user_id = $4))
        ORDER BY r.pub_date DESC
        LIMIT $6 OFFSET $7
    ",
    )
    .bind(filter.author)
    .bind(&filter.tags)
    .bind(filter.is_favorited && viewer.is_some())
    .bind(viewer)
    .bind(filter.is_in_shopping_cart && viewer.is_some())
    .bind(RECIPE_COUNT_PER_PAGE)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    let total_count = rows.first().map(|r| r.count).unwrap_or(0);
    Ok(PageContext::from_rows(
        rows,
        total_count,
        RECIPE_COUNT_PER_PAGE,
        offset,
    ))
}

pub async fn is_favorite(id: Id, user_id: Id, pool: &Pool<Postgres>) -> Result<bool, ApiError> {
    let result: Option<(Id,)> =
        sqlx::query_as("SELECT recipe_id FROM favorites WHERE recipe_id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .fetch_optional(pool)
            .await?;

    Ok(result.is_some())
}

pub async fn add_to_favorites(
    id: Id,
    user_id: Id,
    pool: &Pool<Postgres>,
) -> Result<(), ApiError> {
    if get_recipe(id, pool).await?.is_none() {
        return Err(ApiError::not_found("recipe"));
    }

    let result = sqlx::query(
        "INSERT INTO favorites (user_id, recipe_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
    )
    .bind(user_id)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::validation(
            "errors",
            "Recipe is already in favorites",
        ));
    }

    Ok(())
}

pub async fn remove_from_favorites(
    id: Id,
    user_id: Id,
    pool: &Pool<Postgres>,
) -> Result<(), ApiError> {
    let result = sqlx::query("DELETE FROM favorites WHERE user_id = $1 AND recipe_id = $2")
        .bind(user_id)
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("favorite"));
    }

    Ok(())
}

pub async fn fetch_favorites(
    user_id: Id,
    offset: i64,
    pool: &Pool<Postgres>,
) -> Result<PageContext<RecipeRow>, ApiError> {
    let rows: Vec<RecipeRow> = sqlx::query_as(
        "
        SELECT r.*, COUNT(*) OVER() AS count
        FROM favorites f
        INNER JOIN recipes r ON r.id = f.recipe_id
        WHERE f.user_id = $1
        ORDER BY r.pub_date DESC
        LIMIT $2 OFFSET $3
    ",
    )
    .bind(user_id)
    .bind(RECIPE_COUNT_PER_PAGE)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    let total_count = rows.first().map(|r| r.count).unwrap_or(0);
    Ok(PageContext::from_rows(
        rows,
        total_count,
        RECIPE_COUNT_PER_PAGE,
        offset,
    ))
}

/// Resolves tag and ingredient references before any write: a missing
/// ingredient or tag id is a NotFound, not a validation error.
async fn check_recipe_refs(payload: &RecipePayload, pool: &Pool<Postgres>) -> Result<(), ApiError> {
    let ingredient_ids: Vec<Id> = payload.ingredients.iter().map(|i| i.id).collect();
    if !missing_ingredient_ids(&ingredient_ids, pool).await?.is_empty() {
        return Err(ApiError::not_found("ingredient"));
    }
    if !missing_tag_ids(&payload.tags, pool).await?.is_empty() {
        return Err(ApiError::not_found("tag"));
    }
    Ok(())
}

async fn insert_ingredient_lines(
    tx: &mut Transaction<'_, Postgres>,
    recipe_id: Id,
    lines: &[IngredientRef],
) -> Result<(), ApiError> {
    let mut query_builder: QueryBuilder<Postgres> =
        QueryBuilder::new("INSERT INTO recipe_ingredients (recipe_id, ingredient_id, amount) ");

    query_builder.push_values(lines, |mut b, line| {
        b.push_bind(recipe_id)
            .push_bind(line.id)
            .push_bind(line.amount);
    });

    query_builder.build().execute(&mut **tx).await?;
    Ok(())
}

async fn insert_tag_links(
    tx: &mut Transaction<'_, Postgres>,
    recipe_id: Id,
    tags: &[Id],
) -> Result<(), ApiError> {
    let mut query_builder: QueryBuilder<Postgres> =
        QueryBuilder::new("INSERT INTO recipe_tags (recipe_id, tag_id) ");

    query_builder.push_values(tags, |mut b, tag_id| {
        b.push_bind(recipe_id).push_bind(tag_id);
    });

    query_builder.build().execute(&mut **tx).await?;
    Ok(())
}

fn require_field<'a>(value: &'a Option<String>, field: &str) -> Result<&'a str, ApiError> {
    value
        .as_deref()
        .ok_or_else(|| ApiError::validation(field, "This field is required"))
}

#[cfg(test)]
mod tests {
    use sqlx::{Executor, PgPool};

    use super::*;
    use crate::form::ImageField;

    const SCHEMA: &str = "
        CREATE TYPE user_role AS ENUM ('user', 'admin');
        CREATE TABLE users (
            id SERIAL PRIMARY KEY,
            username TEXT NOT NULL UNIQUE,
            email TEXT NOT NULL UNIQUE,
            first_name TEXT NOT NULL DEFAULT '',
            last_name TEXT NOT NULL DEFAULT '',
            password TEXT NOT NULL DEFAULT '',
            role user_role NOT NULL DEFAULT 'user'
        );
        CREATE TABLE follows (
            user_id INT NOT NULL REFERENCES users (id),
            author_id INT NOT NULL REFERENCES users (id),
            UNIQUE (user_id, author_id)
        );
        CREATE TABLE tags (
            id SERIAL PRIMARY KEY,
            name TEXT NOT NULL,
            color TEXT,
            slug TEXT NOT NULL UNIQUE
        );
        CREATE TABLE ingredients (
            id SERIAL PRIMARY KEY,
            name TEXT NOT NULL,
            measurement_unit TEXT NOT NULL
        );
        CREATE TABLE recipes (
            id SERIAL PRIMARY KEY,
            author_id INT NOT NULL REFERENCES users (id),
            name TEXT NOT NULL,
            text TEXT NOT NULL,
            cooking_time INT NOT NULL,
            image TEXT NOT NULL,
            pub_date TIMESTAMPTZ NOT NULL DEFAULT now()
        );
        CREATE TABLE recipe_ingredients (
            recipe_id INT NOT NULL REFERENCES recipes (id),
            ingredient_id INT NOT NULL REFERENCES ingredients (id),
            amount INT NOT NULL,
            UNIQUE (recipe_id, ingredient_id)
        );
        CREATE TABLE recipe_tags (
            recipe_id INT NOT NULL REFERENCES recipes (id),
            tag_id INT NOT NULL REFERENCES tags (id),
            UNIQUE (recipe_id, tag_id)
        );
        CREATE TABLE favorites (
            user_id INT NOT NULL REFERENCES users (id),
            recipe_id INT NOT NULL REFERENCES recipes (id),
            UNIQUE (user_id, recipe_id)
        );
        CREATE TABLE cart_entries (
            user_id INT NOT NULL REFERENCES users (id),
            recipe_id INT NOT NULL REFERENCES recipes (id),
            UNIQUE (user_id, recipe_id)
        );
        INSERT INTO users (username, email) VALUES ('chef', 'chef@example.com');
        INSERT INTO tags (name, color, slug)
        VALUES ('Breakfast', '#00ff00', 'breakfast'), ('Dinner', '#ff0000', 'dinner');
        INSERT INTO ingredients (name, measurement_unit)
        VALUES ('Salt', 'g'), ('Flour', 'g'), ('Egg', 'pcs');
    ";

    fn create_payload(tags: Vec<Id>, ingredients: Vec<IngredientRef>) -> RecipePayload {
        RecipePayload {
            name: Some(String::from("Pancakes")),
            text: Some(String::from("Mix and fry.")),
            cooking_time: Some(20),
            image: Some(ImageField::from_base64("aGVsbG8=").unwrap()),
            tags,
            ingredients,
        }
    }

    #[sqlx::test]
    async fn update_replaces_lines_and_links_wholesale(pool: PgPool) {
        pool.execute(SCHEMA).await.unwrap();
        let media_root = std::env::temp_dir().join("foodgram-recipes-test");

        let created = create_recipe(
            1,
            &create_payload(
                vec![1],
                vec![
                    IngredientRef { id: 1, amount: 5 },
                    IngredientRef { id: 2, amount: 200 },
                ],
            ),
            &media_root,
            &pool,
        )
        .await
        .unwrap();

        let update = RecipePayload {
            tags: vec![2],
            ingredients: vec![IngredientRef { id: 3, amount: 2 }],
            ..Default::default()
        };
        let updated = update_recipe(created.id, 1, &update, &media_root, &pool)
            .await
            .unwrap();

        // the new set and nothing else, in the representation and in storage
        let ids: Vec<Id> = updated.ingredients.iter().map(|l| l.id).collect();
        assert_eq!(ids, vec![3]);
        assert_eq!(updated.ingredients[0].amount, 2);
        let tag_ids: Vec<Id> = updated.tags.iter().map(|t| t.id).collect();
        assert_eq!(tag_ids, vec![2]);

        let lines = list_ingredient_lines(created.id, &pool).await.unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].id, 3);

        // scalars absent from the payload keep their previous values
        assert_eq!(updated.name, "Pancakes");
        assert_eq!(updated.cooking_time, 20);

        std::fs::remove_dir_all(&media_root).ok();
    }
}
