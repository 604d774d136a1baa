use crate::{
    error::{NotFoundError, QueryError, ValidationError},
    schema::{Id, Ingredient, RecipeIngredient},
};

use sqlx::{Pool, Postgres};

fn escape_like(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

pub async fn create_ingredient(
    name: &str,
    measurement_unit: &str,
    pool: &Pool<Postgres>,
) -> Result<Ingredient, potion::Error> {
    let name = name.trim();
    let measurement_unit = measurement_unit.trim();
    if name.is_empty() {
        return Err(ValidationError::new("name", "Name can't be empty").into());
    }
    if measurement_unit.is_empty() {
        return Err(ValidationError::new("measurement_unit", "Unit can't be empty").into());
    }

    let row: Ingredient = sqlx::query_as(
        "INSERT INTO ingredients (name, measurement_unit) VALUES ($1, $2) RETURNING *",
    )
    .bind(name)
    .bind(measurement_unit)
    .fetch_one(pool)
    .await
    .map_err(|e| QueryError::from(e).into())?;

    Ok(row)
}

pub async fn list_ingredients(pool: &Pool<Postgres>) -> Result<Vec<Ingredient>, potion::Error> {
    let rows: Vec<Ingredient> = sqlx::query_as("SELECT * FROM ingredients ORDER BY LOWER(name)")
        .fetch_all(pool)
        .await
        .map_err(|e| QueryError::from(e).into())?;

    Ok(rows)
}

/// Case-insensitive substring search; names starting with `name` come first.
pub async fn search_ingredients(
    name: &str,
    pool: &Pool<Postgres>,
) -> Result<Vec<Ingredient>, potion::Error> {
    let name = escape_like(name.trim());

    let rows: Vec<Ingredient> = sqlx::query_as(
        "
        SELECT * FROM ingredients
        WHERE name ILIKE $1
        ORDER BY CASE WHEN name ILIKE $2 THEN 1 ELSE 2 END, LOWER(name)
    ",
    )
    .bind(format!("%{name}%"))
    .bind(format!("{name}%"))
    .fetch_all(pool)
    .await
    .map_err(|e| QueryError::from(e).into())?;

    Ok(rows)
}

pub async fn get_ingredient(id: Id, pool: &Pool<Postgres>) -> Result<Ingredient, potion::Error> {
    let row: Option<Ingredient> = sqlx::query_as("SELECT * FROM ingredients WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|e| QueryError::from(e).into())?;

    row.ok_or_else(|| NotFoundError::new("No ingredient exists with specified id").into())
}

/// Ingredients with amounts for every recipe in `recipe_ids`, one query for the whole page.
pub async fn list_recipe_ingredients(
    recipe_ids: &[Id],
    pool: &Pool<Postgres>,
) -> Result<Vec<RecipeIngredient>, potion::Error> {
    let rows: Vec<RecipeIngredient> = sqlx::query_as(
        "
        SELECT ri.recipe_id AS recipe_id, i.id AS id, i.name AS name,
            i.measurement_unit AS measurement_unit, ri.amount AS amount
        FROM recipe_ingredients ri
        INNER JOIN ingredients i ON i.id = ri.ingredient_id
        WHERE ri.recipe_id = ANY($1)
        ORDER BY LOWER(i.name)
    ",
    )
    .bind(recipe_ids)
    .fetch_all(pool)
    .await
    .map_err(|e| QueryError::from(e).into())?;

    Ok(rows)
}
