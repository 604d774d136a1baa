use sqlx::{Pool, Postgres};

use crate::{error::QueryError, manifest::ManifestLine, schema::Id};

pub async fn fetch_user_cart_totals(
    owner_id: Id,
    pool: &Pool<Postgres>,
) -> Result<Vec<ManifestLine>, potion::Error> {
    let rows: Vec<ManifestLine> = sqlx::query_as(
        "
        SELECT i.name AS name, i.measurement_unit AS measurement_unit, SUM(ri.amount) AS total
        FROM shopping_cart_entries c
        INNER JOIN recipe_ingredients ri ON ri.recipe_id = c.recipe_id
        INNER JOIN ingredients i ON i.id = ri.ingredient_id
        WHERE c.owner_id = $1
        GROUP BY i.name, i.measurement_unit
        ORDER BY total DESC, i.name, i.measurement_unit
    ",
    )
    .bind(owner_id)
    .fetch_all(pool)
    .await
    .map_err(|e| QueryError::from(e).into())?;

    Ok(rows)
}

/// Same aggregate over an explicit recipe id list; repeated ids count once per occurrence.
pub async fn fetch_session_cart_totals(
    recipe_ids: &[Id],
    pool: &Pool<Postgres>,
) -> Result<Vec<ManifestLine>, potion::Error> {
    let rows: Vec<ManifestLine> = sqlx::query_as(
        "
        SELECT i.name AS name, i.measurement_unit AS measurement_unit, SUM(ri.amount) AS total
        FROM UNNEST($1::INTEGER[]) AS s(recipe_id)
        INNER JOIN recipe_ingredients ri ON ri.recipe_id = s.recipe_id
        INNER JOIN ingredients i ON i.id = ri.ingredient_id
        GROUP BY i.name, i.measurement_unit
        ORDER BY total DESC, i.name, i.measurement_unit
    ",
    )
    .bind(recipe_ids)
    .fetch_all(pool)
    .await
    .map_err(|e| QueryError::from(e).into())?;

    Ok(rows)
}
