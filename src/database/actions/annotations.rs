use sqlx::{Pool, Postgres};

use crate::{annotation::RecipeFlagsRow, error::QueryError, schema::Id};

/// Favorite, cart and author-follow flags for `recipe_ids` in a single query.
pub async fn fetch_recipe_flags(
    viewer: Id,
    recipe_ids: &[Id],
    pool: &Pool<Postgres>,
) -> Result<Vec<RecipeFlagsRow>, potion::Error> {
    let rows: Vec<RecipeFlagsRow> = sqlx::query_as(
        "
        SELECT r.id AS recipe_id,
            EXISTS (
                SELECT 1 FROM favorites f WHERE f.owner_id = $1 AND f.recipe_id = r.id
            ) AS is_favorited,
            EXISTS (
                SELECT 1 FROM shopping_cart_entries c WHERE c.owner_id = $1 AND c.recipe_id = r.id
            ) AS is_in_shopping_cart,
            EXISTS (
                SELECT 1 FROM follows s
                WHERE s.follower_id = $1 AND s.following_id = r.author_id AND r.author_id <> $1
            ) AS is_subscribed
        FROM recipes r
        WHERE r.id = ANY($2)
    ",
    )
    .bind(viewer)
    .bind(recipe_ids)
    .fetch_all(pool)
    .await
    .map_err(|e| QueryError::from(e).into())?;

    Ok(rows)
}

/// The subset of `user_ids` followed by `viewer`, in a single query.
pub async fn fetch_subscribed_authors(
    viewer: Id,
    user_ids: &[Id],
    pool: &Pool<Postgres>,
) -> Result<Vec<Id>, potion::Error> {
    let rows: Vec<(Id,)> = sqlx::query_as(
        "
        SELECT u.id
        FROM users u
        WHERE u.id = ANY($2)
            AND u.id <> $1
            AND EXISTS (SELECT 1 FROM follows s WHERE s.follower_id = $1 AND s.following_id = u.id)
    ",
    )
    .bind(viewer)
    .bind(user_ids)
    .fetch_all(pool)
    .await
    .map_err(|e| QueryError::from(e).into())?;

    Ok(rows.into_iter().map(|row| row.0).collect())
}
