use std::collections::HashMap;

use crate::{
    annotation::{annotate_users, UserView, Viewer, WithRecipes, WithSubscriptionFlag},
    config::Config,
    error::{NotFoundError, QueryError},
    pagination::{Page, PageRequest},
    schema::{AuthoredShortRecipe, Id, ShortRecipe, User, UserRow},
};

use sqlx::{Pool, Postgres};

pub async fn get_user_by_id(id: Id, pool: &Pool<Postgres>) -> Result<User, potion::Error> {
    let row: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|e| QueryError::from(e).into())?;

    row.ok_or_else(|| NotFoundError::new("No user exists with specified id").into())
}

pub async fn get_users_by_ids(ids: &[Id], pool: &Pool<Postgres>) -> Result<Vec<User>, potion::Error> {
    let rows: Vec<User> = sqlx::query_as("SELECT * FROM users WHERE id = ANY($1)")
        .bind(ids)
        .fetch_all(pool)
        .await
        .map_err(|e| QueryError::from(e).into())?;

    Ok(rows)
}

/// Public profile of `id` as seen by `viewer`.
pub async fn get_profile(
    id: Id,
    viewer: &Viewer,
    pool: &Pool<Postgres>,
) -> Result<WithSubscriptionFlag<UserView>, potion::Error> {
    let user = get_user_by_id(id, pool).await?;

    annotate_users(pool, vec![user.into()], viewer)
        .await?
        .pop()
        .ok_or_else(|| NotFoundError::new("No user exists with specified id").into())
}

/// `recipes_limit` query value, defaulting and clamping through `config`.
pub fn recipes_limit(requested: Option<i64>, config: &Config) -> i64 {
    requested
        .unwrap_or(config.default_recipes_limit)
        .clamp(0, config.max_recipes_limit)
}

/// Wraps followed `authors` with their newest `recipes_limit` recipes and
/// total recipe count. Two queries regardless of how many authors.
pub async fn attach_recipes(
    authors: Vec<User>,
    recipes_limit: i64,
    pool: &Pool<Postgres>,
) -> Result<Vec<WithRecipes<WithSubscriptionFlag<UserView>>>, potion::Error> {
    let author_ids: Vec<Id> = authors.iter().map(|user| user.id).collect();

    let mut recipes: HashMap<Id, Vec<ShortRecipe>> = HashMap::new();
    let mut counts: HashMap<Id, i64> = HashMap::new();

    if !author_ids.is_empty() {
        let newest: Vec<AuthoredShortRecipe> = sqlx::query_as(
            "
            SELECT author_id, id, name, image, cooking_time FROM (
                SELECT r.author_id, r.id, r.name, r.image, r.cooking_time,
                    ROW_NUMBER() OVER (PARTITION BY r.author_id ORDER BY r.pub_date DESC, r.id DESC) AS position
                FROM recipes r
                WHERE r.author_id = ANY($1)
            ) ranked
            WHERE position <= $2
            ORDER BY author_id, position
        ",
        )
        .bind(&author_ids)
        .bind(recipes_limit)
        .fetch_all(pool)
        .await
        .map_err(|e| QueryError::from(e).into())?;

        for row in newest {
            recipes.entry(row.author_id).or_default().push(row.recipe);
        }

        let totals: Vec<(Id, i64)> = sqlx::query_as(
            "SELECT author_id, COUNT(*) FROM recipes WHERE author_id = ANY($1) GROUP BY author_id",
        )
        .bind(&author_ids)
        .fetch_all(pool)
        .await
        .map_err(|e| QueryError::from(e).into())?;

        counts.extend(totals);
    }

    Ok(authors
        .into_iter()
        .map(|user| {
            let id = user.id;
            WithRecipes {
                inner: WithSubscriptionFlag {
                    inner: UserView::from(user),
                    is_subscribed: true,
                },
                recipes: recipes.remove(&id).unwrap_or_default(),
                recipes_count: counts.get(&id).copied().unwrap_or(0),
            }
        })
        .collect())
}

/// Authors followed by `follower`, ordered by username.
pub async fn fetch_subscriptions(
    follower: Id,
    recipes_limit: i64,
    page: &PageRequest,
    pool: &Pool<Postgres>,
) -> Result<Page<WithRecipes<WithSubscriptionFlag<UserView>>>, potion::Error> {
    let rows: Vec<UserRow> = sqlx::query_as(
        "
        SELECT u.*, COUNT(*) OVER() AS count
        FROM follows f
        INNER JOIN users u ON u.id = f.following_id
        WHERE f.follower_id = $1
        ORDER BY u.username, u.id
        LIMIT $2 OFFSET $3
    ",
    )
    .bind(follower)
    .bind(page.limit)
    .bind(page.offset())
    .fetch_all(pool)
    .await
    .map_err(|e| QueryError::from(e).into())?;

    let total_count = rows.first().map(|row| row.count).unwrap_or(0);
    log::debug!("Loaded {} subscriptions for user {follower}", rows.len());

    let authors = rows.into_iter().map(|row| row.user).collect();
    let results = attach_recipes(authors, recipes_limit, pool).await?;

    Page::from_rows(results, total_count, page)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recipes_limit_defaults_and_clamps() {
        let config = Config::default();
        assert_eq!(recipes_limit(None, &config), config.default_recipes_limit);
        assert_eq!(recipes_limit(Some(1000), &config), config.max_recipes_limit);
        assert_eq!(recipes_limit(Some(-4), &config), 0);
        assert_eq!(recipes_limit(Some(2), &config), 2);
    }
}
