use std::collections::{HashMap, HashSet};

use serde::Serialize;
use sqlx::{Pool, Postgres, QueryBuilder, Transaction};

use crate::{
    annotation::{annotate, RecipeView, UserView, Viewer, WithSubscriptionFlag},
    authentication::permissions::ActionType,
    config::Config,
    constants::{FALSE_QUERY_SYMBOLS, TRUE_QUERY_SYMBOLS},
    error::{ForbiddenError, NotFoundError, QueryError, TypeError, ValidationError},
    jwt::SessionData,
    pagination::{query_value, Page, PageRequest},
    schema::{Id, Recipe, RecipeIngredient, RecipePayload, RecipeRow, Tag},
};

use super::{get_users_by_ids, list_recipe_ingredients, list_recipe_tags};

/// Listing filters parsed from the raw query string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecipeFilter {
    pub author: Option<Id>,
    /// Tag slugs, any-of.
    pub tags: Vec<String>,
    /// `Some(false)` keeps only recipes the viewer has not favorited.
    pub is_favorited: Option<bool>,
    pub is_in_shopping_cart: Option<bool>,
}

fn query_flag(pairs: &[(String, String)], key: &str) -> Result<Option<bool>, potion::Error> {
    match pairs.iter().find(|(k, _)| k == key) {
        Some((_, value)) if TRUE_QUERY_SYMBOLS.contains(&value.to_lowercase().as_str()) => {
            Ok(Some(true))
        }
        Some((_, value)) if FALSE_QUERY_SYMBOLS.contains(&value.to_lowercase().as_str()) => {
            Ok(Some(false))
        }
        Some((_, value)) => {
            Err(TypeError::new(&format!("Invalid value for {key}: {value}")).into())
        }
        None => Ok(None),
    }
}

fn push_membership_filter(
    query: &mut QueryBuilder<'_, Postgres>,
    wanted: Option<bool>,
    table: &str,
    viewer_id: Id,
) {
    let Some(wanted) = wanted else {
        return;
    };
    query
        .push(if wanted { " AND EXISTS" } else { " AND NOT EXISTS" })
        .push(format!(
            " (SELECT 1 FROM {table} m WHERE m.recipe_id = r.id AND m.owner_id = "
        ))
        .push_bind(viewer_id)
        .push(")");
}

impl RecipeFilter {
    pub fn from_pairs(pairs: &[(String, String)]) -> Result<Self, potion::Error> {
        Ok(Self {
            author: query_value(pairs, "author")?,
            tags: pairs
                .iter()
                .filter(|(k, v)| k == "tags" && !v.is_empty())
                .map(|(_, v)| v.to_owned())
                .collect(),
            is_favorited: query_flag(pairs, "is_favorited")?,
            is_in_shopping_cart: query_flag(pairs, "is_in_shopping_cart")?,
        })
    }
}

/// A recipe with everything a client renders.
#[derive(Debug, Clone, Serialize)]
pub struct RecipeDetail {
    #[serde(flatten)]
    pub recipe: RecipeView,
    pub author: Option<WithSubscriptionFlag<UserView>>,
    pub tags: Vec<Tag>,
    pub ingredients: Vec<RecipeIngredient>,
}

pub fn validate_recipe(payload: &RecipePayload, config: &Config) -> Result<(), ValidationError> {
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(ValidationError::new("name", "Name can't be empty"));
    }
    if name.chars().count() > config.max_recipe_name_length {
        return Err(ValidationError::new(
            "name",
            &format!("Name can't be longer than {}", config.max_recipe_name_length),
        ));
    }
    if payload.text.trim().is_empty() {
        return Err(ValidationError::new("text", "Text can't be empty"));
    }
    if payload.text.chars().count() > config.max_recipe_text_length {
        return Err(ValidationError::new(
            "text",
            &format!("Text can't be longer than {}", config.max_recipe_text_length),
        ));
    }
    if !config.cooking_time.contains(payload.cooking_time) {
        return Err(ValidationError::new(
            "cooking_time",
            &format!(
                "Cooking time must be between {} and {}",
                config.cooking_time.min, config.cooking_time.max
            ),
        ));
    }

    if payload.tags.is_empty() {
        return Err(ValidationError::new("tags", "At least one tag is required"));
    }
    let mut seen = HashSet::new();
    if !payload.tags.iter().all(|id| seen.insert(*id)) {
        return Err(ValidationError::new("tags", "Tags can't repeat"));
    }

    if payload.ingredients.is_empty() {
        return Err(ValidationError::new(
            "ingredients",
            "At least one ingredient is required",
        ));
    }
    let mut seen = HashSet::new();
    if !payload.ingredients.iter().all(|i| seen.insert(i.id)) {
        return Err(ValidationError::new("ingredients", "Ingredients can't repeat"));
    }
    if let Some(part) = payload
        .ingredients
        .iter()
        .find(|i| !config.ingredient_amount.contains(i.amount))
    {
        return Err(ValidationError::new(
            "amount",
            &format!(
                "Amount of ingredient {} must be between {} and {}",
                part.id, config.ingredient_amount.min, config.ingredient_amount.max
            ),
        ));
    }

    Ok(())
}

/// Authors may edit their own recipes; moderators and admins any recipe.
pub fn check_recipe_access(recipe: &Recipe, session: &SessionData) -> Result<(), potion::Error> {
    session.authenticate(ActionType::ManageOwnRecipes)?;

    if session.authenticate(ActionType::ManageAllRecipes).is_ok() {
        return Ok(());
    }
    if recipe.author_id != Some(session.user_id) {
        return Err(ForbiddenError::new("Only the author can change this recipe").into());
    }
    Ok(())
}

pub async fn get_recipe(id: Id, pool: &Pool<Postgres>) -> Result<Recipe, potion::Error> {
    let row: Option<Recipe> = sqlx::query_as("SELECT * FROM recipes WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|e| QueryError::from(e).into())?;

    row.ok_or_else(|| NotFoundError::new("No recipe exists with specified id").into())
}

pub async fn get_recipe_mut(
    id: Id,
    session: &SessionData,
    pool: &Pool<Postgres>,
) -> Result<Recipe, potion::Error> {
    let recipe = get_recipe(id, pool).await?;
    check_recipe_access(&recipe, session)?;

    Ok(recipe)
}

/// Unknown tag or ingredient ids are reported against the payload field.
async fn ensure_references(
    payload: &RecipePayload,
    tr: &mut Transaction<'_, Postgres>,
) -> Result<(), potion::Error> {
    let tags: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tags WHERE id = ANY($1)")
        .bind(&payload.tags)
        .fetch_one(&mut **tr)
        .await
        .map_err(|e| QueryError::from(e).into())?;
    if tags.0 != payload.tags.len() as i64 {
        return Err(ValidationError::new("tags", "Unknown tag id").into());
    }

    let ids: Vec<Id> = payload.ingredients.iter().map(|i| i.id).collect();
    let ingredients: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM ingredients WHERE id = ANY($1)")
        .bind(&ids)
        .fetch_one(&mut **tr)
        .await
        .map_err(|e| QueryError::from(e).into())?;
    if ingredients.0 != ids.len() as i64 {
        return Err(ValidationError::new("ingredients", "Unknown ingredient id").into());
    }

    Ok(())
}

async fn insert_links(
    recipe_id: Id,
    payload: &RecipePayload,
    tr: &mut Transaction<'_, Postgres>,
) -> Result<(), potion::Error> {
    let mut query: QueryBuilder<Postgres> =
        QueryBuilder::new("INSERT INTO recipe_tags (recipe_id, tag_id) ");
    query.push_values(payload.tags.iter(), |mut row, tag_id| {
        row.push_bind(recipe_id).push_bind(*tag_id);
    });
    query
        .build()
        .execute(&mut **tr)
        .await
        .map_err(|e| QueryError::from(e).into())?;

    let mut query: QueryBuilder<Postgres> =
        QueryBuilder::new("INSERT INTO recipe_ingredients (recipe_id, ingredient_id, amount) ");
    query.push_values(payload.ingredients.iter(), |mut row, part| {
        row.push_bind(recipe_id)
            .push_bind(part.id)
            .push_bind(part.amount);
    });
    query
        .build()
        .execute(&mut **tr)
        .await
        .map_err(|e| QueryError::from(e).into())?;

    Ok(())
}

pub async fn create_recipe(
    payload: &RecipePayload,
    session: &SessionData,
    config: &Config,
    pool: &Pool<Postgres>,
) -> Result<Recipe, potion::Error> {
    session.authenticate(ActionType::CreateRecipes)?;
    validate_recipe(payload, config).map_err(|e| e.into())?;

    let mut tr = pool
        .begin()
        .await
        .map_err(|_| QueryError::new("Could not start transaction".to_owned()).into())?;

    ensure_references(payload, &mut tr).await?;

    let recipe: Recipe = sqlx::query_as(
        "
        INSERT INTO recipes (author_id, name, text, cooking_time, image)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
    ",
    )
    .bind(session.user_id)
    .bind(payload.name.trim())
    .bind(&payload.text)
    .bind(payload.cooking_time)
    .bind(&payload.image)
    .fetch_one(&mut *tr)
    .await
    .map_err(|e| QueryError::from(e).into())?;

    insert_links(recipe.id, payload, &mut tr).await?;

    tr.commit()
        .await
        .map_err(|e| QueryError::from(e).into())?;

    log::debug!("User {} created recipe {}", session.user_id, recipe.id);
    Ok(recipe)
}

/// Replaces the recipe's fields, tags and ingredients. An empty `image`
/// keeps the current one.
pub async fn update_recipe(
    id: Id,
    payload: &RecipePayload,
    session: &SessionData,
    config: &Config,
    pool: &Pool<Postgres>,
) -> Result<Recipe, potion::Error> {
    get_recipe_mut(id, session, pool).await?;
    validate_recipe(payload, config).map_err(|e| e.into())?;

    let mut tr = pool
        .begin()
        .await
        .map_err(|_| QueryError::new("Could not start transaction".to_owned()).into())?;

    ensure_references(payload, &mut tr).await?;

    let recipe: Recipe = sqlx::query_as(
        "
        UPDATE recipes
        SET name = $1, text = $2, cooking_time = $3, image = COALESCE(NULLIF($4, ''), image)
        WHERE id = $5
        RETURNING *
    ",
    )
    .bind(payload.name.trim())
    .bind(&payload.text)
    .bind(payload.cooking_time)
    .bind(&payload.image)
    .bind(id)
    .fetch_one(&mut *tr)
    .await
    .map_err(|e| QueryError::from(e).into())?;

    sqlx::query("DELETE FROM recipe_tags WHERE recipe_id = $1")
        .bind(id)
        .execute(&mut *tr)
        .await
        .map_err(|e| QueryError::from(e).into())?;

    sqlx::query("DELETE FROM recipe_ingredients WHERE recipe_id = $1")
        .bind(id)
        .execute(&mut *tr)
        .await
        .map_err(|e| QueryError::from(e).into())?;

    insert_links(id, payload, &mut tr).await?;

    tr.commit()
        .await
        .map_err(|e| QueryError::from(e).into())?;

    log::debug!("User {} updated recipe {id}", session.user_id);
    Ok(recipe)
}

/// Links, favorites and cart entries go with the recipe through `ON DELETE CASCADE`.
pub async fn delete_recipe(
    id: Id,
    session: &SessionData,
    pool: &Pool<Postgres>,
) -> Result<(), potion::Error> {
    get_recipe_mut(id, session, pool).await?;

    sqlx::query("DELETE FROM recipes WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await
        .map_err(|e| QueryError::from(e).into())?;

    log::debug!("User {} deleted recipe {id}", session.user_id);
    Ok(())
}

/// Newest first. Favorite and cart filters only apply to an authenticated viewer.
pub async fn fetch_recipes(
    filter: &RecipeFilter,
    viewer_id: Option<Id>,
    page: &PageRequest,
    pool: &Pool<Postgres>,
) -> Result<Page<Recipe>, potion::Error> {
    let mut query: QueryBuilder<Postgres> =
        QueryBuilder::new("SELECT r.*, COUNT(*) OVER() AS count FROM recipes r WHERE TRUE");

    if let Some(author) = filter.author {
        query.push(" AND r.author_id = ").push_bind(author);
    }
    if !filter.tags.is_empty() {
        query
            .push(
                " AND EXISTS (SELECT 1 FROM recipe_tags rt INNER JOIN tags t ON t.id = rt.tag_id \
                 WHERE rt.recipe_id = r.id AND t.slug = ANY(",
            )
            .push_bind(filter.tags.clone())
            .push("))");
    }
    if let Some(viewer_id) = viewer_id {
        push_membership_filter(&mut query, filter.is_favorited, "favorites", viewer_id);
        push_membership_filter(
            &mut query,
            filter.is_in_shopping_cart,
            "shopping_cart_entries",
            viewer_id,
        );
    }

    query
        .push(" ORDER BY r.pub_date DESC, r.id DESC LIMIT ")
        .push_bind(page.limit)
        .push(" OFFSET ")
        .push_bind(page.offset());

    let rows: Vec<RecipeRow> = query
        .build_query_as()
        .fetch_all(pool)
        .await
        .map_err(|e| QueryError::from(e).into())?;

    let total_count = rows.first().map(|row| row.count).unwrap_or(0);
    let recipes: Vec<Recipe> = rows.into_iter().map(|row| row.recipe).collect();

    Page::from_rows(recipes, total_count, page)
}

/// Attaches authors, tags and ingredients with one query each for the whole batch.
pub async fn load_recipe_details(
    recipes: Vec<RecipeView>,
    pool: &Pool<Postgres>,
) -> Result<Vec<RecipeDetail>, potion::Error> {
    if recipes.is_empty() {
        return Ok(vec![]);
    }

    let ids: Vec<Id> = recipes.iter().map(|view| view.recipe().id).collect();
    let mut author_ids: Vec<Id> = recipes
        .iter()
        .filter_map(|view| view.recipe().author_id)
        .collect();
    author_ids.sort_unstable();
    author_ids.dedup();

    let mut tags: HashMap<Id, Vec<Tag>> = HashMap::new();
    for row in list_recipe_tags(&ids, pool).await? {
        tags.entry(row.recipe_id).or_default().push(row.tag);
    }

    let mut ingredients: HashMap<Id, Vec<RecipeIngredient>> = HashMap::new();
    for row in list_recipe_ingredients(&ids, pool).await? {
        ingredients.entry(row.recipe_id).or_default().push(row);
    }

    let authors: HashMap<Id, UserView> = get_users_by_ids(&author_ids, pool)
        .await?
        .into_iter()
        .map(|user| (user.id, UserView::from(user)))
        .collect();

    Ok(recipes
        .into_iter()
        .map(|view| {
            let recipe = view.recipe();
            let id = recipe.id;
            let author = recipe
                .author_id
                .and_then(|author_id| authors.get(&author_id))
                .map(|user| WithSubscriptionFlag {
                    inner: user.clone(),
                    // Computed by the recipe annotation batch.
                    is_subscribed: view.flags().is_subscribed,
                });

            RecipeDetail {
                author,
                tags: tags.remove(&id).unwrap_or_default(),
                ingredients: ingredients.remove(&id).unwrap_or_default(),
                recipe: view,
            }
        })
        .collect())
}

pub async fn list_recipes(
    filter: &RecipeFilter,
    page: &PageRequest,
    viewer: &Viewer,
    pool: &Pool<Postgres>,
) -> Result<Page<RecipeDetail>, potion::Error> {
    let mut page = fetch_recipes(filter, viewer.user_id(), page, pool).await?;
    let recipes = std::mem::take(&mut page.results);

    let views = annotate(pool, recipes, viewer)
        .await?
        .into_iter()
        .map(RecipeView::Annotated)
        .collect();
    let details = load_recipe_details(views, pool).await?;

    Ok(page.map(|_| details))
}

pub async fn get_recipe_detail(
    id: Id,
    viewer: &Viewer,
    pool: &Pool<Postgres>,
) -> Result<RecipeDetail, potion::Error> {
    let recipe = get_recipe(id, pool).await?;

    let views = annotate(pool, vec![recipe], viewer)
        .await?
        .into_iter()
        .map(RecipeView::Annotated)
        .collect();

    load_recipe_details(views, pool)
        .await?
        .pop()
        .ok_or_else(|| NotFoundError::new("No recipe exists with specified id").into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{IngredientAmount, UserRole};

    fn payload() -> RecipePayload {
        RecipePayload {
            name: String::from("Pancakes"),
            text: String::from("Whisk and fry."),
            cooking_time: 20,
            image: String::new(),
            tags: vec![1, 2],
            ingredients: vec![
                IngredientAmount { id: 1, amount: 200 },
                IngredientAmount { id: 2, amount: 2 },
            ],
        }
    }

    fn field(payload: &RecipePayload) -> Option<&'static str> {
        validate_recipe(payload, &Config::default())
            .err()
            .map(|e| e.field())
    }

    fn pairs(values: &[(&str, &str)]) -> Vec<(String, String)> {
        values
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn session(user_id: Id, role: UserRole) -> SessionData {
        SessionData {
            user_id,
            username: format!("user{user_id}"),
            role,
        }
    }

    #[test]
    fn valid_payload_passes() {
        assert_eq!(field(&payload()), None);
    }

    #[test]
    fn amount_out_of_range_names_amount() {
        let mut zero = payload();
        zero.ingredients[1].amount = 0;
        assert_eq!(field(&zero), Some("amount"));

        let mut huge = payload();
        huge.ingredients[0].amount = 32_001;
        assert_eq!(field(&huge), Some("amount"));
    }

    #[test]
    fn duplicates_are_rejected() {
        let mut tags = payload();
        tags.tags = vec![1, 1];
        assert_eq!(field(&tags), Some("tags"));

        let mut parts = payload();
        parts.ingredients[1].id = 1;
        assert_eq!(field(&parts), Some("ingredients"));
    }

    #[test]
    fn empty_collections_are_rejected() {
        let mut tags = payload();
        tags.tags.clear();
        assert_eq!(field(&tags), Some("tags"));

        let mut parts = payload();
        parts.ingredients.clear();
        assert_eq!(field(&parts), Some("ingredients"));
    }

    #[test]
    fn scalar_fields_are_checked() {
        let mut name = payload();
        name.name = String::from("   ");
        assert_eq!(field(&name), Some("name"));

        let mut long = payload();
        long.name = "x".repeat(65);
        assert_eq!(field(&long), Some("name"));

        let mut time = payload();
        time.cooking_time = 0;
        assert_eq!(field(&time), Some("cooking_time"));

        let mut text = payload();
        text.text = String::new();
        assert_eq!(field(&text), Some("text"));
    }

    #[test]
    fn filter_reads_repeated_tags_and_flags() {
        let filter = RecipeFilter::from_pairs(&pairs(&[
            ("tags", "breakfast"),
            ("tags", "dinner"),
            ("is_favorited", "1"),
            ("is_in_shopping_cart", "false"),
            ("author", "4"),
        ]))
        .ok()
        .unwrap();

        assert_eq!(filter.tags, vec!["breakfast", "dinner"]);
        assert_eq!(filter.is_favorited, Some(true));
        assert_eq!(filter.is_in_shopping_cart, Some(false));
        assert_eq!(filter.author, Some(4));
    }

    #[test]
    fn filter_reads_false_flags() {
        let filter = RecipeFilter::from_pairs(&pairs(&[
            ("is_favorited", "0"),
            ("is_in_shopping_cart", "False"),
        ]))
        .ok()
        .unwrap();
        assert_eq!(filter.is_favorited, Some(false));
        assert_eq!(filter.is_in_shopping_cart, Some(false));

        let absent = RecipeFilter::from_pairs(&pairs(&[("tags", "lunch")])).ok().unwrap();
        assert_eq!(absent.is_favorited, None);
        assert_eq!(absent.is_in_shopping_cart, None);
    }

    #[test]
    fn filter_rejects_bad_values() {
        assert!(RecipeFilter::from_pairs(&pairs(&[("is_favorited", "maybe")])).is_err());
        assert!(RecipeFilter::from_pairs(&pairs(&[("author", "me")])).is_err());
        assert_eq!(
            RecipeFilter::from_pairs(&[]).ok().unwrap(),
            RecipeFilter::default()
        );
    }

    #[test]
    fn only_author_or_moderator_may_edit() {
        let recipe = crate::testing::FakeStore::default().add_recipe(1, 5, &[]);

        assert!(check_recipe_access(&recipe, &session(5, UserRole::User)).is_ok());
        assert!(check_recipe_access(&recipe, &session(6, UserRole::Moderator)).is_ok());

        let stranger = check_recipe_access(&recipe, &session(6, UserRole::User));
        assert!(matches!(stranger, Err(e) if e.code == 403));
    }

    #[test]
    fn orphaned_recipe_is_moderator_only() {
        let mut recipe = crate::testing::FakeStore::default().add_recipe(1, 5, &[]);
        recipe.author_id = None;

        assert!(check_recipe_access(&recipe, &session(5, UserRole::User)).is_err());
        assert!(check_recipe_access(&recipe, &session(1, UserRole::Admin)).is_ok());
    }
}
