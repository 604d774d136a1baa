use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Postgres};

use super::error::QueryError;

pub type Id = i32;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Applies the bundled schema migrations.
pub async fn migrate(pool: &Pool<Postgres>) -> Result<(), potion::Error> {
    MIGRATOR
        .run(pool)
        .await
        .map_err(|e| QueryError::new(format!("{e}")).into())?;

    Ok(())
}

#[derive(
    Clone, Debug, PartialEq, PartialOrd, sqlx::Type, Serialize, Eq, Ord, Hash, Deserialize,
)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    User,
    Moderator,
    Admin,
}

#[derive(sqlx::FromRow, Debug, Clone, Serialize)]
pub struct User {
    pub id: Id,
    pub email: String,
    pub username: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: UserRole,
    pub is_active: bool,
}

#[derive(sqlx::FromRow, Debug, Clone, Serialize)]
pub struct UserRow {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub user: User,
    pub count: i64,
}

#[derive(sqlx::FromRow, Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Ingredient {
    pub id: Id,
    pub name: String,
    pub measurement_unit: String,
}

#[derive(sqlx::FromRow, Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tag {
    pub id: Id,
    pub name: String,
    pub color: String,
    pub slug: String,
}

#[derive(sqlx::FromRow, Debug, Clone, Serialize)]
pub struct RecipeTag {
    pub recipe_id: Id,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub tag: Tag,
}

#[derive(sqlx::FromRow, Debug, Clone, Serialize, PartialEq)]
pub struct Recipe {
    pub id: Id,
    pub author_id: Option<Id>,
    pub name: String,
    pub text: String,
    pub cooking_time: i32,
    pub image: String,
    pub pub_date: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Debug, Clone, Serialize)]
pub struct RecipeRow {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub recipe: Recipe,
    pub count: i64,
}

/// Short form used in subscription listings and toggle responses.
#[derive(sqlx::FromRow, Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ShortRecipe {
    pub id: Id,
    pub name: String,
    pub image: String,
    pub cooking_time: i32,
}

impl From<Recipe> for ShortRecipe {
    fn from(recipe: Recipe) -> Self {
        Self {
            id: recipe.id,
            name: recipe.name,
            image: recipe.image,
            cooking_time: recipe.cooking_time,
        }
    }
}

#[derive(sqlx::FromRow, Debug, Clone, Serialize)]
pub struct AuthoredShortRecipe {
    pub author_id: Id,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub recipe: ShortRecipe,
}

/// One `recipe_ingredients` row joined with its ingredient.
#[derive(sqlx::FromRow, Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RecipeIngredient {
    #[serde(skip)]
    pub recipe_id: Id,
    pub id: Id,
    pub name: String,
    pub measurement_unit: String,
    pub amount: i32,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngredientAmount {
    pub id: Id,
    pub amount: i32,
}

/// Body of recipe create and update requests.
#[derive(Deserialize, Debug, Clone)]
pub struct RecipePayload {
    pub name: String,
    pub text: String,
    pub cooking_time: i32,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub tags: Vec<Id>,
    #[serde(default)]
    pub ingredients: Vec<IngredientAmount>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct TagPayload {
    pub name: String,
    pub color: String,
    pub slug: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct IngredientPayload {
    pub name: String,
    pub measurement_unit: String,
}
