//! Per-viewer relationship flags for recipes and users.
//!
//! Flags are never stored. For an authenticated viewer every batch costs one
//! store round trip whose query carries one `EXISTS` subquery per flag type, so
//! the number of queries does not grow with the number of rows.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use serde::Serialize;
use sqlx::{Pool, Postgres};

use crate::{
    actions::annotations::{fetch_recipe_flags, fetch_subscribed_authors},
    jwt::SessionData,
    schema::{Id, Recipe, ShortRecipe, User},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Viewer {
    Anonymous,
    Authenticated(SessionData),
}

impl Viewer {
    pub fn user_id(&self) -> Option<Id> {
        match self {
            Viewer::Anonymous => None,
            Viewer::Authenticated(session) => Some(session.user_id),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Flags {
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
    #[serde(skip)]
    pub is_subscribed: bool,
}

/// Flags for one recipe as computed by the store.
#[derive(sqlx::FromRow, Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecipeFlagsRow {
    pub recipe_id: Id,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
    pub is_subscribed: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AnnotatedRecipe {
    #[serde(flatten)]
    pub base: Recipe,
    #[serde(flatten)]
    pub flags: Flags,
}

/// A recipe either fresh from the store or decorated for a viewer.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum RecipeView {
    Plain(Recipe),
    Annotated(AnnotatedRecipe),
}

impl RecipeView {
    pub fn recipe(&self) -> &Recipe {
        match self {
            RecipeView::Plain(recipe) => recipe,
            RecipeView::Annotated(annotated) => &annotated.base,
        }
    }

    pub fn flags(&self) -> Flags {
        match self {
            RecipeView::Plain(_) => Flags::default(),
            RecipeView::Annotated(annotated) => annotated.flags,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct UserView {
    pub id: Id,
    pub email: String,
    pub username: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl From<User> for UserView {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            username: user.username,
            first_name: user.first_name,
            last_name: user.last_name,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct WithSubscriptionFlag<T> {
    #[serde(flatten)]
    pub inner: T,
    pub is_subscribed: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct WithRecipes<T> {
    #[serde(flatten)]
    pub inner: T,
    pub recipes: Vec<ShortRecipe>,
    pub recipes_count: i64,
}

#[async_trait]
pub trait AnnotationStore {
    /// One query: favorite, cart and author-follow flags for every id in `recipe_ids`.
    async fn recipe_flags(
        &self,
        viewer: Id,
        recipe_ids: &[Id],
    ) -> Result<Vec<RecipeFlagsRow>, potion::Error>;

    /// One query: the subset of `user_ids` that `viewer` follows.
    async fn subscribed_among(&self, viewer: Id, user_ids: &[Id])
        -> Result<Vec<Id>, potion::Error>;
}

#[async_trait]
impl AnnotationStore for Pool<Postgres> {
    async fn recipe_flags(
        &self,
        viewer: Id,
        recipe_ids: &[Id],
    ) -> Result<Vec<RecipeFlagsRow>, potion::Error> {
        fetch_recipe_flags(viewer, recipe_ids, self).await
    }

    async fn subscribed_among(
        &self,
        viewer: Id,
        user_ids: &[Id],
    ) -> Result<Vec<Id>, potion::Error> {
        fetch_subscribed_authors(viewer, user_ids, self).await
    }
}

/// Decorates `recipes` for `viewer`, preserving order and length.
pub async fn annotate<S>(
    store: &S,
    recipes: Vec<Recipe>,
    viewer: &Viewer,
) -> Result<Vec<AnnotatedRecipe>, potion::Error>
where
    S: AnnotationStore + Sync,
{
    let viewer_id = match viewer.user_id() {
        Some(id) if !recipes.is_empty() => id,
        _ => {
            return Ok(recipes
                .into_iter()
                .map(|base| AnnotatedRecipe {
                    base,
                    flags: Flags::default(),
                })
                .collect())
        }
    };

    let ids: Vec<Id> = recipes.iter().map(|recipe| recipe.id).collect();
    log::debug!("Annotating {} recipes for user {viewer_id}", ids.len());

    let rows: HashMap<Id, RecipeFlagsRow> = store
        .recipe_flags(viewer_id, &ids)
        .await?
        .into_iter()
        .map(|row| (row.recipe_id, row))
        .collect();

    Ok(recipes
        .into_iter()
        .map(|base| {
            let flags = match rows.get(&base.id) {
                Some(row) => Flags {
                    is_favorited: row.is_favorited,
                    is_in_shopping_cart: row.is_in_shopping_cart,
                    // Self-follow rows may exist if the CHECK constraint is missing.
                    is_subscribed: row.is_subscribed && base.author_id != Some(viewer_id),
                },
                None => Flags::default(),
            };
            AnnotatedRecipe { base, flags }
        })
        .collect())
}

/// Attaches `is_subscribed` to each user, preserving order.
pub async fn annotate_users<S>(
    store: &S,
    users: Vec<UserView>,
    viewer: &Viewer,
) -> Result<Vec<WithSubscriptionFlag<UserView>>, potion::Error>
where
    S: AnnotationStore + Sync,
{
    let subscribed: HashSet<Id> = match viewer.user_id() {
        Some(viewer_id) if !users.is_empty() => {
            let ids: Vec<Id> = users.iter().map(|user| user.id).collect();
            store
                .subscribed_among(viewer_id, &ids)
                .await?
                .into_iter()
                .filter(|id| *id != viewer_id)
                .collect()
        }
        _ => HashSet::new(),
    };

    Ok(users
        .into_iter()
        .map(|inner| WithSubscriptionFlag {
            is_subscribed: subscribed.contains(&inner.id),
            inner,
        })
        .collect())
}
