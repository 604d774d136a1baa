//! Favorite, shopping-cart and subscription membership.
//!
//! Each (owner, target) pair is either absent or present. Adding a present pair
//! is a conflict and removing an absent one is not-found; neither direction is
//! idempotent. The store's unique constraint decides concurrent adds.

use async_trait::async_trait;
use sqlx::{Pool, Postgres};

use crate::{
    actions::relations::{delete_relation, insert_relation, target_exists},
    error::{ConflictError, NotFoundError},
    schema::Id,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Relation {
    Favorite,
    ShoppingCart,
    Follow,
}

impl Relation {
    pub(crate) fn table(&self) -> &'static str {
        match self {
            Relation::Favorite => "favorites",
            Relation::ShoppingCart => "shopping_cart_entries",
            Relation::Follow => "follows",
        }
    }

    pub(crate) fn columns(&self) -> (&'static str, &'static str) {
        match self {
            Relation::Favorite | Relation::ShoppingCart => ("owner_id", "recipe_id"),
            Relation::Follow => ("follower_id", "following_id"),
        }
    }

    pub(crate) fn target_table(&self) -> &'static str {
        match self {
            Relation::Favorite | Relation::ShoppingCart => "recipes",
            Relation::Follow => "users",
        }
    }

    fn missing_target(&self) -> &'static str {
        match self {
            Relation::Favorite | Relation::ShoppingCart => "No recipe exists with specified id",
            Relation::Follow => "No user exists with specified id",
        }
    }

    fn already_present(&self) -> &'static str {
        match self {
            Relation::Favorite => "Recipe is already in favorites",
            Relation::ShoppingCart => "Recipe is already in the shopping cart",
            Relation::Follow => "Already subscribed to this author",
        }
    }

    fn not_present(&self) -> &'static str {
        match self {
            Relation::Favorite => "Recipe is not in favorites",
            Relation::ShoppingCart => "Recipe is not in the shopping cart",
            Relation::Follow => "Not subscribed to this author",
        }
    }
}

#[async_trait]
pub trait MembershipStore {
    async fn target_exists(&self, relation: Relation, target: Id) -> Result<bool, potion::Error>;

    /// Returns `false` when the pair was already present.
    async fn insert(&self, relation: Relation, owner: Id, target: Id)
        -> Result<bool, potion::Error>;

    /// Returns `false` when the pair was absent.
    async fn delete(&self, relation: Relation, owner: Id, target: Id)
        -> Result<bool, potion::Error>;
}

#[async_trait]
impl MembershipStore for Pool<Postgres> {
    async fn target_exists(&self, relation: Relation, target: Id) -> Result<bool, potion::Error> {
        target_exists(relation, target, self).await
    }

    async fn insert(
        &self,
        relation: Relation,
        owner: Id,
        target: Id,
    ) -> Result<bool, potion::Error> {
        insert_relation(relation, owner, target, self).await
    }

    async fn delete(
        &self,
        relation: Relation,
        owner: Id,
        target: Id,
    ) -> Result<bool, potion::Error> {
        delete_relation(relation, owner, target, self).await
    }
}

pub async fn add<S>(store: &S, relation: Relation, owner: Id, target: Id) -> Result<(), potion::Error>
where
    S: MembershipStore + Sync,
{
    if relation == Relation::Follow && owner == target {
        return Err(ConflictError::new("Can't subscribe to yourself").into());
    }
    if !store.target_exists(relation, target).await? {
        return Err(NotFoundError::new(relation.missing_target()).into());
    }
    if !store.insert(relation, owner, target).await? {
        return Err(ConflictError::new(relation.already_present()).into());
    }

    log::debug!("{relation:?} added: {owner} -> {target}");
    Ok(())
}

pub async fn remove<S>(
    store: &S,
    relation: Relation,
    owner: Id,
    target: Id,
) -> Result<(), potion::Error>
where
    S: MembershipStore + Sync,
{
    if !store.target_exists(relation, target).await? {
        return Err(NotFoundError::new(relation.missing_target()).into());
    }
    if !store.delete(relation, owner, target).await? {
        return Err(NotFoundError::new(relation.not_present()).into());
    }

    log::debug!("{relation:?} removed: {owner} -> {target}");
    Ok(())
}
