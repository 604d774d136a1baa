use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use crate::{
    annotation::{AnnotationStore, RecipeFlagsRow},
    manifest::{CartOwner, CartStore, ManifestLine},
    schema::{Id, Recipe},
    toggle::{MembershipStore, Relation},
};

/// In-memory store with the same uniqueness rules as the Postgres schema.
/// Every trait call counts as one query.
#[derive(Default)]
pub struct FakeStore {
    pub recipes: Mutex<HashMap<Id, Recipe>>,
    pub parts: Mutex<HashMap<Id, Vec<(String, String, i32)>>>,
    pub users: Mutex<HashSet<Id>>,
    pub favorites: Mutex<HashSet<(Id, Id)>>,
    pub carts: Mutex<HashSet<(Id, Id)>>,
    pub follows: Mutex<HashSet<(Id, Id)>>,
    queries: AtomicUsize,
}

impl FakeStore {
    pub fn add_recipe(&self, id: Id, author: Id, parts: &[(&str, &str, i32)]) -> Recipe {
        let recipe = Recipe {
            id,
            author_id: Some(author),
            name: format!("recipe {id}"),
            text: String::from("Mix and serve."),
            cooking_time: 10,
            image: String::new(),
            pub_date: Utc.timestamp_opt(1_700_000_000 + i64::from(id), 0).unwrap(),
        };

        self.users.lock().unwrap().insert(author);
        self.recipes.lock().unwrap().insert(id, recipe.clone());
        self.parts.lock().unwrap().insert(
            id,
            parts
                .iter()
                .map(|(name, unit, amount)| (name.to_string(), unit.to_string(), *amount))
                .collect(),
        );

        recipe
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    fn count_query(&self) {
        self.queries.fetch_add(1, Ordering::SeqCst);
    }

    fn pairs(&self, relation: Relation) -> &Mutex<HashSet<(Id, Id)>> {
        match relation {
            Relation::Favorite => &self.favorites,
            Relation::ShoppingCart => &self.carts,
            Relation::Follow => &self.follows,
        }
    }
}

#[async_trait]
impl AnnotationStore for FakeStore {
    async fn recipe_flags(
        &self,
        viewer: Id,
        recipe_ids: &[Id],
    ) -> Result<Vec<RecipeFlagsRow>, potion::Error> {
        self.count_query();

        let recipes = self.recipes.lock().unwrap();
        let favorites = self.favorites.lock().unwrap();
        let carts = self.carts.lock().unwrap();
        let follows = self.follows.lock().unwrap();

        Ok(recipe_ids
            .iter()
            .filter_map(|id| recipes.get(id))
            .map(|recipe| RecipeFlagsRow {
                recipe_id: recipe.id,
                is_favorited: favorites.contains(&(viewer, recipe.id)),
                is_in_shopping_cart: carts.contains(&(viewer, recipe.id)),
                is_subscribed: recipe
                    .author_id
                    .map_or(false, |author| follows.contains(&(viewer, author))),
            })
            .collect())
    }

    async fn subscribed_among(
        &self,
        viewer: Id,
        user_ids: &[Id],
    ) -> Result<Vec<Id>, potion::Error> {
        self.count_query();

        let follows = self.follows.lock().unwrap();
        Ok(user_ids
            .iter()
            .copied()
            .filter(|id| follows.contains(&(viewer, *id)))
            .collect())
    }
}

#[async_trait]
impl CartStore for FakeStore {
    async fn cart_totals(&self, owner: &CartOwner) -> Result<Vec<ManifestLine>, potion::Error> {
        self.count_query();

        let recipe_ids: Vec<Id> = match owner {
            CartOwner::User(id) => self
                .carts
                .lock()
                .unwrap()
                .iter()
                .filter(|(owner, _)| owner == id)
                .map(|(_, recipe)| *recipe)
                .collect(),
            CartOwner::Session(ids) => ids.clone(),
        };

        let parts = self.parts.lock().unwrap();
        let mut totals: BTreeMap<(String, String), i64> = BTreeMap::new();
        for recipe_id in recipe_ids {
            for (name, unit, amount) in parts.get(&recipe_id).into_iter().flatten() {
                *totals.entry((name.clone(), unit.clone())).or_insert(0) += i64::from(*amount);
            }
        }

        Ok(totals
            .into_iter()
            .map(|((name, measurement_unit), total)| ManifestLine {
                name,
                measurement_unit,
                total,
            })
            .collect())
    }
}

#[async_trait]
impl MembershipStore for FakeStore {
    async fn target_exists(&self, relation: Relation, target: Id) -> Result<bool, potion::Error> {
        self.count_query();

        Ok(match relation {
            Relation::Favorite | Relation::ShoppingCart => {
                self.recipes.lock().unwrap().contains_key(&target)
            }
            Relation::Follow => self.users.lock().unwrap().contains(&target),
        })
    }

    async fn insert(
        &self,
        relation: Relation,
        owner: Id,
        target: Id,
    ) -> Result<bool, potion::Error> {
        self.count_query();
        Ok(self.pairs(relation).lock().unwrap().insert((owner, target)))
    }

    async fn delete(
        &self,
        relation: Relation,
        owner: Id,
        target: Id,
    ) -> Result<bool, potion::Error> {
        self.count_query();
        Ok(self.pairs(relation).lock().unwrap().remove(&(owner, target)))
    }
}
