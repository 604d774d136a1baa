//! Shopping-cart aggregation: every ingredient of every cart recipe, summed per
//! `(name, measurement unit)` and rendered as a plain-text shopping list.

use std::cmp::Ordering;

use async_trait::async_trait;
use serde::Serialize;
use sqlx::{Pool, Postgres};

use crate::{
    actions::shopping_cart::{fetch_session_cart_totals, fetch_user_cart_totals},
    constants::{SHOPPING_CART_CONTENT_TYPE, SHOPPING_CART_FILENAME},
    schema::Id,
};

/// Whose cart is being exported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CartOwner {
    User(Id),
    /// Pending purchase list of an anonymous session.
    Session(Vec<Id>),
}

#[derive(sqlx::FromRow, Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ManifestLine {
    pub name: String,
    pub measurement_unit: String,
    pub total: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    pub lines: Vec<ManifestLine>,
}

impl Manifest {
    pub fn render(&self) -> String {
        self.lines
            .iter()
            .map(|line| format!("{} ({}) - {}", line.name, line.measurement_unit, line.total))
            .collect::<Vec<String>>()
            .join("\n")
    }

    pub fn filename(&self) -> &'static str {
        SHOPPING_CART_FILENAME
    }

    pub fn content_type(&self) -> &'static str {
        SHOPPING_CART_CONTENT_TYPE
    }

    pub fn content_disposition(&self) -> String {
        format!("attachment; filename=\"{}\"", self.filename())
    }
}

#[async_trait]
pub trait CartStore {
    /// Grouped `SUM(amount)` over the owner's cart, one row per ingredient and unit.
    async fn cart_totals(&self, owner: &CartOwner) -> Result<Vec<ManifestLine>, potion::Error>;
}

#[async_trait]
impl CartStore for Pool<Postgres> {
    async fn cart_totals(&self, owner: &CartOwner) -> Result<Vec<ManifestLine>, potion::Error> {
        match owner {
            CartOwner::User(id) => fetch_user_cart_totals(*id, self).await,
            CartOwner::Session(recipe_ids) if recipe_ids.is_empty() => Ok(vec![]),
            CartOwner::Session(recipe_ids) => fetch_session_cart_totals(recipe_ids, self).await,
        }
    }
}

/// Largest total first; ties by ingredient name, then unit.
pub fn line_order(a: &ManifestLine, b: &ManifestLine) -> Ordering {
    b.total
        .cmp(&a.total)
        .then_with(|| a.name.cmp(&b.name))
        .then_with(|| a.measurement_unit.cmp(&b.measurement_unit))
}

/// Builds the shopping list for `owner`. Does not touch the cart itself.
pub async fn aggregate<S>(store: &S, owner: CartOwner) -> Result<Manifest, potion::Error>
where
    S: CartStore + Sync,
{
    let mut lines = store.cart_totals(&owner).await?;
    // The store already orders rows; sorting again pins the tie-break for every backend.
    lines.sort_by(line_order);

    log::debug!("Aggregated shopping cart into {} lines", lines.len());

    Ok(Manifest { lines })
}
