//! Runs against a real database when `FOODGRAM_TEST_DATABASE_URL` is set and
//! passes trivially otherwise.

use foodgram_sdk::{
    actions::{
        create_ingredient, create_recipe, create_tag, get_recipe, get_recipe_detail,
        list_recipe_ingredients, list_recipes, update_recipe, RecipeFilter,
    },
    annotation::Viewer,
    jwt::SessionData,
    manifest::{aggregate, CartOwner},
    pagination::PageRequest,
    schema::{migrate, Id, IngredientAmount, RecipePayload, User, UserRole},
    toggle::{self, Relation},
    Config,
};
use sqlx::{postgres::PgPoolOptions, Pool, Postgres};

async fn connect() -> Option<Pool<Postgres>> {
    let url = std::env::var("FOODGRAM_TEST_DATABASE_URL").ok()?;
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&url)
        .await
        .expect("test database should accept connections");
    migrate(&pool).await.ok().expect("migrations should apply");

    Some(pool)
}

fn unique(prefix: &str) -> String {
    format!("{prefix}-{}", uuid::Uuid::new_v4().simple())
}

async fn user(pool: &Pool<Postgres>) -> SessionData {
    let username = unique("cook");
    let user: User = sqlx::query_as("INSERT INTO users (email, username) VALUES ($1, $2) RETURNING *")
        .bind(format!("{username}@example.com"))
        .bind(&username)
        .fetch_one(pool)
        .await
        .expect("user should be inserted");

    SessionData {
        user_id: user.id,
        username: user.username,
        role: UserRole::User,
    }
}

/// A tag and the ingredients `Flour (g)` and `Egg (pcs)` under unique names.
async fn reference_data(pool: &Pool<Postgres>) -> (Id, Id, Id) {
    let color = uuid::Uuid::new_v4().simple().to_string()[..6].to_string();
    let tag = create_tag(&unique("Tag"), &color, &unique("tag"), pool)
        .await
        .ok()
        .expect("tag should be created");
    let flour = create_ingredient(&unique("Flour"), "g", pool)
        .await
        .ok()
        .expect("flour should be created");
    let egg = create_ingredient(&unique("Egg"), "pcs", pool)
        .await
        .ok()
        .expect("egg should be created");

    (tag.id, flour.id, egg.id)
}

fn payload(tag: Id, parts: &[(Id, i32)]) -> RecipePayload {
    RecipePayload {
        name: unique("Pancakes")[..40].to_string(),
        text: String::from("Whisk and fry."),
        cooking_time: 15,
        image: String::new(),
        tags: vec![tag],
        ingredients: parts
            .iter()
            .map(|(id, amount)| IngredientAmount {
                id: *id,
                amount: *amount,
            })
            .collect(),
    }
}

#[tokio::test]
async fn recipe_round_trip_and_cart_download() {
    let Some(pool) = connect().await else {
        return;
    };
    let config = Config::default();
    let author = user(&pool).await;
    let (tag, flour, egg) = reference_data(&pool).await;

    let recipe = create_recipe(
        &payload(tag, &[(flour, 200), (egg, 2)]),
        &author,
        &config,
        &pool,
    )
    .await
    .ok()
    .expect("recipe should be created");

    let viewer = Viewer::Authenticated(author.clone());
    let detail = get_recipe_detail(recipe.id, &viewer, &pool)
        .await
        .ok()
        .expect("recipe should load");
    let mut amounts: Vec<(Id, i32)> = detail
        .ingredients
        .iter()
        .map(|part| (part.id, part.amount))
        .collect();
    amounts.sort();
    let mut expected = vec![(flour, 200), (egg, 2)];
    expected.sort();
    assert_eq!(amounts, expected);
    assert_eq!(detail.tags.len(), 1);

    toggle::add(&pool, Relation::ShoppingCart, author.user_id, recipe.id)
        .await
        .ok()
        .expect("cart add should succeed");
    let manifest = aggregate(&pool, CartOwner::User(author.user_id))
        .await
        .ok()
        .expect("cart should aggregate");

    let totals: Vec<(&str, i64)> = manifest
        .lines
        .iter()
        .map(|line| (line.measurement_unit.as_str(), line.total))
        .collect();
    assert_eq!(totals, vec![("g", 200), ("pcs", 2)]);
}

#[tokio::test]
async fn zero_amount_writes_nothing() {
    let Some(pool) = connect().await else {
        return;
    };
    let author = user(&pool).await;
    let (tag, flour, _) = reference_data(&pool).await;

    let result = create_recipe(
        &payload(tag, &[(flour, 0)]),
        &author,
        &Config::default(),
        &pool,
    )
    .await;
    assert!(matches!(result, Err(e) if e.code == 400));

    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM recipes WHERE author_id = $1")
        .bind(author.user_id)
        .fetch_one(&pool)
        .await
        .expect("count should run");
    assert_eq!(count.0, 0);
}

#[tokio::test]
async fn unknown_ingredient_rolls_back() {
    let Some(pool) = connect().await else {
        return;
    };
    let author = user(&pool).await;
    let (tag, flour, _) = reference_data(&pool).await;

    let result = create_recipe(
        &payload(tag, &[(flour, 10), (i32::MAX, 1)]),
        &author,
        &Config::default(),
        &pool,
    )
    .await;
    assert!(matches!(result, Err(e) if e.code == 400));

    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM recipes WHERE author_id = $1")
        .bind(author.user_id)
        .fetch_one(&pool)
        .await
        .expect("count should run");
    assert_eq!(count.0, 0);
}

#[tokio::test]
async fn favorites_are_not_idempotent() {
    let Some(pool) = connect().await else {
        return;
    };
    let config = Config::default();
    let author = user(&pool).await;
    let fan = user(&pool).await;
    let (tag, flour, _) = reference_data(&pool).await;
    let recipe = create_recipe(&payload(tag, &[(flour, 50)]), &author, &config, &pool)
        .await
        .ok()
        .expect("recipe should be created");
    let other = create_recipe(&payload(tag, &[(flour, 70)]), &author, &config, &pool)
        .await
        .ok()
        .expect("recipe should be created");

    assert!(toggle::add(&pool, Relation::Favorite, fan.user_id, recipe.id)
        .await
        .is_ok());
    let again = toggle::add(&pool, Relation::Favorite, fan.user_id, recipe.id).await;
    assert!(matches!(again, Err(e) if e.code == 409));

    let filter = RecipeFilter {
        author: Some(author.user_id),
        is_favorited: Some(true),
        ..RecipeFilter::default()
    };
    let page = list_recipes(
        &filter,
        &PageRequest::new(None, None, &config),
        &Viewer::Authenticated(fan.clone()),
        &pool,
    )
    .await
    .ok()
    .expect("listing should load");
    assert_eq!(page.count, 1);
    assert_eq!(page.results[0].recipe.recipe().id, recipe.id);
    assert!(page.results[0].recipe.flags().is_favorited);

    let filter = RecipeFilter {
        is_favorited: Some(false),
        ..filter
    };
    let page = list_recipes(
        &filter,
        &PageRequest::new(None, None, &config),
        &Viewer::Authenticated(fan.clone()),
        &pool,
    )
    .await
    .ok()
    .expect("listing should load");
    assert_eq!(page.count, 1);
    assert_eq!(page.results[0].recipe.recipe().id, other.id);
    assert!(!page.results[0].recipe.flags().is_favorited);

    assert!(toggle::remove(&pool, Relation::Favorite, fan.user_id, recipe.id)
        .await
        .is_ok());
    let again = toggle::remove(&pool, Relation::Favorite, fan.user_id, recipe.id).await;
    assert!(matches!(again, Err(e) if e.code == 404));
}

#[tokio::test]
async fn self_subscription_is_refused() {
    let Some(pool) = connect().await else {
        return;
    };
    let cook = user(&pool).await;

    let result = toggle::add(&pool, Relation::Follow, cook.user_id, cook.user_id).await;
    assert!(matches!(result, Err(e) if e.code == 409));

    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM follows WHERE follower_id = $1")
        .bind(cook.user_id)
        .fetch_one(&pool)
        .await
        .expect("count should run");
    assert_eq!(count.0, 0);
}

#[tokio::test]
async fn shared_ingredients_are_summed_across_recipes() {
    let Some(pool) = connect().await else {
        return;
    };
    let config = Config::default();
    let cook = user(&pool).await;
    let (tag, _, _) = reference_data(&pool).await;
    let salt = create_ingredient(&unique("salt"), "g", &pool)
        .await
        .ok()
        .expect("salt should be created");
    let sugar = create_ingredient(&unique("sugar"), "g", &pool)
        .await
        .ok()
        .expect("sugar should be created");

    let first = create_recipe(
        &payload(tag, &[(salt.id, 10), (sugar.id, 20)]),
        &cook,
        &config,
        &pool,
    )
    .await
    .ok()
    .expect("recipe should be created");
    let second = create_recipe(&payload(tag, &[(salt.id, 5)]), &cook, &config, &pool)
        .await
        .ok()
        .expect("recipe should be created");

    for recipe in [first.id, second.id] {
        toggle::add(&pool, Relation::ShoppingCart, cook.user_id, recipe)
            .await
            .ok()
            .expect("cart add should succeed");
    }

    let manifest = aggregate(&pool, CartOwner::User(cook.user_id))
        .await
        .ok()
        .expect("cart should aggregate");
    assert_eq!(
        manifest.render(),
        format!("{} (g) - 20\n{} (g) - 15", sugar.name, salt.name)
    );
}

#[tokio::test]
async fn session_cart_counts_repeated_recipes() {
    let Some(pool) = connect().await else {
        return;
    };
    let cook = user(&pool).await;
    let (tag, flour, egg) = reference_data(&pool).await;
    let recipe = create_recipe(
        &payload(tag, &[(flour, 200), (egg, 2)]),
        &cook,
        &Config::default(),
        &pool,
    )
    .await
    .ok()
    .expect("recipe should be created");

    let manifest = aggregate(&pool, CartOwner::Session(vec![recipe.id, recipe.id]))
        .await
        .ok()
        .expect("cart should aggregate");
    let totals: Vec<(&str, i64)> = manifest
        .lines
        .iter()
        .map(|line| (line.measurement_unit.as_str(), line.total))
        .collect();
    assert_eq!(totals, vec![("g", 400), ("pcs", 4)]);
}

#[tokio::test]
async fn failed_update_keeps_previous_ingredients() {
    let Some(pool) = connect().await else {
        return;
    };
    let config = Config::default();
    let cook = user(&pool).await;
    let (tag, flour, egg) = reference_data(&pool).await;
    let recipe = create_recipe(&payload(tag, &[(flour, 200)]), &cook, &config, &pool)
        .await
        .ok()
        .expect("recipe should be created");

    let result = update_recipe(
        recipe.id,
        &payload(tag, &[(egg, 3), (i32::MAX, 1)]),
        &cook,
        &config,
        &pool,
    )
    .await;
    assert!(matches!(result, Err(e) if e.code == 400));

    let parts: Vec<(i32, i32)> = list_recipe_ingredients(&[recipe.id], &pool)
        .await
        .ok()
        .expect("ingredients should load")
        .iter()
        .map(|part| (part.id, part.amount))
        .collect();
    assert_eq!(parts, vec![(flour, 200)]);

    let stored = get_recipe(recipe.id, &pool)
        .await
        .ok()
        .expect("recipe should load");
    assert_eq!(stored.name, recipe.name);
}
