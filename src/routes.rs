//! warp filters for the public api. Errors leave as rejections carrying a
//! `potion::Error`; the embedding server owns recovery and the logger.

use std::{convert::Infallible, sync::Arc};

use redis::aio::MultiplexedConnection;
use serde::Serialize;
use sqlx::{postgres::PgPoolOptions, Pool, Postgres};
use warp::{
    filters::BoxedFilter,
    http::StatusCode,
    reject::Rejection,
    reply::{self, Reply},
    Filter,
};

use crate::{
    actions::{
        attach_recipes, create_ingredient, create_recipe, create_tag, delete_recipe,
        fetch_subscriptions, get_ingredient, get_profile, get_recipe, get_recipe_detail, get_tag,
        get_user_by_id, list_ingredients, list_recipes, list_tags, load_recipe_details,
        recipes_limit, search_ingredients, update_recipe, RecipeFilter,
    },
    annotation::{RecipeView, Viewer},
    authentication::permissions::ActionType,
    cache::cache::{
        invalidate_reference_cache, new_session_token, session_cart_members, CacheKeyType,
        RedisValue, SessionCart,
    },
    config::Config,
    constants::{CART_SESSION_COOKIE, SESSION_CART_TTL_SECONDS},
    error::{CacheError, QueryError},
    jwt::SessionData,
    manifest::{aggregate, CartOwner},
    middleware::{with_cart_session, with_cart_viewer, with_session, with_viewer},
    pagination::{query_value, PageRequest},
    schema::{
        migrate, Id, Ingredient, IngredientPayload, Recipe, RecipePayload, ShortRecipe, Tag,
        TagPayload,
    },
    toggle::{self, Relation},
};

type Response = Result<Box<dyn Reply>, Rejection>;

#[derive(Clone)]
pub struct AppState {
    pub pool: Pool<Postgres>,
    pub cache: MultiplexedConnection,
    pub config: Arc<Config>,
}

impl AppState {
    /// Opens the pool, applies migrations and connects to redis.
    pub async fn connect(config: Config) -> Result<Self, potion::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(&config.database_url)
            .await
            .map_err(|e| QueryError::from(e).into())?;
        migrate(&pool).await?;

        let client = redis::Client::open(config.redis_url.as_str())
            .map_err(|e| CacheError::from(e).into())?;
        let cache = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| CacheError::from(e).into())?;

        log::info!("Connected to store and cache");

        Ok(Self {
            pool,
            cache,
            config: Arc::new(config),
        })
    }
}

fn reject(error: potion::Error) -> Rejection {
    error.into()
}

fn json<T: Serialize>(value: &T, status: StatusCode) -> Box<dyn Reply> {
    Box::new(reply::with_status(reply::json(value), status))
}

fn no_content() -> Box<dyn Reply> {
    Box::new(StatusCode::NO_CONTENT)
}

fn with_state(state: AppState) -> impl Filter<Extract = (AppState,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

/// Every route in one filter.
pub fn api(state: AppState) -> BoxedFilter<(Box<dyn Reply>,)> {
    let config = state.config.clone();

    let download = warp::path!("recipes" / "download_shopping_cart")
        .and(warp::get())
        .and(with_cart_viewer(config.clone()))
        .and(with_cart_session())
        .and(with_state(state.clone()))
        .and_then(download_shopping_cart);

    let list = warp::path!("recipes")
        .and(warp::get())
        .and(warp::query::<Vec<(String, String)>>())
        .and(with_viewer(config.clone()))
        .and(with_state(state.clone()))
        .and_then(recipes_list);

    let detail = warp::path!("recipes" / Id)
        .and(warp::get())
        .and(with_viewer(config.clone()))
        .and(with_state(state.clone()))
        .and_then(recipe_detail);

    let create = warp::path!("recipes")
        .and(warp::post())
        .and(with_session(config.clone()))
        .and(warp::body::json::<RecipePayload>())
        .and(with_state(state.clone()))
        .and_then(recipe_create);

    let update = warp::path!("recipes" / Id)
        .and(warp::patch())
        .and(with_session(config.clone()))
        .and(warp::body::json::<RecipePayload>())
        .and(with_state(state.clone()))
        .and_then(recipe_update);

    let delete = warp::path!("recipes" / Id)
        .and(warp::delete())
        .and(with_session(config.clone()))
        .and(with_state(state.clone()))
        .and_then(recipe_delete);

    let favorite = warp::path!("recipes" / Id / "favorite")
        .and(warp::post().map(|| true).or(warp::delete().map(|| false)).unify())
        .and(with_session(config.clone()))
        .and(with_state(state.clone()))
        .and_then(favorite_toggle);

    let cart = warp::path!("recipes" / Id / "shopping_cart")
        .and(warp::post().map(|| true).or(warp::delete().map(|| false)).unify())
        .and(with_cart_viewer(config.clone()))
        .and(with_cart_session())
        .and(with_state(state.clone()))
        .and_then(cart_toggle);

    let subscriptions = warp::path!("users" / "subscriptions")
        .and(warp::get())
        .and(warp::query::<Vec<(String, String)>>())
        .and(with_session(config.clone()))
        .and(with_state(state.clone()))
        .and_then(subscriptions_list);

    let subscribe = warp::path!("users" / Id / "subscribe")
        .and(warp::post().map(|| true).or(warp::delete().map(|| false)).unify())
        .and(warp::query::<Vec<(String, String)>>())
        .and(with_session(config.clone()))
        .and(with_state(state.clone()))
        .and_then(subscribe_toggle);

    let profile = warp::path!("users" / Id)
        .and(warp::get())
        .and(with_viewer(config.clone()))
        .and(with_state(state.clone()))
        .and_then(user_profile);

    let tags = warp::path!("tags")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(tags_list);

    let tag = warp::path!("tags" / Id)
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(tag_detail);

    let new_tag = warp::path!("tags")
        .and(warp::post())
        .and(with_session(config.clone()))
        .and(warp::body::json::<TagPayload>())
        .and(with_state(state.clone()))
        .and_then(tag_create);

    let ingredients = warp::path!("ingredients")
        .and(warp::get())
        .and(warp::query::<Vec<(String, String)>>())
        .and(with_state(state.clone()))
        .and_then(ingredients_list);

    let ingredient = warp::path!("ingredients" / Id)
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(ingredient_detail);

    let new_ingredient = warp::path!("ingredients")
        .and(warp::post())
        .and(with_session(config))
        .and(warp::body::json::<IngredientPayload>())
        .and(with_state(state))
        .and_then(ingredient_create);

    download
        .or(list)
        .unify()
        .or(detail)
        .unify()
        .or(create)
        .unify()
        .or(update)
        .unify()
        .or(delete)
        .unify()
        .or(favorite)
        .unify()
        .or(cart)
        .unify()
        .or(subscriptions)
        .unify()
        .or(subscribe)
        .unify()
        .or(profile)
        .unify()
        .or(tags)
        .unify()
        .or(tag)
        .unify()
        .or(new_tag)
        .unify()
        .or(ingredients)
        .unify()
        .or(ingredient)
        .unify()
        .or(new_ingredient)
        .unify()
        .boxed()
}

// Recipes

async fn recipes_list(pairs: Vec<(String, String)>, viewer: Viewer, state: AppState) -> Response {
    let filter = RecipeFilter::from_pairs(&pairs).map_err(reject)?;
    let page = PageRequest::from_pairs(&pairs, &state.config).map_err(reject)?;

    let page = list_recipes(&filter, &page, &viewer, &state.pool)
        .await
        .map_err(reject)?;

    Ok(json(&page, StatusCode::OK))
}

async fn recipe_detail(id: Id, viewer: Viewer, state: AppState) -> Response {
    let detail = get_recipe_detail(id, &viewer, &state.pool)
        .await
        .map_err(reject)?;

    Ok(json(&detail, StatusCode::OK))
}

async fn plain_detail(recipe: Recipe, pool: &Pool<Postgres>) -> Response {
    let detail = load_recipe_details(vec![RecipeView::Plain(recipe)], pool)
        .await
        .map_err(reject)?;

    Ok(json(&detail.first(), StatusCode::OK))
}

async fn recipe_create(session: SessionData, payload: RecipePayload, state: AppState) -> Response {
    let recipe = create_recipe(&payload, &session, &state.config, &state.pool)
        .await
        .map_err(reject)?;

    let reply = plain_detail(recipe, &state.pool).await?;
    Ok(Box::new(reply::with_status(reply, StatusCode::CREATED)))
}

async fn recipe_update(
    id: Id,
    session: SessionData,
    payload: RecipePayload,
    state: AppState,
) -> Response {
    let recipe = update_recipe(id, &payload, &session, &state.config, &state.pool)
        .await
        .map_err(reject)?;

    plain_detail(recipe, &state.pool).await
}

async fn recipe_delete(id: Id, session: SessionData, state: AppState) -> Response {
    delete_recipe(id, &session, &state.pool)
        .await
        .map_err(reject)?;

    Ok(no_content())
}

// Favorites and shopping cart

async fn favorite_toggle(id: Id, adding: bool, session: SessionData, state: AppState) -> Response {
    session
        .authenticate(ActionType::ManageOwnFavorites)
        .map_err(reject)?;

    if adding {
        toggle::add(&state.pool, Relation::Favorite, session.user_id, id)
            .await
            .map_err(reject)?;
        let recipe = get_recipe(id, &state.pool).await.map_err(reject)?;
        Ok(json(&ShortRecipe::from(recipe), StatusCode::CREATED))
    } else {
        toggle::remove(&state.pool, Relation::Favorite, session.user_id, id)
            .await
            .map_err(reject)?;
        Ok(no_content())
    }
}

fn cart_cookie(token: &str) -> String {
    format!(
        "{CART_SESSION_COOKIE}={token}; Path=/; Max-Age={SESSION_CART_TTL_SECONDS}; HttpOnly; SameSite=Lax"
    )
}

/// Signed-in users toggle their stored cart; anonymous visitors get a
/// session cart in redis, created on first add.
async fn cart_toggle(
    id: Id,
    adding: bool,
    viewer: Viewer,
    token: Option<String>,
    state: AppState,
) -> Response {
    let session = match viewer {
        Viewer::Authenticated(session) => session,
        Viewer::Anonymous => return session_cart_toggle(id, adding, token, state).await,
    };
    session
        .authenticate(ActionType::ManageOwnShoppingCart)
        .map_err(reject)?;

    if adding {
        toggle::add(&state.pool, Relation::ShoppingCart, session.user_id, id)
            .await
            .map_err(reject)?;
        let recipe = get_recipe(id, &state.pool).await.map_err(reject)?;
        Ok(json(&ShortRecipe::from(recipe), StatusCode::CREATED))
    } else {
        toggle::remove(&state.pool, Relation::ShoppingCart, session.user_id, id)
            .await
            .map_err(reject)?;
        Ok(no_content())
    }
}

async fn session_cart_toggle(
    id: Id,
    adding: bool,
    token: Option<String>,
    state: AppState,
) -> Response {
    let issued = token.is_none();
    let cart = SessionCart {
        pool: state.pool.clone(),
        cache: state.cache.clone(),
        token: token.unwrap_or_else(new_session_token),
    };

    let reply = if adding {
        toggle::add(&cart, Relation::ShoppingCart, 0, id)
            .await
            .map_err(reject)?;
        let recipe = get_recipe(id, &state.pool).await.map_err(reject)?;
        json(&ShortRecipe::from(recipe), StatusCode::CREATED)
    } else {
        toggle::remove(&cart, Relation::ShoppingCart, 0, id)
            .await
            .map_err(reject)?;
        no_content()
    };

    if issued {
        log::debug!("Issued cart session {}", cart.token);
        return Ok(Box::new(reply::with_header(
            reply,
            "set-cookie",
            cart_cookie(&cart.token),
        )));
    }
    Ok(reply)
}

async fn download_shopping_cart(
    viewer: Viewer,
    token: Option<String>,
    state: AppState,
) -> Response {
    let owner = match (viewer, token) {
        (Viewer::Authenticated(session), _) => CartOwner::User(session.user_id),
        (Viewer::Anonymous, Some(token)) => {
            let mut cache = state.cache.clone();
            CartOwner::Session(
                session_cart_members(&token, &mut cache)
                    .await
                    .map_err(reject)?,
            )
        }
        (Viewer::Anonymous, None) => CartOwner::Session(vec![]),
    };

    let manifest = aggregate(&state.pool, owner).await.map_err(reject)?;

    let body = reply::with_header(manifest.render(), "content-type", manifest.content_type());
    let body = reply::with_header(body, "content-disposition", manifest.content_disposition());
    Ok(Box::new(body))
}

// Users

async fn subscriptions_list(
    pairs: Vec<(String, String)>,
    session: SessionData,
    state: AppState,
) -> Response {
    let page = PageRequest::from_pairs(&pairs, &state.config).map_err(reject)?;
    let limit = recipes_limit(
        query_value(&pairs, "recipes_limit").map_err(reject)?,
        &state.config,
    );

    let page = fetch_subscriptions(session.user_id, limit, &page, &state.pool)
        .await
        .map_err(reject)?;

    Ok(json(&page, StatusCode::OK))
}

async fn subscribe_toggle(
    id: Id,
    adding: bool,
    pairs: Vec<(String, String)>,
    session: SessionData,
    state: AppState,
) -> Response {
    session
        .authenticate(ActionType::ManageSubscriptions)
        .map_err(reject)?;

    if !adding {
        toggle::remove(&state.pool, Relation::Follow, session.user_id, id)
            .await
            .map_err(reject)?;
        return Ok(no_content());
    }

    toggle::add(&state.pool, Relation::Follow, session.user_id, id)
        .await
        .map_err(reject)?;

    let limit = recipes_limit(
        query_value(&pairs, "recipes_limit").map_err(reject)?,
        &state.config,
    );
    let author = get_user_by_id(id, &state.pool).await.map_err(reject)?;
    let card = attach_recipes(vec![author], limit, &state.pool)
        .await
        .map_err(reject)?;

    Ok(json(&card.first(), StatusCode::CREATED))
}

async fn user_profile(id: Id, viewer: Viewer, state: AppState) -> Response {
    let profile = get_profile(id, &viewer, &state.pool)
        .await
        .map_err(reject)?;

    Ok(json(&profile, StatusCode::OK))
}

// Tags and ingredients

async fn tags_list(state: AppState) -> Response {
    let pool = state.pool.clone();
    let mut cache = state.cache.clone();

    let tags = RedisValue::<Tag>::get_or_list(CacheKeyType::Tag.new("all"), &mut cache, move || {
        async move { list_tags(&pool).await }
    })
    .await
    .map_err(reject)?;

    Ok(json(&tags.value, StatusCode::OK))
}

async fn tag_detail(id: Id, state: AppState) -> Response {
    let pool = state.pool.clone();
    let mut cache = state.cache.clone();

    let tag = RedisValue::<Tag>::get_or(CacheKeyType::Tag.new(id), &mut cache, move || {
        async move { get_tag(id, &pool).await }
    })
    .await
    .map_err(reject)?;

    Ok(json(&tag.value, StatusCode::OK))
}

async fn tag_create(session: SessionData, payload: TagPayload, state: AppState) -> Response {
    session
        .authenticate(ActionType::ManageReferenceData)
        .map_err(reject)?;

    let tag = create_tag(&payload.name, &payload.color, &payload.slug, &state.pool)
        .await
        .map_err(reject)?;

    let mut cache = state.cache.clone();
    invalidate_reference_cache(&mut cache)
        .await
        .map_err(reject)?;

    Ok(json(&tag, StatusCode::CREATED))
}

/// `?name=` searches without the cache; the full list is cached.
async fn ingredients_list(pairs: Vec<(String, String)>, state: AppState) -> Response {
    let name: Option<String> = query_value(&pairs, "name").map_err(reject)?;

    if let Some(name) = name.filter(|name| !name.trim().is_empty()) {
        let rows = search_ingredients(&name, &state.pool)
            .await
            .map_err(reject)?;
        return Ok(json(&rows, StatusCode::OK));
    }

    let pool = state.pool.clone();
    let mut cache = state.cache.clone();
    let rows = RedisValue::<Ingredient>::get_or_list(
        CacheKeyType::Ingredient.new("all"),
        &mut cache,
        move || async move { list_ingredients(&pool).await },
    )
    .await
    .map_err(reject)?;

    Ok(json(&rows.value, StatusCode::OK))
}

async fn ingredient_detail(id: Id, state: AppState) -> Response {
    let pool = state.pool.clone();
    let mut cache = state.cache.clone();

    let row = RedisValue::<Ingredient>::get_or(
        CacheKeyType::Ingredient.new(id),
        &mut cache,
        move || async move { get_ingredient(id, &pool).await },
    )
    .await
    .map_err(reject)?;

    Ok(json(&row.value, StatusCode::OK))
}

async fn ingredient_create(
    session: SessionData,
    payload: IngredientPayload,
    state: AppState,
) -> Response {
    session
        .authenticate(ActionType::ManageReferenceData)
        .map_err(reject)?;

    let row = create_ingredient(&payload.name, &payload.measurement_unit, &state.pool)
        .await
        .map_err(reject)?;

    let mut cache = state.cache.clone();
    invalidate_reference_cache(&mut cache)
        .await
        .map_err(reject)?;

    Ok(json(&row, StatusCode::CREATED))
}
