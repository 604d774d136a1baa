use std::{env, fmt::Display, str::FromStr};

use crate::constants::{
    DEFAULT_PAGE_SIZE, DEFAULT_RECIPES_LIMIT, MAX_COOKING_TIME, MAX_INGREDIENT_AMOUNT,
    MAX_PAGE_SIZE, MAX_RECIPES_LIMIT, MAX_RECIPE_NAME_LENGTH, MAX_RECIPE_TEXT_LENGTH,
    MIN_COOKING_TIME, MIN_INGREDIENT_AMOUNT,
};

/// Inclusive integer range used for cooking times and ingredient amounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    pub min: i32,
    pub max: i32,
}

impl Bounds {
    pub const fn new(min: i32, max: i32) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: i32) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Immutable settings handed to every action and route at construction.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub jwt_secret: String,

    pub default_page_size: i64,
    pub max_page_size: i64,
    pub default_recipes_limit: i64,
    pub max_recipes_limit: i64,

    pub cooking_time: Bounds,
    pub ingredient_amount: Bounds,
    pub max_recipe_name_length: usize,
    pub max_recipe_text_length: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: String::from("postgres://localhost/foodgram"),
            redis_url: String::from("redis://127.0.0.1/"),
            jwt_secret: String::from("secret"),
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: MAX_PAGE_SIZE,
            default_recipes_limit: DEFAULT_RECIPES_LIMIT,
            max_recipes_limit: MAX_RECIPES_LIMIT,
            cooking_time: Bounds::new(MIN_COOKING_TIME, MAX_COOKING_TIME),
            ingredient_amount: Bounds::new(MIN_INGREDIENT_AMOUNT, MAX_INGREDIENT_AMOUNT),
            max_recipe_name_length: MAX_RECIPE_NAME_LENGTH,
            max_recipe_text_length: MAX_RECIPE_TEXT_LENGTH,
        }
    }
}

impl Config {
    /// Reads `FOODGRAM_*` environment variables, keeping the default for anything
    /// missing or unparsable.
    pub fn load() -> Self {
        let defaults = Self::default();

        let max_page_size = try_load("FOODGRAM_MAX_PAGE_SIZE", defaults.max_page_size).max(1);
        let max_recipes_limit =
            try_load("FOODGRAM_MAX_RECIPES_LIMIT", defaults.max_recipes_limit).max(1);

        Self {
            database_url: try_load("FOODGRAM_DATABASE_URL", defaults.database_url),
            redis_url: try_load("FOODGRAM_REDIS_URL", defaults.redis_url),
            jwt_secret: secret_or_default(env::var("FOODGRAM_JWT_SECRET").ok(), defaults.jwt_secret),
            default_page_size: try_load("FOODGRAM_DEFAULT_PAGE_SIZE", defaults.default_page_size)
                .clamp(1, max_page_size),
            max_page_size,
            default_recipes_limit: try_load(
                "FOODGRAM_RECIPES_LIMIT",
                defaults.default_recipes_limit,
            )
            .clamp(1, max_recipes_limit),
            max_recipes_limit,
            ..defaults
        }
    }
}

/// A missing or blank secret falls back to the built-in one with a warning.
fn secret_or_default(value: Option<String>, default: String) -> String {
    match value.map(|value| value.trim().to_owned()) {
        Some(value) if !value.is_empty() => value,
        _ => {
            log::warn!("FOODGRAM_JWT_SECRET not set, signing sessions with the development secret");
            default
        }
    }
}

fn try_load<T>(key: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    match env::var(key) {
        Ok(value) => value.trim().parse().unwrap_or_else(|e| {
            log::warn!("Invalid {key} value: {e}, using default: {default}");
            default
        }),
        Err(_) => {
            log::info!("{key} not set, using default");
            default
        }
    }
}
