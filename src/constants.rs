pub const DEFAULT_PAGE_SIZE: i64 = 25;
pub const MAX_PAGE_SIZE: i64 = 100;

pub const DEFAULT_RECIPES_LIMIT: i64 = 3;
pub const MAX_RECIPES_LIMIT: i64 = 10;

pub const MIN_COOKING_TIME: i32 = 1;
pub const MAX_COOKING_TIME: i32 = 300;

pub const MIN_INGREDIENT_AMOUNT: i32 = 1;
pub const MAX_INGREDIENT_AMOUNT: i32 = 32000;

pub const MAX_RECIPE_NAME_LENGTH: usize = 64;
pub const MAX_RECIPE_TEXT_LENGTH: usize = 5000;

pub const SHOPPING_CART_FILENAME: &str = "foodgram_shopping_cart.txt";
pub const SHOPPING_CART_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

pub const SESSION_COOKIE: &str = "session";
pub const CART_SESSION_COOKIE: &str = "cart_session";
pub const SESSION_CART_TTL_SECONDS: i64 = 60 * 60 * 24 * 30;

pub const TRUE_QUERY_SYMBOLS: &[&str] = &["1", "true"];
pub const FALSE_QUERY_SYMBOLS: &[&str] = &["0", "false"];
