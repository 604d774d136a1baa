use crate::{
    error::{NotFoundError, QueryError, ValidationError},
    schema::{Id, RecipeTag, Tag},
};

use sqlx::{Pool, Postgres};

/// Normalises `"#abc"`, `"abc"` or `" #a1B2c3 "` to `#AABBCC` / `#A1B2C3`.
pub fn normalize_hex_color(color: &str) -> Result<String, ValidationError> {
    let color = color.trim_matches(|c: char| c == ' ' || c == '#');

    if color.len() != 3 && color.len() != 6 {
        return Err(ValidationError::new(
            "color",
            &format!("The color code {color} is not the correct length ({})", color.len()),
        ));
    }
    if !color.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ValidationError::new(
            "color",
            &format!("{color} is not hexadecimal"),
        ));
    }

    let color = if color.len() == 3 {
        color.chars().flat_map(|c| [c, c]).collect::<String>()
    } else {
        color.to_string()
    };

    Ok(format!("#{}", color.to_ascii_uppercase()))
}

pub fn validate_slug(slug: &str) -> Result<(), ValidationError> {
    if slug.is_empty() {
        return Err(ValidationError::new("slug", "Slug can't be empty"));
    }
    if !slug
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::new(
            "slug",
            &format!("{slug} may only contain letters, digits, '-' and '_'"),
        ));
    }
    Ok(())
}

pub async fn create_tag(
    name: &str,
    color: &str,
    slug: &str,
    pool: &Pool<Postgres>,
) -> Result<Tag, potion::Error> {
    let name = name.trim();
    let slug = slug.trim();
    if name.is_empty() {
        return Err(ValidationError::new("name", "Name can't be empty").into());
    }
    validate_slug(slug).map_err(|e| e.into())?;
    let color = normalize_hex_color(color).map_err(|e| e.into())?;

    let tag: Tag = sqlx::query_as(
        "INSERT INTO tags (name, color, slug) VALUES ($1, $2, $3) RETURNING *",
    )
    .bind(name)
    .bind(color)
    .bind(slug)
    .fetch_one(pool)
    .await
    .map_err(|e| QueryError::from(e).into())?;

    Ok(tag)
}

pub async fn get_tag(id: Id, pool: &Pool<Postgres>) -> Result<Tag, potion::Error> {
    let tag: Option<Tag> = sqlx::query_as("SELECT * FROM tags WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|e| QueryError::from(e).into())?;

    tag.ok_or_else(|| NotFoundError::new("No tag exists with specified id").into())
}

pub async fn list_tags(pool: &Pool<Postgres>) -> Result<Vec<Tag>, potion::Error> {
    let list: Vec<Tag> = sqlx::query_as("SELECT * FROM tags ORDER BY name")
        .fetch_all(pool)
        .await
        .map_err(|e| QueryError::from(e).into())?;

    Ok(list)
}

/// Tags of every recipe in `recipe_ids`, one query for the whole page.
pub async fn list_recipe_tags(
    recipe_ids: &[Id],
    pool: &Pool<Postgres>,
) -> Result<Vec<RecipeTag>, potion::Error> {
    let list: Vec<RecipeTag> = sqlx::query_as(
        "
        SELECT rt.recipe_id AS recipe_id, t.id AS id, t.name AS name, t.color AS color, t.slug AS slug
        FROM recipe_tags rt
        INNER JOIN tags t ON t.id = rt.tag_id
        WHERE rt.recipe_id = ANY($1)
        ORDER BY t.name
    ",
    )
    .bind(recipe_ids)
    .fetch_all(pool)
    .await
    .map_err(|e| QueryError::from(e).into())?;

    Ok(list)
}
