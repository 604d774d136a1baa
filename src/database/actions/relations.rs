use sqlx::{Pool, Postgres};

use crate::{error::QueryError, schema::Id, toggle::Relation};

pub async fn target_exists(
    relation: Relation,
    target: Id,
    pool: &Pool<Postgres>,
) -> Result<bool, potion::Error> {
    let row: (bool,) = sqlx::query_as(&format!(
        "SELECT EXISTS (SELECT 1 FROM {} WHERE id = $1)",
        relation.target_table()
    ))
    .bind(target)
    .fetch_one(pool)
    .await
    .map_err(|e| QueryError::from(e).into())?;

    Ok(row.0)
}

pub async fn insert_relation(
    relation: Relation,
    owner: Id,
    target: Id,
    pool: &Pool<Postgres>,
) -> Result<bool, potion::Error> {
    let (owner_column, target_column) = relation.columns();

    let result = sqlx::query(&format!(
        "INSERT INTO {} ({owner_column}, {target_column}) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        relation.table()
    ))
    .bind(owner)
    .bind(target)
    .execute(pool)
    .await
    .map_err(|e| QueryError::from(e).into())?;

    Ok(result.rows_affected() > 0)
}

pub async fn delete_relation(
    relation: Relation,
    owner: Id,
    target: Id,
    pool: &Pool<Postgres>,
) -> Result<bool, potion::Error> {
    let (owner_column, target_column) = relation.columns();

    let result = sqlx::query(&format!(
        "DELETE FROM {} WHERE {owner_column} = $1 AND {target_column} = $2",
        relation.table()
    ))
    .bind(owner)
    .bind(target)
    .execute(pool)
    .await
    .map_err(|e| QueryError::from(e).into())?;

    Ok(result.rows_affected() > 0)
}
