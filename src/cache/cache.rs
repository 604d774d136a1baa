use std::future::Future;

use async_trait::async_trait;
use redis::{aio::MultiplexedConnection, AsyncCommands, FromRedisValue, ToRedisArgs};
use redis_macros::{FromRedisValue, ToRedisArgs};
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Postgres};

use crate::{
    actions::relations::target_exists,
    constants::SESSION_CART_TTL_SECONDS,
    error::CacheError,
    schema::Id,
    toggle::{MembershipStore, Relation},
};

const REFERENCE_CACHE_KEY: &str = "reference-cache-key";

// Caching - keys

#[derive(Serialize, Clone, Debug)]
pub struct CacheKey<T: ToString + Serialize> {
    _value: T,
    _type: CacheKeyType,
}

impl<T: ToString + Serialize> CacheKey<T> {
    pub fn from(r#type: CacheKeyType, key: T) -> Self {
        Self {
            _value: key,
            _type: r#type,
        }
    }

    pub fn to_string(&self) -> String {
        self.into()
    }
}

impl<T: ToString + Serialize> Into<String> for &CacheKey<T> {
    fn into(self) -> String {
        match self._type {
            CacheKeyType::Tag => format!("tag-{}", self._value.to_string()),
            CacheKeyType::Ingredient => format!("ingredient-{}", self._value.to_string()),
            CacheKeyType::SessionCart => format!("cart-{}", self._value.to_string()),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum CacheKeyType {
    Tag,
    Ingredient,
    SessionCart,
}

impl CacheKeyType {
    pub fn new<T: ToString + Serialize>(self, key: T) -> CacheKey<T> {
        CacheKey::from(self, key)
    }
}

impl<T: ToString + Serialize> Into<CacheLifetime> for CacheKey<T> {
    fn into(self) -> CacheLifetime {
        match self._type {
            CacheKeyType::Tag | CacheKeyType::Ingredient => CacheLifetime::BindReferenceCache,
            CacheKeyType::SessionCart => CacheLifetime::Infinite,
        }
    }
}

// Cache - wrappers

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum CacheLifetime {
    Infinite,
    /// Valid until `invalidate_reference_cache` rotates the binding.
    BindReferenceCache,
}

impl CacheLifetime {
    pub async fn get_cache_bind(
        &self,
        cache: &mut MultiplexedConnection,
    ) -> Result<Option<String>, potion::Error> {
        match self {
            CacheLifetime::Infinite => Ok(None),
            CacheLifetime::BindReferenceCache => {
                get_cache_value::<&str, String>(REFERENCE_CACHE_KEY, cache).await
            }
        }
    }

    pub async fn validate_cache_bind(
        &self,
        bind: &Option<String>,
        cache: &mut MultiplexedConnection,
    ) -> Result<bool, potion::Error> {
        Ok(bind == &self.get_cache_bind(cache).await?)
    }
}

/// Makes every value bound to the reference cache stale.
pub async fn invalidate_reference_cache(
    cache: &mut MultiplexedConnection,
) -> Result<(), potion::Error> {
    let bind = uuid::Uuid::new_v4().to_string();
    log::debug!("Rotating reference cache binding to {bind}");

    set_cache_value(REFERENCE_CACHE_KEY, bind, cache).await
}

#[derive(Serialize, serde::Deserialize, FromRedisValue, ToRedisArgs, Clone)]
pub struct RedisValue<T: serde::Serialize + Send + Sync + Clone> {
    pub value: T,
    _lifetime: CacheLifetime,
    _bind: Option<String>,
}

impl<T: serde::Serialize + Send + Sync + Clone + for<'a> Deserialize<'a>> RedisValue<T> {
    async fn new(
        value: T,
        lifetime: CacheLifetime,
        cache: &mut MultiplexedConnection,
    ) -> Result<Self, potion::Error> {
        let bind = lifetime.get_cache_bind(cache).await?;

        Ok(Self {
            value,
            _lifetime: lifetime,
            _bind: bind,
        })
    }

    async fn validate(&self, cache: &mut MultiplexedConnection) -> Result<bool, potion::Error> {
        self._lifetime.validate_cache_bind(&self._bind, cache).await
    }

    /// Returns the cached value when its binding is still current, otherwise
    /// runs `callback` and stores the result. A failed store write is logged
    /// and the fresh value returned anyway.
    pub async fn get_or<'a, F, Fut, K>(
        key: CacheKey<K>,
        cache: &mut MultiplexedConnection,
        callback: F,
    ) -> Result<RedisValue<T>, potion::Error>
    where
        K: ToString + Serialize + Clone + Send + Sync,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, potion::Error>> + Send + 'a,
    {
        let value = get_cache_value::<String, RedisValue<T>>((&key).into(), cache)
            .await
            .unwrap_or_else(|_| {
                let mut c = cache.clone();
                let k = key.to_string();
                tokio::spawn(async move {
                    log::error!("> Failed to deserialize cached value. Deleting {}", &k);
                    if let Err(e) = delete_cache_value(k, &mut c).await {
                        log::error!("> Failed to delete cached value! {e:?}");
                    }
                });
                None
            });
        // * Cannot use .map(|| {...}) due to async closures
        let value = match value {
            Some(value) => {
                log::trace!("> Found {:?}", key.to_string());
                match value.validate(cache).await? {
                    true => Some(value),
                    false => {
                        log::trace!("> Invalidated {:?}", key.to_string());
                        None
                    }
                }
            }
            None => None,
        };

        match value {
            Some(value) => Ok(value),
            None => {
                log::trace!("> Fetching {:?}", key.to_string());
                let value = callback().await?;
                let lifetime: CacheLifetime = key.to_owned().into();
                let value = RedisValue::new(value, lifetime, cache).await?;

                if let Err(e) =
                    set_cache_value::<String, RedisValue<T>>((&key).into(), value.clone(), cache)
                        .await
                {
                    log::error!("> Failed to cache {:?}: {e:?}", key.to_string());
                }

                Ok(value)
            }
        }
    }

    pub async fn get_or_list<'a, F, Fut, K>(
        key: CacheKey<K>,
        cache: &mut MultiplexedConnection,
        callback: F,
    ) -> Result<RedisValue<Vec<T>>, potion::Error>
    where
        K: ToString + Serialize + Clone + Send + Sync,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Vec<T>, potion::Error>> + Send + 'a,
    {
        RedisValue::<Vec<T>>::get_or(key, cache, callback).await
    }
}

// Session carts

pub fn new_session_token() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub async fn session_cart_members(
    token: &str,
    cache: &mut MultiplexedConnection,
) -> Result<Vec<Id>, potion::Error> {
    let key = CacheKeyType::SessionCart.new(token).to_string();
    let members: Vec<Id> = cache
        .smembers(key)
        .await
        .map_err(|e| CacheError::from(e).into())?;

    Ok(members)
}

/// Pending purchase list of an anonymous visitor, keyed by the `cart_session` cookie.
#[derive(Clone)]
pub struct SessionCart {
    pub pool: Pool<Postgres>,
    pub cache: MultiplexedConnection,
    pub token: String,
}

impl SessionCart {
    fn key(&self) -> String {
        CacheKeyType::SessionCart.new(self.token.as_str()).to_string()
    }
}

#[async_trait]
impl MembershipStore for SessionCart {
    async fn target_exists(&self, relation: Relation, target: Id) -> Result<bool, potion::Error> {
        target_exists(relation, target, &self.pool).await
    }

    async fn insert(
        &self,
        _relation: Relation,
        _owner: Id,
        target: Id,
    ) -> Result<bool, potion::Error> {
        let mut cache = self.cache.clone();
        let added: i64 = cache
            .sadd(self.key(), target)
            .await
            .map_err(|e| CacheError::from(e).into())?;
        let _: bool = cache
            .expire(self.key(), SESSION_CART_TTL_SECONDS)
            .await
            .map_err(|e| CacheError::from(e).into())?;

        Ok(added > 0)
    }

    async fn delete(
        &self,
        _relation: Relation,
        _owner: Id,
        target: Id,
    ) -> Result<bool, potion::Error> {
        let mut cache = self.cache.clone();
        let removed: i64 = cache
            .srem(self.key(), target)
            .await
            .map_err(|e| CacheError::from(e).into())?;

        Ok(removed > 0)
    }
}

// Cache - raw handlers

pub async fn set_cache_value<K: ToRedisArgs + Send + Sync, V: ToRedisArgs + Send + Sync>(
    key: K,
    value: V,
    cache: &mut MultiplexedConnection,
) -> Result<(), potion::Error> {
    let _: () = cache
        .set(key, value)
        .await
        .map_err(|e| CacheError::from(e).into())?;

    Ok(())
}

pub async fn delete_cache_value<K: ToRedisArgs + Send + Sync>(
    key: K,
    cache: &mut MultiplexedConnection,
) -> Result<(), potion::Error> {
    let _: () = cache
        .del(key)
        .await
        .map_err(|e| CacheError::from(e).into())?;

    Ok(())
}

pub async fn get_cache_value<K: ToRedisArgs + Send + Sync, V: FromRedisValue>(
    key: K,
    cache: &mut MultiplexedConnection,
) -> Result<Option<V>, potion::Error> {
    let value: Option<V> = cache
        .get(key)
        .await
        .map_err(|e| CacheError::from(e).into())?;

    Ok(value)
}
