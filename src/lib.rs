mod database {
    pub mod actions;
    pub mod error;
    pub mod pagination;
    pub mod schema;
}
mod authentication {
    pub mod jwt;
    pub mod middleware;
    pub mod permissions;
}
mod engine {
    pub mod annotation;
    pub mod manifest;
    pub mod toggle;
}
mod config;
mod constants;

mod cache {
    pub mod cache;
}

pub mod routes;

#[cfg(test)]
mod testing;

pub use authentication::*;
pub use cache::cache::*;
pub use config::*;
pub use constants::*;
pub use database::*;
pub use engine::*;
