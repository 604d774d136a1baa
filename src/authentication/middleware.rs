use std::sync::Arc;

use potion::HtmlError;
use warp::{reject::Rejection, Filter};

use crate::{
    annotation::Viewer,
    config::Config,
    constants::{CART_SESSION_COOKIE, SESSION_COOKIE},
};

use super::jwt::{verify_jwt_session, SessionData};

fn resolve_viewer(token: Option<String>, config: &Config) -> Result<Viewer, potion::Error> {
    match token {
        Some(token) => verify_jwt_session(&token, &config.jwt_secret)
            .map(|data| Viewer::Authenticated(data.into())),
        None => Ok(Viewer::Anonymous),
    }
}

/// Resolves the caller from the `session` cookie. Missing or invalid tokens
/// yield an anonymous viewer rather than a rejection.
pub fn with_viewer(
    config: Arc<Config>,
) -> impl Filter<Extract = (Viewer,), Error = Rejection> + Clone {
    warp::cookie::optional::<String>(SESSION_COOKIE).and_then(move |token: Option<String>| {
        let config = config.clone();
        async move {
            let viewer = resolve_viewer(token, &config).unwrap_or_else(|_| {
                log::debug!("Ignoring invalid session cookie");
                Viewer::Anonymous
            });
            Ok::<Viewer, Rejection>(viewer)
        }
    })
}

/// Like `with_viewer`, but a present session cookie that fails to verify is
/// rejected with 401 instead of falling back to the anonymous cart.
pub fn with_cart_viewer(
    config: Arc<Config>,
) -> impl Filter<Extract = (Viewer,), Error = Rejection> + Clone {
    warp::cookie::optional::<String>(SESSION_COOKIE).and_then(move |token: Option<String>| {
        let config = config.clone();
        async move {
            resolve_viewer(token, &config).map_err(|_| {
                let rejection: Rejection = HtmlError::Unauthorized
                    .new("Session expired or invalid")
                    .into();
                rejection
            })
        }
    })
}

pub fn with_session(
    config: Arc<Config>,
) -> impl Filter<Extract = (SessionData,), Error = Rejection> + Clone {
    with_viewer(config).and_then(|viewer: Viewer| async move {
        match viewer {
            Viewer::Authenticated(session) => Ok(session),
            Viewer::Anonymous => Err::<SessionData, Rejection>(
                HtmlError::Unauthorized
                    .new("Authentication credentials were not provided")
                    .into(),
            ),
        }
    })
}

pub fn with_cart_session() -> impl Filter<Extract = (Option<String>,), Error = Rejection> + Clone
{
    warp::cookie::optional::<String>(CART_SESSION_COOKIE)
        .and_then(|token: Option<String>| async move { Ok::<_, Rejection>(token) })
}
