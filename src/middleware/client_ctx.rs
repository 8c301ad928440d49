use crate::user::Profile;
use actix_web::dev::Payload;
use actix_web::http::header::AUTHORIZATION;
use actix_web::{web::Data, Error, FromRequest, HttpMessage, HttpRequest};
use futures::future::{ready, LocalBoxFuture};
use std::time::{Duration, Instant};

/// Client data stored for a single request cycle.
#[derive(Clone, Debug)]
pub struct ClientCtxInner {
    /// User data. Optional. None is an anonymous request.
    pub client: Option<Profile>,
    /// The raw bearer token presented with the request, if any.
    pub token: Option<String>,
    /// Time the request started.
    pub request_start: Instant,
}

impl Default for ClientCtxInner {
    fn default() -> Self {
        Self {
            client: None,
            token: None,
            request_start: Instant::now(),
        }
    }
}

impl ClientCtxInner {
    /// Resolve a bearer token to its user. Unknown or expired tokens yield an anonymous context.
    pub async fn from_token(token: Option<String>) -> Result<Self, sea_orm::DbErr> {
        let client = match token.as_deref() {
            Some(token) => crate::session::authenticate_by_token(token).await?,
            None => None,
        };

        Ok(Self {
            client,
            token,
            ..Default::default()
        })
    }
}

/// Extract the credential from `Authorization: Bearer <token>`.
pub fn bearer_token(req: &HttpRequest) -> Option<String> {
    let value = req.headers().get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }

    let token = token.trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_owned())
    }
}

/// Client context passed to routes.
/// Wraps ClientCtxInner, which is resolved once per request and cached in extensions.
#[derive(Clone, Debug)]
pub struct ClientCtx(Data<ClientCtxInner>);

impl Default for ClientCtx {
    fn default() -> Self {
        Self(Data::new(ClientCtxInner::default()))
    }
}

impl ClientCtx {
    /// Returns either the user's id or None.
    pub fn get_id(&self) -> Option<i32> {
        self.0.client.as_ref().map(|u| u.id)
    }

    pub fn get_user(&self) -> Option<&Profile> {
        self.0.client.as_ref()
    }

    /// The presented token. Only meaningful when `is_user()`.
    pub fn get_token(&self) -> Option<&str> {
        self.0.token.as_deref()
    }

    pub fn is_user(&self) -> bool {
        self.0.client.is_some()
    }

    /// Returns Duration representing request time.
    pub fn request_time(&self) -> Duration {
        Instant::now() - self.0.request_start
    }

    /// Require user to be logged in. Returns user_id or ErrorUnauthorized.
    pub fn require_login(&self) -> Result<i32, actix_web::Error> {
        self.get_id()
            .ok_or_else(|| actix_web::error::ErrorUnauthorized("Login required"))
    }

    /// Require ownership of a resource. Returns () or ErrorForbidden.
    pub fn require_ownership(&self, resource_user_id: i32) -> Result<(), actix_web::Error> {
        let user_id = self.require_login()?;

        if resource_user_id == user_id {
            Ok(())
        } else {
            Err(actix_web::error::ErrorForbidden("You don't own this resource"))
        }
    }
}

/// This implementation is what actually provides the `client: ClientCtx` in the parameters of route functions.
impl FromRequest for ClientCtx {
    /// The associated error which can be returned.
    type Error = Error;
    /// Future that resolves to a Self.
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    /// Resolve the bearer token once and reuse it for every extractor in the request.
    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        if let Some(inner) = req.extensions().get::<Data<ClientCtxInner>>() {
            return Box::pin(ready(Ok(ClientCtx(inner.clone()))));
        }

        let req = req.clone();
        let token = bearer_token(&req);

        Box::pin(async move {
            let inner = ClientCtxInner::from_token(token).await.map_err(|e| {
                log::error!("Unable to resolve bearer token: {}", e);
                actix_web::error::ErrorInternalServerError("DB error")
            })?;

            let inner = Data::new(inner);
            req.extensions_mut().insert(inner.clone());
            Ok(ClientCtx(inner))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn test_bearer_token_parses_header() {
        let req = TestRequest::default()
            .insert_header((AUTHORIZATION, "Bearer abc123"))
            .to_http_request();
        assert_eq!(bearer_token(&req), Some("abc123".to_string()));

        let req = TestRequest::default()
            .insert_header((AUTHORIZATION, "bearer   xyz "))
            .to_http_request();
        assert_eq!(bearer_token(&req), Some("xyz".to_string()));
    }

    #[test]
    fn test_bearer_token_rejects_other_schemes() {
        let req = TestRequest::default()
            .insert_header((AUTHORIZATION, "Basic dXNlcjpwYXNz"))
            .to_http_request();
        assert_eq!(bearer_token(&req), None);

        let req = TestRequest::default()
            .insert_header((AUTHORIZATION, "Bearer "))
            .to_http_request();
        assert_eq!(bearer_token(&req), None);

        let req = TestRequest::default().to_http_request();
        assert_eq!(bearer_token(&req), None);
    }

    #[actix_rt::test]
    async fn test_anonymous_request_is_not_user() {
        let req = TestRequest::default().to_http_request();
        let client = ClientCtx::extract(&req).await.unwrap();

        assert!(!client.is_user());
        assert!(client.require_login().is_err());
    }
}
