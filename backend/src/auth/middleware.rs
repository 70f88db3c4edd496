use super::jwt::JwtService;
use super::models::AuthUser;
use actix_web::{
    Error, HttpMessage, HttpResponse,
    dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
};
use actix_web::{FromRequest, HttpRequest};
use futures::future::{Ready, ok, ready};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use shared::ErrorResponse;

#[derive(Clone)]
pub struct AuthMiddleware {
    jwt_service: Arc<JwtService>,
}

impl AuthMiddleware {
    pub fn new(jwt_service: Arc<JwtService>) -> Self {
        Self { jwt_service }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<actix_web::body::EitherBody<B>>;
    type Error = Error;
    type Transform = AuthMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(AuthMiddlewareService {
            service: Arc::new(service),
            jwt_service: self.jwt_service.clone(),
        })
    }
}

pub struct AuthMiddlewareService<S> {
    service: Arc<S>,
    jwt_service: Arc<JwtService>,
}

#[derive(Debug)]
enum AuthError {
    NoAuthHeader,
    InvalidHeaderFormat,
    NotBearerToken,
    VerificationFailed(String),
}

impl AuthError {
    fn log_message(&self, path: &str) -> String {
        match self {
            AuthError::NoAuthHeader => format!("No Authorization header found for path: {}", path),
            AuthError::InvalidHeaderFormat => {
                format!("Invalid Authorization header format (non-UTF-8) for path: {}", path)
            }
            AuthError::NotBearerToken => {
                format!("Authorization header for path {} doesn't start with 'Bearer '", path)
            }
            AuthError::VerificationFailed(e) => {
                format!("JWT token verification failed for path {}: {}", path, e)
            }
        }
    }

    fn client_error(&self) -> ErrorResponse {
        let error_message = match self {
            AuthError::VerificationFailed(_) => "Token verification failed",
            _ => "Authentication credentials were not provided.",
        };
        ErrorResponse::new(error_message)
    }
}

fn validate_request_token(
    req: &ServiceRequest,
    jwt_service: &JwtService,
) -> Result<AuthUser, AuthError> {
    let auth_header = req
        .headers()
        .get("Authorization")
        .ok_or(AuthError::NoAuthHeader)?;
    let auth_str = auth_header
        .to_str()
        .map_err(|_| AuthError::InvalidHeaderFormat)?;
    let token = auth_str
        .strip_prefix("Bearer ")
        .ok_or(AuthError::NotBearerToken)?;

    log::debug!("Found Bearer token, verifying...");
    let user = jwt_service
        .authenticate(token)
        .map_err(|e| AuthError::VerificationFailed(e.to_string()))?;

    log::debug!("JWT token verified for user: {}", user.id);
    Ok(user)
}

impl<S, B> Service<ServiceRequest> for AuthMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<actix_web::body::EitherBody<B>>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let jwt_service = self.jwt_service.clone();

        Box::pin(async move {
            let path_str = req.path().to_string();
            log::debug!("Auth middleware processing path: {}", &path_str);

            match validate_request_token(&req, &jwt_service) {
                Ok(user) => {
                    req.extensions_mut().insert(user);
                    let res = service.call(req).await?;
                    Ok(res.map_into_left_body())
                }
                Err(auth_error) => {
                    log::warn!("{}", auth_error.log_message(&path_str));

                    let (http_req, _payload) = req.into_parts();
                    let response = HttpResponse::Unauthorized()
                        .json(auth_error.client_error())
                        .map_into_right_body();
                    Ok(ServiceResponse::new(http_req, response))
                }
            }
        })
    }
}

/// Extracts the user placed in the request extensions by [`AuthMiddleware`].
pub struct AuthenticatedUser(pub AuthUser);

impl FromRequest for AuthenticatedUser {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut actix_web::dev::Payload) -> Self::Future {
        match req.extensions().get::<AuthUser>() {
            Some(user) => ok(AuthenticatedUser(user.clone())),
            None => {
                log::warn!(
                    "AuthenticatedUser extractor: no user in request extensions for path: {}",
                    req.path()
                );
                let response = HttpResponse::Unauthorized().json(ErrorResponse::new(
                    "Authentication credentials were not provided.",
                ));
                ready(Err(actix_web::error::InternalError::from_response(
                    "missing authenticated user",
                    response,
                )
                .into()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::tests::{SECRET, issue_token};
    use actix_web::{App, http::StatusCode, test, web};
    use chrono::Duration;
    use uuid::Uuid;

    async fn whoami(user: AuthenticatedUser) -> HttpResponse {
        HttpResponse::Ok().body(user.0.id.to_string())
    }

    fn jwt() -> Arc<JwtService> {
        Arc::new(JwtService::new(SECRET))
    }

    #[actix_web::test]
    async fn missing_token_is_unauthorized() {
        let app = test::init_service(
            App::new().service(
                web::resource("/me")
                    .wrap(AuthMiddleware::new(jwt()))
                    .route(web::get().to(whoami)),
            ),
        )
        .await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/me").to_request()).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let body: ErrorResponse = test::read_body_json(resp).await;
        assert_eq!(body.error, "Authentication credentials were not provided.");
    }

    #[actix_web::test]
    async fn valid_token_reaches_handler() {
        let app = test::init_service(
            App::new().service(
                web::resource("/me")
                    .wrap(AuthMiddleware::new(jwt()))
                    .route(web::get().to(whoami)),
            ),
        )
        .await;

        let id = Uuid::new_v4();
        let token = issue_token(SECRET, &id.to_string(), Duration::hours(1));
        let req = test::TestRequest::get()
            .uri("/me")
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .to_request();
        let body = test::call_and_read_body(&app, req).await;
        assert_eq!(body, id.to_string());
    }

    #[actix_web::test]
    async fn extractor_without_middleware_is_unauthorized() {
        let app = test::init_service(App::new().route("/me", web::get().to(whoami))).await;
        let resp = test::call_service(&app, test::TestRequest::get().uri("/me").to_request()).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }
}
