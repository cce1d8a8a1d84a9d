// orderflow_server/src/web/extractors.rs

use actix_web::{dev::Payload, FromRequest, HttpRequest};
use orderflow::model::{Requester, Role};
use tracing::warn;
use uuid::Uuid;

use crate::errors::AppError;

/// The authenticated caller. An upstream gateway terminates the session and
/// forwards identity as `X-User-ID` and `X-User-Role`.
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedUser(pub Requester);

fn header<'a>(req: &'a HttpRequest, name: &str) -> Option<&'a str> {
  req.headers().get(name).and_then(|h| h.to_str().ok())
}

impl FromRequest for AuthenticatedUser {
  type Error = AppError;
  type Future = futures_util::future::Ready<Result<Self, Self::Error>>;

  fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
    let user_id = header(req, "X-User-ID").and_then(|raw| Uuid::parse_str(raw.trim()).ok());
    let role = header(req, "X-User-Role").and_then(Role::parse);
    let result = match (user_id, role) {
      (Some(user_id), Some(role)) => Ok(AuthenticatedUser(Requester { user_id, role })),
      _ => {
        warn!("Missing or invalid X-User-ID / X-User-Role headers.");
        Err(AppError::Auth(
          "Authentication required: valid X-User-ID and X-User-Role headers".to_string(),
        ))
      }
    };
    futures_util::future::ready(result)
  }
}
