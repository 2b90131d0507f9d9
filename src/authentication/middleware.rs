use std::convert::Infallible;

use warp::{reject::Rejection, Filter};

use super::jwt::{verify_jwt_session, SessionData};

/// Requires a valid `session` cookie and extracts the session.
pub fn with_session(
    secret: &'static [u8],
) -> impl Filter<Extract = (SessionData,), Error = Rejection> + Copy {
    warp::cookie::<String>("session").and_then(move |session: String| async move {
        match verify_jwt_session(&session, secret) {
            Ok(data) => Ok(SessionData::from(data)),
            Err(e) => {
                log::debug!("session rejected: {e}");
                Err(Rejection::from(e))
            }
        }
    })
}

/// Extracts a session when the cookie is present and valid, `None` otherwise.
/// Read endpoints use this to compute per-request flags for anonymous users.
pub fn with_possible_session(
    secret: &'static [u8],
) -> impl Filter<Extract = (Option<SessionData>,), Error = Infallible> + Copy {
    warp::cookie::optional::<String>("session").map(move |session: Option<String>| {
        session.and_then(|token| {
            verify_jwt_session(&token, secret)
                .ok()
                .map(SessionData::from)
        })
    })
}

/// Requires a valid session without extracting it.
pub fn with_auth(
    secret: &'static [u8],
) -> impl Filter<Extract = ((),), Error = Rejection> + Copy {
    warp::cookie::<String>("session").and_then(move |session: String| async move {
        match verify_jwt_session(&session, secret) {
            Ok(_) => Ok(()),
            Err(e) => Err(Rejection::from(e)),
        }
    })
}
