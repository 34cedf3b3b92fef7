use warp::{
    reject::{self, Reject},
    Filter,
};

use crate::controllers::QuizController;
use crate::models::SessionId;

#[derive(Debug)]
pub struct Unauthorized;

impl Reject for Unauthorized {}

pub fn with_quiz_controller(
    quiz_controller: QuizController,
) -> impl Filter<Extract = (QuizController,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || quiz_controller.clone())
}

/// Extracts the session id from an `Authorization: Session <token>` header.
pub fn session_id(
    quiz_controller: QuizController,
) -> impl Filter<Extract = (SessionId,), Error = warp::Rejection> + Clone {
    warp::header::optional("Authorization")
        .and(with_quiz_controller(quiz_controller))
        .and_then(
            move |auth: Option<String>, quiz_controller: QuizController| async move {
                let auth = auth.ok_or_else(|| reject::custom(Unauthorized))?;

                let mut parts = auth.splitn(2, ' ');
                let kind = parts.next().ok_or_else(|| reject::custom(Unauthorized))?;
                let value = parts.next().ok_or_else(|| reject::custom(Unauthorized))?;

                if !kind.eq_ignore_ascii_case("session") {
                    return Err(reject::custom(Unauthorized));
                }

                quiz_controller
                    .decode_token(value.trim())
                    .map_err(|_err| reject::custom(Unauthorized))
            },
        )
}
