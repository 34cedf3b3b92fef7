use anyhow::{Error, Result};
use rand::prelude::*;
use ring::{digest, hmac};
use serde::{Deserialize, Serialize};
use std::{convert::Infallible, env, net::SocketAddr};
use tokio::fs;
use tracing_subscriber::EnvFilter;
use warp::{
    http::{self, Response},
    reply::{self, Reply},
    Filter, Rejection,
};

use controllers::QuizController;
use map::Geography;
use models::{Catalog, Config, SessionId, MAX_HINTS};
use session::SessionSnapshot;

mod controllers;
mod filters;
mod map;
mod matching;
mod models;
mod session;

#[derive(Clone, Debug, Serialize)]
struct SessionReply<'a> {
    token: &'a str,
    session: SessionSnapshot,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
struct InputRequest {
    text: String,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
struct GuessRequest {
    #[serde(default)]
    answer: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
struct CatalogReply {
    countries: usize,
    hints_per_country: u8,
    time_budget_secs: u32,
    code_property: String,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
struct ErrorReply {
    error: ErrorCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
enum ErrorCode {
    NotFound,
    Unauthorized,
    BadRequest,
    GeographyUnavailable,
    Internal,
}

fn error_reply(
    error: ErrorCode,
    status: http::StatusCode,
    message: Option<String>,
) -> reply::Response {
    reply::with_status(reply::json(&ErrorReply { error, message }), status).into_response()
}

fn json_reply<T: Serialize>(result: Result<Option<T>>) -> reply::Response {
    match result {
        Ok(Some(value)) => reply::json(&value).into_response(),
        Ok(None) => error_reply(ErrorCode::NotFound, http::StatusCode::NOT_FOUND, None),
        Err(error) => {
            tracing::error!(%error, "request failed");
            error_reply(
                ErrorCode::Internal,
                http::StatusCode::INTERNAL_SERVER_ERROR,
                None,
            )
        }
    }
}

async fn handle_rejection(err: Rejection) -> Result<reply::Response, Infallible> {
    let reply = if err.is_not_found() {
        error_reply(ErrorCode::NotFound, http::StatusCode::NOT_FOUND, None)
    } else if err.find::<filters::Unauthorized>().is_some() {
        error_reply(
            ErrorCode::Unauthorized,
            http::StatusCode::UNAUTHORIZED,
            None,
        )
    } else if let Some(error) = err.find::<warp::filters::body::BodyDeserializeError>() {
        error_reply(
            ErrorCode::BadRequest,
            http::StatusCode::BAD_REQUEST,
            Some(error.to_string()),
        )
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        error_reply(
            ErrorCode::NotFound,
            http::StatusCode::METHOD_NOT_ALLOWED,
            None,
        )
    } else {
        tracing::error!(?err, "unhandled rejection");
        error_reply(
            ErrorCode::Internal,
            http::StatusCode::INTERNAL_SERVER_ERROR,
            None,
        )
    };

    Ok(reply)
}

fn routes(
    quiz_controller: QuizController,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let create_session = warp::path!("session")
        .and(warp::post())
        .and(filters::with_quiz_controller(quiz_controller.clone()))
        .map(|quiz_controller: QuizController| {
            let created = quiz_controller.create_session().and_then(|(id, session)| {
                let token = quiz_controller.encode_token(&id)?;
                Ok((token, session))
            });

            match created {
                Ok((token, session)) => reply::json(&SessionReply {
                    token: &token,
                    session,
                })
                .into_response(),
                Err(error) => json_reply::<()>(Err(error)),
            }
        });

    let get_session = warp::path!("session")
        .and(warp::get())
        .and(filters::session_id(quiz_controller.clone()))
        .and(filters::with_quiz_controller(quiz_controller.clone()))
        .map(|id: SessionId, quiz_controller: QuizController| {
            json_reply(quiz_controller.snapshot(id))
        });

    let end_session = warp::path!("session")
        .and(warp::delete())
        .and(filters::session_id(quiz_controller.clone()))
        .and(filters::with_quiz_controller(quiz_controller.clone()))
        .map(
            |id: SessionId, quiz_controller: QuizController| match quiz_controller.end_session(id) {
                Ok(true) => {
                    reply::with_status(warp::reply(), http::StatusCode::NO_CONTENT).into_response()
                }
                Ok(false) => json_reply::<()>(Ok(None)),
                Err(error) => json_reply::<()>(Err(error)),
            },
        );

    let start = warp::path!("session" / "start")
        .and(warp::post())
        .and(filters::session_id(quiz_controller.clone()))
        .and(filters::with_quiz_controller(quiz_controller.clone()))
        .map(|id: SessionId, quiz_controller: QuizController| {
            json_reply(quiz_controller.start(id))
        });

    let input = warp::path!("session" / "input")
        .and(warp::put())
        .and(warp::filters::body::json())
        .and(filters::session_id(quiz_controller.clone()))
        .and(filters::with_quiz_controller(quiz_controller.clone()))
        .map(
            |body: InputRequest, id: SessionId, quiz_controller: QuizController| {
                json_reply(quiz_controller.set_input(id, &body.text))
            },
        );

    let guess = warp::path!("session" / "guess")
        .and(warp::post())
        .and(warp::filters::body::json())
        .and(filters::session_id(quiz_controller.clone()))
        .and(filters::with_quiz_controller(quiz_controller.clone()))
        .map(
            |body: GuessRequest, id: SessionId, quiz_controller: QuizController| {
                json_reply(quiz_controller.guess(id, body.answer.as_deref()))
            },
        );

    let hint = warp::path!("session" / "hint")
        .and(warp::post())
        .and(filters::session_id(quiz_controller.clone()))
        .and(filters::with_quiz_controller(quiz_controller.clone()))
        .map(|id: SessionId, quiz_controller: QuizController| {
            json_reply(quiz_controller.hint(id))
        });

    let skip = warp::path!("session" / "skip")
        .and(warp::post())
        .and(filters::session_id(quiz_controller.clone()))
        .and(filters::with_quiz_controller(quiz_controller.clone()))
        .map(|id: SessionId, quiz_controller: QuizController| {
            json_reply(quiz_controller.skip(id))
        });

    let styles = warp::path!("session" / "styles")
        .and(warp::get())
        .and(filters::session_id(quiz_controller.clone()))
        .and(filters::with_quiz_controller(quiz_controller.clone()))
        .map(|id: SessionId, quiz_controller: QuizController| {
            json_reply(quiz_controller.styles(id))
        });

    let geography = warp::path!("geography")
        .and(warp::get())
        .and(filters::with_quiz_controller(quiz_controller.clone()))
        .map(|quiz_controller: QuizController| match quiz_controller.geography() {
            Geography::Loaded(document) => reply::json(document.body()).into_response(),
            Geography::Failed(message) => error_reply(
                ErrorCode::GeographyUnavailable,
                http::StatusCode::SERVICE_UNAVAILABLE,
                Some(message.clone()),
            ),
        });

    let catalog = warp::path!("catalog")
        .and(warp::get())
        .and(filters::with_quiz_controller(quiz_controller))
        .map(|quiz_controller: QuizController| {
            let reply = CatalogReply {
                countries: quiz_controller.catalog().len(),
                hints_per_country: MAX_HINTS,
                time_budget_secs: quiz_controller.game().time_budget_secs,
                code_property: quiz_controller.code_property().to_string(),
            };

            reply::json(&reply).into_response()
        });

    let index = warp::path::end()
        .and(warp::get())
        .map(|| reply::html(include_str!("../static/index.html")).into_response());

    let script = warp::path!("static" / "quiz.js")
        .and(warp::get())
        .map(|| {
            const SCRIPT: &str = include_str!("../static/quiz.js");
            Response::builder()
                .header("Content-Type", "application/javascript")
                .body(SCRIPT)
        })
        .with(warp::compression::gzip());

    create_session
        .or(get_session)
        .or(end_session)
        .or(start)
        .or(input)
        .or(guess)
        .or(hint)
        .or(skip)
        .or(styles)
        .or(geography)
        .or(catalog)
        .or(index)
        .or(script)
        .recover(handle_rejection)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_err| EnvFilter::new("info")),
        )
        .init();

    let bind_addr = env::var("BIND").unwrap_or_else(|_err| "127.0.0.1:3030".into());
    let bind_addr: SocketAddr = bind_addr.parse()?;

    let cors_origin = env::var("CORS_ORIGIN").unwrap_or_else(|_err| "http://localhost:3030".into());

    let secret_key = env::var("SECRET_KEY")
        .map_err(|err| Error::new(err))
        .and_then(|env| {
            let mut secret_key = [0u8; digest::SHA256_OUTPUT_LEN];
            hex::decode_to_slice(env, &mut secret_key)?;
            Ok(secret_key)
        })
        .or_else(|_err| -> Result<_> {
            let mut secret_key = [0u8; digest::SHA256_OUTPUT_LEN];
            rand::rngs::OsRng.fill(&mut secret_key);

            tracing::warn!(
                "no secret key was specified, generated a new one; rerun with SECRET_KEY={} to keep sessions valid across restarts",
                hex::encode(secret_key)
            );

            Ok(secret_key)
        })?;

    let secret_key = hmac::Key::new(hmac::HMAC_SHA256, secret_key.as_ref());

    let config_path = env::var("QUIZ_CONFIG").unwrap_or_else(|_err| "quiz.toml".into());
    let config = fs::read_to_string(&config_path).await?;
    let config = Config::from_toml(&config)?;

    let catalog = Catalog::new(config.country)?;

    let map_config = config.map;
    let code_property = map_config.code_property.clone();
    let geography = tokio::task::spawn_blocking(move || {
        Geography::load(&map_config.geography_path, &map_config.code_property)
    })
    .await?;

    tracing::info!(
        %bind_addr,
        countries = catalog.len(),
        time_budget_secs = config.game.time_budget_secs,
        "starting geography quiz"
    );

    let quiz_controller = QuizController::new(secret_key, catalog, config.game, geography)
        .with_code_property(code_property);
    quiz_controller.spawn_reaper();

    let cors = warp::cors()
        .allow_origin(cors_origin.as_str())
        .allow_methods(vec!["GET", "POST", "PUT", "DELETE"])
        .allow_headers(vec!["Authorization", "Content-Type"]);

    warp::serve(routes(quiz_controller).with(cors))
        .run(bind_addr)
        .await;

    Ok(())
}
