use anyhow::{anyhow, Result};
use rand::prelude::*;
use ring::hmac;
use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::time::{self, Instant};

use crate::map::{self, Geography, PaintStyle};
use crate::models::{Catalog, GameConfig, MapConfig, SessionId};
use crate::session::{Deferred, Effect, Session, SessionSnapshot};

const REAP_PERIOD: Duration = Duration::from_secs(60);

#[derive(Debug)]
struct SessionEntry {
    session: Session,
    last_seen: Instant,
}

/// Owns every live quiz session. All transitions, whether triggered by a
/// request or by a timer, run under the same lock.
#[derive(Clone, Debug)]
pub struct QuizController {
    secret_key: Arc<hmac::Key>,
    catalog: Arc<Catalog>,
    game: Arc<GameConfig>,
    geography: Arc<Geography>,
    code_property: Arc<str>,
    sessions: Arc<Mutex<BTreeMap<SessionId, SessionEntry>>>,
}

impl QuizController {
    pub fn new(
        secret_key: hmac::Key,
        catalog: Catalog,
        game: GameConfig,
        geography: Geography,
    ) -> QuizController {
        QuizController {
            secret_key: Arc::new(secret_key),
            catalog: Arc::new(catalog),
            game: Arc::new(game),
            geography: Arc::new(geography),
            code_property: MapConfig::default().code_property.into(),
            sessions: Default::default(),
        }
    }

    /// Sets the feature property the geography document keys regions by.
    pub fn with_code_property(mut self, code_property: impl Into<String>) -> QuizController {
        self.code_property = code_property.into().into();
        self
    }

    pub fn code_property(&self) -> &str {
        &self.code_property
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn game(&self) -> &GameConfig {
        &self.game
    }

    pub fn geography(&self) -> &Geography {
        &self.geography
    }

    pub fn create_session(&self) -> Result<(SessionId, SessionSnapshot)> {
        let id = {
            let mut id = [0u8; 16];
            rand::rngs::OsRng.fill(&mut id);
            SessionId(id)
        };

        let session = Session::new(self.catalog.clone(), &self.game);
        let snapshot = session.snapshot();

        self.lock()?.insert(
            id,
            SessionEntry {
                session,
                last_seen: Instant::now(),
            },
        );

        tracing::info!(session = %id, "session created");
        Ok((id, snapshot))
    }

    pub fn decode_token(&self, token: &str) -> Result<SessionId> {
        let mut parts = token.splitn(2, ':');
        let session_id = parts
            .next()
            .ok_or_else(|| anyhow!("bad session token"))?;
        let session_id = base64::decode_config(session_id, base64::URL_SAFE_NO_PAD)?;

        let signature = parts
            .next()
            .ok_or_else(|| anyhow!("bad session token"))?;
        let signature = base64::decode_config(signature, base64::URL_SAFE_NO_PAD)?;

        hmac::verify(&self.secret_key, &session_id, &signature)
            .map_err(|_err| anyhow!("invalid signature"))?;

        let id = bincode::deserialize(&session_id)?;
        Ok(id)
    }

    pub fn encode_token(&self, id: &SessionId) -> Result<String> {
        let session_id = bincode::serialize(id)?;

        let signature = hmac::sign(&self.secret_key, &session_id);

        let token = format!(
            "{}:{}",
            base64::encode_config(session_id, base64::URL_SAFE_NO_PAD),
            base64::encode_config(signature, base64::URL_SAFE_NO_PAD),
        );

        Ok(token)
    }

    pub fn snapshot(&self, id: SessionId) -> Result<Option<SessionSnapshot>> {
        self.update(id, true, |session| session.snapshot())
    }

    pub fn start(&self, id: SessionId) -> Result<Option<SessionSnapshot>> {
        let started = self.update(id, true, |session| {
            let effects = session.start(&mut thread_rng());
            (effects, session.snapshot())
        })?;

        Ok(started.map(|(effects, snapshot)| {
            tracing::info!(session = %id, country = ?snapshot.target, "quiz started");
            self.run_effects(id, effects);
            snapshot
        }))
    }

    pub fn set_input(&self, id: SessionId, text: &str) -> Result<Option<SessionSnapshot>> {
        self.update(id, true, |session| {
            session.set_input(text);
            session.snapshot()
        })
    }

    /// Submits `answer` (or the pending input when absent) as a guess.
    pub fn guess(&self, id: SessionId, answer: Option<&str>) -> Result<Option<SessionSnapshot>> {
        let guessed = self.update(id, true, |session| {
            if let Some(answer) = answer {
                session.set_input(answer);
            }
            let effects = session.guess();
            (effects, session.snapshot())
        })?;

        Ok(guessed.map(|(effects, snapshot)| {
            tracing::debug!(
                session = %id,
                feedback = ?snapshot.feedback,
                score = snapshot.score,
                "guess"
            );
            self.run_effects(id, effects);
            snapshot
        }))
    }

    pub fn hint(&self, id: SessionId) -> Result<Option<SessionSnapshot>> {
        self.update(id, true, |session| {
            session.request_hint();
            session.snapshot()
        })
    }

    pub fn skip(&self, id: SessionId) -> Result<Option<SessionSnapshot>> {
        self.update(id, true, |session| {
            session.skip(&mut thread_rng());
            session.snapshot()
        })
    }

    pub fn styles(&self, id: SessionId) -> Result<Option<BTreeMap<String, PaintStyle>>> {
        let geography = self.geography.clone();
        self.update(id, true, |session| match geography.document() {
            Some(document) => map::style_sheet(document, session),
            None => BTreeMap::new(),
        })
    }

    /// Drops the session. Any ticker or delayed task still pending for it
    /// finds nothing to act on and exits.
    pub fn end_session(&self, id: SessionId) -> Result<bool> {
        let removed = self.lock()?.remove(&id).is_some();
        if removed {
            tracing::info!(session = %id, "session ended");
        }
        Ok(removed)
    }

    pub fn reap_idle(&self) -> Result<usize> {
        let idle_timeout = self.game.idle_timeout();
        let now = Instant::now();

        let mut sessions = self.lock()?;
        let before = sessions.len();
        sessions.retain(|_id, entry| now.duration_since(entry.last_seen) <= idle_timeout);

        Ok(before - sessions.len())
    }

    pub fn spawn_reaper(&self) {
        let controller = self.clone();
        tokio::spawn(async move {
            let mut interval = time::interval_at(Instant::now() + REAP_PERIOD, REAP_PERIOD);
            loop {
                interval.tick().await;
                match controller.reap_idle() {
                    Ok(0) => {}
                    Ok(reaped) => tracing::info!(reaped, "expired idle sessions"),
                    Err(error) => tracing::error!(%error, "couldn't expire idle sessions"),
                }
            }
        });
    }

    fn run_effects(&self, id: SessionId, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::StartTicker { play } => self.spawn_ticker(id, play),
                Effect::Schedule { after, task } => self.spawn_deferred(id, after, task),
            }
        }
    }

    fn spawn_ticker(&self, id: SessionId, play: u64) {
        const SECOND: Duration = Duration::from_secs(1);

        let controller = self.clone();
        let mut interval = time::interval_at(Instant::now() + SECOND, SECOND);

        tokio::spawn(async move {
            loop {
                interval.tick().await;

                match controller.update(id, false, |session| session.tick(play)) {
                    Ok(Some(true)) => {}
                    Ok(_) => break,
                    Err(error) => {
                        tracing::error!(session = %id, %error, "ticker failed");
                        break;
                    }
                }
            }

            tracing::debug!(session = %id, play, "ticker stopped");
        });
    }

    fn spawn_deferred(&self, id: SessionId, after: Duration, task: Deferred) {
        let controller = self.clone();
        let deadline = Instant::now() + after;

        tokio::spawn(async move {
            time::sleep_until(deadline).await;

            let fired = controller.update(id, false, |session| {
                session.fire(task, &mut thread_rng());
            });
            if let Err(error) = fired {
                tracing::error!(session = %id, ?task, %error, "deferred task failed");
            }
        });
    }

    fn update<T>(
        &self,
        id: SessionId,
        touch: bool,
        f: impl FnOnce(&mut Session) -> T,
    ) -> Result<Option<T>> {
        let mut sessions = self.lock()?;

        Ok(sessions.get_mut(&id).map(|entry| {
            if touch {
                entry.last_seen = Instant::now();
            }
            f(&mut entry.session)
        }))
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<SessionId, SessionEntry>>> {
        self.sessions
            .lock()
            .map_err(|_err| anyhow!("couldn't lock sessions"))
    }
}
