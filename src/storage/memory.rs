//! In-memory [`Store`] for router tests.

use anyhow::{anyhow, Result};
use chrono::Utc;
use std::sync::{Arc, Mutex};

use super::{CreateUserOutcome, NewTrade, NewUser, Store, User};
use crate::identity::BoxFuture;

#[derive(Default)]
struct State {
    users: Vec<User>,
    trades: Vec<NewTrade>,
}

#[derive(Clone, Default)]
pub(crate) struct MemoryStore {
    state: Arc<Mutex<State>>,
    unavailable: bool,
}

impl MemoryStore {
    /// A store whose every call fails, as if the database were down.
    pub(crate) fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    pub(crate) fn with_user(self, user_id: &str, email: &str) -> Self {
        self.insert(User {
            user_id: user_id.to_string(),
            email: email.to_string(),
            first_name: "Alice".to_string(),
            last_name: "Liddell".to_string(),
            full_name: "Alice Liddell".to_string(),
            profile_url: None,
            created_at: Utc::now(),
        });
        self
    }

    fn insert(&self, user: User) {
        if let Ok(mut state) = self.state.lock() {
            state.users.push(user);
        }
    }

    pub(crate) fn users(&self) -> Vec<User> {
        self.state
            .lock()
            .map(|state| state.users.clone())
            .unwrap_or_default()
    }

    pub(crate) fn trades(&self) -> Vec<NewTrade> {
        self.state
            .lock()
            .map(|state| state.trades.clone())
            .unwrap_or_default()
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut State) -> T) -> Result<T> {
        if self.unavailable {
            return Err(anyhow!("database unavailable"));
        }
        let mut state = self
            .state
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))?;
        Ok(f(&mut state))
    }
}

impl Store for MemoryStore {
    fn user_by_email<'a>(&'a self, email: &'a str) -> BoxFuture<'a, Result<Option<User>>> {
        Box::pin(async move {
            self.with_state(|state| state.users.iter().find(|u| u.email == email).cloned())
        })
    }

    fn user_by_id<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, Result<Option<User>>> {
        Box::pin(async move {
            self.with_state(|state| state.users.iter().find(|u| u.user_id == user_id).cloned())
        })
    }

    fn create_user<'a>(&'a self, user: &'a NewUser) -> BoxFuture<'a, Result<CreateUserOutcome>> {
        Box::pin(async move {
            self.with_state(|state| {
                if state
                    .users
                    .iter()
                    .any(|u| u.user_id == user.user_id || u.email == user.email)
                {
                    return CreateUserOutcome::Conflict;
                }
                state.users.push(User {
                    user_id: user.user_id.clone(),
                    email: user.email.clone(),
                    first_name: user.first_name.clone(),
                    last_name: user.last_name.clone(),
                    full_name: user.full_name.clone(),
                    profile_url: None,
                    created_at: Utc::now(),
                });
                CreateUserOutcome::Created
            })
        })
    }

    fn create_trade<'a>(&'a self, trade: &'a NewTrade) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move { self.with_state(|state| state.trades.push(trade.clone())) })
    }

    fn ping(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move { self.with_state(|_| ()) })
    }
}
