use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use coderun_core::environment::{packages_changed, InstallState};
use coderun_core::types::DbId;

use crate::error::DbError;
use crate::models::environment::{
    CreatePythonEnvironment, InstallOutcome, PythonEnvironment, UpdatePythonEnvironment,
};
use crate::store::{ApplyOutcome, EnvironmentStore};

#[derive(Debug, Default)]
struct State {
    next_id: DbId,
    rows: BTreeMap<DbId, PythonEnvironment>,
}

/// Process-local [`EnvironmentStore`]. Contents are lost on restart.
#[derive(Debug, Default)]
pub struct MemoryEnvironmentStore {
    state: Mutex<State>,
}

impl MemoryEnvironmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut State) -> T) -> T {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut state)
    }

    fn modify(&self, id: DbId, f: impl FnOnce(&mut PythonEnvironment)) -> bool {
        self.with_state(|state| match state.rows.get_mut(&id) {
            Some(row) => {
                f(row);
                row.updated_at = Utc::now();
                true
            }
            None => false,
        })
    }
}

#[async_trait]
impl EnvironmentStore for MemoryEnvironmentStore {
    async fn list(&self) -> Result<Vec<PythonEnvironment>, DbError> {
        let mut rows: Vec<PythonEnvironment> =
            self.with_state(|state| state.rows.values().cloned().collect());
        rows.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(rows)
    }

    async fn find_by_id(&self, id: DbId) -> Result<Option<PythonEnvironment>, DbError> {
        Ok(self.with_state(|state| state.rows.get(&id).cloned()))
    }

    async fn count(&self) -> Result<i64, DbError> {
        Ok(self.with_state(|state| state.rows.len() as i64))
    }

    async fn create(&self, dto: &CreatePythonEnvironment) -> Result<PythonEnvironment, DbError> {
        Ok(self.with_state(|state| {
            state.next_id += 1;
            let now = Utc::now();
            let row = PythonEnvironment {
                id: state.next_id,
                name: dto.name.clone(),
                description: dto.description.clone(),
                packages: dto.packages.clone(),
                install_state_id: InstallState::NotInstalled.id(),
                install_path: None,
                install_error: None,
                package_results: serde_json::Value::Array(Vec::new()),
                last_used_at: None,
                created_at: now,
                updated_at: now,
            };
            state.rows.insert(row.id, row.clone());
            row
        }))
    }

    async fn update(
        &self,
        id: DbId,
        dto: &UpdatePythonEnvironment,
    ) -> Result<Option<PythonEnvironment>, DbError> {
        let found = self.modify(id, |row| {
            if let Some(name) = &dto.name {
                row.name = name.clone();
            }
            if let Some(description) = &dto.description {
                row.description = Some(description.clone());
            }
            if let Some(packages) = &dto.packages {
                row.packages = packages.clone();
            }
            if dto.reset_install {
                row.install_state_id = InstallState::NotInstalled.id();
                row.install_error = None;
                row.package_results = serde_json::Value::Array(Vec::new());
            }
        });
        if !found {
            return Ok(None);
        }
        self.find_by_id(id).await
    }

    async fn delete(&self, id: DbId) -> Result<Option<PythonEnvironment>, DbError> {
        Ok(self.with_state(|state| state.rows.remove(&id)))
    }

    async fn mark_installing(&self, id: DbId) -> Result<bool, DbError> {
        Ok(self.modify(id, |row| {
            row.install_state_id = InstallState::Installing.id();
            row.install_error = None;
        }))
    }

    async fn reset_install(&self, id: DbId, reason: &str) -> Result<bool, DbError> {
        Ok(self.modify(id, |row| {
            row.install_state_id = InstallState::NotInstalled.id();
            row.install_path = None;
            row.install_error = Some(reason.to_string());
        }))
    }

    async fn apply_install_outcome(
        &self,
        id: DbId,
        expected_packages: &[String],
        outcome: &InstallOutcome,
    ) -> Result<ApplyOutcome, DbError> {
        Ok(self.with_state(|state| {
            let Some(row) = state.rows.get_mut(&id) else {
                return ApplyOutcome::Missing;
            };
            if packages_changed(&row.packages, expected_packages) {
                return ApplyOutcome::Superseded;
            }
            row.install_state_id = outcome.state.id();
            row.install_path = outcome.install_path.clone();
            row.install_error = outcome.install_error.clone();
            row.package_results = outcome.package_results_json();
            row.updated_at = Utc::now();
            ApplyOutcome::Applied
        }))
    }

    async fn touch_last_used(&self, id: DbId) -> Result<(), DbError> {
        self.modify(id, |row| row.last_used_at = Some(Utc::now()));
        Ok(())
    }

    async fn health_check(&self) -> Result<(), DbError> {
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
