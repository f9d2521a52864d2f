//! The in-memory state a user works against.
//!
//! [`StateStore`] owns one [`PersistedState`] and applies user operations to
//! it synchronously, in the order they are issued. It never touches storage;
//! callers persist [`StateStore::snapshot`] when they choose to.

use std::collections::HashSet;

use thiserror::Error;

use crate::generate::merge_generated_tasks;
use crate::migration::clamp_prompt;
use crate::models::{Mountain, MountainSummary, PersistedState, Task, TimeOfDay};
use crate::progress::{completion_percent, done_count, ProgressReport};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Mountain not found: {0}")]
    MountainNotFound(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Cannot delete the last remaining mountain")]
    LastMountain,
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateStore {
    state: PersistedState,
}

impl StateStore {
    /// Wrap an already normalized state. See [`crate::migration`].
    pub fn new(state: PersistedState) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &PersistedState {
        &self.state
    }

    pub fn snapshot(&self) -> PersistedState {
        self.state.clone()
    }

    pub fn into_state(self) -> PersistedState {
        self.state
    }

    /// Replace the whole state, e.g. after a remote document was loaded.
    pub fn replace(&mut self, state: PersistedState) {
        self.state = state;
    }

    // ============================================================
    // Mountains
    // ============================================================

    pub fn mountains(&self) -> &[Mountain] {
        &self.state.mountains
    }

    pub fn current(&self) -> &Mountain {
        self.state
            .mountains
            .iter()
            .find(|m| m.id == self.state.current_mountain_id)
            .unwrap_or(&self.state.mountains[0])
    }

    pub fn mountain(&self, id: &str) -> StoreResult<&Mountain> {
        self.state
            .mountains
            .iter()
            .find(|m| m.id == id)
            .ok_or_else(|| StoreError::MountainNotFound(id.to_string()))
    }

    fn mountain_mut(&mut self, id: &str) -> StoreResult<&mut Mountain> {
        self.state
            .mountains
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| StoreError::MountainNotFound(id.to_string()))
    }

    fn current_index(&self) -> usize {
        self.state
            .mountains
            .iter()
            .position(|m| m.id == self.state.current_mountain_id)
            .unwrap_or(0)
    }

    pub fn summaries(&self) -> Vec<MountainSummary> {
        let current = &self.current().id;
        self.state
            .mountains
            .iter()
            .map(|m| MountainSummary {
                id: m.id.clone(),
                title: m.title().to_string(),
                done: done_count(&m.tasks),
                total: m.tasks.len(),
                percent: completion_percent(&m.tasks),
                is_current: &m.id == current,
            })
            .collect()
    }

    /// Start a new, empty expedition and make it current.
    pub fn create_mountain(&mut self) -> &Mountain {
        let mountain = Mountain::new();
        self.state.current_mountain_id = mountain.id.clone();
        self.state.mountains.push(mountain);
        &self.state.mountains[self.state.mountains.len() - 1]
    }

    pub fn select_mountain(&mut self, id: &str) -> StoreResult<&Mountain> {
        let index = self
            .state
            .mountains
            .iter()
            .position(|m| m.id == id)
            .ok_or_else(|| StoreError::MountainNotFound(id.to_string()))?;
        self.state.current_mountain_id = id.to_string();
        Ok(&self.state.mountains[index])
    }

    /// Move the selection forward, wrapping around at the end.
    pub fn select_next(&mut self) -> &Mountain {
        self.step_selection(1)
    }

    /// Move the selection backward, wrapping around at the start.
    pub fn select_previous(&mut self) -> &Mountain {
        self.step_selection(self.state.mountains.len() - 1)
    }

    fn step_selection(&mut self, offset: usize) -> &Mountain {
        let count = self.state.mountains.len();
        let index = (self.current_index() + offset) % count;
        self.state.current_mountain_id = self.state.mountains[index].id.clone();
        &self.state.mountains[index]
    }

    /// Set or rename a mountain's goal. Surrounding whitespace is dropped.
    pub fn set_goal(&mut self, id: &str, goal: &str) -> StoreResult<&Mountain> {
        let mountain = self.mountain_mut(id)?;
        mountain.goal = goal.trim().to_string();
        Ok(&*mountain)
    }

    /// Delete a mountain. The last one cannot be deleted.
    ///
    /// Returns the photo references held by its tasks so the caller can
    /// release them.
    pub fn delete_mountain(&mut self, id: &str) -> StoreResult<Vec<String>> {
        let index = self
            .state
            .mountains
            .iter()
            .position(|m| m.id == id)
            .ok_or_else(|| StoreError::MountainNotFound(id.to_string()))?;
        if self.state.mountains.len() == 1 {
            return Err(StoreError::LastMountain);
        }

        let removed = self.state.mountains.remove(index);
        if self.state.current_mountain_id == removed.id {
            let next = index.min(self.state.mountains.len() - 1);
            self.state.current_mountain_id = self.state.mountains[next].id.clone();
        }
        Ok(removed.tasks.into_iter().filter_map(|t| t.photo).collect())
    }

    // ============================================================
    // Tasks
    // ============================================================

    /// Append a task. Blank text is ignored and yields `None`.
    pub fn add_task(&mut self, mountain_id: &str, text: &str) -> StoreResult<Option<&Task>> {
        let mountain = self.mountain_mut(mountain_id)?;
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }
        mountain.tasks.push(Task::new(text));
        Ok(mountain.tasks.last())
    }

    pub fn toggle_task(&mut self, mountain_id: &str, task_id: &str) -> StoreResult<&Task> {
        let task = self.task_mut(mountain_id, task_id)?;
        task.done = !task.done;
        Ok(&*task)
    }

    /// Remove a task, returning its photo reference for release.
    pub fn remove_task(&mut self, mountain_id: &str, task_id: &str) -> StoreResult<Option<String>> {
        let mountain = self.mountain_mut(mountain_id)?;
        let index = mountain
            .tasks
            .iter()
            .position(|t| t.id == task_id)
            .ok_or_else(|| StoreError::TaskNotFound(task_id.to_string()))?;
        Ok(mountain.tasks.remove(index).photo)
    }

    /// Attach or clear a photo, returning the reference it replaced.
    pub fn set_task_photo(
        &mut self,
        mountain_id: &str,
        task_id: &str,
        photo: Option<String>,
    ) -> StoreResult<Option<String>> {
        let task = self.task_mut(mountain_id, task_id)?;
        Ok(std::mem::replace(&mut task.photo, photo))
    }

    fn task_mut(&mut self, mountain_id: &str, task_id: &str) -> StoreResult<&mut Task> {
        self.mountain_mut(mountain_id)?
            .task_mut(task_id)
            .ok_or_else(|| StoreError::TaskNotFound(task_id.to_string()))
    }

    /// Append generated tasks that are not already on the mountain.
    pub fn merge_generated(
        &mut self,
        mountain_id: &str,
        texts: Vec<String>,
        cap: usize,
    ) -> StoreResult<Vec<Task>> {
        let mountain = self.mountain_mut(mountain_id)?;
        Ok(merge_generated_tasks(&mut mountain.tasks, texts, cap))
    }

    pub fn progress(&self, mountain_id: &str) -> StoreResult<ProgressReport> {
        let mountain = self.mountain(mountain_id)?;
        Ok(ProgressReport::compute(&mountain.goal, &mountain.tasks))
    }

    /// Every photo reference held by any task.
    pub fn photo_references(&self) -> HashSet<&str> {
        self.state
            .mountains
            .iter()
            .flat_map(|m| &m.tasks)
            .filter_map(|t| t.photo.as_deref())
            .collect()
    }

    /// The subset of `references` no task holds any more.
    pub fn unreferenced_photos(&self, references: impl IntoIterator<Item = String>) -> Vec<String> {
        let held = self.photo_references();
        let mut released: Vec<String> = Vec::new();
        for reference in references {
            if !held.contains(reference.as_str()) && !released.contains(&reference) {
                released.push(reference);
            }
        }
        released
    }

    // ============================================================
    // Preferences
    // ============================================================

    pub fn set_task_generation_prompt(&mut self, prompt: &str) {
        self.state.task_generation_prompt = clamp_prompt(prompt.to_string());
    }

    pub fn set_time_of_day(&mut self, time_of_day: TimeOfDay) {
        self.state.time_of_day = time_of_day;
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new(PersistedState::fresh())
    }
}
