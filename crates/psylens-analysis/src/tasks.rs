use std::collections::HashMap;

use tokio::sync::{RwLock, watch};
use uuid::Uuid;

use psylens_core::error::CoreError;
use psylens_core::models::task::AnalysisTask;

use crate::error::AnalysisError;

/// In-process registry of background tasks.
///
/// Each task lives behind its own watch channel: transitions are applied
/// atomically with `send_if_modified`, and waiters subscribe instead of
/// polling. Only the task's own transition methods mutate it, so a task
/// never leaves a terminal state.
#[derive(Default)]
pub struct TaskStore {
    tasks: RwLock<HashMap<Uuid, watch::Sender<AnalysisTask>>>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, task: AnalysisTask) {
        let (tx, _rx) = watch::channel(task);
        let task_id = tx.borrow().task_id;
        self.tasks.write().await.insert(task_id, tx);
    }

    pub async fn get(&self, task_id: Uuid) -> Option<AnalysisTask> {
        self.tasks
            .read()
            .await
            .get(&task_id)
            .map(|tx| tx.borrow().clone())
    }

    pub async fn subscribe(&self, task_id: Uuid) -> Option<watch::Receiver<AnalysisTask>> {
        self.tasks.read().await.get(&task_id).map(|tx| tx.subscribe())
    }

    /// Apply `transition` atomically and return the updated task.
    ///
    /// A rejected transition leaves the task untouched and wakes nobody.
    pub async fn update<F>(&self, task_id: Uuid, transition: F) -> Result<AnalysisTask, AnalysisError>
    where
        F: FnOnce(&mut AnalysisTask) -> Result<(), CoreError>,
    {
        let tasks = self.tasks.read().await;
        let tx = tasks
            .get(&task_id)
            .ok_or(AnalysisError::TaskNotFound(task_id))?;

        let mut transition = Some(transition);
        let mut outcome = Ok(None);
        tx.send_if_modified(|task| {
            let Some(apply) = transition.take() else {
                return false;
            };
            match apply(task) {
                Ok(()) => {
                    outcome = Ok(Some(task.clone()));
                    true
                }
                Err(e) => {
                    outcome = Err(e);
                    false
                }
            }
        });

        outcome?.ok_or_else(|| AnalysisError::Internal("task transition not applied".to_string()))
    }

    /// Drop tasks for which `keep` returns false. Returns how many were dropped.
    pub async fn retain<F>(&self, mut keep: F) -> usize
    where
        F: FnMut(&AnalysisTask) -> bool,
    {
        let mut tasks = self.tasks.write().await;
        let before = tasks.len();
        tasks.retain(|_, tx| keep(&tx.borrow()));
        before - tasks.len()
    }

    pub async fn len(&self) -> usize {
        self.tasks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tasks.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use psylens_core::models::analysis::{AnalysisRequest, AnalysisType, ProcessingMode};
    use psylens_core::models::task::TaskStatus;

    use super::*;

    fn queued() -> AnalysisTask {
        AnalysisTask::new(
            AnalysisRequest::new("I have not slept in days", AnalysisType::RiskAssessment)
                .with_mode(ProcessingMode::Async),
        )
    }

    #[tokio::test]
    async fn transitions_are_applied_and_observed() {
        let store = TaskStore::new();
        let task = queued();
        let id = task.task_id;
        store.insert(task).await;

        let mut rx = store.subscribe(id).await.unwrap();
        let updated = store
            .update(id, |t| t.start(jiff::Timestamp::now()))
            .await
            .unwrap();
        assert_eq!(updated.status, TaskStatus::Processing);
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().status, TaskStatus::Processing);
    }

    #[tokio::test]
    async fn rejected_transition_changes_nothing() {
        let store = TaskStore::new();
        let task = queued();
        let id = task.task_id;
        store.insert(task).await;

        let mut rx = store.subscribe(id).await.unwrap();
        let err = store
            .update(id, |t| t.complete(Uuid::new_v4(), jiff::Timestamp::now()))
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::TaskState(_)));
        assert!(!rx.has_changed().unwrap());
        assert_eq!(store.get(id).await.unwrap().status, TaskStatus::Queued);
    }

    #[tokio::test]
    async fn unknown_task_is_not_found() {
        let store = TaskStore::new();
        let err = store
            .update(Uuid::new_v4(), |t| t.cancel(jiff::Timestamp::now()))
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::TaskNotFound(_)));
    }

    #[tokio::test]
    async fn retain_drops_finished_tasks() {
        let store = TaskStore::new();
        let done = queued();
        let done_id = done.task_id;
        store.insert(done).await;
        store.insert(queued()).await;
        store
            .update(done_id, |t| t.cancel(jiff::Timestamp::now()))
            .await
            .unwrap();

        let dropped = store.retain(|t| !t.status.is_terminal()).await;
        assert_eq!(dropped, 1);
        assert_eq!(store.len().await, 1);
        assert!(store.get(done_id).await.is_none());
    }
}
