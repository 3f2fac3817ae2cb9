use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::storage::{Slot, TaskPersistence};
use crate::task::{Counts, Task, TaskFilter};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum EditSession {
    #[default]
    Idle,
    Editing { id: String, draft: String },
}

impl EditSession {
    pub fn target(&self) -> Option<&str> {
        match self {
            EditSession::Idle => None,
            EditSession::Editing { id, .. } => Some(id.as_str()),
        }
    }
}

/// Owns the ordered task list (newest first), the active filter and the
/// edit session. Misuse such as unknown ids or blank text is a silent no-op.
#[derive(Debug)]
pub struct TaskStore<S: Slot> {
    tasks: Vec<Task>,
    filter: TaskFilter,
    edit: EditSession,
    persistence: TaskPersistence<S>,
    last_save_error: Option<String>,
}

impl<S: Slot> TaskStore<S> {
    /// Loads the saved list once; the store is ready afterwards.
    #[tracing::instrument(skip(persistence), fields(key = %persistence.key()))]
    pub fn open(persistence: TaskPersistence<S>) -> Self {
        let tasks = persistence.load();
        info!(count = tasks.len(), "task store ready");
        Self {
            tasks,
            filter: TaskFilter::default(),
            edit: EditSession::Idle,
            persistence,
            last_save_error: None,
        }
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn filter(&self) -> TaskFilter {
        self.filter
    }

    pub fn edit_session(&self) -> &EditSession {
        &self.edit
    }

    pub fn last_save_error(&self) -> Option<&str> {
        self.last_save_error.as_deref()
    }

    pub fn persistence(&self) -> &TaskPersistence<S> {
        &self.persistence
    }

    pub fn add(&mut self, text: &str) -> Option<String> {
        self.add_at(text, Utc::now())
    }

    #[tracing::instrument(skip(self, text, now))]
    pub fn add_at(&mut self, text: &str, now: DateTime<Utc>) -> Option<String> {
        let text = text.trim();
        if text.is_empty() {
            debug!("ignoring blank task text");
            return None;
        }

        let task = Task::new(text.to_string(), now);
        let id = task.id.clone();
        self.tasks.insert(0, task);
        debug!(id = %id, count = self.tasks.len(), "task added");
        self.persist();
        Some(id)
    }

    /// Returns the new completion state, or `None` if `id` is unknown.
    #[tracing::instrument(skip(self))]
    pub fn toggle(&mut self, id: &str) -> Option<bool> {
        let task = self.tasks.iter_mut().find(|t| t.id == id)?;
        task.completed = !task.completed;
        let completed = task.completed;
        debug!(completed, "task toggled");
        self.persist();
        Some(completed)
    }

    #[tracing::instrument(skip(self))]
    pub fn remove(&mut self, id: &str) -> bool {
        let Some(idx) = self.tasks.iter().position(|t| t.id == id) else {
            debug!("remove: no such task");
            return false;
        };

        self.tasks.remove(idx);
        if self.edit.target() == Some(id) {
            debug!("removed task was being edited; cancelling edit");
            self.edit = EditSession::Idle;
        }
        self.persist();
        true
    }

    /// Replaces any edit already in progress, discarding its draft.
    #[tracing::instrument(skip(self, current_text))]
    pub fn begin_edit(&mut self, id: &str, current_text: &str) {
        if self.get(id).is_none() {
            debug!("begin_edit: no such task");
            return;
        }
        if let Some(previous) = self.edit.target()
            && previous != id
        {
            debug!(previous = %previous, "abandoning unsaved edit");
        }
        self.edit = EditSession::Editing {
            id: id.to_string(),
            draft: current_text.to_string(),
        };
    }

    pub fn update_draft(&mut self, text: &str) {
        if let EditSession::Editing { draft, .. } = &mut self.edit {
            *draft = text.to_string();
        }
    }

    /// Ends the edit session whatever happens; returns whether a task changed.
    #[tracing::instrument(skip(self))]
    pub fn commit_edit(&mut self) -> bool {
        let EditSession::Editing { id, draft } = std::mem::take(&mut self.edit) else {
            return false;
        };

        let text = draft.trim();
        if text.is_empty() {
            debug!(id = %id, "blank draft; leaving task unchanged");
            return false;
        }
        let Some(task) = self.tasks.iter_mut().find(|t| t.id == id) else {
            debug!(id = %id, "edited task no longer exists");
            return false;
        };

        task.text = text.to_string();
        debug!(id = %id, "task text updated");
        self.persist();
        true
    }

    pub fn cancel_edit(&mut self) {
        self.edit = EditSession::Idle;
    }

    pub fn set_filter(&mut self, filter: TaskFilter) {
        self.filter = filter;
    }

    /// Tasks matching the current filter, in store order.
    pub fn visible_tasks(&self) -> impl Iterator<Item = &Task> + Clone {
        let filter = self.filter;
        self.tasks.iter().filter(move |t| filter.matches(t))
    }

    pub fn counts(&self) -> Counts {
        let completed = self.tasks.iter().filter(|t| t.completed).count();
        Counts {
            active: self.tasks.len() - completed,
            completed,
        }
    }

    fn persist(&mut self) {
        match self.persistence.save(&self.tasks) {
            Ok(()) => self.last_save_error = None,
            Err(err) => {
                let message = format!("{err:#}");
                warn!(error = %message, "failed to save tasks; continuing");
                self.last_save_error = Some(message);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;
    use chrono::{Duration, TimeZone, Utc};

    use super::{EditSession, TaskStore};
    use crate::storage::{MemorySlot, Slot, TaskPersistence};
    use crate::task::TaskFilter;

    fn empty_store() -> TaskStore<MemorySlot> {
        TaskStore::open(TaskPersistence::new(MemorySlot::new()))
    }

    fn saved_json(store: &TaskStore<MemorySlot>) -> Option<String> {
        store.persistence().slot().get("todos").unwrap()
    }

    #[derive(Debug, Default)]
    struct CountingSlot {
        inner: MemorySlot,
        writes: usize,
        fail: bool,
    }

    impl Slot for CountingSlot {
        fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
            self.inner.get(key)
        }

        fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
            if self.fail {
                return Err(anyhow!("disk full"));
            }
            self.writes += 1;
            self.inner.set(key, value)
        }
    }

    fn writes(store: &TaskStore<CountingSlot>) -> usize {
        store.persistence().slot().writes
    }

    #[test]
    fn adds_are_newest_first_and_blank_text_is_ignored() {
        let mut store = empty_store();
        let texts = ["first", "  ", "second", "", "\t third \n"];
        for text in texts {
            store.add(text);
        }

        let stored: Vec<&str> = store.tasks().iter().map(|t| t.text.as_str()).collect();
        assert_eq!(stored, vec!["third", "second", "first"]);
        assert!(store.add("").is_none());
        assert!(store.add("   ").is_none());
        assert_eq!(store.tasks().len(), 3);
    }

    #[test]
    fn add_captures_creation_time() {
        let mut store = empty_store();
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 9, 30, 0).unwrap();
        let id = store.add_at("Stretch", now).unwrap();
        let task = store.get(&id).unwrap();
        assert_eq!(task.created_at, now);
        assert!(!task.completed);
    }

    #[test]
    fn toggling_twice_restores_state() {
        let mut store = empty_store();
        let id = store.add("Read a chapter").unwrap();

        assert_eq!(store.toggle(&id), Some(true));
        assert_eq!(store.toggle(&id), Some(false));
        assert!(!store.get(&id).unwrap().completed);
        assert_eq!(store.toggle("missing"), None);
    }

    #[test]
    fn removing_twice_is_a_no_op_the_second_time() {
        let mut store = empty_store();
        let keep = store.add("keep").unwrap();
        let gone = store.add("gone").unwrap();

        assert!(store.remove(&gone));
        assert!(!store.remove(&gone));
        assert_eq!(store.tasks().len(), 1);
        assert_eq!(store.tasks()[0].id, keep);
    }

    #[test]
    fn removing_the_edited_task_cancels_the_edit() {
        let mut store = empty_store();
        let a = store.add("a").unwrap();
        let b = store.add("b").unwrap();

        store.begin_edit(&b, "b");
        store.remove(&a);
        assert_eq!(store.edit_session().target(), Some(b.as_str()));

        store.remove(&b);
        assert_eq!(store.edit_session(), &EditSession::Idle);
    }

    #[test]
    fn counts_cover_the_whole_list_regardless_of_filter() {
        let mut store = empty_store();
        let ids: Vec<String> = (0..5).filter_map(|i| store.add(&format!("task {i}"))).collect();
        store.toggle(&ids[1]);
        store.toggle(&ids[3]);
        store.set_filter(TaskFilter::Completed);

        let counts = store.counts();
        assert_eq!(counts.active, 3);
        assert_eq!(counts.completed, 2);
        assert_eq!(counts.total(), store.tasks().len());
    }

    #[test]
    fn visible_tasks_follow_filter_in_store_order() {
        let mut store = empty_store();
        let ids: Vec<String> = ["one", "two", "three", "four"]
            .iter()
            .filter_map(|text| store.add(text))
            .collect();
        store.toggle(&ids[0]);
        store.toggle(&ids[2]);

        let texts = |store: &TaskStore<MemorySlot>| -> Vec<String> {
            store.visible_tasks().map(|t| t.text.clone()).collect()
        };

        assert_eq!(texts(&store), vec!["four", "three", "two", "one"]);
        store.set_filter(TaskFilter::Active);
        assert_eq!(texts(&store), vec!["four", "two"]);
        store.set_filter(TaskFilter::Completed);
        assert_eq!(texts(&store), vec!["three", "one"]);
    }

    #[test]
    fn visible_tasks_can_be_restarted() {
        let mut store = empty_store();
        store.add("a");
        store.add("b");

        let view = store.visible_tasks();
        assert_eq!(view.clone().count(), 2);
        assert_eq!(view.count(), 2);
    }

    #[test]
    fn commit_applies_to_the_latest_edit_target() {
        let mut store = empty_store();
        let a = store.add("alpha").unwrap();
        let b = store.add("beta").unwrap();

        store.begin_edit(&a, "alpha");
        store.update_draft("alpha draft");
        store.begin_edit(&b, "beta");
        store.update_draft("  beta, revised ");
        assert!(store.commit_edit());

        assert_eq!(store.get(&a).unwrap().text, "alpha");
        assert_eq!(store.get(&b).unwrap().text, "beta, revised");
        assert_eq!(store.edit_session(), &EditSession::Idle);
    }

    #[test]
    fn blank_draft_keeps_text_but_closes_session() {
        let mut store = empty_store();
        let id = store.add("walk the dog").unwrap();

        store.begin_edit(&id, "walk the dog");
        store.update_draft("   ");
        assert!(!store.commit_edit());
        assert_eq!(store.get(&id).unwrap().text, "walk the dog");
        assert_eq!(store.edit_session(), &EditSession::Idle);
    }

    #[test]
    fn draft_is_kept_verbatim_until_commit() {
        let mut store = empty_store();
        let id = store.add("x").unwrap();
        store.begin_edit(&id, "x");
        store.update_draft("  padded  ");
        assert_eq!(
            store.edit_session(),
            &EditSession::Editing {
                id: id.clone(),
                draft: "  padded  ".to_string()
            }
        );
    }

    #[test]
    fn edit_operations_without_a_session_do_nothing() {
        let mut store = empty_store();
        let id = store.add("x").unwrap();

        store.update_draft("ignored");
        assert_eq!(store.edit_session(), &EditSession::Idle);
        assert!(!store.commit_edit());

        store.begin_edit("missing", "whatever");
        assert_eq!(store.edit_session(), &EditSession::Idle);

        store.begin_edit(&id, "x");
        store.begin_edit("missing", "whatever");
        assert_eq!(store.edit_session().target(), Some(id.as_str()));
    }

    #[test]
    fn cancel_discards_draft() {
        let mut store = empty_store();
        let id = store.add("original").unwrap();
        store.begin_edit(&id, "original");
        store.update_draft("changed");
        store.cancel_edit();

        assert_eq!(store.edit_session(), &EditSession::Idle);
        assert_eq!(store.get(&id).unwrap().text, "original");
    }

    #[test]
    fn only_durable_changes_are_saved() {
        let mut store = TaskStore::open(TaskPersistence::new(CountingSlot::default()));
        let id = store.add("water plants").unwrap();
        assert_eq!(writes(&store), 1);

        store.add("  ");
        store.set_filter(TaskFilter::Active);
        store.begin_edit(&id, "water plants");
        store.update_draft("water the plants");
        store.cancel_edit();
        store.toggle("missing");
        store.remove("missing");
        assert_eq!(writes(&store), 1);

        store.toggle(&id);
        assert_eq!(writes(&store), 2);

        store.begin_edit(&id, "water plants");
        store.update_draft("");
        store.commit_edit();
        assert_eq!(writes(&store), 2);

        store.begin_edit(&id, "water plants");
        store.update_draft("water the plants");
        store.commit_edit();
        assert_eq!(writes(&store), 3);

        store.remove(&id);
        assert_eq!(writes(&store), 4);
    }

    #[test]
    fn failed_writes_are_tolerated_and_reported() {
        let slot = CountingSlot {
            fail: true,
            ..CountingSlot::default()
        };
        let mut store = TaskStore::open(TaskPersistence::new(slot));

        let id = store.add("still here").unwrap();
        assert_eq!(store.tasks().len(), 1);
        assert!(store.last_save_error().unwrap().contains("disk full"));

        store.persistence.slot_mut().fail = false;
        store.toggle(&id);
        assert!(store.last_save_error().is_none());
        assert_eq!(writes(&store), 1);
    }

    #[test]
    fn every_mutation_is_reflected_in_the_slot() {
        let mut store = empty_store();
        let now = Utc.with_ymd_and_hms(2025, 2, 3, 4, 5, 6).unwrap();
        let first = store.add_at("first", now).unwrap();
        store.add_at("second", now + Duration::seconds(1));
        store.toggle(&first);

        let reopened = TaskStore::open(TaskPersistence::new(MemorySlot::with_entry(
            "todos",
            &saved_json(&store).unwrap(),
        )));
        assert_eq!(reopened.tasks(), store.tasks());
        assert_eq!(reopened.filter(), TaskFilter::All);
    }

    #[test]
    fn buy_milk_scenario() {
        let mut store = empty_store();
        let id = store.add("Buy milk").unwrap();
        assert_eq!(store.tasks().len(), 1);
        assert_eq!(store.tasks()[0].text, "Buy milk");
        assert!(!store.tasks()[0].completed);

        store.toggle(&id);
        assert!(store.tasks()[0].completed);

        let counts = store.counts();
        assert_eq!((counts.active, counts.completed), (0, 1));

        store.set_filter("active".parse().unwrap());
        assert_eq!(store.visible_tasks().count(), 0);
    }
}
