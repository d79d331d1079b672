use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::{GameConfig, DEFAULT_LEVEL_LABELS};
use crate::events::{EventBus, EventKind, EventQueue, GameEvent, HandlerError, SubscriptionSet};
use crate::save::{merge_state, SaveStore};

/// Key of the progress object inside the saved state.
pub const PROGRESS_STATE_KEY: &str = "progress";

/// Ordered level labels with a fixed xp step between them.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelTable {
    labels: Vec<String>,
    xp_per_level: u32,
}

impl Default for LevelTable {
    fn default() -> Self {
        Self::new(DEFAULT_LEVEL_LABELS.iter().map(ToString::to_string), 200)
    }
}

impl LevelTable {
    pub fn new(labels: impl IntoIterator<Item = String>, xp_per_level: u32) -> Self {
        let mut labels: Vec<String> = labels.into_iter().collect();
        if labels.is_empty() {
            labels = DEFAULT_LEVEL_LABELS.iter().map(ToString::to_string).collect();
        }
        Self {
            labels,
            xp_per_level: xp_per_level.max(1),
        }
    }

    pub fn from_config(config: &GameConfig) -> Self {
        Self::new(config.level_labels.iter().cloned(), config.xp_per_level)
    }

    pub fn label(&self, index: usize) -> &str {
        self.labels
            .get(index)
            .or_else(|| self.labels.last())
            .map_or("", String::as_str)
    }

    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.labels.iter().position(|candidate| candidate == label)
    }

    pub fn last_index(&self) -> usize {
        self.labels.len().saturating_sub(1)
    }

    /// Total xp needed to leave level `index`.
    pub fn threshold(&self, index: usize) -> u64 {
        (index as u64 + 1) * u64::from(self.xp_per_level)
    }

    pub fn level_for_xp(&self, xp: u32) -> usize {
        let mut index = 0;
        while index < self.last_index() && u64::from(xp) >= self.threshold(index) {
            index += 1;
        }
        index
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Progress {
    pub xp: u32,
    pub level_index: usize,
    pub completed_lessons: BTreeSet<String>,
    pub known_vocab: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SavedProgress {
    #[serde(default)]
    xp: u32,
    #[serde(default)]
    level: String,
    #[serde(default)]
    completed_lessons: Vec<String>,
    #[serde(default)]
    known_vocab: Vec<String>,
}

/// Experience, level and learned content, persisted after every change.
pub struct ProgressTracker {
    progress: Progress,
    levels: LevelTable,
    store: Rc<dyn SaveStore>,
    slot: u32,
    lesson_default_xp: u32,
}

impl ProgressTracker {
    /// Reads the slot once; anything unusable starts fresh.
    pub fn load(store: Rc<dyn SaveStore>, slot: u32, levels: LevelTable, lesson_default_xp: u32) -> Self {
        let saved = store
            .load(slot)
            .and_then(|state| state.get(PROGRESS_STATE_KEY).cloned())
            .and_then(|value| match serde_json::from_value::<SavedProgress>(value) {
                Ok(saved) => Some(saved),
                Err(error) => {
                    warn!(slot, error = %error, "progress_load_failed_starting_fresh");
                    None
                }
            });

        let progress = match saved {
            Some(saved) => {
                let level_index = levels.index_of(&saved.level).unwrap_or_else(|| {
                    let fallback = levels.level_for_xp(saved.xp);
                    warn!(level = %saved.level, fallback = levels.label(fallback), "progress_level_unknown");
                    fallback
                });
                Progress {
                    xp: saved.xp,
                    level_index,
                    completed_lessons: saved.completed_lessons.into_iter().collect(),
                    known_vocab: saved.known_vocab.into_iter().collect(),
                }
            }
            None => Progress::default(),
        };
        info!(slot, xp = progress.xp, level = levels.label(progress.level_index), "progress_loaded");

        Self {
            progress,
            levels,
            store,
            slot,
            lesson_default_xp,
        }
    }

    pub fn progress(&self) -> &Progress {
        &self.progress
    }

    pub fn xp(&self) -> u32 {
        self.progress.xp
    }

    pub fn level_index(&self) -> usize {
        self.progress.level_index
    }

    pub fn level_label(&self) -> &str {
        self.levels.label(self.progress.level_index)
    }

    pub fn levels(&self) -> &LevelTable {
        &self.levels
    }

    pub fn add_experience(&mut self, amount: u32, events: &mut EventQueue) {
        self.apply_experience(amount, events);
        self.persist();
    }

    pub fn complete_lesson(&mut self, lesson: &str, xp: Option<u32>, vocab: &[String], events: &mut EventQueue) {
        self.progress.completed_lessons.insert(lesson.to_string());
        self.progress.known_vocab.extend(vocab.iter().cloned());
        self.apply_experience(xp.unwrap_or(self.lesson_default_xp), events);
        self.persist();
    }

    pub fn record_quiz(&mut self, score: u32, events: &mut EventQueue) {
        self.add_experience(score, events);
    }

    pub fn learn_word(&mut self, word: &str) {
        if self.progress.known_vocab.insert(word.to_string()) {
            self.persist();
        }
    }

    /// Level-ups are emitted one per threshold crossed, in order.
    fn apply_experience(&mut self, amount: u32, events: &mut EventQueue) {
        self.progress.xp = self.progress.xp.saturating_add(amount);
        while self.progress.level_index < self.levels.last_index()
            && u64::from(self.progress.xp) >= self.levels.threshold(self.progress.level_index)
        {
            self.progress.level_index += 1;
            let level = self.levels.label(self.progress.level_index).to_string();
            info!(level = %level, xp = self.progress.xp, "level_up");
            events.emit(GameEvent::LevelUp {
                level,
                level_index: self.progress.level_index,
            });
        }
    }

    fn persist(&self) {
        let saved = SavedProgress {
            xp: self.progress.xp,
            level: self.level_label().to_string(),
            completed_lessons: self.progress.completed_lessons.iter().cloned().collect(),
            known_vocab: self.progress.known_vocab.iter().cloned().collect(),
        };
        let value = match serde_json::to_value(&saved) {
            Ok(value) => value,
            Err(error) => {
                warn!(error = %error, "progress_encode_failed");
                return;
            }
        };
        let state = merge_state(self.store.load(self.slot), PROGRESS_STATE_KEY, value);
        if let Err(error) = self.store.save(self.slot, &state) {
            warn!(slot = self.slot, error = %error, "progress_save_failed");
        }
    }

    /// Wires lesson, quiz and vocabulary events to the tracker.
    pub fn subscribe(tracker: &Rc<RefCell<Self>>, bus: &EventBus) -> SubscriptionSet {
        let mut subscriptions = SubscriptionSet::new();
        for kind in [
            EventKind::LessonCompleted,
            EventKind::QuizCompleted,
            EventKind::VocabularyLearned,
        ] {
            let tracker = Rc::clone(tracker);
            subscriptions.push(bus.subscribe(kind, move |event, queue| {
                let mut tracker = tracker
                    .try_borrow_mut()
                    .map_err(|_| HandlerError::new("progress tracker already borrowed"))?;
                match event {
                    GameEvent::LessonCompleted { lesson, xp, vocab } => {
                        tracker.complete_lesson(lesson, *xp, vocab, queue);
                    }
                    GameEvent::QuizCompleted { score, .. } => tracker.record_quiz(*score, queue),
                    GameEvent::VocabularyLearned { word } => tracker.learn_word(word),
                    _ => {}
                }
                Ok(())
            }));
        }
        subscriptions
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::save::MemorySaveStore;

    fn tracker_with(store: Rc<MemorySaveStore>) -> ProgressTracker {
        ProgressTracker::load(store, 0, LevelTable::default(), 20)
    }

    fn level_ups(events: &mut EventQueue) -> Vec<(String, usize)> {
        events
            .take()
            .into_iter()
            .filter_map(|event| match event {
                GameEvent::LevelUp { level, level_index } => Some((level, level_index)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn crossing_two_thresholds_emits_two_level_ups_in_order() {
        let store = Rc::new(MemorySaveStore::new());
        let mut tracker = tracker_with(Rc::clone(&store));
        let mut events = EventQueue::new();
        tracker.add_experience(190, &mut events);
        assert!(level_ups(&mut events).is_empty());

        tracker.add_experience(250, &mut events);

        assert_eq!(tracker.xp(), 440);
        assert_eq!(tracker.level_index(), 2);
        assert_eq!(
            level_ups(&mut events),
            vec![("A2".to_string(), 1), ("B1".to_string(), 2)]
        );
    }

    #[test]
    fn level_stops_at_last_label() {
        let store = Rc::new(MemorySaveStore::new());
        let mut tracker = tracker_with(store);
        let mut events = EventQueue::new();

        tracker.add_experience(10_000, &mut events);

        assert_eq!(tracker.level_label(), "C2");
        assert_eq!(level_ups(&mut events).len(), 5);
        tracker.add_experience(10_000, &mut events);
        assert!(level_ups(&mut events).is_empty());
    }

    #[test]
    fn every_mutation_persists_and_merges() {
        let store = Rc::new(MemorySaveStore::new());
        store
            .save(0, &json!({ "settings": { "music": false } }))
            .expect("seed");
        let mut tracker = tracker_with(Rc::clone(&store));
        let mut events = EventQueue::new();

        tracker.complete_lesson("greetings", None, &["kaixo".to_string()], &mut events);

        let state = store.load(0).expect("saved");
        assert_eq!(state["settings"], json!({ "music": false }));
        assert_eq!(state["progress"]["xp"], json!(20));
        assert_eq!(state["progress"]["level"], json!("A1"));
        assert_eq!(state["progress"]["completedLessons"], json!(["greetings"]));
        assert_eq!(state["progress"]["knownVocab"], json!(["kaixo"]));
    }

    #[test]
    fn reload_restores_saved_progress() {
        let store = Rc::new(MemorySaveStore::new());
        {
            let mut tracker = tracker_with(Rc::clone(&store));
            let mut events = EventQueue::new();
            tracker.add_experience(450, &mut events);
            tracker.learn_word("etxea");
        }

        let tracker = tracker_with(store);

        assert_eq!(tracker.xp(), 450);
        assert_eq!(tracker.level_label(), "B1");
        assert!(tracker.progress().known_vocab.contains("etxea"));
    }

    #[test]
    fn unknown_saved_level_falls_back_to_xp() {
        let store = Rc::new(MemorySaveStore::new());
        store.insert_raw(
            0,
            r#"{"version": 1, "state": {"progress": {"xp": 420, "level": "Z9"}}}"#,
        );
        let tracker = tracker_with(store);
        assert_eq!(tracker.level_index(), 2);
    }

    #[test]
    fn incompatible_save_starts_fresh() {
        let store = Rc::new(MemorySaveStore::new());
        store.insert_raw(0, r#"{"version": 99, "state": {"progress": {"xp": 999}}}"#);
        let tracker = tracker_with(store);
        assert_eq!(tracker.progress(), &Progress::default());
    }

    #[test]
    fn bus_events_drive_awards_and_level_ups() {
        let bus = EventBus::new();
        let store = Rc::new(MemorySaveStore::new());
        let tracker = Rc::new(RefCell::new(tracker_with(store)));
        let _subscriptions = ProgressTracker::subscribe(&tracker, &bus);
        let level_events = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&level_events);
        bus.subscribe(EventKind::LevelUp, move |event, _| {
            sink.borrow_mut().push(event.clone());
            Ok(())
        });

        bus.emit(GameEvent::QuizCompleted {
            id: "q1".to_string(),
            score: 150,
        });
        bus.emit(GameEvent::LessonCompleted {
            lesson: "numbers".to_string(),
            xp: Some(60),
            vocab: Vec::new(),
        });
        bus.emit(GameEvent::VocabularyLearned {
            word: "bat".to_string(),
        });

        let tracker = tracker.borrow();
        assert_eq!(tracker.xp(), 210);
        assert!(tracker.progress().completed_lessons.contains("numbers"));
        assert!(tracker.progress().known_vocab.contains("bat"));
        assert_eq!(
            *level_events.borrow(),
            vec![GameEvent::LevelUp {
                level: "A2".to_string(),
                level_index: 1
            }]
        );
    }
}
