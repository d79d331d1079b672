use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use crate::dialogue::{DialogueLine, DialogueScript};
use crate::json::{decode_json, JsonDecodeError};
use crate::quiz::{QuizDefinition, QuizQuestion};

/// Source of dialogue scripts and quizzes by id.
pub trait ContentProvider {
    fn dialogue(&self, id: &str) -> Option<DialogueScript>;
    fn quiz(&self, id: &str) -> Option<QuizDefinition>;
}

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("failed to read content file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse content file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: JsonDecodeError,
    },
    #[error("quiz {quiz_id} question {question}: correct index {correct} out of range for {options} options")]
    InvalidQuiz {
        quiz_id: String,
        question: usize,
        correct: usize,
        options: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ContentKind {
    Vocabulary,
    Dialogue,
    Quiz,
}

#[derive(Debug, Deserialize)]
struct ManifestEntry {
    #[serde(rename = "type")]
    kind: ContentKind,
    key: String,
    src: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DialogueFile {
    Lines(Vec<DialogueLine>),
    Script {
        lines: Vec<DialogueLine>,
        #[serde(default)]
        quiz: Option<String>,
    },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum QuizFile {
    Questions(Vec<QuizQuestion>),
    Quiz { questions: Vec<QuizQuestion> },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VocabEntry {
    pub word: String,
    pub translation: String,
    #[serde(default)]
    pub audio: Option<String>,
}

/// In-memory content, optionally filled from a JSON manifest.
#[derive(Debug, Clone, Default)]
pub struct ContentDatabase {
    dialogues: HashMap<String, DialogueScript>,
    quizzes: HashMap<String, QuizDefinition>,
    vocabulary: BTreeMap<String, Vec<VocabEntry>>,
}

impl ContentDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads every entry of `manifest_path`; `src` paths resolve against
    /// `root`.
    pub fn load_manifest(root: &Path, manifest_path: &Path) -> Result<Self, ContentError> {
        let entries: Vec<ManifestEntry> = read_json(manifest_path)?;
        let mut database = Self::new();
        for entry in entries {
            let path = root.join(&entry.src);
            match entry.kind {
                ContentKind::Dialogue => {
                    let script = match read_json::<DialogueFile>(&path)? {
                        DialogueFile::Lines(lines) => DialogueScript {
                            id: entry.key,
                            lines,
                            follow_up_quiz: None,
                        },
                        DialogueFile::Script { lines, quiz } => DialogueScript {
                            id: entry.key,
                            lines,
                            follow_up_quiz: quiz,
                        },
                    };
                    database.insert_dialogue(script);
                }
                ContentKind::Quiz => {
                    let questions = match read_json::<QuizFile>(&path)? {
                        QuizFile::Questions(questions) | QuizFile::Quiz { questions } => questions,
                    };
                    let quiz = QuizDefinition {
                        id: entry.key,
                        questions,
                    };
                    validate_quiz(&quiz)?;
                    database.insert_quiz(quiz);
                }
                ContentKind::Vocabulary => {
                    let levels: BTreeMap<String, Vec<VocabEntry>> = read_json(&path)?;
                    for (level, words) in levels {
                        database.vocabulary.entry(level).or_default().extend(words);
                    }
                }
            }
        }
        info!(
            dialogues = database.dialogues.len(),
            quizzes = database.quizzes.len(),
            vocabulary_levels = database.vocabulary.len(),
            "content_loaded"
        );
        Ok(database)
    }

    pub fn insert_dialogue(&mut self, script: DialogueScript) {
        self.dialogues.insert(script.id.clone(), script);
    }

    pub fn insert_quiz(&mut self, quiz: QuizDefinition) {
        self.quizzes.insert(quiz.id.clone(), quiz);
    }

    pub fn vocabulary(&self, level: &str) -> &[VocabEntry] {
        self.vocabulary
            .get(level)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Translation for a known word at any level.
    pub fn translate(&self, word: &str) -> Option<&str> {
        self.vocabulary
            .values()
            .flatten()
            .find(|entry| entry.word == word)
            .map(|entry| entry.translation.as_str())
    }

    pub fn dialogue_count(&self) -> usize {
        self.dialogues.len()
    }

    pub fn quiz_count(&self) -> usize {
        self.quizzes.len()
    }
}

impl ContentProvider for ContentDatabase {
    fn dialogue(&self, id: &str) -> Option<DialogueScript> {
        self.dialogues.get(id).cloned()
    }

    fn quiz(&self, id: &str) -> Option<QuizDefinition> {
        self.quizzes.get(id).cloned()
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ContentError> {
    let raw = fs::read_to_string(path).map_err(|source| ContentError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    decode_json(&raw).map_err(|source| ContentError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn validate_quiz(quiz: &QuizDefinition) -> Result<(), ContentError> {
    for (index, question) in quiz.questions.iter().enumerate() {
        if question.correct >= question.options.len() {
            return Err(ContentError::InvalidQuiz {
                quiz_id: quiz.id.clone(),
                question: index,
                correct: question.correct,
                options: question.options.len(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(root: &Path, relative: &str, body: &str) {
        let path = root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create dirs");
        }
        fs::write(path, body).expect("write");
    }

    #[test]
    fn manifest_loads_all_content_kinds() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path();
        write(
            root,
            "manifest.json",
            r#"[
                {"type": "dialogue", "key": "elder", "src": "dialogues/elder.json"},
                {"type": "dialogue", "key": "quizmaster", "src": "dialogues/quizmaster.json"},
                {"type": "quiz", "key": "q1", "src": "quizzes/q1.json"},
                {"type": "vocabulary", "key": "core", "src": "vocab.json"}
            ]"#,
        );
        write(
            root,
            "dialogues/elder.json",
            r#"[{"text": "Kaixo", "translation": "Hello", "audio": "kaixo"}]"#,
        );
        write(
            root,
            "dialogues/quizmaster.json",
            r#"{"lines": [{"text": "Prest?"}], "quiz": "q1"}"#,
        );
        write(
            root,
            "quizzes/q1.json",
            r#"[{"question": "house?", "options": ["etxea", "ura"], "correct": 0}]"#,
        );
        write(
            root,
            "vocab.json",
            r#"{"A1": [{"word": "etxea", "translation": "house"}]}"#,
        );

        let database =
            ContentDatabase::load_manifest(root, &root.join("manifest.json")).expect("load");

        let elder = database.dialogue("elder").expect("elder");
        assert_eq!(elder.lines[0].audio.as_deref(), Some("kaixo"));
        assert_eq!(
            database
                .dialogue("quizmaster")
                .and_then(|script| script.follow_up_quiz),
            Some("q1".to_string())
        );
        assert_eq!(
            database.quiz("q1").map(|quiz| quiz.questions[0].prompt.clone()),
            Some("house?".to_string())
        );
        assert_eq!(database.vocabulary("A1").len(), 1);
        assert_eq!(database.translate("etxea"), Some("house"));
        assert!(database.vocabulary("C2").is_empty());
    }

    #[test]
    fn missing_source_file_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path();
        write(
            root,
            "manifest.json",
            r#"[{"type": "quiz", "key": "q1", "src": "quizzes/missing.json"}]"#,
        );

        let error = ContentDatabase::load_manifest(root, &root.join("manifest.json"))
            .expect_err("missing file");
        assert!(matches!(error, ContentError::Read { .. }));
    }

    #[test]
    fn out_of_range_correct_index_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path();
        write(
            root,
            "manifest.json",
            r#"[{"type": "quiz", "key": "q1", "src": "q1.json"}]"#,
        );
        write(
            root,
            "q1.json",
            r#"{"questions": [{"prompt": "?", "options": ["a"], "correct": 3}]}"#,
        );

        let error = ContentDatabase::load_manifest(root, &root.join("manifest.json"))
            .expect_err("invalid quiz");
        assert!(matches!(error, ContentError::InvalidQuiz { correct: 3, .. }));
    }

    #[test]
    fn unknown_manifest_type_reports_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path();
        write(
            root,
            "manifest.json",
            r#"[{"type": "cutscene", "key": "intro", "src": "intro.json"}]"#,
        );

        match ContentDatabase::load_manifest(root, &root.join("manifest.json")) {
            Err(ContentError::Parse { source, .. }) => assert_eq!(source.path, "[0].type"),
            other => panic!("expected parse error, got {other:?}"),
        }
    }
}
