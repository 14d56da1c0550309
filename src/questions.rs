//! Question bank and the per-session question draw.

use crate::types::{Category, Question};
use std::path::Path;

/// Static source of questions, in bank order
#[derive(Debug, Clone)]
pub struct QuestionBank {
    questions: Vec<Question>,
}

#[derive(Debug, thiserror::Error)]
pub enum BankError {
    #[error("Failed to read question bank: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse question bank: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Question bank is empty")]
    Empty,

    #[error("Question {0} has no option matching its correct answer")]
    InvalidQuestion(String),
}

impl QuestionBank {
    pub fn new(questions: Vec<Question>) -> Result<Self, BankError> {
        if questions.is_empty() {
            return Err(BankError::Empty);
        }
        if let Some(bad) = questions
            .iter()
            .find(|q| !q.options.iter().any(|o| *o == q.correct_answer))
        {
            return Err(BankError::InvalidQuestion(bad.id.clone()));
        }
        Ok(Self { questions })
    }

    /// Load a bank from a JSON array of questions
    pub fn from_file(path: &Path) -> Result<Self, BankError> {
        let data = std::fs::read_to_string(path)?;
        let questions: Vec<Question> = serde_json::from_str(&data)?;
        Self::new(questions)
    }

    /// Load from `path` if given, falling back to the built-in bank on any failure
    pub fn load(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::builtin();
        };

        match Self::from_file(path) {
            Ok(bank) => {
                tracing::info!(
                    "Loaded {} questions from {}",
                    bank.len(),
                    path.display()
                );
                bank
            }
            Err(e) => {
                tracing::warn!(
                    "Could not load question bank from {}: {}. Using built-in questions.",
                    path.display(),
                    e
                );
                Self::builtin()
            }
        }
    }

    pub fn builtin() -> Self {
        Self {
            questions: builtin_questions(),
        }
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    /// Number of bank entries tagged with `category`
    pub fn count_in(&self, category: Category) -> usize {
        self.questions
            .iter()
            .filter(|q| q.category == category)
            .count()
    }

    /// Draw the question set for a session.
    ///
    /// Category matches come first in bank order, then other categories
    /// backfill (also in bank order) until `target` is reached. `Mixed` takes
    /// the whole bank. The result is deterministic for a given bank.
    pub fn select(&self, category: Category, target: usize) -> Vec<Question> {
        let mut selected: Vec<Question> = if category == Category::Mixed {
            self.questions.clone()
        } else {
            self.questions
                .iter()
                .filter(|q| q.category == category)
                .cloned()
                .collect()
        };

        if selected.len() < target && category != Category::Mixed {
            let missing = target - selected.len();
            selected.extend(
                self.questions
                    .iter()
                    .filter(|q| q.category != category)
                    .take(missing)
                    .cloned(),
            );
        }

        selected.truncate(target);
        selected
    }
}

fn question(id: &str, category: Category, text: &str, options: [&str; 4], correct: &str) -> Question {
    Question {
        id: id.to_string(),
        category,
        question: text.to_string(),
        options: options.iter().map(|o| o.to_string()).collect(),
        correct_answer: correct.to_string(),
    }
}

fn builtin_questions() -> Vec<Question> {
    vec![
        question(
            "football-1",
            Category::Football,
            "Which country won the 2022 FIFA World Cup?",
            ["France", "Brazil", "Argentina", "Germany"],
            "Argentina",
        ),
        question(
            "football-2",
            Category::Football,
            "Who holds the record for most goals in World Cup history?",
            ["Pelé", "Miroslav Klose", "Ronaldo", "Just Fontaine"],
            "Miroslav Klose",
        ),
        question(
            "basketball-1",
            Category::Basketball,
            "Which NBA team has won the most championships?",
            ["Los Angeles Lakers", "Boston Celtics", "Chicago Bulls", "Golden State Warriors"],
            "Boston Celtics",
        ),
        question(
            "basketball-2",
            Category::Basketball,
            "Who holds the NBA record for most points in a single game?",
            ["Michael Jordan", "Kobe Bryant", "Wilt Chamberlain", "LeBron James"],
            "Wilt Chamberlain",
        ),
        question(
            "tennis-1",
            Category::Tennis,
            "Who has won the most Grand Slam singles titles in tennis history?",
            ["Roger Federer", "Rafael Nadal", "Novak Djokovic", "Serena Williams"],
            "Novak Djokovic",
        ),
        question(
            "tennis-2",
            Category::Tennis,
            "Which Grand Slam tournament is played on clay courts?",
            ["Wimbledon", "US Open", "French Open", "Australian Open"],
            "French Open",
        ),
        question(
            "olympics-1",
            Category::Olympics,
            "Which city hosted the 2020 Summer Olympics (held in 2021)?",
            ["Paris", "Tokyo", "London", "Rio de Janeiro"],
            "Tokyo",
        ),
        question(
            "olympics-2",
            Category::Olympics,
            "Who is the most decorated Olympian of all time?",
            ["Usain Bolt", "Michael Phelps", "Simone Biles", "Carl Lewis"],
            "Michael Phelps",
        ),
        question(
            "mixed-1",
            Category::Mixed,
            "In which sport would you perform a \"slam dunk\"?",
            ["Volleyball", "Basketball", "Tennis", "Football"],
            "Basketball",
        ),
        question(
            "mixed-2",
            Category::Mixed,
            "What is the diameter of a basketball hoop in inches?",
            ["16 inches", "18 inches", "20 inches", "24 inches"],
            "18 inches",
        ),
    ]
}
