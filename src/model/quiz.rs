use serde::{Deserialize, Serialize};

pub const ANSWERS_PER_QUESTION: usize = 4;
pub const ALLOWED_TIMER_SECONDS: [u32; 5] = [5, 10, 20, 30, 60];

// === Quiz ===
// Authored externally and delivered once over the socket; immutable for the
// rest of the session.

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quiz {
    pub id: String,
    pub title: String,
    pub questions: Vec<Question>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub image_url: Option<String>,
    pub answers: Vec<String>,
    pub correct_indices: Vec<usize>,
    pub timer_seconds: u32,
    #[serde(default)]
    pub double_points: bool,
}

impl Quiz {
    /// Structural validation applied at intake. Returns the first failure as
    /// a human-readable reason.
    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("Quiz title must not be empty".to_string());
        }
        if self.questions.is_empty() {
            return Err("Quiz must contain at least one question".to_string());
        }
        for (i, question) in self.questions.iter().enumerate() {
            question.validate().map_err(|e| format!("Question {}: {e}", i + 1))?;
        }
        Ok(())
    }

    /// Put every question's correct-answer set into canonical form.
    pub fn normalize(&mut self) {
        for question in &mut self.questions {
            question.correct_indices.sort_unstable();
            question.correct_indices.dedup();
        }
    }
}

impl Question {
    fn validate(&self) -> Result<(), String> {
        if self.id.is_empty() {
            return Err("missing question id".to_string());
        }
        if self.text.trim().is_empty() {
            return Err("question text must not be empty".to_string());
        }
        if self.answers.len() != ANSWERS_PER_QUESTION {
            return Err(format!(
                "expected exactly {ANSWERS_PER_QUESTION} answers, got {}",
                self.answers.len()
            ));
        }
        if self.correct_indices.is_empty() {
            return Err("at least one correct answer is required".to_string());
        }
        if self.correct_indices.iter().any(|&i| i >= ANSWERS_PER_QUESTION) {
            return Err("correct answer index out of range".to_string());
        }
        if !ALLOWED_TIMER_SECONDS.contains(&self.timer_seconds) {
            return Err(format!(
                "timer must be one of {ALLOWED_TIMER_SECONDS:?} seconds"
            ));
        }
        Ok(())
    }

    pub fn is_multiple_choice(&self) -> bool {
        self.correct_indices.len() > 1
    }

    /// Wire form of a question. Correct answers are never included; the image
    /// URL is only delivered to host screens.
    pub fn view(&self, for_host: bool) -> QuestionView {
        QuestionView {
            id: self.id.clone(),
            text: self.text.clone(),
            image_url: if for_host { self.image_url.clone() } else { None },
            answers: self.answers.clone(),
            timer_seconds: self.timer_seconds,
            double_points: self.double_points,
            multiple_choice: self.is_multiple_choice(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionView {
    pub id: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub image_url: Option<String>,
    pub answers: Vec<String>,
    pub timer_seconds: u32,
    pub double_points: bool,
    pub multiple_choice: bool,
}
