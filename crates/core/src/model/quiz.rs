use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Answer format of a quiz question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum QuestionKind {
    MultipleChoice,
    SelectAll,
    TrueFalse,
    Number,
    FreeResponse,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerOption {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub correct: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeAttributes {
    #[serde(default)]
    pub options: Vec<AnswerOption>,
    #[serde(default)]
    pub correct_answer: Option<Value>,
}

/// One question of a quiz or CTF block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    #[serde(default)]
    pub question: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cmi5_question_id: Option<String>,
    #[serde(rename = "type")]
    pub kind: QuestionKind,
    #[serde(default)]
    pub type_attributes: TypeAttributes,
}

impl Question {
    /// Checks a learner answer against this question.
    ///
    /// A missing (`null`) answer is never correct.
    #[must_use]
    pub fn is_correct(&self, answer: &Value) -> bool {
        if answer.is_null() {
            return false;
        }
        let options = &self.type_attributes.options;

        match self.kind {
            QuestionKind::MultipleChoice => answer
                .as_u64()
                .and_then(|index| usize::try_from(index).ok())
                .and_then(|index| options.get(index))
                .is_some_and(|option| option.correct),
            QuestionKind::SelectAll => {
                let Some(selected) = answer.as_array() else {
                    return false;
                };
                let selected: Vec<usize> = selected
                    .iter()
                    .filter_map(Value::as_u64)
                    .filter_map(|index| usize::try_from(index).ok())
                    .collect();
                let all_selected_correct = selected
                    .iter()
                    .all(|index| options.get(*index).is_some_and(|option| option.correct));
                let all_correct_selected = options
                    .iter()
                    .enumerate()
                    .filter(|(_, option)| option.correct)
                    .all(|(index, _)| selected.contains(&index));
                all_selected_correct && all_correct_selected
            }
            QuestionKind::TrueFalse => {
                let expected = self
                    .type_attributes
                    .correct_answer
                    .as_ref()
                    .map_or_else(String::new, loose_string);
                loose_string(answer).eq_ignore_ascii_case(&expected)
            }
            QuestionKind::Number | QuestionKind::FreeResponse => self
                .type_attributes
                .correct_answer
                .as_ref()
                .is_some_and(|expected| strict_eq(answer, expected)),
            QuestionKind::Unknown => false,
        }
    }
}

fn loose_string(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn strict_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => left == right,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn question(value: Value) -> Question {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn multiple_choice_checks_selected_option() {
        let q = question(json!({
            "question": "Pick",
            "type": "multipleChoice",
            "typeAttributes": {"options": [{"text": "a"}, {"text": "b", "correct": true}]}
        }));
        assert!(q.is_correct(&json!(1)));
        assert!(!q.is_correct(&json!(0)));
        assert!(!q.is_correct(&json!(7)));
        assert!(!q.is_correct(&Value::Null));
    }

    #[test]
    fn select_all_requires_exact_set() {
        let q = question(json!({
            "type": "selectAll",
            "typeAttributes": {"options": [
                {"text": "a", "correct": true},
                {"text": "b"},
                {"text": "c", "correct": true}
            ]}
        }));
        assert!(q.is_correct(&json!([2, 0])));
        assert!(!q.is_correct(&json!([0])));
        assert!(!q.is_correct(&json!([0, 1, 2])));
        assert!(!q.is_correct(&json!(0)));
    }

    #[test]
    fn true_false_ignores_case_and_type() {
        let q = question(json!({"type": "trueFalse", "typeAttributes": {"correctAnswer": true}}));
        assert!(q.is_correct(&json!("True")));
        assert!(q.is_correct(&json!(true)));
        assert!(!q.is_correct(&json!("false")));
    }

    #[test]
    fn free_response_and_number_match_exactly() {
        let free = question(json!({"type": "freeResponse", "typeAttributes": {"correctAnswer": "nmap"}}));
        assert!(free.is_correct(&json!("nmap")));
        assert!(!free.is_correct(&json!("Nmap")));

        let number = question(json!({"type": "number", "typeAttributes": {"correctAnswer": 443}}));
        assert!(number.is_correct(&json!(443)));
        assert!(number.is_correct(&json!(443.0)));
        assert!(!number.is_correct(&json!("443")));
    }

    #[test]
    fn unknown_question_type_is_never_correct() {
        let q = question(json!({"type": "matching", "typeAttributes": {"correctAnswer": "x"}}));
        assert_eq!(q.kind, QuestionKind::Unknown);
        assert!(!q.is_correct(&json!("x")));
    }
}
