use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Objective {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub team_id: Option<String>,
    #[serde(default)]
    pub quarter: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub progress: Option<f64>,
    #[serde(default)]
    pub created_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_modified_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
}

impl Objective {
    pub fn progress_display(&self) -> String {
        match self.progress {
            Some(p) => format!("{:.0}%", p.round()),
            None => "-".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyResult {
    pub id: String,
    #[serde(default)]
    pub objective_id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub metric_type: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub target_value: Option<f64>,
    #[serde(default)]
    pub current_value: Option<f64>,
    #[serde(default)]
    pub created_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_modified_date: Option<DateTime<Utc>>,
}

impl KeyResult {
    /// Completion ratio in percent, when both values are known
    pub fn completion(&self) -> Option<f64> {
        match (self.current_value, self.target_value) {
            (Some(current), Some(target)) if target != 0.0 => Some(current / target * 100.0),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_objective_ignores_unknown_fields() {
        let json = r#"{
            "id": "obj-1",
            "title": "Grow revenue",
            "quarter": "Q3",
            "status": "ON_TRACK",
            "progress": 42.5,
            "created_date": "2024-07-01T08:00:00Z",
            "labels": "growth",
            "key_results": []
        }"#;
        let objective: Objective = serde_json::from_str(json).unwrap();
        assert_eq!(objective.quarter.as_deref(), Some("Q3"));
        assert_eq!(objective.progress_display(), "43%");
        assert!(objective.created_date.is_some());
        assert_eq!(objective.owner_id, None);
    }

    #[test]
    fn test_key_result_completion() {
        let json = r#"{"id":"kr-1","title":"Close deals","target_value":20,"current_value":5}"#;
        let kr: KeyResult = serde_json::from_str(json).unwrap();
        assert_eq!(kr.completion(), Some(25.0));

        let zero_target = KeyResult { target_value: Some(0.0), ..kr };
        assert_eq!(zero_target.completion(), None);
    }
}
