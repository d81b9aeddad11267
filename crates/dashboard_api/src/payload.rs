use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// One account that the user follows but that does not follow back.
///
/// The backend attaches the store document id, which is sometimes numeric;
/// it is normalized to a string here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NonFollower {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub username: String,
}

impl NonFollower {
    pub fn new(id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
        }
    }
}

/// `GET dashboard-data`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DashboardData {
    #[serde(default, deserialize_with = "null_as_zero")]
    pub followers_count: u64,
    #[serde(default, deserialize_with = "null_as_zero")]
    pub following_count: u64,
    #[serde(default)]
    pub last_sync_time: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub non_followers: Vec<NonFollower>,
}

/// `GET non-followers`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct NonFollowersResponse {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub non_followers: Vec<NonFollower>,
}

/// `POST non-followers/compare`. The backend answers either with the fresh
/// list or, when it only consumed a pending new-data flag, with a bare status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CompareResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub non_followers: Option<Vec<NonFollower>>,
}

/// `POST non-followers/update-list`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateListRequest {
    pub list: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct UpdateListResponse {
    #[serde(default)]
    pub message: Option<String>,
}

/// `GET follow-stats`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct FollowStats {
    #[serde(default, deserialize_with = "null_as_zero")]
    pub followers: u64,
    #[serde(default, deserialize_with = "null_as_zero")]
    pub following: u64,
    #[serde(default)]
    pub last_followers_scan: Option<String>,
    #[serde(default)]
    pub last_following_scan: Option<String>,
}

/// `GET check-data`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct NewDataFlag {
    #[serde(default)]
    pub new_data: bool,
}

/// `GET check-bot-status`. While a run is active the backend only reports
/// `is_running`; the remaining fields describe the last completed run.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct BotStatusReport {
    #[serde(default)]
    pub is_running: bool,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, rename = "type")]
    pub run_type: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub count_before: Option<i64>,
    #[serde(default)]
    pub count_after: Option<i64>,
    #[serde(default)]
    pub non_followers_before: Option<i64>,
    #[serde(default)]
    pub non_followers_after: Option<i64>,
    #[serde(default)]
    pub following_before: Option<i64>,
    #[serde(default)]
    pub following_after: Option<i64>,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(text) => Ok(text),
        Value::Number(number) => Ok(number.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, found {other}"
        ))),
    }
}

fn null_as_zero<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<u64>::deserialize(deserializer)?.unwrap_or_default())
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<NonFollower>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<NonFollower>>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn dashboard_data_tolerates_nulls_and_numeric_ids() {
        let data: DashboardData = serde_json::from_value(json!({
            "followers_count": null,
            "following_count": 140,
            "last_sync_time": null,
            "non_followers": [{"id": 42, "username": "bob", "profile_url": "x"}]
        }))
        .expect("decode");

        assert_eq!(data.followers_count, 0);
        assert_eq!(data.following_count, 140);
        assert_eq!(data.non_followers, vec![NonFollower::new("42", "bob")]);
    }

    #[test]
    fn compare_response_accepts_flag_reset_shape() {
        let reset: CompareResponse =
            serde_json::from_value(json!({"status": "Flag reset successfully."})).expect("decode");
        assert_eq!(reset.non_followers, None);
    }

    #[test]
    fn bot_status_reads_type_field() {
        let report: BotStatusReport = serde_json::from_value(json!({
            "is_running": false,
            "status": "no_change",
            "type": "followers",
            "count_after": 120
        }))
        .expect("decode");
        assert_eq!(report.run_type.as_deref(), Some("followers"));
        assert_eq!(report.count_after, Some(120));
    }
}
