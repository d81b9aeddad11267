use followsync::{DashboardSnapshot, ListVerdict, Notice, NoticeLevel};

pub fn render_snapshot(snapshot: &DashboardSnapshot) -> String {
    let mut lines = vec![
        format!("followers: {}", snapshot.followers_count),
        format!("following: {}", snapshot.following_count),
        format!(
            "last sync: {}",
            snapshot.last_sync_time.as_deref().unwrap_or("never")
        ),
    ];

    match snapshot.verdict() {
        ListVerdict::NonFollowersFound(count) => {
            lines.push(format!("not following back ({count}):"));
            lines.extend(
                snapshot
                    .non_followers
                    .iter()
                    .map(|entry| format!("  {:>12}  @{}", entry.id, entry.username)),
            );
        }
        ListVerdict::EveryoneFollowsBack => {
            lines.push("everyone you follow follows you back".to_string());
        }
        ListVerdict::NoScanYet => {
            lines.push("no scan has been performed yet".to_string());
        }
    }

    lines.join("\n")
}

pub fn render_notice(notice: &Notice) -> String {
    let level = match notice.level {
        NoticeLevel::Info => "info",
        NoticeLevel::Warning => "warning",
        NoticeLevel::Error => "error",
    };
    format!("[{level}] {}", notice.message)
}
