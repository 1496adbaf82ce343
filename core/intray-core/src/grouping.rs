//! Grouping of notifications for the tray views.
//!
//! Groups are ordered by display name, then by raw key. Front-ends rely on
//! that ordering, so it must not change between calls with the same input.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::dedup::{build_keys, strip_bucket_suffix, DedupOptions, DedupRecord, PART_SEPARATOR};
use crate::notification::Notification;

const EMPTY_DISPLAY_NAME: &str = "(empty)";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupByMode {
    #[default]
    None,
    Session,
    Window,
    Pane,
    Level,
    Message,
}

impl GroupByMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupByMode::None => "none",
            GroupByMode::Session => "session",
            GroupByMode::Window => "window",
            GroupByMode::Pane => "pane",
            GroupByMode::Level => "level",
            GroupByMode::Message => "message",
        }
    }

    /// Unknown modes mean no grouping.
    pub fn parse(value: &str) -> Self {
        match value {
            "session" => GroupByMode::Session,
            "window" => GroupByMode::Window,
            "pane" => GroupByMode::Pane,
            "level" => GroupByMode::Level,
            "message" => GroupByMode::Message,
            _ => GroupByMode::None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Group {
    pub key: String,
    pub display_name: String,
    pub count: usize,
    pub unread_count: usize,
    /// Members in input order.
    pub notifications: Vec<Notification>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupResult {
    pub mode: GroupByMode,
    pub groups: Vec<Group>,
    pub total_count: usize,
    pub total_unread: usize,
}

pub fn group_notifications(
    notifications: &[Notification],
    mode: GroupByMode,
    dedup: &DedupOptions,
) -> GroupResult {
    let total_count = notifications.len();
    let total_unread = count_unread(notifications);
    if mode == GroupByMode::None || notifications.is_empty() {
        return GroupResult {
            mode,
            groups: Vec::new(),
            total_count,
            total_unread,
        };
    }

    let keys = group_keys(notifications, mode, dedup);

    let mut order: Vec<String> = Vec::new();
    let mut members: HashMap<String, Vec<Notification>> = HashMap::new();
    for (notification, key) in notifications.iter().zip(keys) {
        members
            .entry(key)
            .or_insert_with_key(|key| {
                order.push(key.clone());
                Vec::new()
            })
            .push(notification.clone());
    }

    let mut groups: Vec<Group> = order
        .into_iter()
        .map(|key| {
            let notifications = members.remove(&key).unwrap_or_default();
            Group {
                display_name: display_name(&key, mode),
                count: notifications.len(),
                unread_count: count_unread(&notifications),
                key,
                notifications,
            }
        })
        .collect();
    groups.sort_by(|a, b| {
        a.display_name
            .cmp(&b.display_name)
            .then_with(|| a.key.cmp(&b.key))
    });

    GroupResult {
        mode,
        groups,
        total_count,
        total_unread,
    }
}

/// Group key to member count. `none` yields an empty map.
pub fn group_counts(notifications: &[Notification], mode: GroupByMode) -> BTreeMap<String, usize> {
    group_notifications(notifications, mode, &DedupOptions::default())
        .groups
        .into_iter()
        .map(|group| (group.key, group.count))
        .collect()
}

fn group_keys(notifications: &[Notification], mode: GroupByMode, dedup: &DedupOptions) -> Vec<String> {
    if mode == GroupByMode::Message {
        let records: Vec<DedupRecord> = notifications.iter().map(DedupRecord::from).collect();
        return build_keys(&records, dedup);
    }
    notifications
        .iter()
        .map(|n| match mode {
            GroupByMode::Session => n.session.clone(),
            GroupByMode::Window => join_parts(&[n.session.as_str(), n.window.as_str()]),
            GroupByMode::Pane => join_parts(&[n.session.as_str(), n.window.as_str(), n.pane.as_str()]),
            GroupByMode::Level => n.level.as_str().to_string(),
            GroupByMode::None | GroupByMode::Message => String::new(),
        })
        .collect()
}

fn join_parts(parts: &[&str]) -> String {
    let mut key = String::new();
    for (idx, part) in parts.iter().enumerate() {
        if idx > 0 {
            key.push(PART_SEPARATOR);
        }
        key.push_str(part);
    }
    key
}

/// Empty key parts are kept positionally, so a window or pane key with an
/// empty last part shows the placeholder rather than the raw compound key.
fn display_name(key: &str, mode: GroupByMode) -> String {
    let name = match mode {
        GroupByMode::Window => key.split(PART_SEPARATOR).nth(1).unwrap_or(key),
        GroupByMode::Pane => key.split(PART_SEPARATOR).nth(2).unwrap_or(key),
        GroupByMode::Message => strip_bucket_suffix(key)
            .split(PART_SEPARATOR)
            .next()
            .unwrap_or_default(),
        GroupByMode::None | GroupByMode::Session | GroupByMode::Level => key,
    };
    if name.is_empty() {
        EMPTY_DISPLAY_NAME.to_string()
    } else {
        name.to_string()
    }
}

fn count_unread(notifications: &[Notification]) -> usize {
    notifications.iter().filter(|n| !n.is_read()).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dedup::Criteria;
    use crate::notification::{NotificationLevel, NotificationState};
    use std::time::Duration;

    fn notification(id: u64, session: &str, window: &str, pane: &str, message: &str) -> Notification {
        Notification {
            id,
            timestamp: format!("2026-01-01T12:{:02}:00Z", id),
            state: NotificationState::Active,
            session: session.to_string(),
            session_name: String::new(),
            window: window.to_string(),
            pane: pane.to_string(),
            message: message.to_string(),
            pane_created: String::new(),
            level: NotificationLevel::Info,
            read_timestamp: String::new(),
        }
    }

    fn names(result: &GroupResult) -> Vec<&str> {
        result.groups.iter().map(|g| g.display_name.as_str()).collect()
    }

    #[test]
    fn none_mode_reports_totals_only() {
        let mut read = notification(1, "$1", "@1", "%1", "a");
        read.read_timestamp = "2026-01-02T00:00:00Z".to_string();
        let input = vec![read, notification(2, "$1", "@1", "%1", "b")];

        let result = group_notifications(&input, GroupByMode::None, &DedupOptions::default());
        assert!(result.groups.is_empty());
        assert_eq!(result.total_count, 2);
        assert_eq!(result.total_unread, 1);
    }

    #[test]
    fn groups_sort_by_display_name_then_key() {
        let input = vec![
            notification(1, "$2", "@9", "%1", "a"),
            notification(2, "$1", "@9", "%1", "b"),
            notification(3, "$1", "@1", "%1", "c"),
        ];
        let result = group_notifications(&input, GroupByMode::Window, &DedupOptions::default());
        assert_eq!(names(&result), vec!["@1", "@9", "@9"]);
        assert_eq!(result.groups[1].key, "$1\0@9");
        assert_eq!(result.groups[2].key, "$2\0@9");
    }

    #[test]
    fn empty_parts_display_as_placeholder() {
        let input = vec![
            notification(1, "", "", "", "a"),
            notification(2, "$1", "", "%4", "b"),
        ];
        let sessions = group_notifications(&input, GroupByMode::Session, &DedupOptions::default());
        assert_eq!(names(&sessions), vec!["$1", "(empty)"]);

        let windows = group_notifications(&input, GroupByMode::Window, &DedupOptions::default());
        assert_eq!(names(&windows), vec!["(empty)", "(empty)"]);

        let panes = group_notifications(&input, GroupByMode::Pane, &DedupOptions::default());
        assert_eq!(names(&panes), vec!["%4", "(empty)"]);
    }

    #[test]
    fn empty_trailing_part_never_shows_raw_key() {
        assert_eq!(display_name("$1\0", GroupByMode::Window), "(empty)");
        assert_eq!(display_name("$1\0@2\0", GroupByMode::Pane), "(empty)");
        assert_eq!(display_name("$1\0\0%4", GroupByMode::Pane), "%4");
    }

    #[test]
    fn message_mode_uses_dedup_keys() {
        let input = vec![
            notification(1, "$1", "@1", "%1", "build failed"),
            notification(2, "$2", "@1", "%1", "build failed"),
            notification(50, "$1", "@1", "%1", "build failed"),
        ];
        let options = DedupOptions::new(Criteria::Message, Duration::from_secs(300));
        let result = group_notifications(&input, GroupByMode::Message, &options);

        assert_eq!(names(&result), vec!["build failed", "build failed"]);
        // 12:50 anchors bucket 0; 12:02 and 12:01 fall outside it.
        assert_eq!(result.groups[0].key, "build failed");
        assert_eq!(result.groups[0].count, 1);
        assert_eq!(result.groups[1].key, "build failed\u{1f}1");
        assert_eq!(result.groups[1].count, 2);

        let by_source = DedupOptions::new(Criteria::MessageSource, Duration::ZERO);
        let result = group_notifications(&input, GroupByMode::Message, &by_source);
        assert_eq!(result.groups.len(), 2);
        assert_eq!(names(&result), vec!["build failed", "build failed"]);
    }

    #[test]
    fn members_keep_input_order() {
        let input = vec![
            notification(3, "$1", "@1", "%1", "x"),
            notification(1, "$1", "@1", "%1", "y"),
            notification(2, "$1", "@1", "%1", "z"),
        ];
        let result = group_notifications(&input, GroupByMode::Session, &DedupOptions::default());
        let ids: Vec<u64> = result.groups[0].notifications.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![3, 1, 2]);
    }

    #[test]
    fn regrouping_flattened_groups_is_idempotent() {
        let input = vec![
            notification(5, "$2", "@1", "%1", "deploy"),
            notification(1, "$1", "@1", "%2", "deploy"),
            notification(30, "$1", "@2", "%1", "deploy"),
            notification(2, "", "@1", "%1", "tests"),
        ];
        let options = DedupOptions::new(Criteria::Message, Duration::from_secs(600));
        for mode in [
            GroupByMode::Session,
            GroupByMode::Window,
            GroupByMode::Pane,
            GroupByMode::Level,
            GroupByMode::Message,
        ] {
            let first = group_notifications(&input, mode, &options);
            let flattened: Vec<Notification> = first
                .groups
                .iter()
                .flat_map(|g| g.notifications.iter().cloned())
                .collect();
            let second = group_notifications(&flattened, mode, &options);
            assert_eq!(first.groups, second.groups, "mode {}", mode.as_str());
        }
    }

    #[test]
    fn counts_by_key() {
        let input = vec![
            notification(1, "$1", "@1", "%1", "a"),
            notification(2, "$1", "@1", "%1", "b"),
            notification(3, "$2", "@1", "%1", "c"),
        ];
        let counts = group_counts(&input, GroupByMode::Session);
        assert_eq!(counts.get("$1"), Some(&2));
        assert_eq!(counts.get("$2"), Some(&1));
        assert!(group_counts(&input, GroupByMode::parse("bogus")).is_empty());
    }
}
