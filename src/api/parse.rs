//! Tolerant parsing of Insider API payloads
//!
//! The upstream API is undocumented and its field names have changed between
//! releases. Every field is read through an ordered list of extraction rules
//! (key paths); the first rule that yields a usable value wins. An empty key
//! path addresses the document root, which lets "flat list" responses share
//! the same rule tables as enveloped ones.
//!
//! This is technical debt inherited from an unstable upstream contract. Once
//! the schema is pinned, the rule tables should shrink to one entry each.

use serde_json::Value;

use crate::models::{HighScore, Machine, Team, TeamMember, HIGH_SCORE_COUNT};

/// A path of object keys, walked from the value it is applied to
pub type KeyPath = &'static [&'static str];

/// Rule tables, one per field
pub mod rules {
    use super::KeyPath;

    pub const MACHINE_LIST: &[KeyPath] = &[&["user", "machines"], &["machines"], &["data"], &[]];
    pub const MACHINE_ID: &[KeyPath] = &[&["id"], &["machine_id"], &["machineId"]];
    pub const MACHINE_GAME_TITLE: &[KeyPath] = &[
        &["model", "title", "name"],
        &["game_title"],
        &["gameTitle"],
        &["title"],
    ];
    pub const MACHINE_NAME: &[KeyPath] = &[&["name"], &["nickname"]];
    pub const MACHINE_IMAGE: &[KeyPath] = &[
        &["model", "title", "default_backglass_image"],
        &["model", "title", "square_logo"],
        &["image_url"],
        &["imageUrl"],
    ];
    pub const SQUARE_LOGO: &[KeyPath] = &[&["model", "title", "square_logo"]];
    pub const VARIABLE_WIDTH_LOGO: &[KeyPath] = &[&["model", "title", "variable_width_logo"]];
    pub const BACKGLASS_IMAGE: &[KeyPath] = &[&["model", "title", "default_backglass_image"]];
    pub const BACKGROUND_IMAGE: &[KeyPath] = &[&["model", "title", "primary_background"]];
    pub const GRADIENT_START: &[KeyPath] = &[&["model", "title", "gradient_start"]];
    pub const GRADIENT_STOP: &[KeyPath] = &[&["model", "title", "gradient_stop"]];

    pub const SCORE_LIST: &[KeyPath] = &[
        &["high_score"],
        &["high_scores"],
        &["highScores"],
        &["scores"],
        &["data"],
        &[],
    ];
    pub const SCORE_ID: &[KeyPath] = &[&["id"], &["score_id"], &["scoreId"]];
    pub const SCORE_RANK: &[KeyPath] = &[&["rank"], &["position"]];
    pub const SCORE_VALUE: &[KeyPath] = &[&["score"], &["value"]];
    pub const PLAYER_NAME: &[KeyPath] = &[
        &["user", "name"],
        &["user", "display_name"],
        &["user", "displayName"],
        &["user", "username"],
        &["player", "name"],
        &["player", "display_name"],
        &["player", "displayName"],
        &["player", "username"],
        &["player_name"],
        &["playerName"],
        &["username"],
    ];
    pub const PLAYER_USERNAME: &[KeyPath] =
        &[&["user", "username"], &["player", "username"], &["username"]];
    pub const PLAYER_INITIALS: &[KeyPath] =
        &[&["user", "initials"], &["player", "initials"], &["initials"]];
    pub const PLAYER_AVATAR: &[KeyPath] = &[
        &["user", "avatar_url"],
        &["user", "avatarUrl"],
        &["player", "avatar_url"],
        &["player", "avatarUrl"],
        &["avatar_url"],
        &["avatarUrl"],
    ];

    pub const TEAM_LIST: &[KeyPath] = &[&["teams"], &["data"], &[]];
    pub const TEAM_ID: &[KeyPath] = &[&["id"], &["teamId"], &["team_id"]];
    pub const TEAM_NAME: &[KeyPath] = &[&["name"]];
    pub const TEAM_MEMBERS: &[KeyPath] = &[&["members"], &["users"]];
    pub const MEMBER_ID: &[KeyPath] = &[&["id"], &["userId"], &["user_id"]];
    pub const MEMBER_USERNAME: &[KeyPath] = &[&["username"]];
    pub const MEMBER_DISPLAY_NAME: &[KeyPath] = &[&["displayName"], &["display_name"], &["name"]];
    pub const MEMBER_AVATAR: &[KeyPath] = &[&["avatarUrl"], &["avatar_url"]];
}

/// Walk `path` from `value`
pub fn lookup<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(value, |current, key| current.get(key))
}

/// First rule that resolves to a non-null value
pub fn first_value<'a>(value: &'a Value, rules: &[KeyPath]) -> Option<&'a Value> {
    rules
        .iter()
        .filter_map(|path| lookup(value, path))
        .find(|v| !v.is_null())
}

/// First rule that resolves to a non-empty string (numbers are stringified)
pub fn first_string(value: &Value, rules: &[KeyPath]) -> Option<String> {
    rules
        .iter()
        .filter_map(|path| lookup(value, path))
        .find_map(|v| match v {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}

/// First rule that resolves to a non-negative integer or a digit string
pub fn first_u64(value: &Value, rules: &[KeyPath]) -> Option<u64> {
    rules
        .iter()
        .filter_map(|path| lookup(value, path))
        .find_map(|v| match v {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse::<u64>().ok(),
            _ => None,
        })
}

/// First rule that resolves to an array; empty when none does
pub fn first_list<'a>(value: &'a Value, rules: &[KeyPath]) -> &'a [Value] {
    rules
        .iter()
        .filter_map(|path| lookup(value, path))
        .find_map(|v| v.as_array())
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Parse the machine list response
pub fn parse_machines(data: &Value) -> Vec<Machine> {
    first_list(data, rules::MACHINE_LIST)
        .iter()
        .filter_map(|item| {
            let Some(machine_id) = first_string(item, rules::MACHINE_ID) else {
                tracing::debug!("Skipping machine entry without an id");
                return None;
            };

            let game_title = first_string(item, rules::MACHINE_GAME_TITLE)
                .unwrap_or_else(|| "Unknown".to_string());
            let name =
                first_string(item, rules::MACHINE_NAME).unwrap_or_else(|| game_title.clone());

            Some(Machine {
                machine_id,
                name,
                game_title,
                image_url: first_string(item, rules::MACHINE_IMAGE),
                square_logo_url: first_string(item, rules::SQUARE_LOGO),
                variable_width_logo_url: first_string(item, rules::VARIABLE_WIDTH_LOGO),
                backglass_image_url: first_string(item, rules::BACKGLASS_IMAGE),
                background_image_url: first_string(item, rules::BACKGROUND_IMAGE),
                gradient_start: first_string(item, rules::GRADIENT_START),
                gradient_stop: first_string(item, rules::GRADIENT_STOP),
                high_scores: Vec::new(),
            })
        })
        .collect()
}

/// Parse a high-score response into at most five entries ordered by rank
pub fn parse_high_scores(data: &Value) -> Vec<HighScore> {
    let mut scores: Vec<HighScore> = first_list(data, rules::SCORE_LIST)
        .iter()
        .enumerate()
        .filter(|(_, item)| item.is_object())
        .map(|(idx, item)| parse_high_score(idx, item))
        .collect();

    scores.sort_by_key(|s| s.rank);
    scores.dedup_by_key(|s| s.rank);
    scores.truncate(HIGH_SCORE_COUNT);
    scores
}

fn parse_high_score(idx: usize, item: &Value) -> HighScore {
    let rank = first_u64(item, rules::SCORE_RANK)
        .and_then(|r| u32::try_from(r).ok())
        .filter(|r| *r > 0)
        .unwrap_or_else(|| u32::try_from(idx + 1).unwrap_or(u32::MAX));

    let score = first_value(item, rules::SCORE_VALUE)
        .and_then(score_value)
        .unwrap_or(0);

    let player_username = first_string(item, rules::PLAYER_USERNAME).unwrap_or_default();
    let player_initials =
        first_string(item, rules::PLAYER_INITIALS).unwrap_or_else(|| "???".to_string());

    let score_id = first_string(item, rules::SCORE_ID).unwrap_or_else(|| {
        let who = if player_username.is_empty() {
            &player_initials
        } else {
            &player_username
        };
        format!("{who}:{score}")
    });

    HighScore {
        score_id,
        rank,
        score,
        player_name: first_string(item, rules::PLAYER_NAME)
            .unwrap_or_else(|| "Unknown".to_string()),
        player_username,
        player_initials,
        avatar_url: first_string(item, rules::PLAYER_AVATAR),
    }
}

/// Scores arrive as numbers or as digit strings; anything else counts as zero
fn score_value(v: &Value) -> Option<u64> {
    match v {
        Value::Number(n) => Some(n.as_u64().unwrap_or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && *f > 0.0)
                .map_or(0, |f| f as u64)
        })),
        Value::String(s) => Some(s.trim().parse::<u64>().unwrap_or(0)),
        _ => None,
    }
}

/// Parse the teams response
pub fn parse_teams(data: &Value) -> Vec<Team> {
    first_list(data, rules::TEAM_LIST)
        .iter()
        .filter(|item| item.is_object())
        .map(|item| Team {
            team_id: first_string(item, rules::TEAM_ID).unwrap_or_default(),
            name: first_string(item, rules::TEAM_NAME)
                .unwrap_or_else(|| "Unknown Team".to_string()),
            members: first_list(item, rules::TEAM_MEMBERS)
                .iter()
                .filter(|m| m.is_object())
                .map(parse_member)
                .collect(),
        })
        .collect()
}

fn parse_member(member: &Value) -> TeamMember {
    TeamMember {
        user_id: first_string(member, rules::MEMBER_ID).unwrap_or_default(),
        username: first_string(member, rules::MEMBER_USERNAME).unwrap_or_default(),
        display_name: first_string(member, rules::MEMBER_DISPLAY_NAME).unwrap_or_default(),
        avatar_url: first_string(member, rules::MEMBER_AVATAR),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_lookup_root_path() {
        let v = json!([1, 2]);
        assert_eq!(lookup(&v, &[]), Some(&v));
    }

    #[test]
    fn test_first_string_skips_empty_and_null() {
        let v = json!({"a": "", "b": null, "c": 42});
        assert_eq!(first_string(&v, &[&["a"], &["b"], &["c"]]), Some("42".to_string()));
    }

    #[test]
    fn test_machines_nested_under_user() {
        let data = json!({
            "user": {
                "machines": [{
                    "id": 1234,
                    "model": {
                        "title": {
                            "name": "Godzilla",
                            "square_logo": "https://example.com/logo.png",
                            "variable_width_logo": "https://example.com/wide.png",
                            "default_backglass_image": "https://example.com/bg.jpg",
                            "primary_background": "https://example.com/back.jpg",
                            "gradient_start": "#000000",
                            "gradient_stop": "#ffffff"
                        }
                    }
                }]
            }
        });

        let machines = parse_machines(&data);
        assert_eq!(machines.len(), 1);
        let m = &machines[0];
        assert_eq!(m.machine_id, "1234");
        assert_eq!(m.name, "Godzilla");
        assert_eq!(m.game_title, "Godzilla");
        assert_eq!(m.image_url.as_deref(), Some("https://example.com/bg.jpg"));
        assert_eq!(m.square_logo_url.as_deref(), Some("https://example.com/logo.png"));
        assert_eq!(m.gradient_stop.as_deref(), Some("#ffffff"));
        assert!(m.high_scores.is_empty());
    }

    #[test]
    fn test_machines_flat_list_alternate_keys() {
        let data = json!([
            {"machineId": "m-1", "gameTitle": "Venom", "name": "Basement", "imageUrl": "https://x/v.jpg"},
            {"name": "No id here"}
        ]);

        let machines = parse_machines(&data);
        assert_eq!(machines.len(), 1);
        assert_eq!(machines[0].machine_id, "m-1");
        assert_eq!(machines[0].name, "Basement");
        assert_eq!(machines[0].game_title, "Venom");
        assert_eq!(machines[0].image_url.as_deref(), Some("https://x/v.jpg"));
    }

    #[test]
    fn test_machines_top_level_key() {
        let data = json!({"machines": [{"id": "abc"}]});
        let machines = parse_machines(&data);
        assert_eq!(machines[0].game_title, "Unknown");
        assert_eq!(machines[0].name, "Unknown");
    }

    #[test]
    fn test_machines_unexpected_shape_is_empty() {
        assert!(parse_machines(&json!({"status": "ok"})).is_empty());
        assert!(parse_machines(&json!("nope")).is_empty());
    }

    #[test]
    fn test_high_scores_current_shape() {
        let data = json!({
            "high_score": [
                {"score": "1500000000", "user": {"username": "gc_player", "initials": "GC", "avatar_url": "https://x/gc.jpg"}},
                {"score": "1200000000", "user": {"username": "hs1", "initials": "HS1", "avatar_url": ""}},
            ]
        });

        let scores = parse_high_scores(&data);
        assert_eq!(scores.len(), 2);
        assert_eq!(scores[0].rank, 1);
        assert_eq!(scores[0].score, 1_500_000_000);
        assert_eq!(scores[0].player_name, "gc_player");
        assert_eq!(scores[0].player_initials, "GC");
        assert_eq!(scores[0].avatar_url.as_deref(), Some("https://x/gc.jpg"));
        assert_eq!(scores[0].score_id, "gc_player:1500000000");
        assert_eq!(scores[1].rank, 2);
        assert!(scores[1].avatar_url.is_none());
    }

    #[test]
    fn test_high_scores_explicit_rank_sorted_and_truncated() {
        let items: Vec<Value> = (1..=7)
            .rev()
            .map(|rank| json!({"id": format!("s{rank}"), "rank": rank, "score": 1000 - rank}))
            .collect();
        let data = Value::Array(items);

        let scores = parse_high_scores(&data);
        assert_eq!(scores.len(), 5);
        let ranks: Vec<u32> = scores.iter().map(|s| s.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3, 4, 5]);
        assert_eq!(scores[0].score_id, "s1");
    }

    #[test]
    fn test_high_scores_position_fallback() {
        let data = json!({"scores": [
            {"position": 2, "value": 50, "player": {"displayName": "Bee"}},
            {"position": 1, "value": 90, "player": {"displayName": "Ace"}}
        ]});

        let scores = parse_high_scores(&data);
        assert_eq!(scores[0].player_name, "Ace");
        assert_eq!(scores[0].rank, 1);
        assert_eq!(scores[1].score, 50);
    }

    #[test]
    fn test_high_scores_bad_values() {
        let data = json!({"highScores": [
            {"score": "n/a"},
            {"score": -12},
            {"score": {"nested": true}}
        ]});

        let scores = parse_high_scores(&data);
        assert!(scores.iter().all(|s| s.score == 0));
        assert_eq!(scores[0].player_name, "Unknown");
        assert_eq!(scores[0].player_initials, "???");
    }

    #[test]
    fn test_high_scores_duplicate_rank_kept_once() {
        let data = json!([
            {"id": "a", "rank": 1, "score": 10},
            {"id": "b", "rank": 1, "score": 5}
        ]);
        let scores = parse_high_scores(&data);
        assert_eq!(scores.len(), 1);
        assert_eq!(scores[0].score_id, "a");
    }

    #[test]
    fn test_teams_enveloped() {
        let data = json!({"teams": [{
            "id": 7,
            "name": "League Night",
            "members": [
                {"id": 1, "username": "u1", "displayName": "User One", "avatarUrl": "https://x/1.png"},
                {"userId": "2", "username": "u2", "name": "User Two"}
            ]
        }]});

        let teams = parse_teams(&data);
        assert_eq!(teams.len(), 1);
        assert_eq!(teams[0].team_id, "7");
        assert_eq!(teams[0].members.len(), 2);
        assert_eq!(teams[0].members[1].user_id, "2");
        assert_eq!(teams[0].members[1].display_name, "User Two");
        assert!(teams[0].members[1].avatar_url.is_none());
    }

    #[test]
    fn test_teams_flat_list_defaults() {
        let data = json!([{"teamId": "t1", "users": []}]);
        let teams = parse_teams(&data);
        assert_eq!(teams[0].team_id, "t1");
        assert_eq!(teams[0].name, "Unknown Team");
        assert!(teams[0].members.is_empty());
    }
}
