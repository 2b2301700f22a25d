use itertools::Itertools;
use shared::slack::{escape, SlackMessage};
use shared::{ReportEntry, ReportSnapshot};

pub const FIRST_PLACE: &str = ":first_place_medal:";
pub const SECOND_PLACE: &str = ":second_place_medal:";
pub const THIRD_PLACE: &str = ":third_place_medal:";
pub const OTHER_PLACE: &str = ":star:";

pub const NO_ACTIVE_MEMBERS: &str = "_Nobody is on the leaderboard yet._";

/// `Alice`, `Alice , and Bob`, `Alice , Bob , and Carl`.
pub fn join_names<S: AsRef<str>>(names: &[S]) -> String {
    let mut result = String::new();
    for (i, name) in names.iter().enumerate() {
        if i > 0 {
            result.push_str(" , ");
            if i == names.len() - 1 {
                result.push_str("and ");
            }
        }
        result.push_str(name.as_ref());
    }
    result
}

/// One welcome message for everyone who joined since the last poll.
pub fn welcome_message<S: AsRef<str>>(names: &[S]) -> Option<SlackMessage> {
    if names.is_empty() {
        return None;
    }

    let escaped: Vec<String> = names.iter().map(|name| escape(name.as_ref())).collect();
    let plural = if names.len() > 1 { "s" } else { "" };
    Some(SlackMessage::text(format!(
        "Please welcome new member{plural}: {} to the leaderboard! :wave:",
        join_names(escaped.as_slice())
    )))
}

pub fn star_message(name: &str, new_stars: u32) -> Option<SlackMessage> {
    let stars = match new_stars {
        0 => return None,
        1 => "a new star".to_string(),
        n => format!("{n} new stars"),
    };
    Some(SlackMessage::text(format!(
        ":star2: {} got {stars}!",
        escape(name)
    )))
}

pub fn place_marker(place: usize) -> &'static str {
    match place {
        1 => FIRST_PLACE,
        2 => SECOND_PLACE,
        3 => THIRD_PLACE,
        _ => OTHER_PLACE,
    }
}

/// Members by local score, highest first. Equal scores keep report order.
pub fn ranked(report: &ReportSnapshot) -> Vec<&ReportEntry> {
    report
        .members
        .iter()
        .sorted_by(|a, b| b.local_score.cmp(&a.local_score))
        .collect()
}

pub fn ranking_lines(report: &ReportSnapshot) -> Vec<String> {
    ranked(report)
        .into_iter()
        .enumerate()
        .map(|(i, member)| {
            format!(
                "{} {} (points: {}, stars: {})",
                place_marker(i + 1),
                escape(&member.name),
                member.local_score,
                member.stars
            )
        })
        .collect()
}

pub fn ranking_message(report: &ReportSnapshot) -> SlackMessage {
    let header = format!(
        ":christmas_tree: Leaderboard standings as of {}",
        report.time.format("%b %-d, %H:%M UTC")
    );
    let lines = ranking_lines(report);
    let body = if lines.is_empty() {
        NO_ACTIVE_MEMBERS.to_string()
    } else {
        lines.join("\n")
    };
    SlackMessage::with_header(header, body)
}
