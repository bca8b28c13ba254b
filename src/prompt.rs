//! Builds the article prompt from a match, its odds and its recent history.
use crate::model::{display_value, HistoricalMatch, Match, Statistics};

/// Odds rows in display order: label, provider key.
const ODDS_ROWS: [(&str, &str); 8] = [
    ("Home Win ({home})", "1"),
    ("Away Win ({away})", "2"),
    ("Either team to Win", "12"),
    ("Draw", "x"),
    ("Home win or draw", "1x"),
    ("Away win or draw", "x2"),
    ("Total goals, less than 3 goals", "u_2_5"),
    ("Total goals, 3 goals or more", "o_2_5"),
];

const TITLE_WORDS: usize = 6;

/// Assemble the full prompt: template, match details, odds, then history
/// sections. Empty parts are left out.
pub fn build(m: &Match, stats: &Statistics, template: &str) -> String {
    let mut sections = vec![match_details(m)];
    if let Some(odds) = odds_block(m) {
        sections.push(odds);
    }

    let home = history(stats.home_matches.as_deref());
    let away = history(stats.away_matches.as_deref());
    let h2h = history(stats.head_to_head.as_deref());
    if let Some(lines) = home {
        sections.push(format!(
            "Match History Analysis:\nHome Team Recent Performance:\n{}",
            lines
        ));
    }
    if let Some(lines) = away {
        sections.push(format!("Away Team Recent Performance:\n{}", lines));
    }
    if let Some(lines) = h2h {
        sections.push(format!("Head-to-Head History:\n{}", lines));
    }

    format!("{}\n\n{}", template, sections.join("\n\n"))
}

fn match_details(m: &Match) -> String {
    [
        "Match Details:".to_string(),
        format!("- Upcoming Match: {} vs {}", m.home_team, m.away_team),
        format!("- Home team: {}", m.home_team),
        format!("- Away team: {}", m.away_team),
        format!(
            "- Match Date: {}",
            m.kickoff_datetime.format("%Y-%m-%d %H:%M:%S")
        ),
        format!("- Region: {}", m.region),
    ]
    .join("\n")
}

fn odds_block(m: &Match) -> Option<String> {
    if m.odds.is_empty() {
        return None;
    }
    let mut lines = vec!["Betting Odds Breakdown:".to_string()];
    for (label, key) in ODDS_ROWS {
        let label = label
            .replace("{home}", &m.home_team)
            .replace("{away}", &m.away_team);
        lines.push(format!("- {}: {}", label, m.odds.display(key)));
    }
    Some(lines.join("\n"))
}

/// Most recent first; the provider lists oldest first.
fn history(entries: Option<&[HistoricalMatch]>) -> Option<String> {
    let entries = entries.filter(|e| !e.is_empty())?;
    Some(
        entries
            .iter()
            .rev()
            .map(history_line)
            .collect::<Vec<_>>()
            .join("\n"),
    )
}

fn history_line(h: &HistoricalMatch) -> String {
    let text = |v: &Option<String>| v.clone().unwrap_or_default();
    let score = |v: &Option<serde_json::Value>| v.as_ref().map(display_value).unwrap_or_default();

    let half_time = match (&h.home_ht_score, &h.away_ht_score) {
        (Some(hs), Some(aws)) if !hs.is_null() && !aws.is_null() => format!(
            ". Half time: {}:{}",
            display_value(hs),
            display_value(aws)
        ),
        _ => String::new(),
    };
    format!(
        "-{} vs {}{}. Full time: {}:{}. Date: {}",
        text(&h.home_team_name),
        text(&h.away_team_name),
        half_time,
        score(&h.home_ft_score),
        score(&h.away_ft_score),
        text(&h.match_date)
    )
}

/// Title used when the generator returns nothing: the first six words of the
/// body, with `...` when more follow.
pub fn fallback_title(body: &str) -> String {
    let words: Vec<&str> = body.split_whitespace().collect();
    if words.len() > TITLE_WORDS {
        format!("{}...", words[..TITLE_WORDS].join(" "))
    } else {
        words.join(" ")
    }
}
