use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    FullTime,
    FirstHalf,
    SecondHalf,
}

impl Period {
    fn label_prefix(self) -> &'static str {
        match self {
            Period::FullTime => "",
            Period::FirstHalf => "ht_",
            Period::SecondHalf => "2h_",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Home,
    Away,
}

impl Side {
    fn as_str(self) -> &'static str {
        match self {
            Side::Home => "home",
            Side::Away => "away",
        }
    }
}

/// A half-goal line (0.5, 2.5, -1.5 ...) stored in tenths so it can key maps.
/// Whole lines are rejected: every market here settles without a push.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "f64", try_from = "f64")]
pub struct Line(i16);

impl Line {
    pub fn value(self) -> f64 {
        self.0 as f64 / 10.0
    }

    /// Smallest integer count strictly above the line (2.5 -> 3, -1.5 -> -1).
    pub fn next_integer_above(self) -> i32 {
        (self.0 as i32 + 5).div_euclid(10)
    }

    pub fn negated(self) -> Line {
        Line(-self.0)
    }
}

/// Slack, in tenths, for float noise such as `2.4999999`.
const LINE_TOLERANCE: f64 = 1e-6;

impl TryFrom<f64> for Line {
    type Error = String;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        if !value.is_finite() || value.abs() > 100.0 {
            return Err(format!("line {value} out of range"));
        }
        let scaled = value * 10.0;
        let tenths = scaled.round() as i16;
        if (scaled - scaled.round()).abs() > LINE_TOLERANCE || tenths.rem_euclid(10) != 5 {
            return Err(format!("line {value} is not a half-goal line"));
        }
        Ok(Line(tenths))
    }
}

impl From<Line> for f64 {
    fn from(line: Line) -> f64 {
        line.value()
    }
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}", self.value())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketFamily {
    MatchResult,
    DoubleChance,
    TotalGoals,
    BothTeamsToScore,
    TeamGoals,
    Handicap,
    Corners,
    Cards,
}

/// Every market the engine can price. One computation branch and one settlement
/// method exist per variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Market {
    MatchResult { period: Period },
    DoubleChance { period: Period },
    TotalGoals { period: Period, line: Line },
    BothTeamsToScore,
    TeamGoals { side: Side, line: Line },
    /// Half-goal handicap applied to the home side; `Away` takes the mirrored line.
    Handicap { line: Line },
    Corners { line: Line },
    Cards { line: Line },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Selection {
    Home,
    Draw,
    Away,
    HomeOrDraw,
    DrawOrAway,
    HomeOrAway,
    Over,
    Under,
    Yes,
    No,
}

impl Market {
    pub fn family(&self) -> MarketFamily {
        match self {
            Market::MatchResult { .. } => MarketFamily::MatchResult,
            Market::DoubleChance { .. } => MarketFamily::DoubleChance,
            Market::TotalGoals { .. } => MarketFamily::TotalGoals,
            Market::BothTeamsToScore => MarketFamily::BothTeamsToScore,
            Market::TeamGoals { .. } => MarketFamily::TeamGoals,
            Market::Handicap { .. } => MarketFamily::Handicap,
            Market::Corners { .. } => MarketFamily::Corners,
            Market::Cards { .. } => MarketFamily::Cards,
        }
    }

    pub fn period(&self) -> Period {
        match self {
            Market::MatchResult { period }
            | Market::DoubleChance { period }
            | Market::TotalGoals { period, .. } => *period,
            _ => Period::FullTime,
        }
    }

    /// The selections of this market. For every family except double chance they
    /// form a closed partition of outcomes; double chance selections overlap.
    pub fn selections(&self) -> &'static [Selection] {
        match self {
            Market::MatchResult { .. } => &[Selection::Home, Selection::Draw, Selection::Away],
            Market::DoubleChance { .. } => &[
                Selection::HomeOrDraw,
                Selection::DrawOrAway,
                Selection::HomeOrAway,
            ],
            Market::TotalGoals { .. }
            | Market::TeamGoals { .. }
            | Market::Corners { .. }
            | Market::Cards { .. } => &[Selection::Over, Selection::Under],
            Market::BothTeamsToScore => &[Selection::Yes, Selection::No],
            Market::Handicap { .. } => &[Selection::Home, Selection::Away],
        }
    }

    pub fn accepts(&self, selection: Selection) -> bool {
        self.selections().contains(&selection)
    }

    /// Compact label for one selection of this market, e.g. `over_2.5`, `ht_home`,
    /// `home_-1.5`, `corners_over_9.5`. Inverse of [`parse_label`].
    pub fn label(&self, selection: Selection) -> String {
        let ou = |s: Selection| if s == Selection::Over { "over" } else { "under" };
        match self {
            Market::MatchResult { period } => {
                let s = match selection {
                    Selection::Home => "home",
                    Selection::Draw => "draw",
                    _ => "away",
                };
                format!("{}{s}", period.label_prefix())
            }
            Market::DoubleChance { period } => {
                let s = match selection {
                    Selection::HomeOrDraw => "1x",
                    Selection::DrawOrAway => "x2",
                    _ => "12",
                };
                format!("{}{s}", period.label_prefix())
            }
            Market::TotalGoals { period, line } => {
                format!("{}{}_{line}", period.label_prefix(), ou(selection))
            }
            Market::BothTeamsToScore => {
                if selection == Selection::Yes {
                    "btts_yes".to_string()
                } else {
                    "btts_no".to_string()
                }
            }
            Market::TeamGoals { side, line } => {
                format!("{}_{}_{line}", side.as_str(), ou(selection))
            }
            Market::Handicap { line } => {
                if selection == Selection::Home {
                    format!("home_{:+.1}", line.value())
                } else {
                    format!("away_{:+.1}", line.negated().value())
                }
            }
            Market::Corners { line } => format!("corners_{}_{line}", ou(selection)),
            Market::Cards { line } => format!("cards_{}_{line}", ou(selection)),
        }
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Market::MatchResult { period } => write!(f, "{}match_result", period.label_prefix()),
            Market::DoubleChance { period } => write!(f, "{}double_chance", period.label_prefix()),
            Market::TotalGoals { period, line } => {
                write!(f, "{}total_goals_{line}", period.label_prefix())
            }
            Market::BothTeamsToScore => write!(f, "btts"),
            Market::TeamGoals { side, line } => write!(f, "{}_goals_{line}", side.as_str()),
            Market::Handicap { line } => write!(f, "handicap_{:+.1}", line.value()),
            Market::Corners { line } => write!(f, "corners_{line}"),
            Market::Cards { line } => write!(f, "cards_{line}"),
        }
    }
}

/// Parse a compact selection label back into its market and selection.
pub fn parse_label(raw: &str) -> Option<(Market, Selection)> {
    let s = raw.trim().to_ascii_lowercase();
    let (period, rest) = if let Some(rest) = s.strip_prefix("ht_") {
        (Period::FirstHalf, rest)
    } else if let Some(rest) = s.strip_prefix("2h_") {
        (Period::SecondHalf, rest)
    } else {
        (Period::FullTime, s.as_str())
    };

    let parse_line = |v: &str| v.parse::<f64>().ok().and_then(|x| Line::try_from(x).ok());
    let parse_ou = |v: &str| match v {
        "over" => Some(Selection::Over),
        "under" => Some(Selection::Under),
        _ => None,
    };

    match rest {
        "home" => return Some((Market::MatchResult { period }, Selection::Home)),
        "draw" => return Some((Market::MatchResult { period }, Selection::Draw)),
        "away" => return Some((Market::MatchResult { period }, Selection::Away)),
        "1x" => return Some((Market::DoubleChance { period }, Selection::HomeOrDraw)),
        "x2" => return Some((Market::DoubleChance { period }, Selection::DrawOrAway)),
        "12" => return Some((Market::DoubleChance { period }, Selection::HomeOrAway)),
        _ => {}
    }

    let parts: Vec<&str> = rest.split('_').collect();
    match parts.as_slice() {
        [ou, line] if parse_ou(*ou).is_some() => {
            let line = parse_line(*line)?;
            Some((Market::TotalGoals { period, line }, parse_ou(*ou)?))
        }
        ["btts", yn] if period == Period::FullTime => match *yn {
            "yes" => Some((Market::BothTeamsToScore, Selection::Yes)),
            "no" => Some((Market::BothTeamsToScore, Selection::No)),
            _ => None,
        },
        [side @ ("home" | "away"), ou, line] if period == Period::FullTime => {
            let side = if *side == "home" { Side::Home } else { Side::Away };
            Some((Market::TeamGoals { side, line: parse_line(*line)? }, parse_ou(*ou)?))
        }
        [side @ ("home" | "away"), line] if period == Period::FullTime => {
            let line = parse_line(*line)?;
            if *side == "home" {
                Some((Market::Handicap { line }, Selection::Home))
            } else {
                Some((Market::Handicap { line: line.negated() }, Selection::Away))
            }
        }
        [kind @ ("corners" | "cards"), ou, line] if period == Period::FullTime => {
            let line = parse_line(*line)?;
            let market = if *kind == "corners" {
                Market::Corners { line }
            } else {
                Market::Cards { line }
            };
            Some((market, parse_ou(*ou)?))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(v: f64) -> Line {
        Line::try_from(v).unwrap()
    }

    #[test]
    fn line_rejects_whole_numbers() {
        assert!(Line::try_from(2.0).is_err());
        assert!(Line::try_from(f64::NAN).is_err());
        assert_eq!(line(-1.5).value(), -1.5);
    }

    #[test]
    fn line_rejects_off_grid_values() {
        assert!(Line::try_from(2.54).is_err());
        assert!(Line::try_from(2.45).is_err());
        assert_eq!(line(2.4999999999).value(), 2.5);
    }

    #[test]
    fn next_integer_above_handles_negative_lines() {
        assert_eq!(line(2.5).next_integer_above(), 3);
        assert_eq!(line(0.5).next_integer_above(), 1);
        assert_eq!(line(-0.5).next_integer_above(), 0);
        assert_eq!(line(-1.5).next_integer_above(), -1);
    }

    #[test]
    fn labels_parse_back() {
        let cases = [
            (Market::MatchResult { period: Period::FullTime }, Selection::Draw),
            (Market::MatchResult { period: Period::FirstHalf }, Selection::Home),
            (Market::DoubleChance { period: Period::FullTime }, Selection::DrawOrAway),
            (
                Market::TotalGoals {
                    period: Period::SecondHalf,
                    line: line(1.5),
                },
                Selection::Under,
            ),
            (Market::BothTeamsToScore, Selection::No),
            (
                Market::TeamGoals {
                    side: Side::Away,
                    line: line(0.5),
                },
                Selection::Over,
            ),
            (Market::Handicap { line: line(-1.5) }, Selection::Home),
            (Market::Handicap { line: line(-1.5) }, Selection::Away),
            (Market::Corners { line: line(9.5) }, Selection::Over),
            (Market::Cards { line: line(3.5) }, Selection::Under),
        ];
        for (market, selection) in cases {
            let label = market.label(selection);
            assert_eq!(parse_label(&label), Some((market, selection)), "{label}");
        }
    }

    #[test]
    fn handicap_labels_mirror_the_line() {
        let m = Market::Handicap { line: line(-1.5) };
        assert_eq!(m.label(Selection::Home), "home_-1.5");
        assert_eq!(m.label(Selection::Away), "away_+1.5");
    }

    #[test]
    fn market_serializes_with_kind_tag() {
        let m = Market::TotalGoals {
            period: Period::FullTime,
            line: line(2.5),
        };
        let json = serde_json::to_string(&m).unwrap();
        assert_eq!(json, r#"{"kind":"total_goals","period":"full_time","line":2.5}"#);
        let back: Market = serde_json::from_str(&json).unwrap();
        assert_eq!(back, m);
    }

    #[test]
    fn selection_must_belong_to_market() {
        assert!(Market::BothTeamsToScore.accepts(Selection::Yes));
        assert!(!Market::BothTeamsToScore.accepts(Selection::Over));
        assert!(!Market::Handicap { line: line(0.5) }.accepts(Selection::Draw));
    }
}
