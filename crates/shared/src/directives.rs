//! Bracketed directives embedded in assistant text.
//!
//! The assistant emits tokens such as `[SEARCH_EVENT: Taylor Swift]` or
//! `[FIND_PLACES: type=hotel | budget=cheap | rating=4 | radius=1600]` inside
//! otherwise free-form prose. [`DirectiveScanner`] consumes the response as it
//! streams, strips every directive from the display text and reports each
//! directive kind at most once per response, no matter where chunk boundaries
//! fall.

use std::collections::HashSet;

use serde::Serialize;

use crate::models::SearchCategory;
use crate::search::filters::Budget;

pub const DEFAULT_FIND_PLACES_RADIUS_M: u32 = 1_500;
pub const MAX_FIND_PLACES_RADIUS_M: u32 = 50_000;

/// Longest unterminated `[...` tail held back while waiting for `]`.
const MAX_PENDING_DIRECTIVE_BYTES: usize = 512;

const METERS_PER_MILE: f64 = 1_609.344;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectiveKind {
    SearchEvent,
    FindPlaces,
    AskHotels,
    ConfirmEvent,
}

impl DirectiveKind {
    const ALL: [DirectiveKind; 4] = [
        Self::SearchEvent,
        Self::FindPlaces,
        Self::AskHotels,
        Self::ConfirmEvent,
    ];

    pub const fn token(self) -> &'static str {
        match self {
            Self::SearchEvent => "SEARCH_EVENT",
            Self::FindPlaces => "FIND_PLACES",
            Self::AskHotels => "ASK_HOTELS",
            Self::ConfirmEvent => "CONFIRM_EVENT",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    SearchEvent { keyword: String },
    FindPlaces(FindPlacesParams),
    AskHotels,
    ConfirmEvent,
}

impl Directive {
    pub fn kind(&self) -> DirectiveKind {
        match self {
            Self::SearchEvent { .. } => DirectiveKind::SearchEvent,
            Self::FindPlaces(_) => DirectiveKind::FindPlaces,
            Self::AskHotels => DirectiveKind::AskHotels,
            Self::ConfirmEvent => DirectiveKind::ConfirmEvent,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FindPlacesParams {
    pub category: SearchCategory,
    pub budget: Budget,
    pub min_rating: f64,
    pub radius_m: u32,
}

impl Default for FindPlacesParams {
    fn default() -> Self {
        Self {
            category: SearchCategory::Food,
            budget: Budget::Moderate,
            min_rating: 0.0,
            radius_m: DEFAULT_FIND_PLACES_RADIUS_M,
        }
    }
}

/// Parses the text between `[` and `]`. Returns `None` when the body is not a
/// directive, in which case the brackets are ordinary prose.
pub fn parse_directive(body: &str) -> Option<Directive> {
    if body.contains('\n') {
        return None;
    }

    let trimmed = body.trim();
    let (kind, rest) = DirectiveKind::ALL.iter().find_map(|kind| {
        strip_keyword(trimmed, kind.token()).map(|rest| (*kind, rest))
    })?;
    let arguments = rest.trim_start();
    let arguments = arguments.strip_prefix(':').unwrap_or(arguments).trim();

    match kind {
        DirectiveKind::SearchEvent => Some(Directive::SearchEvent {
            keyword: arguments.to_string(),
        }),
        DirectiveKind::FindPlaces => Some(Directive::FindPlaces(parse_find_places(arguments))),
        DirectiveKind::AskHotels => Some(Directive::AskHotels),
        DirectiveKind::ConfirmEvent => Some(Directive::ConfirmEvent),
    }
}

/// Case-insensitive keyword match that refuses to match a longer identifier
/// (`ASK_HOTELS_LATER` is not `ASK_HOTELS`).
fn strip_keyword<'a>(text: &'a str, keyword: &str) -> Option<&'a str> {
    let head = text.get(..keyword.len())?;
    if !head.eq_ignore_ascii_case(keyword) {
        return None;
    }

    let rest = &text[keyword.len()..];
    match rest.chars().next() {
        None => Some(rest),
        Some(next) if next == ':' || next.is_whitespace() => Some(rest),
        Some(_) => None,
    }
}

fn parse_find_places(arguments: &str) -> FindPlacesParams {
    let mut params = FindPlacesParams::default();
    let arguments = join_digit_groups(arguments);

    for part in arguments.split(['|', ',']) {
        let Some((key, value)) = part.split_once(['=', ':']) else {
            continue;
        };
        let value = value.trim();

        match key.trim().to_ascii_lowercase().as_str() {
            "type" => {
                if let Some(category) = SearchCategory::from_type_name(value) {
                    params.category = category;
                }
            }
            "budget" | "price" => {
                if let Some(budget) = Budget::parse(value) {
                    params.budget = budget;
                }
            }
            "rating" | "min_rating" => {
                if let Some(rating) = leading_number(value) {
                    params.min_rating = rating.clamp(0.0, 5.0);
                }
            }
            "radius" | "distance" => {
                if let Some(radius_m) = parse_radius_m(value) {
                    params.radius_m = radius_m;
                }
            }
            _ => {}
        }
    }

    params
}

/// Drops thousands separators (`1,600`) so the comma only separates pairs.
fn join_digit_groups(arguments: &str) -> String {
    let chars = arguments.chars().collect::<Vec<_>>();
    chars
        .iter()
        .enumerate()
        .filter(|(index, ch)| {
            **ch != ','
                || !(*index > 0
                    && chars[*index - 1].is_ascii_digit()
                    && chars.get(*index + 1).is_some_and(char::is_ascii_digit))
        })
        .map(|(_, ch)| *ch)
        .collect()
}

fn parse_radius_m(value: &str) -> Option<u32> {
    let amount = leading_number(value)?;
    let unit = value
        .trim_start_matches(|ch: char| ch.is_ascii_digit() || ch == '.')
        .trim()
        .to_ascii_lowercase();
    let meters = match unit.as_str() {
        "mi" | "mile" | "miles" => amount * METERS_PER_MILE,
        "km" | "kilometers" => amount * 1_000.0,
        _ => amount,
    };

    if meters < 1.0 {
        return None;
    }

    Some((meters.round() as u32).min(MAX_FIND_PLACES_RADIUS_M))
}

fn leading_number(value: &str) -> Option<f64> {
    let end = value
        .find(|ch: char| !(ch.is_ascii_digit() || ch == '.'))
        .unwrap_or(value.len());
    value[..end].parse::<f64>().ok()
}

/// True when `tail` (the text after an unmatched `[`) could still grow into a
/// directive.
fn could_become_directive(tail: &str) -> bool {
    if tail.contains('\n') {
        return false;
    }

    let candidate = tail.trim_start();
    DirectiveKind::ALL.iter().any(|kind| {
        let token = kind.token();
        if candidate.len() <= token.len() {
            token
                .get(..candidate.len())
                .is_some_and(|prefix| prefix.eq_ignore_ascii_case(candidate))
        } else {
            strip_keyword(candidate, token).is_some()
        }
    })
}

/// Incremental directive scanner for one assistant response.
#[derive(Debug, Default)]
pub struct DirectiveScanner {
    raw: String,
    consumed: usize,
    display: String,
    fired: HashSet<DirectiveKind>,
}

impl DirectiveScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a streamed chunk and returns directives that fired for the
    /// first time in this response.
    pub fn push(&mut self, chunk: &str) -> Vec<Directive> {
        self.raw.push_str(chunk);
        self.scan(false)
    }

    /// Ends the response. Any held-back `[...` tail is released as text.
    pub fn finish(&mut self) -> Vec<Directive> {
        self.scan(true)
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Directive-free text committed so far.
    pub fn display(&self) -> &str {
        self.display.trim()
    }

    pub fn has_fired(&self, kind: DirectiveKind) -> bool {
        self.fired.contains(&kind)
    }

    fn scan(&mut self, finished: bool) -> Vec<Directive> {
        let mut fired = Vec::new();

        while self.consumed < self.raw.len() {
            let pending = &self.raw[self.consumed..];
            let Some(open) = pending.find('[') else {
                self.display.push_str(pending);
                self.consumed = self.raw.len();
                break;
            };

            self.display.push_str(&pending[..open]);
            let bracket_start = self.consumed + open;
            let after_open = &self.raw[bracket_start + 1..];

            match after_open.find(']') {
                Some(close) => {
                    let body = &after_open[..close];
                    match parse_directive(body) {
                        Some(directive) => {
                            if self.should_fire(&directive) {
                                fired.push(directive);
                            }
                            self.consumed = bracket_start + 1 + close + 1;
                        }
                        None => {
                            self.display.push('[');
                            self.consumed = bracket_start + 1;
                        }
                    }
                }
                None => {
                    let holdable = !finished
                        && self.raw.len() - bracket_start <= MAX_PENDING_DIRECTIVE_BYTES
                        && could_become_directive(after_open);
                    if holdable {
                        self.consumed = bracket_start;
                        break;
                    }

                    self.display.push('[');
                    self.consumed = bracket_start + 1;
                }
            }
        }

        fired
    }

    fn should_fire(&mut self, directive: &Directive) -> bool {
        if let Directive::SearchEvent { keyword } = directive
            && keyword.is_empty()
        {
            return false;
        }

        self.fired.insert(directive.kind())
    }
}

/// Display projection of a complete message.
pub fn strip_directives(text: &str) -> String {
    let mut scanner = DirectiveScanner::new();
    scanner.push(text);
    scanner.finish();
    scanner.display().to_string()
}

#[cfg(test)]
mod tests {
    use super::{
        Directive, DirectiveKind, DirectiveScanner, FindPlacesParams, parse_directive,
        strip_directives,
    };
    use crate::models::SearchCategory;
    use crate::search::filters::Budget;

    fn stream(chunks: &[&str]) -> (Vec<Directive>, String) {
        let mut scanner = DirectiveScanner::new();
        let mut fired = Vec::new();
        for chunk in chunks {
            fired.extend(scanner.push(chunk));
            assert!(
                !scanner.display().contains("SEARCH_EVENT"),
                "partial directive leaked into display: {}",
                scanner.display()
            );
        }
        fired.extend(scanner.finish());
        (fired, scanner.display().to_string())
    }

    #[test]
    fn search_event_fires_once_for_every_chunk_split() {
        let text = "Great choice! [SEARCH_EVENT: Taylor Swift] Let me look that up.";

        for split in 1..text.len() {
            let (fired, display) = stream(&[&text[..split], &text[split..]]);
            assert_eq!(
                fired,
                vec![Directive::SearchEvent {
                    keyword: "Taylor Swift".to_string()
                }],
                "split at {split}"
            );
            assert_eq!(display, "Great choice!  Let me look that up.");
        }
    }

    #[test]
    fn character_by_character_stream_fires_once() {
        let text = "[search_event: Lakers] and again [SEARCH_EVENT: Lakers]";
        let chunks = text
            .char_indices()
            .map(|(index, ch)| &text[index..index + ch.len_utf8()])
            .collect::<Vec<_>>();

        let (fired, display) = stream(&chunks);
        assert_eq!(fired.len(), 1);
        assert_eq!(display, "and again");
    }

    #[test]
    fn find_places_parses_all_parameters() {
        let parsed = parse_directive("FIND_PLACES: type=hotel | budget=cheap | rating=4.0+ | radius=800");
        assert_eq!(
            parsed,
            Some(Directive::FindPlaces(FindPlacesParams {
                category: SearchCategory::Hotel,
                budget: Budget::Cheap,
                min_rating: 4.0,
                radius_m: 800,
            }))
        );
    }

    #[test]
    fn find_places_falls_back_to_defaults() {
        assert_eq!(
            parse_directive("FIND_PLACES"),
            Some(Directive::FindPlaces(FindPlacesParams::default()))
        );

        let Some(Directive::FindPlaces(params)) =
            parse_directive("find_places: type=spa | budget=?? | rating=high | radius=far")
        else {
            panic!("expected FIND_PLACES directive");
        };
        assert_eq!(params.category, SearchCategory::Food);
        assert_eq!(params.budget, Budget::Moderate);
        assert_eq!(params.min_rating, 0.0);
        assert_eq!(params.radius_m, 1_500);
    }

    #[test]
    fn find_places_accepts_units_and_symbols() {
        let Some(Directive::FindPlaces(params)) =
            parse_directive("FIND_PLACES: type=explore | budget=$$$ | rating=9 | radius=1mi")
        else {
            panic!("expected FIND_PLACES directive");
        };
        assert_eq!(params.category, SearchCategory::Explore);
        assert_eq!(params.budget, Budget::Expensive);
        assert_eq!(params.min_rating, 5.0);
        assert_eq!(params.radius_m, 1_609);

        let Some(Directive::FindPlaces(params)) =
            parse_directive("FIND_PLACES: radius=900000")
        else {
            panic!("expected FIND_PLACES directive");
        };
        assert_eq!(params.radius_m, 50_000);
    }

    #[test]
    fn find_places_reads_grouped_thousands() {
        let Some(Directive::FindPlaces(params)) =
            parse_directive("FIND_PLACES: type=hotel | radius=1,600")
        else {
            panic!("expected FIND_PLACES directive");
        };
        assert_eq!(params.radius_m, 1_600);

        let Some(Directive::FindPlaces(params)) =
            parse_directive("FIND_PLACES: type=food, rating=4,radius=2,500m")
        else {
            panic!("expected FIND_PLACES directive");
        };
        assert_eq!(params.category, SearchCategory::Food);
        assert_eq!(params.min_rating, 4.0);
        assert_eq!(params.radius_m, 2_500);
    }

    #[test]
    fn each_kind_fires_at_most_once_per_response() {
        let (fired, display) = stream(&[
            "[ASK_HOTELS] [FIND_PLACES: type=hotel] ",
            "[FIND_PLACES: type=restaurant] [ask_hotels] [CONFIRM_EVENT]",
        ]);

        let kinds = fired.iter().map(Directive::kind).collect::<Vec<_>>();
        assert_eq!(
            kinds,
            vec![
                DirectiveKind::AskHotels,
                DirectiveKind::FindPlaces,
                DirectiveKind::ConfirmEvent
            ]
        );
        let Directive::FindPlaces(params) = &fired[1] else {
            panic!("expected FIND_PLACES directive");
        };
        assert_eq!(params.category, SearchCategory::Hotel);
        assert!(display.is_empty());
    }

    #[test]
    fn ordinary_brackets_stay_in_display_text() {
        assert_eq!(
            strip_directives("Pick one: [A] or [B]. Arrays look like [1, 2]."),
            "Pick one: [A] or [B]. Arrays look like [1, 2]."
        );
        assert_eq!(
            strip_directives("[[SEARCH_EVENT: Coldplay]]"),
            "[]"
        );
        assert_eq!(strip_directives("[ASK_HOTELS_LATER]"), "[ASK_HOTELS_LATER]");
    }

    #[test]
    fn empty_search_keyword_is_stripped_without_firing() {
        let (fired, display) = stream(&["Sure! [SEARCH_EVENT: ]"]);
        assert!(fired.is_empty());
        assert_eq!(display, "Sure!");
    }

    #[test]
    fn unterminated_directive_is_released_when_the_response_ends() {
        let mut scanner = DirectiveScanner::new();
        assert!(scanner.push("Looking now [SEARCH_EVENT: Ad").is_empty());
        assert_eq!(scanner.display(), "Looking now");

        assert!(scanner.finish().is_empty());
        assert_eq!(scanner.display(), "Looking now [SEARCH_EVENT: Ad");
        assert!(!scanner.has_fired(DirectiveKind::SearchEvent));
    }

    #[test]
    fn unrelated_open_bracket_is_not_held_back() {
        let mut scanner = DirectiveScanner::new();
        scanner.push("Options [see below");
        assert_eq!(scanner.display(), "Options [see below");
        assert_eq!(scanner.raw(), "Options [see below");
    }
}
