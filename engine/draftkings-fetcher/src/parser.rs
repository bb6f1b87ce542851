//! Typed walk over the DraftKings response tree

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use props_model::{CategoryDispatcher, MarketLine, Position};
use std::collections::HashMap;
use tracing::{debug, info};

use crate::models::{DkResponse, Offer, Outcome, PropOffer};

/// Line assumed for yes/no markets that carry no explicit line
const YES_NO_LINE: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutcomeSide {
    Over,
    Under,
}

fn outcome_side(label: &str) -> Option<OutcomeSide> {
    let label = label.trim().to_ascii_lowercase();
    if label.starts_with("over") || label == "yes" {
        Some(OutcomeSide::Over)
    } else if label.starts_with("under") || label == "no" {
        Some(OutcomeSide::Under)
    } else {
        None
    }
}

fn is_yes_no(outcome: &Outcome) -> bool {
    matches!(outcome.label.trim().to_ascii_lowercase().as_str(), "yes" | "no")
}

/// Parse an American price, accepting a leading '+' and the unicode minus
pub fn parse_american_odds(raw: &str) -> Option<i32> {
    let cleaned = raw.trim().replace('\u{2212}', "-");
    cleaned.strip_prefix('+').unwrap_or(&cleaned).parse().ok()
}

/// Deserialize a raw response and flatten it into offers
pub fn parse_response(raw: &serde_json::Value, timestamp: DateTime<Utc>) -> Result<Vec<PropOffer>> {
    let response: DkResponse =
        serde_json::from_value(raw.clone()).context("Failed to parse DraftKings response")?;
    Ok(parse_offers(&response, timestamp))
}

/// Flatten every over/under offer in a response
pub fn parse_offers(response: &DkResponse, timestamp: DateTime<Utc>) -> Vec<PropOffer> {
    let group = &response.event_group;
    let event_names: HashMap<String, String> = group
        .events
        .iter()
        .filter_map(|event| event.name.clone().map(|name| (event.event_id.to_string(), name)))
        .collect();

    let mut parsed = Vec::new();
    for category in &group.offer_categories {
        for descriptor in &category.offer_subcategory_descriptors {
            let Some(subcategory) = &descriptor.offer_subcategory else {
                continue;
            };
            let subcategory_id = subcategory
                .subcategory_id
                .as_ref()
                .or(descriptor.subcategory_id.as_ref())
                .map(|id| id.to_string());

            for offer in subcategory.offers.iter().flatten() {
                match parse_offer(offer, &subcategory.name, &event_names, timestamp) {
                    Some(mut prop) => {
                        prop.subcategory_id = subcategory_id.clone();
                        parsed.push(prop);
                    }
                    None => debug!(
                        "Skipping offer {:?} in {}: unrecognised shape",
                        offer.label, subcategory.name
                    ),
                }
            }
        }
    }

    info!("Parsed {} offers", parsed.len());
    parsed
}

fn parse_offer(
    offer: &Offer,
    subcategory_name: &str,
    event_names: &HashMap<String, String>,
    timestamp: DateTime<Utc>,
) -> Option<PropOffer> {
    let mut over = None;
    let mut under = None;
    for outcome in &offer.outcomes {
        match outcome_side(&outcome.label) {
            Some(OutcomeSide::Over) if over.is_none() => over = Some(outcome),
            Some(OutcomeSide::Under) if under.is_none() => under = Some(outcome),
            _ => {}
        }
    }
    if over.is_none() && under.is_none() {
        return None;
    }

    let sides = [over, under];
    let participant = sides.iter().flatten().find_map(|o| o.participant.clone())?;
    let line = sides
        .iter()
        .flatten()
        .find_map(|o| o.line)
        .or_else(|| sides.iter().flatten().any(|o| is_yes_no(o)).then_some(YES_NO_LINE))?;

    let odds = |side: Option<&Outcome>| side.and_then(|o| o.odds_american.as_deref()).and_then(parse_american_odds);
    let event_id = offer.event_id.as_ref().map(|id| id.to_string());

    Some(PropOffer {
        subcategory_id: None,
        subcategory_name: subcategory_name.to_string(),
        offer_label: offer.label.clone(),
        provider_offer_id: offer.provider_offer_id.as_ref().map(|id| id.to_string()),
        event_name: event_id.as_ref().and_then(|id| event_names.get(id).cloned()),
        event_id,
        participant,
        line,
        over_odds: odds(over),
        under_odds: odds(under),
        timestamp,
    })
}

/// Market lines built from parsed offers, with skip counts
#[derive(Debug, Default)]
pub struct MarketBuild {
    pub lines: Vec<MarketLine>,
    pub unknown_labels: usize,
    pub unmatched_players: usize,
}

/// Attach a stat category and position to each offer.
///
/// Participants are translated through `name_map` (exact match) and then
/// looked up in `positions`; offers whose label or player cannot be
/// resolved are skipped.
pub fn build_market_lines(
    offers: &[PropOffer],
    dispatcher: &CategoryDispatcher,
    positions: &HashMap<String, Position>,
    name_map: &HashMap<String, String>,
) -> MarketBuild {
    let mut build = MarketBuild::default();

    for offer in offers {
        let category = match dispatcher.category_for_label(&offer.subcategory_name) {
            Ok(category) => category,
            Err(e) => {
                debug!("{}", e);
                build.unknown_labels += 1;
                continue;
            }
        };

        let name = name_map.get(&offer.participant).unwrap_or(&offer.participant);
        let Some(position) = positions.get(name) else {
            debug!("No position for participant {}", offer.participant);
            build.unmatched_players += 1;
            continue;
        };

        build.lines.push(MarketLine {
            player_id: name.clone(),
            position: *position,
            stat_category: category,
            line: offer.line,
            over_odds: offer.over_odds,
            under_odds: offer.under_odds,
            timestamp: offer.timestamp,
            event_id: offer.event_id.clone(),
        });
    }

    info!(
        "Built {} market lines ({} unknown labels, {} unmatched players)",
        build.lines.len(),
        build.unknown_labels,
        build.unmatched_players
    );
    build
}
