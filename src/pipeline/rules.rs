//! Keyword triage: the fast, zero-cost first pass.
//!
//! Runs on every message. Vision triage (when configured) refines it; when
//! vision is unavailable or fails, this result is used as is.

use crate::model::{TicketCategory, TicketPriority};
use crate::pipeline::types::MaintenanceAnalysis;

/// Category keyword tables, in tie-break order.
const CATEGORY_KEYWORDS: &[(TicketCategory, &[&str])] = &[
    (
        TicketCategory::Plumbing,
        &[
            "leak", "water", "faucet", "toilet", "drain", "pipe", "shower", "bath", "sink",
            "disposal", "flooding", "clogged", "dripping",
        ],
    ),
    (
        TicketCategory::Electrical,
        &[
            "outlet", "switch", "light", "electric", "power", "breaker", "wiring", "sparks",
            "flickering", "dim",
        ],
    ),
    (
        TicketCategory::Hvac,
        &[
            "heat", "cold", "ac", "a/c", "air", "conditioning", "thermostat", "vent",
            "temperature", "hot", "cool", "fan", "filter",
        ],
    ),
    (
        TicketCategory::Appliance,
        &[
            "refrigerator", "fridge", "stove", "oven", "dishwasher", "washer", "dryer",
            "microwave", "garbage disposal", "freezer",
        ],
    ),
    (
        TicketCategory::PestControl,
        &[
            "bug", "roach", "ant", "spider", "mouse", "rat", "pest", "infestation",
            "exterminator",
        ],
    ),
    (
        TicketCategory::Security,
        &[
            "lock", "door", "window", "key", "broken", "security", "deadbolt", "handle",
        ],
    ),
    (
        TicketCategory::Cosmetic,
        &[
            "paint", "wall", "ceiling", "floor", "carpet", "tile", "scratch", "hole", "stain",
            "chip", "crack",
        ],
    ),
];

const EMERGENCY_KEYWORDS: &[&str] = &[
    "flood",
    "gas",
    "smoke",
    "fire",
    "sparks",
    "electrical fire",
    "no heat",
    "no power",
    "broken lock",
    "security",
    "emergency",
    "urgent",
    "major leak",
    "water everywhere",
    "can’t get in",
    "locked out",
];

const HIGH_PRIORITY_KEYWORDS: &[&str] = &[
    "not working",
    "broken",
    "major",
    "significant",
    "important",
    "asap",
    "soon as possible",
    "refrigerator",
    "stove",
    "heat",
    "ac",
    "a/c",
];

/// Confidence when at least one category keyword matched.
pub const KEYWORD_HIT_CONFIDENCE: f32 = 0.8;
/// Confidence when nothing matched.
pub const KEYWORD_MISS_CONFIDENCE: f32 = 0.3;

/// Classify free text by keyword substring hits.
///
/// Matching is plain substring search on the lowercased text, so short
/// keywords also hit inside longer words ("ac" in "back").
pub fn keyword_analysis(description: &str) -> MaintenanceAnalysis {
    let text = description.to_lowercase();

    let mut category = TicketCategory::Unknown;
    let mut best_hits = 0;
    for (candidate, words) in CATEGORY_KEYWORDS {
        let hits = words.iter().filter(|w| text.contains(*w)).count();
        if hits > best_hits {
            best_hits = hits;
            category = *candidate;
        }
    }

    let priority = if EMERGENCY_KEYWORDS.iter().any(|k| text.contains(k)) {
        TicketPriority::Emergency
    } else if HIGH_PRIORITY_KEYWORDS.iter().any(|k| text.contains(k)) {
        TicketPriority::High
    } else if category == TicketCategory::Cosmetic {
        TicketPriority::Low
    } else {
        TicketPriority::Medium
    };

    MaintenanceAnalysis {
        category,
        priority,
        confidence: if best_hits > 0 {
            KEYWORD_HIT_CONFIDENCE
        } else {
            KEYWORD_MISS_CONFIDENCE
        },
        summary: description.to_string(),
    }
}
