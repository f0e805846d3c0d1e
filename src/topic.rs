//! Topic selection — rotating, non-repeating advice themes.
//!
//! Each advice generation is anchored to a topic drawn from a curated
//! per-breed list (when the breed matches a known keyword) or a generic
//! list. Topics already used for a (user, pet) pair are filtered out so
//! consecutive generations rotate through themes instead of repeating,
//! and every list carries a seasonal topic derived from the calendar
//! month.
//!
//! Topic strings are user-visible and in Spanish, matching the advice
//! output language.

use chrono::{Datelike, Utc};
use rand::Rng;
use rand::seq::SliceRandom;

/// Calendar season, derived from the month in fixed 3-month bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Season {
    Primavera,
    Verano,
    Otono,
    Invierno,
}

impl Season {
    /// Season for a calendar month (1–12). Dec–Feb is winter,
    /// northern-hemisphere style, matching the reference behaviour.
    pub fn from_month(month: u32) -> Self {
        match month {
            3..=5 => Season::Primavera,
            6..=8 => Season::Verano,
            9..=11 => Season::Otono,
            _ => Season::Invierno,
        }
    }

    /// Season for the current UTC month.
    pub fn current() -> Self {
        Self::from_month(Utc::now().month())
    }

    /// Display name, as it appears inside topic strings.
    pub fn name(&self) -> &'static str {
        match self {
            Season::Primavera => "primavera",
            Season::Verano => "verano",
            Season::Otono => "otoño",
            Season::Invierno => "invierno",
        }
    }
}

/// The seasonal topic every candidate list carries.
pub fn seasonal_topic(season: Season) -> String {
    format!("cuidados durante el {}", season.name())
}

/// Generic topics offered when no breed keyword matches.
///
/// Thirteen candidates including the seasonal one.
const GENERIC_TOPICS: &[&str] = &[
    "alimentación equilibrada",
    "actividades en interiores",
    "actividades al aire libre",
    "socialización con otros perros",
    "interacción con niños",
    "interacción con visitas",
    "cuidado del pelaje",
    "salud dental",
    "ejercicio diario",
    "entrenamiento básico",
    "hidratación y golpes de calor",
    "enriquecimiento mental",
];

/// Curated topics per breed keyword. The keyword is matched as a
/// substring of the *normalized* breed; "mestizo"/"criollo" cover the
/// mixed-breed marker.
const BREED_TOPICS: &[(&str, &[&str])] = &[
    (
        "golden",
        &[
            "cuidado del pelaje dorado",
            "prevención de displasia de cadera",
            "juegos de cobro y recogida",
            "socialización con otros perros",
            "limpieza de oídos",
            "control de peso",
        ],
    ),
    (
        "labrador",
        &[
            "control de peso y apetito",
            "ejercicio para perros cobradores",
            "natación y juegos de agua",
            "prevención de displasia de cadera",
            "interacción con niños",
            "estimulación mental",
        ],
    ),
    (
        "bulldog",
        &[
            "cuidado de pliegues de la piel",
            "respiración y golpes de calor",
            "ejercicio moderado",
            "control de peso",
            "actividades en interiores",
            "salud dental",
        ],
    ),
    (
        "chihuahua",
        &[
            "abrigo y temperatura corporal",
            "salud dental en razas pequeñas",
            "socialización temprana",
            "manejo del ladrido",
            "interacción con visitas",
            "ejercicio en espacios pequeños",
        ],
    ),
    (
        "beagle",
        &[
            "juegos de olfato y rastreo",
            "control de peso y apetito",
            "manejo del aullido",
            "ejercicio diario",
            "actividades al aire libre",
            "entrenamiento de llamada",
        ],
    ),
    (
        "mestizo",
        &[
            "alimentación equilibrada",
            "chequeos veterinarios regulares",
            "ejercicio diario",
            "socialización con otros perros",
            "enriquecimiento mental",
            "cuidado del pelaje",
        ],
    ),
    (
        "criollo",
        &[
            "alimentación equilibrada",
            "chequeos veterinarios regulares",
            "ejercicio diario",
            "socialización con otros perros",
            "enriquecimiento mental",
            "cuidado del pelaje",
        ],
    ),
];

/// Candidate topics for a normalized breed: the curated list when a
/// keyword matches, the generic list otherwise. The seasonal topic is
/// always appended.
pub fn candidate_topics(normalized_breed: &str, season: Season) -> Vec<String> {
    for (keyword, topics) in BREED_TOPICS {
        if normalized_breed.contains(keyword) {
            let mut list: Vec<String> = topics.iter().map(|t| t.to_string()).collect();
            list.push(seasonal_topic(season));
            return list;
        }
    }
    generic_topics(season)
}

/// The generic candidate list, seasonal topic included.
pub fn generic_topics(season: Season) -> Vec<String> {
    let mut list: Vec<String> = GENERIC_TOPICS.iter().map(|t| t.to_string()).collect();
    list.push(seasonal_topic(season));
    list
}

/// Pick a topic for a generation, avoiding already-used themes.
///
/// `used` is the topic history for the (user, pet) pair across all its
/// records. Selection order:
///
/// 1. uniform draw from unused curated/generic candidates;
/// 2. if exhausted, uniform draw from unused *generic* candidates;
/// 3. if those are exhausted too, the seasonal topic — repetition is
///    accepted as the terminal fallback, never an error.
pub fn select_topic<R: Rng + ?Sized>(
    normalized_breed: &str,
    used: &[String],
    season: Season,
    rng: &mut R,
) -> String {
    let candidates = candidate_topics(normalized_breed, season);
    if let Some(topic) = draw_unused(&candidates, used, rng) {
        return topic;
    }

    let generic = generic_topics(season);
    if let Some(topic) = draw_unused(&generic, used, rng) {
        return topic;
    }

    seasonal_topic(season)
}

fn draw_unused<R: Rng + ?Sized>(
    candidates: &[String],
    used: &[String],
    rng: &mut R,
) -> Option<String> {
    let available: Vec<&String> = candidates
        .iter()
        .filter(|c| !used.iter().any(|u| u == *c))
        .collect();
    available.choose(rng).map(|t| (*t).clone())
}
